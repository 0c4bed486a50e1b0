use super::{position, read_binning_index};
use crate::pair::classify;
use crate::storage::ReadSeek;
use crate::types::{AlignmentRecord, Format, GenomicRange, KnownReference, Mate, Record};
use crate::{Error, Result};
use noodles::bam;
use noodles::bgzf;
use noodles::core::region::Interval;
use noodles::csi::binning_index::BinningIndex;
use std::path::Path;
use tracing::debug;

/// BAM alignments behind a BAI or CSI index.
///
/// Positions are 1-based and closed, as in the underlying format. An
/// alignment's end is its start plus the reference span of its CIGAR.
pub struct BamSource {
    reader: bam::io::Reader<bgzf::Reader<Box<dyn ReadSeek>>>,
    index: Box<dyn BinningIndex>,
    references: Vec<KnownReference>,
}

enum Step {
    Keep(Record),
    Skip,
    Past,
}

impl BamSource {
    pub fn open(inner: Box<dyn ReadSeek>, index_path: &Path) -> Result<Self> {
        let index = read_binning_index(Format::Bam, index_path)?;

        // bam::io::Reader::new wraps the stream in a BGZF reader internally
        let mut reader = bam::io::Reader::new(inner);
        let header = reader
            .read_header()
            .map_err(|e| Error::InvalidInput(format!("failed to read BAM header: {}", e)))?;

        let references = header
            .reference_sequences()
            .iter()
            .map(|(name, reference_sequence)| {
                KnownReference::new(
                    String::from_utf8_lossy(name).into_owned(),
                    Some(usize::from(reference_sequence.length()) as u64),
                )
            })
            .collect();

        Ok(Self {
            reader,
            index,
            references,
        })
    }

    pub fn references(&self) -> &[KnownReference] {
        &self.references
    }

    /// Mapped alignments overlapping `range`, in file order.
    pub fn records(&mut self, range: &GenomicRange) -> Result<Vec<Record>> {
        let reference_id = self
            .references
            .iter()
            .position(|r| r.name == range.reference)
            .ok_or_else(|| Error::NotFound(format!("reference sequence not found: {}", range.reference)))?;

        let interval = Interval::from(position(range.start)?..=position(range.end)?);
        let chunks = self
            .index
            .query(reference_id, interval)
            .map_err(|e| Error::Internal(format!("index query failed: {}", e)))?;

        debug!(%range, chunks = chunks.len(), "querying BAM");

        let mut records = Vec::new();
        let mut record = bam::Record::default();

        'chunks: for chunk in chunks {
            self.reader.get_mut().seek(chunk.start())?;

            while self.reader.get_ref().virtual_position() < chunk.end() {
                if self.reader.read_record(&mut record)? == 0 {
                    break;
                }

                match self.convert(&record, reference_id, range)? {
                    Step::Keep(converted) => records.push(converted),
                    Step::Skip => {}
                    Step::Past => break 'chunks,
                }
            }
        }

        Ok(records)
    }

    fn convert(&self, record: &bam::Record, reference_id: usize, range: &GenomicRange) -> Result<Step> {
        let flags = record.flags();
        if flags.is_unmapped() {
            return Ok(Step::Skip);
        }

        let Some(id) = record.reference_sequence_id().transpose()? else {
            return Ok(Step::Skip);
        };
        if id != reference_id {
            // Coordinate-sorted: a later reference means the range is exhausted
            return Ok(if id > reference_id { Step::Past } else { Step::Skip });
        }

        let Some(start) = record.alignment_start().transpose()? else {
            return Ok(Step::Skip);
        };
        let start = usize::from(start) as u64;
        if start > range.end {
            return Ok(Step::Past);
        }

        let end = start + reference_span(record)?.max(1) - 1;
        if end < range.start {
            return Ok(Step::Skip);
        }

        let reverse = flags.is_reverse_complemented();
        let mate = if flags.is_segmented() && !flags.is_mate_unmapped() {
            self.mate(record)?
        } else {
            None
        };

        let pair_type = mate
            .as_ref()
            .filter(|mate| mate.reference == range.reference)
            .map(|mate| classify(start, mate.start, reverse, mate.reverse));

        Ok(Step::Keep(Record::Alignment(AlignmentRecord {
            name: record
                .name()
                .map(|name| String::from_utf8_lossy(name).into_owned()),
            reference: range.reference.clone(),
            start,
            end,
            reverse,
            mapping_quality: record.mapping_quality().map(|mq| mq.get()),
            mate,
            pair_type,
        })))
    }

    fn mate(&self, record: &bam::Record) -> Result<Option<Mate>> {
        let Some(id) = record.mate_reference_sequence_id().transpose()? else {
            return Ok(None);
        };
        let Some(start) = record.mate_alignment_start().transpose()? else {
            return Ok(None);
        };
        let Some(reference) = self.references.get(id) else {
            return Ok(None);
        };

        Ok(Some(Mate {
            reference: reference.name.clone(),
            start: usize::from(start) as u64,
            reverse: record.flags().is_mate_reverse_complemented(),
        }))
    }
}

/// Number of reference bases covered by the alignment's CIGAR.
fn reference_span(record: &bam::Record) -> Result<u64> {
    let mut span = 0;
    for op in record.cigar().iter() {
        let op = op?;
        if op.kind().consumes_reference() {
            span += op.len() as u64;
        }
    }
    Ok(span)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pair::PairType;
    use std::fs::File;

    fn source() -> BamSource {
        let file = File::open("tests/data/mt.bam").unwrap();
        BamSource::open(Box::new(file), Path::new("tests/data/mt.bam.bai")).unwrap()
    }

    fn alignments(records: Vec<Record>) -> Vec<AlignmentRecord> {
        records
            .into_iter()
            .map(|record| match record {
                Record::Alignment(alignment) => alignment,
                other => panic!("expected alignment record, got {:?}", other),
            })
            .collect()
    }

    #[test]
    fn test_references() {
        assert_eq!(
            source().references(),
            &[KnownReference::new("chrM", Some(16569))]
        );
    }

    #[test]
    fn test_whole_reference_skips_unmapped() {
        let mut source = source();
        let range = GenomicRange::new("chrM", 1, 16569).unwrap();
        let records = alignments(source.records(&range).unwrap());

        let starts: Vec<u64> = records.iter().map(|r| r.start).collect();
        assert_eq!(starts, vec![100, 150, 300, 5000]);

        let first = &records[0];
        assert_eq!(first.name.as_deref(), Some("r001"));
        assert_eq!(first.end, 149);
        assert_eq!(first.mapping_quality, Some(60));
        assert_eq!(
            first.mate,
            Some(Mate {
                reference: "chrM".to_string(),
                start: 300,
                reverse: true,
            })
        );
        assert_eq!(first.pair_type, Some(PairType::Normal));

        assert_eq!(records[1].pair_type, Some(PairType::InvertedRead));
        assert_eq!(records[2].pair_type, Some(PairType::Normal));
        assert!(records[2].reverse);

        // 10M5I20M spans 30 reference bases
        let single = &records[3];
        assert_eq!((single.start, single.end), (5000, 5029));
        assert_eq!(single.mate, None);
        assert_eq!(single.pair_type, None);
    }

    #[test]
    fn test_partial_range() {
        let mut source = source();
        let range = GenomicRange::new("chrM", 120, 160).unwrap();
        let records = alignments(source.records(&range).unwrap());
        let starts: Vec<u64> = records.iter().map(|r| r.start).collect();
        assert_eq!(starts, vec![100, 150]);

        let range = GenomicRange::new("chrM", 6000, 7000).unwrap();
        assert!(source.records(&range).unwrap().is_empty());
    }

    #[test]
    fn test_unknown_reference() {
        let range = GenomicRange::new("chr1", 1, 100).unwrap();
        assert!(matches!(source().records(&range), Err(Error::NotFound(_))));
    }
}
