use super::{position, read_binning_index};
use crate::storage::ReadSeek;
use crate::types::{Format, GenomicRange, IntervalRecord, KnownReference, Record};
use crate::{Error, Result};
use noodles::bgzf;
use noodles::core::region::Interval;
use noodles::csi::binning_index::BinningIndex;
use noodles::csi::binning_index::index::header::format::{CoordinateSystem, Format as TabixFormat};
use std::io::BufRead;
use std::path::Path;
use tracing::debug;

/// Column layout of a tabix-indexed text file, taken from the index header.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Layout {
    /// 0-based column positions
    reference: usize,
    start: usize,
    end: Option<usize>,
    zero_based: bool,
    vcf: bool,
    comment: u8,
}

/// Bgzipped, tab-delimited records behind a TBI or CSI index.
///
/// Native coordinates follow the index header: BED-style files are 0-based
/// half-open and are shifted to 1-based closed; GFF-, VCF- and SAM-style files
/// are already 1-based. A VCF record ends at `POS + len(REF) - 1`.
pub struct TabixSource {
    reader: bgzf::Reader<Box<dyn ReadSeek>>,
    index: Box<dyn BinningIndex>,
    layout: Layout,
    references: Vec<KnownReference>,
}

impl TabixSource {
    pub fn open(inner: Box<dyn ReadSeek>, index_path: &Path) -> Result<Self> {
        let index = read_binning_index(Format::Tabix, index_path)?;
        let header = index.header().ok_or_else(|| {
            Error::InvalidInput(format!(
                "index has no tabix header: {}",
                index_path.display()
            ))
        })?;

        let (zero_based, vcf) = match header.format() {
            TabixFormat::Generic(CoordinateSystem::Bed) => (true, false),
            TabixFormat::Vcf => (false, true),
            _ => (false, false),
        };

        // Header column indices are 1-based
        let layout = Layout {
            reference: header.reference_sequence_name_index().saturating_sub(1),
            start: header.start_position_index().saturating_sub(1),
            end: header.end_position_index().map(|i| i.saturating_sub(1)),
            zero_based,
            vcf,
            comment: header.line_comment_prefix(),
        };

        let references = header
            .reference_sequence_names()
            .iter()
            .map(|name| {
                let name: &[u8] = name.as_ref();
                KnownReference::new(String::from_utf8_lossy(name).into_owned(), None)
            })
            .collect();

        Ok(Self {
            reader: bgzf::Reader::new(inner),
            index,
            layout,
            references,
        })
    }

    pub fn references(&self) -> &[KnownReference] {
        &self.references
    }

    /// Records overlapping `range`, in file order.
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

        debug!(%range, chunks = chunks.len(), "querying tabix");

        let mut records = Vec::new();
        let mut line = String::new();

        'chunks: for chunk in chunks {
            self.reader.seek(chunk.start())?;

            while self.reader.virtual_position() < chunk.end() {
                line.clear();
                if self.reader.read_line(&mut line)? == 0 {
                    break;
                }

                let text = line.trim_end_matches(['\n', '\r']);
                if text.is_empty() || text.as_bytes()[0] == self.layout.comment {
                    continue;
                }

                let record = parse_line(text, &self.layout)?;
                if record.reference != range.reference {
                    continue;
                }
                if record.start > range.end {
                    break 'chunks;
                }
                if record.end >= range.start {
                    records.push(Record::Interval(record));
                }
            }
        }

        Ok(records)
    }
}

fn parse_line(line: &str, layout: &Layout) -> Result<IntervalRecord> {
    let fields: Vec<String> = line.split('\t').map(str::to_string).collect();

    let reference = column(&fields, layout.reference, line)?.to_string();
    let raw_start = number(&fields, layout.start, line)?;

    let (start, end) = if layout.vcf {
        // REF is the fourth VCF column
        let reference_bases = column(&fields, 3, line)?.len() as u64;
        (raw_start, raw_start + reference_bases.max(1) - 1)
    } else {
        let raw_end = match layout.end {
            Some(i) => number(&fields, i, line)?,
            None => raw_start + u64::from(layout.zero_based),
        };
        if layout.zero_based {
            (raw_start + 1, raw_end.max(raw_start + 1))
        } else {
            (raw_start, raw_end.max(raw_start))
        }
    };

    Ok(IntervalRecord {
        reference,
        start,
        end,
        fields,
    })
}

fn column<'a>(fields: &'a [String], i: usize, line: &str) -> Result<&'a str> {
    fields
        .get(i)
        .map(String::as_str)
        .ok_or_else(|| Error::InvalidInput(format!("missing column {} in {:?}", i + 1, line)))
}

fn number(fields: &[String], i: usize, line: &str) -> Result<u64> {
    let value = column(fields, i, line)?;
    value
        .trim()
        .parse()
        .map_err(|_| Error::InvalidInput(format!("invalid position {:?} in column {}", value, i + 1)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;

    fn bed() -> Layout {
        Layout {
            reference: 0,
            start: 1,
            end: Some(2),
            zero_based: true,
            vcf: false,
            comment: b'#',
        }
    }

    #[test]
    fn test_parse_bed_line() {
        let record = parse_line("chr1\t99\t200\tfeature", &bed()).unwrap();
        assert_eq!(record.reference, "chr1");
        assert_eq!((record.start, record.end), (100, 200));
        assert_eq!(record.fields.len(), 4);
    }

    #[test]
    fn test_parse_gff_line() {
        let layout = Layout {
            reference: 0,
            start: 3,
            end: Some(4),
            zero_based: false,
            vcf: false,
            comment: b'#',
        };
        let record = parse_line("chr2\tsrc\tgene\t1000\t2000\t.\t+\t.\tID=g1", &layout).unwrap();
        assert_eq!((record.start, record.end), (1000, 2000));
    }

    #[test]
    fn test_parse_vcf_line() {
        let layout = Layout {
            reference: 0,
            start: 1,
            end: None,
            zero_based: false,
            vcf: true,
            comment: b'#',
        };
        let record = parse_line("chr1\t500\t.\tACGT\tA\t50\tPASS\t.", &layout).unwrap();
        assert_eq!((record.start, record.end), (500, 503));
    }

    #[test]
    fn test_parse_line_errors() {
        assert!(parse_line("chr1\tx\t10", &bed()).is_err());
        assert!(parse_line("chr1\t10", &bed()).is_err());
    }

    fn source() -> TabixSource {
        let file = File::open("tests/data/sample.bed.gz").unwrap();
        TabixSource::open(Box::new(file), Path::new("tests/data/sample.bed.gz.tbi")).unwrap()
    }

    fn spans(records: Vec<Record>) -> Vec<(u64, u64)> {
        records
            .into_iter()
            .map(|record| match record {
                Record::Interval(interval) => (interval.start, interval.end),
                other => panic!("expected interval record, got {:?}", other),
            })
            .collect()
    }

    #[test]
    fn test_layout_from_header() {
        let source = source();
        assert_eq!(source.layout, bed());
        assert_eq!(source.references()[1], KnownReference::new("chr2", None));
    }

    #[test]
    fn test_bed_query_is_one_based() {
        let mut source = source();

        let range = GenomicRange::new("chr1", 150, 160).unwrap();
        assert_eq!(spans(source.records(&range).unwrap()), vec![(100, 200), (150, 300)]);

        let range = GenomicRange::new("chr1", 201, 4999).unwrap();
        assert_eq!(spans(source.records(&range).unwrap()), vec![(150, 300)]);

        let range = GenomicRange::new("chr2", 1, 100).unwrap();
        assert_eq!(spans(source.records(&range).unwrap()), vec![(10, 50)]);
    }
}
