use crate::storage::{ByteRange, ReadSeek};
use crate::types::{GenomicRange, KnownReference, Record, SequenceRecord};
use crate::{Error, Result};
use noodles::fasta::fai;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use tracing::debug;

/// Layout of one sequence in a FASTA file, from its FAI record.
#[derive(Debug, Clone)]
struct Layout {
    name: String,
    length: u64,
    offset: u64,
    line_bases: u64,
    line_width: u64,
}

/// Reference sequence behind a FAI index.
///
/// Queries are 1-based closed and clamped to the sequence length; the byte
/// arithmetic works on 0-based half-open base offsets.
pub struct FastaSource {
    reader: Box<dyn ReadSeek>,
    layouts: Vec<Layout>,
    references: Vec<KnownReference>,
}

impl FastaSource {
    pub fn open(inner: Box<dyn ReadSeek>, index_path: &Path) -> Result<Self> {
        let index = fai::read(index_path)
            .map_err(|e| Error::InvalidInput(format!("failed to read FAI index: {}", e)))?;

        // FAI Index wraps Vec<Record>, access via as_ref()
        let layouts: Vec<Layout> = index
            .as_ref()
            .iter()
            .map(|record| Layout {
                name: String::from_utf8_lossy(record.name()).into_owned(),
                length: record.length() as u64,
                offset: record.offset(),
                line_bases: record.line_bases() as u64,
                line_width: record.line_width() as u64,
            })
            .collect();

        if let Some(bad) = layouts.iter().find(|l| l.line_bases == 0) {
            return Err(Error::InvalidInput(format!(
                "FAI record {} has zero bases per line",
                bad.name
            )));
        }

        let references = layouts
            .iter()
            .map(|l| KnownReference::new(l.name.clone(), Some(l.length)))
            .collect();

        Ok(Self {
            reader: inner,
            layouts,
            references,
        })
    }

    pub fn references(&self) -> &[KnownReference] {
        &self.references
    }

    /// The bases covered by `range`, as a single record.
    ///
    /// A range starting past the end of the sequence yields no records.
    pub fn records(&mut self, range: &GenomicRange) -> Result<Vec<Record>> {
        range.validate()?;
        let layout = self
            .layouts
            .iter()
            .find(|l| l.name == range.reference)
            .ok_or_else(|| Error::NotFound(format!("sequence not found: {}", range.reference)))?;

        let end = range.end.min(layout.length);
        if range.start > end {
            return Ok(Vec::new());
        }

        let bytes = byte_range(layout, range.start - 1, end);
        debug!(%range, start = bytes.start, end = bytes.end, "reading FASTA bytes");

        let mut buf = vec![0u8; (bytes.end - bytes.start) as usize];
        self.reader.seek(SeekFrom::Start(bytes.start))?;
        self.reader.read_exact(&mut buf)?;
        buf.retain(|b| !matches!(b, b'\n' | b'\r'));

        Ok(vec![Record::Sequence(SequenceRecord {
            reference: range.reference.clone(),
            start: range.start,
            end,
            sequence: String::from_utf8_lossy(&buf).into_owned(),
        })])
    }
}

/// File bytes holding the 0-based half-open bases `[start_base, end_base)`.
fn byte_range(layout: &Layout, start_base: u64, end_base: u64) -> ByteRange {
    // Each line has line_bases bases and line_width bytes
    let start_line = start_base / layout.line_bases;
    let end_line = (end_base - 1) / layout.line_bases;

    ByteRange {
        start: layout.offset + start_line * layout.line_width + (start_base % layout.line_bases),
        end: layout.offset
            + end_line * layout.line_width
            + ((end_base - 1) % layout.line_bases)
            + 1,
    }
}
