use serde::{Deserialize, Serialize};
use std::fmt;

use crate::pair::PairType;
use crate::{Error, Result};

/// Record source formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Format {
    Bam,
    Tabix,
    Fasta,
}

impl Format {
    /// Detect the format from a file name or URL path.
    pub fn detect(name: &str) -> Option<Self> {
        let lower = name.to_ascii_lowercase();
        let lower = lower.split(['?', '#']).next().unwrap_or_default();

        let compressed = lower
            .strip_suffix(".gz")
            .or_else(|| lower.strip_suffix(".bgz"));

        match compressed {
            // Bgzipped FASTA needs a GZI index, which is not read
            Some(inner) if is_fasta(inner) => None,
            Some(_) => Some(Format::Tabix),
            None if lower.ends_with(".bam") => Some(Format::Bam),
            None if is_fasta(lower) => Some(Format::Fasta),
            None => None,
        }
    }

    /// Companion index suffixes, in the order they are tried.
    pub fn index_suffixes(&self) -> &'static [&'static str] {
        match self {
            Format::Bam => &["bai", "csi"],
            Format::Tabix => &["tbi", "csi"],
            Format::Fasta => &["fai"],
        }
    }
}

fn is_fasta(name: &str) -> bool {
    [".fa", ".fasta", ".fna", ".fas"]
        .iter()
        .any(|ext| name.ends_with(ext))
}

/// A closed interval on a reference sequence, 1-based at both ends.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GenomicRange {
    pub reference: String,
    pub start: u64,
    pub end: u64,
}

impl GenomicRange {
    pub fn new(reference: impl Into<String>, start: u64, end: u64) -> Result<Self> {
        let range = Self {
            reference: reference.into(),
            start,
            end,
        };
        range.validate()?;
        Ok(range)
    }

    /// Check `1 <= start <= end`.
    ///
    /// Fields are public and deserializable, so ranges built without
    /// [`new`](Self::new) are checked again before they reach a reader.
    pub fn validate(&self) -> Result<()> {
        if self.start == 0 {
            return Err(Error::InvalidRange("start must be 1-based".to_string()));
        }
        if self.start > self.end {
            return Err(Error::InvalidRange(format!(
                "start {} > end {}",
                self.start, self.end
            )));
        }
        Ok(())
    }

    /// Whether the two ranges share at least one position. Adjacent ranges do not.
    pub fn intersects(&self, other: &GenomicRange) -> bool {
        self.reference == other.reference && self.start <= other.end && other.start <= self.end
    }

    pub fn overlaps(&self, start: u64, end: u64) -> bool {
        self.start <= end && start <= self.end
    }

    pub fn span(&self) -> u64 {
        self.end - self.start + 1
    }
}

impl fmt::Display for GenomicRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}-{}", self.reference, self.start, self.end)
    }
}

/// Index tier requested by a caller.
///
/// None of the supported formats carries pre-aggregated zoom levels, so every
/// tier is answered from the native records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resolution {
    #[default]
    High,
    Medium,
    Low,
}

/// A range query against a record source.
#[derive(Debug, Clone)]
pub struct Query {
    pub range: GenomicRange,
    pub resolution: Resolution,
    /// Length of the requested reference in the caller's genome, if known.
    pub reference_length: Option<u64>,
}

impl Query {
    pub fn new(range: GenomicRange) -> Self {
        Self {
            range,
            resolution: Resolution::default(),
            reference_length: None,
        }
    }

    pub fn with_resolution(mut self, resolution: Resolution) -> Self {
        self.resolution = resolution;
        self
    }

    pub fn with_reference_length(mut self, length: u64) -> Self {
        self.reference_length = Some(length);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Record {
    Alignment(AlignmentRecord),
    Interval(IntervalRecord),
    Sequence(SequenceRecord),
}

impl Record {
    pub fn start(&self) -> u64 {
        match self {
            Record::Alignment(r) => r.start,
            Record::Interval(r) => r.start,
            Record::Sequence(r) => r.start,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlignmentRecord {
    pub name: Option<String>,
    pub reference: String,
    pub start: u64,
    pub end: u64,
    pub reverse: bool,
    pub mapping_quality: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mate: Option<Mate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pair_type: Option<PairType>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Mate {
    pub reference: String,
    pub start: u64,
    pub reverse: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IntervalRecord {
    pub reference: String,
    pub start: u64,
    pub end: u64,
    pub fields: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SequenceRecord {
    pub reference: String,
    pub start: u64,
    pub end: u64,
    pub sequence: String,
}

/// A reference sequence as declared by an opened file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KnownReference {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub length: Option<u64>,
}

impl KnownReference {
    pub fn new(name: impl Into<String>, length: Option<u64>) -> Self {
        Self {
            name: name.into(),
            length,
        }
    }
}

/// Query parameters for `GET /records/:id`
#[derive(Debug, Deserialize, Default)]
pub struct RecordsQuery {
    #[serde(rename = "referenceName")]
    pub reference_name: String,
    pub start: Option<u64>,
    pub end: Option<u64>,
    pub resolution: Option<Resolution>,
    #[serde(rename = "referenceLength")]
    pub reference_length: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct RecordsResponse {
    pub format: Format,
    pub reference: String,
    pub records: Vec<Record>,
}

#[derive(Debug, Serialize)]
pub struct ReferencesResponse {
    pub format: Format,
    pub references: Vec<KnownReference>,
}

#[derive(Debug, Deserialize)]
pub struct FeaturesQuery {
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct FeaturesResponse {
    pub name: String,
    pub locations: Vec<GenomicRange>,
}

/// Service info response
#[derive(Debug, Serialize)]
pub struct ServiceInfo {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub version: String,
    pub formats: Vec<Format>,
    pub dictionary: bool,
}
