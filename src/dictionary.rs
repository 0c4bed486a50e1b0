//! Name to location lookup table for "jump to feature" navigation.
//!
//! A sidecar file lists one feature per line:
//!
//! ```text
//! # name<TAB>reference:start-end
//! BRCA1	chr17:41196312-41277500
//! ```
//!
//! Coordinates are 1-based and closed. Files ending in `.gz` are decompressed.

use flate2::read::MultiGzDecoder;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::info;

use crate::types::GenomicRange;
use crate::{Error, Result};

#[derive(Debug, Clone, Default)]
pub struct Dictionary {
    entries: HashMap<String, Vec<GenomicRange>>,
}

impl Dictionary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a dictionary from a sidecar file.
    pub fn build(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .map_err(|e| Error::NotFound(format!("{}: {}", path.display(), e)))?;

        let is_gzip = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("gz"));

        let dictionary = if is_gzip {
            Self::from_reader(BufReader::new(MultiGzDecoder::new(file)))?
        } else {
            Self::from_reader(BufReader::new(file))?
        };

        info!(
            path = %path.display(),
            keys = dictionary.len(),
            "loaded feature dictionary"
        );
        Ok(dictionary)
    }

    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self> {
        let mut dictionary = Self::new();

        for (i, line) in reader.lines().enumerate() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let (name, range) = parse_line(line)
                .map_err(|e| Error::InvalidInput(format!("dictionary line {}: {}", i + 1, e)))?;
            dictionary.insert(name, range);
        }

        Ok(dictionary)
    }

    /// Add a location under a case-insensitive key.
    ///
    /// Existing locations on the same reference that intersect the new range
    /// are folded into a single entry. Adjacent ranges stay separate.
    pub fn insert(&mut self, name: &str, range: GenomicRange) {
        let locations = self.entries.entry(name.to_lowercase()).or_default();

        let mut merged = range;
        locations.retain(|existing| {
            if existing.intersects(&merged) {
                merged.start = merged.start.min(existing.start);
                merged.end = merged.end.max(existing.end);
                false
            } else {
                true
            }
        });

        // A widened range can now reach entries that were kept above.
        while let Some(i) = locations.iter().position(|l| l.intersects(&merged)) {
            let existing = locations.swap_remove(i);
            merged.start = merged.start.min(existing.start);
            merged.end = merged.end.max(existing.end);
        }

        locations.push(merged);
        locations.sort_by(|a, b| {
            a.reference
                .cmp(&b.reference)
                .then(a.start.cmp(&b.start))
        });
    }

    pub fn lookup(&self, key: &str) -> &[GenomicRange] {
        self.entries
            .get(&key.to_lowercase())
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn parse_line(line: &str) -> std::result::Result<(&str, GenomicRange), String> {
    let (name, location) = line
        .split_once('\t')
        .ok_or_else(|| "expected name<TAB>location".to_string())?;

    let name = name.trim();
    if name.is_empty() {
        return Err("empty feature name".to_string());
    }

    let range = parse_location(location.trim())?;
    Ok((name, range))
}

/// Parse `reference:start-end` or `reference:position`.
pub fn parse_location(location: &str) -> std::result::Result<GenomicRange, String> {
    let (reference, span) = location
        .rsplit_once(':')
        .ok_or_else(|| format!("expected reference:start-end, got {:?}", location))?;

    let parse = |s: &str| -> std::result::Result<u64, String> {
        s.trim()
            .replace(',', "")
            .parse::<u64>()
            .map_err(|e| format!("invalid coordinate {:?}: {}", s, e))
    };

    let (start, end) = match span.split_once('-') {
        Some((start, end)) => (parse(start)?, parse(end)?),
        None => {
            let position = parse(span)?;
            (position, position)
        }
    };

    GenomicRange::new(reference, start, end).map_err(|e| e.to_string())
}
