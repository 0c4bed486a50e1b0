//! Record sources over indexed genomic files.
//!
//! A [`RecordSource`] pairs an open primary file (local or remote) with its
//! resolved companion index and answers range queries against it.
//!
//! # Supported Formats
//!
//! - [`BamSource`] - BAM alignments (`.bai`, `.csi`)
//! - [`TabixSource`] - bgzipped tab-delimited files (`.tbi`, `.csi`)
//! - [`FastaSource`] - FASTA sequences (`.fai`)
//!
//! # Index Resolution
//!
//! Local files use a co-located index (`sample.bam.bai`, then `sample.bai`).
//! Remote files get their index through the [`IndexCache`].

mod bam;
mod fasta;
mod tabix;

pub use bam::BamSource;
pub use fasta::FastaSource;
pub use tabix::TabixSource;

use crate::resolve::{ReferenceNameResolver, UnresolvedPolicy};
use crate::storage::{IndexCache, Location, ReadSeek, local};
use crate::types::{Format, GenomicRange, KnownReference, Query, Record, Resolution};
use crate::{Error, Result};
use noodles::core::Position;
use noodles::csi::binning_index::BinningIndex;
use noodles::{bam::bai, csi, tabix as tbi};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

enum Backend {
    Bam(BamSource),
    Tabix(TabixSource),
    Fasta(FastaSource),
}

impl Backend {
    fn references(&self) -> &[KnownReference] {
        match self {
            Backend::Bam(source) => source.references(),
            Backend::Tabix(source) => source.references(),
            Backend::Fasta(source) => source.references(),
        }
    }

    fn records(&mut self, range: &GenomicRange) -> Result<Vec<Record>> {
        match self {
            Backend::Bam(source) => source.records(range),
            Backend::Tabix(source) => source.records(range),
            Backend::Fasta(source) => source.records(range),
        }
    }
}

/// An opened primary file and its index.
///
/// The handle is open from construction until [`close`](Self::close); closing
/// is idempotent and queries on a closed source fail with [`Error::Closed`].
pub struct RecordSource {
    location: Location,
    format: Format,
    index_path: PathBuf,
    resolver: ReferenceNameResolver,
    backend: Option<Backend>,
}

impl RecordSource {
    pub fn location(&self) -> &Location {
        &self.location
    }

    pub fn format(&self) -> Format {
        self.format
    }

    /// Local path of the index in use, possibly inside the index cache.
    pub fn index_path(&self) -> &Path {
        &self.index_path
    }

    pub fn is_open(&self) -> bool {
        self.backend.is_some()
    }

    /// The file's own reference dictionary, in declaration order.
    pub fn references(&self) -> Result<&[KnownReference]> {
        self.backend
            .as_ref()
            .map(Backend::references)
            .ok_or(Error::Closed)
    }

    pub fn reference_names(&self) -> Result<Vec<String>> {
        Ok(self.references()?.iter().map(|r| r.name.clone()).collect())
    }

    /// Records overlapping the query range, ordered by start.
    ///
    /// A reference name unknown to the file goes through the resolver first;
    /// when it stays unresolved the resolver's policy decides between an
    /// error, an empty result, or the first sequence in the file.
    pub fn records(&mut self, query: &Query) -> Result<Vec<Record>> {
        let backend = self.backend.as_mut().ok_or(Error::Closed)?;
        query.range.validate()?;

        let Some(reference) = self.resolver.select(
            &query.range.reference,
            backend.references(),
            query.reference_length,
        )?
        else {
            return Ok(Vec::new());
        };

        if query.resolution != Resolution::High {
            debug!(
                resolution = ?query.resolution,
                "no zoom tiers in {:?}, answering from native records",
                self.format
            );
        }

        let range = GenomicRange {
            reference,
            ..query.range.clone()
        };
        backend.records(&range)
    }

    /// Release the underlying file and index.
    pub fn close(&mut self) {
        if self.backend.take().is_some() {
            debug!(location = %self.location, "closed record source");
        }
    }
}

/// Opens record sources, resolving indexes locally or through the cache.
#[derive(Clone)]
pub struct SourceOpener {
    cache: Arc<IndexCache>,
    resolver: ReferenceNameResolver,
}

impl SourceOpener {
    pub fn new(cache: Arc<IndexCache>, policy: UnresolvedPolicy) -> Self {
        Self {
            cache,
            resolver: ReferenceNameResolver::new(policy),
        }
    }

    pub fn cache(&self) -> &Arc<IndexCache> {
        &self.cache
    }

    /// Open a local path, `file://` URL or `http(s)://` URL, detecting the format
    /// from its extension.
    pub fn open(&self, uri: &str) -> Result<RecordSource> {
        let location = Location::parse(uri)?;
        let format = Format::detect(&location.name())
            .ok_or_else(|| Error::UnsupportedFormat(uri.to_string()))?;
        self.open_as(location, format)
    }

    pub fn open_as(&self, location: Location, format: Format) -> Result<RecordSource> {
        let suffixes = format.index_suffixes();

        let (inner, index_path): (Box<dyn ReadSeek>, PathBuf) = match &location {
            Location::Local(path) => {
                let file = File::open(path).map_err(|e| match e.kind() {
                    std::io::ErrorKind::NotFound => Error::NotFound(path.display().to_string()),
                    _ => Error::Io(e),
                })?;
                let index = local::find_index(path, suffixes)
                    .ok_or_else(|| Error::IndexNotFound(path.display().to_string()))?;
                (Box::new(file), index)
            }
            Location::Remote(url) => {
                let index = self.cache.get_index(url, suffixes)?;
                let stream = self.cache.fetcher().open(url)?;
                (stream, index)
            }
        };

        let backend = match format {
            Format::Bam => Backend::Bam(BamSource::open(inner, &index_path)?),
            Format::Tabix => Backend::Tabix(TabixSource::open(inner, &index_path)?),
            Format::Fasta => Backend::Fasta(FastaSource::open(inner, &index_path)?),
        };

        info!(%location, index = %index_path.display(), ?format, "opened record source");

        Ok(RecordSource {
            location,
            format,
            index_path,
            resolver: self.resolver,
            backend: Some(backend),
        })
    }
}

/// Read a binning index, choosing the reader from the index file name.
fn read_binning_index(format: Format, path: &Path) -> Result<Box<dyn BinningIndex>> {
    let is_csi = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("csi"));

    let index: Box<dyn BinningIndex> = match (format, is_csi) {
        (_, true) => Box::new(csi::read(path).map_err(|e| index_error(path, e))?),
        (Format::Bam, false) => Box::new(bai::read(path).map_err(|e| index_error(path, e))?),
        (Format::Tabix, false) => Box::new(tbi::read(path).map_err(|e| index_error(path, e))?),
        (Format::Fasta, false) => {
            return Err(Error::UnsupportedFormat(
                "FASTA uses a FAI index, not a binning index".to_string(),
            ));
        }
    };
    Ok(index)
}

fn index_error(path: &Path, e: std::io::Error) -> Error {
    Error::InvalidInput(format!("failed to read index {}: {}", path.display(), e))
}

fn position(n: u64) -> Result<Position> {
    Position::try_from(n as usize)
        .map_err(|e| Error::InvalidRange(format!("invalid position {}: {}", n, e)))
}
