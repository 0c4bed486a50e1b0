//! Access to primary files and their companion indexes.
//!
//! # Implementations
//!
//! - [`HttpFetcher`] - blocking HTTP/HTTPS access with range reads
//! - [`IndexCache`] - disk-backed cache of remote index files
//! - [`local`] - co-located index discovery for local paths
//!
//! # Example
//!
//! ```no_run
//! use genoreach::storage::{HttpFetcher, IndexCache};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let fetcher = Arc::new(HttpFetcher::new(Duration::from_secs(30)));
//! let cache = IndexCache::new("/tmp/genoreach", fetcher).unwrap();
//! let url = "https://example.com/sample.bam".parse().unwrap();
//! let index = cache.get_index(&url, &["bai"]).unwrap();
//! ```

mod cache;
mod http;
pub mod local;

pub use cache::{CacheEntry, IndexCache};
pub use http::{HttpFetcher, RemoteReader};

use crate::{Error, Result};
use std::fmt;
use std::io::{Read, Seek, Write};
use std::path::PathBuf;
use url::Url;

/// Byte range within a file, end exclusive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

/// A short validator identifying one version of a remote resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub trait ReadSeek: Read + Seek + Send {}

impl<T: Read + Seek + Send> ReadSeek for T {}

/// Network primitive used for remote indexes and primary files.
pub trait Fetcher: Send + Sync {
    /// Fetch the remote validator without downloading the resource.
    ///
    /// `Ok(None)` means the resource exists but offers no validator.
    fn fingerprint(&self, url: &Url) -> Result<Option<Fingerprint>>;

    /// Download the whole resource into `dest`, returning the byte count.
    fn download(&self, url: &Url, dest: &mut dyn Write) -> Result<u64>;

    /// Open the resource for random access.
    fn open(&self, url: &Url) -> Result<Box<dyn ReadSeek>>;
}

/// Where a primary file lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    Local(PathBuf),
    Remote(Url),
}

impl Location {
    pub fn parse(uri: &str) -> Result<Self> {
        let url = match Url::parse(uri) {
            Ok(url) => url,
            // Plain paths, including Windows drive letters, are local
            Err(_) => return Ok(Location::Local(PathBuf::from(uri))),
        };

        match url.scheme() {
            "file" => url
                .to_file_path()
                .map(Location::Local)
                .map_err(|_| Error::InvalidInput(format!("invalid file URL: {}", uri))),
            "http" | "https" => Ok(Location::Remote(url)),
            s if s.len() == 1 => Ok(Location::Local(PathBuf::from(uri))),
            s => Err(Error::UnsupportedScheme(s.to_string())),
        }
    }

    pub fn name(&self) -> String {
        match self {
            Location::Local(path) => path.display().to_string(),
            Location::Remote(url) => url.path().to_string(),
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Local(path) => write!(f, "{}", path.display()),
            Location::Remote(url) => write!(f, "{}", url),
        }
    }
}

/// Candidate index URLs for a remote primary file, in the order they are tried.
///
/// For each suffix the appended form (`sample.bam.bai`) comes before the
/// substituted form (`sample.bai`). Query strings are preserved.
pub fn index_urls(primary: &Url, suffixes: &[&str]) -> Vec<Url> {
    let path = primary.path();
    let mut candidates = Vec::new();

    for suffix in suffixes {
        let mut appended = primary.clone();
        appended.set_path(&format!("{}.{}", path, suffix));
        candidates.push(appended);

        if let Some(stem) = strip_extension(path) {
            let mut replaced = primary.clone();
            replaced.set_path(&format!("{}.{}", stem, suffix));
            candidates.push(replaced);
        }
    }

    candidates
}

fn strip_extension(path: &str) -> Option<&str> {
    let file_start = path.rfind('/').map_or(0, |i| i + 1);
    let dot = path[file_start..].rfind('.')?;
    if dot == 0 {
        return None;
    }
    Some(&path[..file_start + dot])
}
