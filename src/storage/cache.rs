//! Disk-backed cache of remote index files.
//!
//! The cache directory holds two JSON tables keyed by index URL
//! (`url -> fingerprint` and `url -> file name`) and the downloaded index files
//! themselves. A cached file is reused only while the remote fingerprint is
//! unchanged; entries are never expired otherwise.
//!
//! Downloaded bytes are not verified beyond the fingerprint taken before the
//! download. Two processes sharing one cache directory may race on the tables.

use super::{Fetcher, Fingerprint, index_urls};
use crate::{Error, Result};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};
use url::Url;

const FINGERPRINT_TABLE: &str = "index-fingerprints.json";
const FILE_TABLE: &str = "index-files.json";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub url: String,
    /// Absent when the server offered no validator for the last download.
    pub fingerprint: Option<String>,
    pub file_name: String,
}

pub struct IndexCache {
    dir: PathBuf,
    fetcher: Arc<dyn Fetcher>,
    // Serializes table read-modify-write within this process
    lock: Mutex<()>,
}

impl IndexCache {
    pub fn new(dir: impl Into<PathBuf>, fetcher: Arc<dyn Fetcher>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| {
            Error::Internal(format!(
                "failed to create cache dir {}: {}",
                dir.display(),
                e
            ))
        })?;
        Ok(Self {
            dir,
            fetcher,
            lock: Mutex::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn fetcher(&self) -> &Arc<dyn Fetcher> {
        &self.fetcher
    }

    /// Return a local copy of the index for a remote primary file.
    ///
    /// Candidates from [`index_urls`] are tried in order. The first one that
    /// answers a fingerprint request is served from cache when its fingerprint
    /// matches, and downloaded otherwise.
    pub fn get_index(&self, primary: &Url, suffixes: &[&str]) -> Result<PathBuf> {
        let _guard = self.guard()?;

        let mut tables = Tables::load(&self.dir);

        for candidate in index_urls(primary, suffixes) {
            let fingerprint = match self.fetcher.fingerprint(&candidate) {
                Ok(fingerprint) => fingerprint,
                Err(e) => {
                    debug!(url = %candidate, error = %e, "index candidate unreachable");
                    continue;
                }
            };

            match self.refresh(&mut tables, &candidate, fingerprint) {
                Ok(path) => return Ok(path),
                Err(Error::Network(e)) => {
                    warn!(url = %candidate, error = %e, "index download failed");
                    continue;
                }
                Err(e) => return Err(e),
            }
        }

        Err(Error::IndexNotFound(primary.to_string()))
    }

    fn guard(&self) -> Result<MutexGuard<'_, ()>> {
        self.lock
            .lock()
            .map_err(|_| Error::Internal("index cache lock poisoned".to_string()))
    }

    fn refresh(
        &self,
        tables: &mut Tables,
        url: &Url,
        fingerprint: Option<Fingerprint>,
    ) -> Result<PathBuf> {
        let key = url.as_str();

        if let (Some(current), Some(stored), Some(file_name)) = (
            fingerprint.as_ref(),
            tables.fingerprints.get(key),
            tables.files.get(key),
        ) {
            let path = self.dir.join(file_name);
            if current.as_str() == stored && path.is_file() {
                debug!(%url, fingerprint = %current, "index cache hit");
                return Ok(path);
            }
        }

        // The file name stays fixed for a URL once assigned
        let file_name = tables
            .files
            .get(key)
            .cloned()
            .unwrap_or_else(|| cache_file_name(url));
        let path = self.dir.join(&file_name);

        if path.exists() {
            fs::remove_file(&path)?;
        }

        if let Err(e) = self.download_to(url, &path) {
            let _ = fs::remove_file(&path);
            return Err(e);
        }

        match &fingerprint {
            Some(current) => {
                tables
                    .fingerprints
                    .insert(key.to_string(), current.as_str().to_string());
            }
            None => {
                tables.fingerprints.remove(key);
            }
        }
        tables.files.insert(key.to_string(), file_name);
        tables.save(&self.dir)?;

        info!(%url, path = %path.display(), "downloaded index");
        Ok(path)
    }

    fn download_to(&self, url: &Url, path: &Path) -> Result<()> {
        let mut file = fs::File::create(path)?;
        let bytes = self.fetcher.download(url, &mut file)?;
        file.sync_all()?;
        debug!(%url, bytes, "index bytes written");
        Ok(())
    }

    /// Current table entry for an index URL.
    pub fn entry(&self, url: &Url) -> Result<Option<CacheEntry>> {
        let _guard = self.guard()?;
        let tables = Tables::load(&self.dir);
        let key = url.as_str();
        Ok(tables.files.get(key).map(|file_name| CacheEntry {
            url: key.to_string(),
            fingerprint: tables.fingerprints.get(key).cloned(),
            file_name: file_name.clone(),
        }))
    }

    /// Delete every cached index and both tables.
    pub fn clear(&self) -> Result<()> {
        let _guard = self.guard()?;

        let tables = Tables::load(&self.dir);
        for file_name in tables.files.values() {
            let path = self.dir.join(file_name);
            if path.exists() {
                fs::remove_file(&path)?;
            }
        }
        for table in [FINGERPRINT_TABLE, FILE_TABLE] {
            let path = self.dir.join(table);
            if path.exists() {
                fs::remove_file(&path)?;
            }
        }

        info!(dir = %self.dir.display(), "cleared index cache");
        Ok(())
    }
}

#[derive(Debug, Default)]
struct Tables {
    fingerprints: BTreeMap<String, String>,
    files: BTreeMap<String, String>,
}

impl Tables {
    fn load(dir: &Path) -> Self {
        Self {
            fingerprints: load_table(&dir.join(FINGERPRINT_TABLE)),
            files: load_table(&dir.join(FILE_TABLE)),
        }
    }

    fn save(&self, dir: &Path) -> Result<()> {
        save_table(&dir.join(FINGERPRINT_TABLE), &self.fingerprints)?;
        save_table(&dir.join(FILE_TABLE), &self.files)
    }
}

/// Missing or unreadable tables load as empty and are rewritten on the next save.
fn load_table(path: &Path) -> BTreeMap<String, String> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return BTreeMap::new(),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "unreadable cache table, starting empty");
            return BTreeMap::new();
        }
    };

    serde_json::from_slice(&bytes).unwrap_or_else(|e| {
        warn!(path = %path.display(), error = %e, "corrupt cache table, starting empty");
        BTreeMap::new()
    })
}

fn save_table(path: &Path, table: &BTreeMap<String, String>) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(table)
        .map_err(|e| Error::Internal(format!("failed to encode cache table: {}", e)))?;
    write_atomic_file(path, &bytes)
}

fn write_atomic_file(path: &Path, bytes: &[u8]) -> Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| Error::Internal("atomic write missing parent".to_string()))?;
    let tmp = parent.join(format!(
        ".{}.tmp.{}",
        path.file_name().and_then(|s| s.to_str()).unwrap_or("table"),
        std::process::id()
    ));
    {
        let mut f = fs::File::create(&tmp)?;
        f.write_all(bytes)?;
        f.sync_all()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

/// `<16 hex digits of sha256(url)>-<last path segment>`
fn cache_file_name(url: &Url) -> String {
    let digest = format!("{:x}", Sha256::digest(url.as_str().as_bytes()));
    let segment: String = url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .unwrap_or("index")
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .collect();

    if segment.is_empty() {
        digest[..16].to_string()
    } else {
        format!("{}-{}", &digest[..16], segment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::ReadSeek;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Serves fixed fingerprints and counts downloads.
    #[derive(Default)]
    struct MockFetcher {
        fingerprints: Mutex<HashMap<String, Option<String>>>,
        failing_downloads: Mutex<Vec<String>>,
        downloads: AtomicUsize,
    }

    impl MockFetcher {
        fn serve(&self, url: &str, fingerprint: Option<&str>) {
            self.fingerprints
                .lock()
                .unwrap()
                .insert(url.to_string(), fingerprint.map(str::to_string));
        }

        fn downloads(&self) -> usize {
            self.downloads.load(Ordering::SeqCst)
        }
    }

    impl Fetcher for MockFetcher {
        fn fingerprint(&self, url: &Url) -> Result<Option<Fingerprint>> {
            self.fingerprints
                .lock()
                .unwrap()
                .get(url.as_str())
                .map(|fp| fp.as_deref().map(Fingerprint::new))
                .ok_or_else(|| Error::Network(format!("404 {}", url)))
        }

        fn download(&self, url: &Url, dest: &mut dyn Write) -> Result<u64> {
            if self.failing_downloads.lock().unwrap().contains(&url.to_string()) {
                dest.write_all(b"part")?;
                return Err(Error::Network("connection reset".to_string()));
            }
            self.downloads.fetch_add(1, Ordering::SeqCst);
            let fingerprint = self.fingerprint(url)?;
            let body = format!("index@{}", fingerprint.map(|f| f.to_string()).unwrap_or_default());
            dest.write_all(body.as_bytes())?;
            Ok(body.len() as u64)
        }

        fn open(&self, url: &Url) -> Result<Box<dyn ReadSeek>> {
            Err(Error::Network(format!("cannot open {}", url)))
        }
    }

    const PRIMARY: &str = "https://example.com/data/sample.bam";
    const INDEX: &str = "https://example.com/data/sample.bam.bai";

    fn setup() -> (tempfile::TempDir, Arc<MockFetcher>, IndexCache) {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = Arc::new(MockFetcher::default());
        let cache = IndexCache::new(dir.path().join("cache"), fetcher.clone()).unwrap();
        (dir, fetcher, cache)
    }

    fn primary() -> Url {
        PRIMARY.parse().unwrap()
    }

    fn index() -> Url {
        INDEX.parse().unwrap()
    }

    #[test]
    fn test_fingerprint_lifecycle() {
        let (_dir, fetcher, cache) = setup();

        fetcher.serve(INDEX, Some("abc123"));
        let first = cache.get_index(&primary(), &["bai"]).unwrap();
        assert_eq!(fetcher.downloads(), 1);
        assert_eq!(fs::read_to_string(&first).unwrap(), "index@abc123");
        let entry = cache.entry(&index()).unwrap().unwrap();
        assert_eq!(entry.fingerprint.as_deref(), Some("abc123"));

        // Unchanged remote: zero downloads
        let second = cache.get_index(&primary(), &["bai"]).unwrap();
        assert_eq!(fetcher.downloads(), 1);
        assert_eq!(first, second);

        // Changed remote: one re-download into the same file name
        fetcher.serve(INDEX, Some("def456"));
        let third = cache.get_index(&primary(), &["bai"]).unwrap();
        assert_eq!(fetcher.downloads(), 2);
        assert_eq!(third, first);
        assert_eq!(fs::read_to_string(&third).unwrap(), "index@def456");

        let entry = cache.entry(&index()).unwrap().unwrap();
        assert_eq!(entry.fingerprint.as_deref(), Some("def456"));
        assert_eq!(cache.dir().join(&entry.file_name), third);
    }

    #[test]
    fn test_cache_survives_new_instance() {
        let (dir, fetcher, cache) = setup();
        fetcher.serve(INDEX, Some("abc123"));
        cache.get_index(&primary(), &["bai"]).unwrap();
        drop(cache);

        let reopened = IndexCache::new(dir.path().join("cache"), fetcher.clone()).unwrap();
        reopened.get_index(&primary(), &["bai"]).unwrap();
        assert_eq!(fetcher.downloads(), 1);
    }

    #[test]
    fn test_missing_cached_file_is_refetched() {
        let (_dir, fetcher, cache) = setup();
        fetcher.serve(INDEX, Some("abc123"));
        let path = cache.get_index(&primary(), &["bai"]).unwrap();
        fs::remove_file(&path).unwrap();

        let again = cache.get_index(&primary(), &["bai"]).unwrap();
        assert_eq!(again, path);
        assert_eq!(fetcher.downloads(), 2);
    }

    #[test]
    fn test_falls_back_to_substituted_name() {
        let (_dir, fetcher, cache) = setup();
        fetcher.serve("https://example.com/data/sample.bai", Some("v1"));
        let path = cache.get_index(&primary(), &["bai"]).unwrap();
        assert!(path.to_string_lossy().ends_with("-sample.bai"));
        assert_eq!(fetcher.downloads(), 1);
    }

    #[test]
    fn test_no_candidate_is_index_not_found() {
        let (_dir, fetcher, cache) = setup();
        let err = cache.get_index(&primary(), &["bai", "csi"]).unwrap_err();
        assert!(matches!(err, Error::IndexNotFound(_)));
        assert_eq!(fetcher.downloads(), 0);
    }

    #[test]
    fn test_failed_download_tries_next_candidate() {
        let (_dir, fetcher, cache) = setup();
        fetcher.serve(INDEX, Some("abc123"));
        fetcher.serve("https://example.com/data/sample.bai", Some("xyz"));
        fetcher.failing_downloads.lock().unwrap().push(INDEX.to_string());

        let path = cache.get_index(&primary(), &["bai"]).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "index@xyz");
        assert!(cache.entry(&index()).unwrap().is_none());

        // The partial file for the failed candidate is gone
        let leftovers: Vec<_> = fs::read_dir(cache.dir())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with("sample.bam.bai"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_no_validator_always_downloads() {
        let (_dir, fetcher, cache) = setup();
        fetcher.serve(INDEX, None);
        cache.get_index(&primary(), &["bai"]).unwrap();
        cache.get_index(&primary(), &["bai"]).unwrap();
        assert_eq!(fetcher.downloads(), 2);
        assert_eq!(cache.entry(&index()).unwrap().unwrap().fingerprint, None);
    }

    #[test]
    fn test_corrupt_tables_are_rebuilt() {
        let (_dir, fetcher, cache) = setup();
        fs::write(cache.dir().join(FINGERPRINT_TABLE), b"{not json").unwrap();
        fs::write(cache.dir().join(FILE_TABLE), b"[1, 2").unwrap();

        fetcher.serve(INDEX, Some("abc123"));
        cache.get_index(&primary(), &["bai"]).unwrap();
        assert_eq!(fetcher.downloads(), 1);
        assert_eq!(
            cache.entry(&index()).unwrap().unwrap().fingerprint.as_deref(),
            Some("abc123")
        );
    }

    #[test]
    fn test_clear() {
        let (_dir, fetcher, cache) = setup();
        fetcher.serve(INDEX, Some("abc123"));
        let path = cache.get_index(&primary(), &["bai"]).unwrap();

        cache.clear().unwrap();
        assert!(!path.exists());
        assert!(cache.entry(&index()).unwrap().is_none());

        cache.get_index(&primary(), &["bai"]).unwrap();
        assert_eq!(fetcher.downloads(), 2);
    }

    #[test]
    fn test_poisoned_lock_is_an_error() {
        let (_dir, fetcher, cache) = setup();
        fetcher.serve(INDEX, Some("abc123"));
        cache.get_index(&primary(), &["bai"]).unwrap();

        let cache = Arc::new(cache);
        let holder = Arc::clone(&cache);
        let _ = std::thread::spawn(move || {
            let _guard = holder.lock.lock().unwrap();
            panic!("panic while holding the cache lock");
        })
        .join();

        assert!(matches!(cache.entry(&index()), Err(Error::Internal(_))));
        assert!(matches!(
            cache.get_index(&primary(), &["bai"]),
            Err(Error::Internal(_))
        ));
        assert!(matches!(cache.clear(), Err(Error::Internal(_))));
    }

    #[test]
    fn test_cache_file_name() {
        let name = cache_file_name(&index());
        assert_eq!(name.len(), 16 + 1 + "sample.bam.bai".len());
        assert!(name.ends_with("-sample.bam.bai"));
        assert_eq!(name, cache_file_name(&index()));
        assert_ne!(
            name,
            cache_file_name(&"https://other.org/data/sample.bam.bai".parse().unwrap())
        );
    }
}
