mod features;
mod records;
mod references;
mod service_info;

pub use features::get_features;
pub use records::get_records;
pub use references::get_references;
pub use service_info::service_info;

use crate::dictionary::Dictionary;
use crate::formats::SourceOpener;
use crate::storage::Location;
use crate::types::Format;
use crate::{Error, Result};
use axum::{Router, routing::get};
use std::path::PathBuf;
use std::sync::Arc;
use url::Url;

/// Where request ids are looked up.
#[derive(Debug, Clone)]
pub enum DataRoot {
    Local(PathBuf),
    Remote(Url),
}

impl DataRoot {
    /// Resolve a request id to a primary file, rejecting anything that could
    /// escape the root.
    pub fn locate(&self, id: &str) -> Result<(Location, Format)> {
        if id.is_empty()
            || id.starts_with('.')
            || id.contains("..")
            || id.contains(['/', '\\'])
        {
            return Err(Error::InvalidInput(format!("invalid id: {}", id)));
        }

        let format = Format::detect(id).ok_or_else(|| Error::UnsupportedFormat(id.to_string()))?;

        let location = match self {
            DataRoot::Local(dir) => Location::Local(dir.join(id)),
            DataRoot::Remote(base) => {
                let mut base = base.clone();
                if !base.path().ends_with('/') {
                    let path = format!("{}/", base.path());
                    base.set_path(&path);
                }
                let url = base
                    .join(id)
                    .map_err(|e| Error::InvalidInput(format!("invalid id {}: {}", id, e)))?;
                Location::Remote(url)
            }
        };

        Ok((location, format))
    }
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub opener: Arc<SourceOpener>,
    pub root: DataRoot,
    pub dictionary: Option<Arc<Dictionary>>,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/records/:id", get(get_records))
        .route("/references/:id", get(get_references))
        .route("/features", get(get_features))
        .route("/", get(service_info))
        .route("/service-info", get(service_info))
        .with_state(state)
}

/// Run blocking index and file work off the async executor.
async fn blocking<T, F>(work: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| Error::Internal(format!("blocking task failed: {}", e)))?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locate_local() {
        let root = DataRoot::Local(PathBuf::from("/data"));
        let (location, format) = root.locate("sample.bam").unwrap();
        assert_eq!(location, Location::Local(PathBuf::from("/data/sample.bam")));
        assert_eq!(format, Format::Bam);
    }

    #[test]
    fn test_locate_remote_base_without_slash() {
        let root = DataRoot::Remote("https://example.com/genomes".parse().unwrap());
        let (location, format) = root.locate("hg19.fa").unwrap();
        assert_eq!(
            location,
            Location::Remote("https://example.com/genomes/hg19.fa".parse().unwrap())
        );
        assert_eq!(format, Format::Fasta);
    }

    #[test]
    fn test_locate_rejects_traversal() {
        let root = DataRoot::Local(PathBuf::from("/data"));
        for id in ["..", "../secret.bam", "a/b.bam", ".hidden.bam", "a\\b.bam", ""] {
            assert!(matches!(root.locate(id), Err(Error::InvalidInput(_))), "{}", id);
        }
        assert!(matches!(
            root.locate("notes.txt"),
            Err(Error::UnsupportedFormat(_))
        ));
    }
}
