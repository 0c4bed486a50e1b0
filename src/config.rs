use crate::resolve::UnresolvedPolicy;
use clap::Parser;
use directories::ProjectDirs;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Parser)]
#[command(name = "genoreach")]
#[command(about = "Range queries over indexed genomic files, local or remote")]
pub struct Config {
    /// Host address to bind to
    #[arg(long, env = "GENOREACH_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to listen on
    #[arg(short, long, env = "GENOREACH_PORT", default_value = "8080")]
    pub port: u16,

    /// Directory containing data files
    #[arg(long, env = "GENOREACH_DATA_DIR", default_value = "./data")]
    pub data_dir: PathBuf,

    /// Serve ids relative to this URL instead of the data directory
    #[arg(long, env = "GENOREACH_REMOTE_BASE_URL")]
    pub remote_base_url: Option<url::Url>,

    /// Directory for cached remote indexes
    #[arg(long, env = "GENOREACH_CACHE_DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Feature-name dictionary (`name<TAB>ref:start-end`, optionally gzipped)
    #[arg(long, env = "GENOREACH_DICTIONARY")]
    pub dictionary: Option<PathBuf>,

    /// What to do when a reference name cannot be matched
    #[arg(long, env = "GENOREACH_UNRESOLVED", value_enum, default_value_t = UnresolvedPolicy::Empty)]
    pub unresolved: UnresolvedPolicy,

    /// Network timeout in seconds for index and range fetches
    #[arg(long, env = "GENOREACH_TIMEOUT", default_value = "30")]
    pub timeout_secs: u64,

    /// Empty the index cache before starting
    #[arg(long)]
    pub clear_cache: bool,

    /// Enable CORS for all origins
    #[arg(long, env = "GENOREACH_CORS", default_value = "true")]
    pub cors: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "RUST_LOG", default_value = "info")]
    pub log_level: String,
}

impl Config {
    /// Cache directory, falling back to the platform cache location.
    pub fn effective_cache_dir(&self) -> PathBuf {
        self.cache_dir.clone().unwrap_or_else(|| {
            ProjectDirs::from("org", "genoreach", "genoreach")
                .map(|dirs| dirs.cache_dir().join("indexes"))
                .unwrap_or_else(|| std::env::temp_dir().join("genoreach").join("indexes"))
        })
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
