//! Random-access retrieval of records from indexed genomic files.
//!
//! Primary files may be local or served over HTTP(S). Remote companion
//! indexes are downloaded once into an [`storage::IndexCache`] and refreshed
//! only when the server reports a new version.

pub mod config;
pub mod dictionary;
pub mod error;
pub mod formats;
pub mod handlers;
pub mod pair;
pub mod resolve;
pub mod storage;
pub mod types;

pub use config::Config;
pub use error::{Error, Result};
