//! Error taxonomy for bundle ingestion and storage.
//!
//! Every variant is fatal for the run that raised it. Nothing here is retried
//! and no symbol is skipped: downstream writers assume complete input.

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BundleError {
    /// Missing or invalid input root, empty symbol set, bad config values.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A CSV file could not be parsed or lacks an expected column.
    #[error("malformed data in {}: {reason}", path.display())]
    DataFormat { path: PathBuf, reason: String },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Failure inside the Parquet bundle store.
    #[error("bundle store error: {0}")]
    Store(String),
}

impl BundleError {
    pub fn config(msg: impl Into<String>) -> Self {
        BundleError::Configuration(msg.into())
    }

    pub fn data_format(path: &Path, reason: impl Into<String>) -> Self {
        BundleError::DataFormat {
            path: path.to_path_buf(),
            reason: reason.into(),
        }
    }

    pub fn io(path: &Path, source: io::Error) -> Self {
        BundleError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    pub fn store(msg: impl Into<String>) -> Self {
        BundleError::Store(msg.into())
    }

    /// True for the errors an operator fixes by changing inputs or flags.
    pub fn is_configuration(&self) -> bool {
        matches!(self, BundleError::Configuration(_))
    }
}
