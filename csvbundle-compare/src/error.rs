//! Comparator errors. All of them abort the operation in progress; appends
//! flushed before the failure stay on disk.

use csvbundle_core::BundleError;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CompareError {
    /// A reader, asset finder or calendar lookup failed.
    #[error(transparent)]
    Bundle(#[from] BundleError),

    #[error("result store I/O on {}: {source}", path.display())]
    ResultStore {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A persisted result file could not be parsed.
    #[error("malformed result file {}: {reason}", path.display())]
    ResultFormat { path: PathBuf, reason: String },

    #[error("invalid comparison state: {0}")]
    InvalidState(String),
}

impl CompareError {
    pub fn result_store(path: &Path, source: io::Error) -> Self {
        CompareError::ResultStore {
            path: path.to_path_buf(),
            source,
        }
    }

    pub fn result_format(path: &Path, reason: impl Into<String>) -> Self {
        CompareError::ResultFormat {
            path: path.to_path_buf(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bundle_errors_pass_through_unchanged() {
        let err: CompareError = BundleError::config("unknown sid 9").into();
        assert_eq!(err.to_string(), "configuration error: unknown sid 9");
    }

    #[test]
    fn result_store_names_the_file() {
        let err = CompareError::result_store(
            Path::new("/out/with_diff.txt"),
            io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(err.to_string().contains("/out/with_diff.txt"));
    }
}
