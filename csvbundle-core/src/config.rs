//! Ingest configuration, loadable from TOML.
//!
//! ```toml
//! csvdir = "/data/csv"
//! tframe = "daily"
//! start = "2020-01-01"
//! output_dir = "bundle"
//!
//! [calendar_aliases]
//! CSVDIR = "NYSE"
//! ```

use crate::calendar::default_aliases;
use crate::domain::TimeFrame;
use crate::error::BundleError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Environment variable naming the CSV root directory.
pub const CSVDIR_ENV: &str = "CSVDIR";

/// Exchange tag stamped on every ingested equity.
pub const DEFAULT_EXCHANGE: &str = "CSVDIR";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IngestConfig {
    /// CSV root. Falls back to `$CSVDIR` when unset.
    pub csvdir: Option<PathBuf>,
    pub tframe: TimeFrame,
    /// Rows before this date are dropped.
    pub start: Option<NaiveDate>,
    /// Rows after this date are dropped.
    pub end: Option<NaiveDate>,
    pub exchange: String,
    pub calendar_aliases: BTreeMap<String, String>,
    pub output_dir: PathBuf,
    pub show_progress: bool,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            csvdir: None,
            tframe: TimeFrame::Daily,
            start: None,
            end: None,
            exchange: DEFAULT_EXCHANGE.to_string(),
            calendar_aliases: default_aliases(),
            output_dir: PathBuf::from("bundle"),
            show_progress: false,
        }
    }
}

impl IngestConfig {
    pub fn from_file(path: &Path) -> Result<Self, BundleError> {
        let content = std::fs::read_to_string(path).map_err(|e| BundleError::io(path, e))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, BundleError> {
        let config: Self = toml::from_str(content)
            .map_err(|e| BundleError::config(format!("parse ingest config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), BundleError> {
        if let (Some(start), Some(end)) = (self.start, self.end) {
            if start > end {
                return Err(BundleError::config(format!(
                    "start {start} is after end {end}"
                )));
            }
        }
        if self.exchange.trim().is_empty() {
            return Err(BundleError::config("exchange tag must not be empty"));
        }
        Ok(())
    }

    /// The CSV root: explicit setting first, then `$CSVDIR`.
    pub fn resolve_csvdir(&self) -> Result<PathBuf, BundleError> {
        pick_csvdir(self.csvdir.as_deref(), std::env::var_os(CSVDIR_ENV))
    }
}

fn pick_csvdir(explicit: Option<&Path>, env: Option<OsString>) -> Result<PathBuf, BundleError> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }
    match env {
        Some(value) if !value.is_empty() => Ok(PathBuf::from(value)),
        _ => Err(BundleError::config(format!(
            "{CSVDIR_ENV} environment variable is not set"
        ))),
    }
}
