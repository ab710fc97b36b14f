//! Comparison run configuration, loadable from TOML.
//!
//! ```toml
//! rootdir = "compare-out"
//! bundle_a = "bundles/old"
//! bundle_b = "bundles/new"
//! start = "2020-01-02"
//! end = "2020-12-31"
//! field = "close"
//! ```

use crate::error::CompareError;
use chrono::NaiveDate;
use csvbundle_core::calendar::{default_aliases, DEFAULT_CALENDAR};
use csvbundle_core::domain::{BarField, Sid};
use csvbundle_core::BundleError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CompareConfig {
    /// Where `processed.txt`, `with_diff.txt` and `{sid}.json` go.
    pub rootdir: PathBuf,
    pub bundle_a: PathBuf,
    pub bundle_b: PathBuf,
    pub start: NaiveDate,
    pub end: NaiveDate,
    #[serde(default = "default_field")]
    pub field: BarField,
    /// Calendar name or alias the sessions come from.
    #[serde(default = "default_calendar")]
    pub calendar: String,
    /// Restrict to these sids. All assets of `bundle_a` when absent.
    #[serde(default)]
    pub assets: Option<Vec<Sid>>,
    #[serde(default = "default_aliases")]
    pub calendar_aliases: BTreeMap<String, String>,
}

fn default_field() -> BarField {
    BarField::Volume
}

fn default_calendar() -> String {
    DEFAULT_CALENDAR.to_string()
}

impl CompareConfig {
    /// A volume comparison on the default calendar over all assets.
    pub fn new(
        rootdir: impl Into<PathBuf>,
        bundle_a: impl Into<PathBuf>,
        bundle_b: impl Into<PathBuf>,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Self {
        Self {
            rootdir: rootdir.into(),
            bundle_a: bundle_a.into(),
            bundle_b: bundle_b.into(),
            start,
            end,
            field: default_field(),
            calendar: default_calendar(),
            assets: None,
            calendar_aliases: default_aliases(),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, CompareError> {
        let content = std::fs::read_to_string(path).map_err(|e| BundleError::io(path, e))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, CompareError> {
        let config: Self = toml::from_str(content)
            .map_err(|e| BundleError::config(format!("parse compare config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), CompareError> {
        if self.start > self.end {
            return Err(BundleError::config(format!(
                "start {} is after end {}",
                self.start, self.end
            ))
            .into());
        }
        if matches!(&self.assets, Some(sids) if sids.is_empty()) {
            return Err(BundleError::config("assets list is empty").into());
        }
        Ok(())
    }
}
