//! Shared identifiers and small value types.

use crate::error::BundleError;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Security identifier: the index of a symbol in the sorted symbol list.
pub type Sid = u32;

/// Row index of a price table. Daily rows sit at midnight.
pub type Timestamp = NaiveDateTime;

/// Bar granularity requested for an ingest run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeFrame {
    #[default]
    Daily,
    Minute,
}

impl TimeFrame {
    pub fn as_str(self) -> &'static str {
        match self {
            TimeFrame::Daily => "daily",
            TimeFrame::Minute => "minute",
        }
    }
}

impl fmt::Display for TimeFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TimeFrame {
    type Err = BundleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "daily" => Ok(TimeFrame::Daily),
            "minute" => Ok(TimeFrame::Minute),
            other => Err(BundleError::config(format!(
                "unknown time frame '{other}' (expected 'daily' or 'minute')"
            ))),
        }
    }
}

/// A price column that bar readers can load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BarField {
    Open,
    High,
    Low,
    Close,
    Volume,
}

impl BarField {
    pub const ALL: [BarField; 5] = [
        BarField::Open,
        BarField::High,
        BarField::Low,
        BarField::Close,
        BarField::Volume,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            BarField::Open => "open",
            BarField::High => "high",
            BarField::Low => "low",
            BarField::Close => "close",
            BarField::Volume => "volume",
        }
    }

    /// Value a reader reports for a session with no bar.
    ///
    /// Volume reads as zero on missing sessions, prices read as NaN.
    pub fn missing_value(self) -> f64 {
        match self {
            BarField::Volume => 0.0,
            _ => f64::NAN,
        }
    }
}

impl fmt::Display for BarField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BarField {
    type Err = BundleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BarField::ALL
            .into_iter()
            .find(|f| f.as_str() == s)
            .ok_or_else(|| BundleError::config(format!("unknown bar field '{s}'")))
    }
}
