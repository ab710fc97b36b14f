use crate::error::BundleError;
use csv::StringRecord;
use polars::prelude::*;
use std::path::Path;

pub const OPEN: &str = "open";
pub const HIGH: &str = "high";
pub const LOW: &str = "low";
pub const CLOSE: &str = "close";
pub const VOLUME: &str = "volume";
pub const SPLIT: &str = "split";
pub const DIVIDEND: &str = "dividend";

/// Column name of the timestamp index in stored bar files.
pub const DATE: &str = "date";

/// Expected layout of per-symbol price data.
pub struct PriceSchema;

/// Positions of the known columns in a CSV header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnLayout {
    /// The index column is always the first one.
    pub index: usize,
    pub open: usize,
    pub high: usize,
    pub low: usize,
    pub close: usize,
    pub volume: usize,
    pub split: Option<usize>,
    pub dividend: Option<usize>,
}

impl PriceSchema {
    pub const REQUIRED: [&'static str; 5] = [OPEN, HIGH, LOW, CLOSE, VOLUME];

    /// Locate the price columns in a CSV header.
    pub fn locate(headers: &StringRecord, path: &Path) -> Result<ColumnLayout, BundleError> {
        if headers.is_empty() {
            return Err(BundleError::data_format(path, "file has no header row"));
        }
        let find = |name: &str| headers.iter().skip(1).position(|h| h == name).map(|i| i + 1);
        let require = |name: &str| {
            find(name).ok_or_else(|| {
                BundleError::data_format(path, format!("missing required column '{name}'"))
            })
        };

        Ok(ColumnLayout {
            index: 0,
            open: require(OPEN)?,
            high: require(HIGH)?,
            low: require(LOW)?,
            close: require(CLOSE)?,
            volume: require(VOLUME)?,
            split: find(SPLIT),
            dividend: find(DIVIDEND),
        })
    }

    /// Schema of a stored bar file.
    pub fn stored_schema() -> Schema {
        Schema::from_iter(vec![
            Field::new(DATE.into(), DataType::Datetime(TimeUnit::Milliseconds, None)),
            Field::new(OPEN.into(), DataType::Float64),
            Field::new(HIGH.into(), DataType::Float64),
            Field::new(LOW.into(), DataType::Float64),
            Field::new(CLOSE.into(), DataType::Float64),
            Field::new(VOLUME.into(), DataType::Float64),
        ])
    }

    /// Check a stored bar file read from `path` against [`PriceSchema::stored_schema`].
    pub fn validate(df: &DataFrame, path: &Path) -> Result<(), BundleError> {
        let actual = df.schema();
        for field in Self::stored_schema().iter_fields() {
            match actual.get(field.name()) {
                None => {
                    return Err(BundleError::data_format(
                        path,
                        format!("bar file lacks column '{}'", field.name()),
                    ))
                }
                Some(dtype) if dtype != field.dtype() => {
                    return Err(BundleError::data_format(
                        path,
                        format!("bar column '{}' is {dtype}, want {}", field.name(), field.dtype()),
                    ))
                }
                Some(_) => {}
            }
        }
        Ok(())
    }
}
