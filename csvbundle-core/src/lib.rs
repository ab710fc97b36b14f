//! csvbundle core: turns a directory of per-symbol CSV files into a bundle.
//!
//! - Symbol scan and sid assignment (sorted basenames)
//! - Price CSV parsing, split/dividend/fundamentals extraction
//! - Writer and reader contracts, with a Parquet implementation
//! - Trading calendars and the exchange alias registry

pub mod calendar;
pub mod config;
pub mod data;
pub mod domain;
pub mod error;

pub use error::BundleError;
