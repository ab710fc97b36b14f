//! Daily bar comparison between two bundle readers.
//!
//! Results are persisted append-only under a result directory so a long run
//! can be inspected (or resumed by hand) after a failure.

pub mod comparison;
pub mod config;
pub mod error;
pub mod result_store;

pub use comparison::{
    all_assets, values_match, ComparisonState, ComparisonSummary, DailyBarComparison,
    UnmatchedValue,
};
pub use config::CompareConfig;
pub use error::CompareError;
pub use result_store::ResultStore;
