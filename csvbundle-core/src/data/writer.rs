//! Sink contracts an ingest run writes into.
//!
//! The Parquet store in [`crate::data::store`] implements all of them; tests
//! plug in recording writers.

use crate::data::parse::PriceTable;
use crate::data::tables::{DividendEvent, EquityTable, FundamentalsTable, SplitEvent};
use crate::domain::{Sid, TimeFrame};
use crate::error::BundleError;

/// Lazy stream of `(sid, table)` pairs handed to a bar writer.
///
/// Items are produced in sid order. An `Err` item ends the stream.
pub type PricingStream<'a> = dyn Iterator<Item = Result<(Sid, PriceTable), BundleError>> + 'a;

/// Consumes per-sid price tables.
pub trait BarWriter {
    fn write(&mut self, bars: &mut PricingStream<'_>, show_progress: bool) -> Result<(), BundleError>;
}

pub trait AssetDbWriter {
    fn write_equities(&mut self, equities: &EquityTable) -> Result<(), BundleError>;
}

pub trait AdjustmentWriter {
    fn write(&mut self, splits: &[SplitEvent], dividends: &[DividendEvent]) -> Result<(), BundleError>;
}

pub trait FundamentalsWriter {
    fn write(&mut self, fundamentals: &FundamentalsTable) -> Result<(), BundleError>;
}

/// Every sink one ingest run needs. Only the bar writer matching the run's
/// time frame is used.
pub struct BundleWriters<'a> {
    pub asset_db: &'a mut dyn AssetDbWriter,
    pub minute_bars: &'a mut dyn BarWriter,
    pub daily_bars: &'a mut dyn BarWriter,
    pub adjustments: &'a mut dyn AdjustmentWriter,
    pub fundamentals: &'a mut dyn FundamentalsWriter,
}

impl<'a> BundleWriters<'a> {
    pub fn bars_for(&mut self, tframe: TimeFrame) -> &mut dyn BarWriter {
        match tframe {
            TimeFrame::Daily => &mut *self.daily_bars,
            TimeFrame::Minute => &mut *self.minute_bars,
        }
    }
}

/// Pulls every remaining item out of a stream, stopping at the first error.
pub fn drain(bars: &mut PricingStream<'_>) -> Result<usize, BundleError> {
    let mut n = 0;
    for item in bars {
        item?;
        n += 1;
    }
    Ok(n)
}
