//! The CSV-directory bundle: scan, parse, extract, dispatch to writers.

use crate::config::{IngestConfig, DEFAULT_EXCHANGE};
use crate::data::extract::{EventExtractor, ExtractedTables};
use crate::data::fundamentals::{read_fundamentals_csv, FundamentalsFile};
use crate::data::parse::{read_price_csv, PriceTable};
use crate::data::scan::{resolve_price_dir, scan_symbols, CSV_EXTENSION, FUNDAMENTALS_DIR};
use crate::data::tables::EquityTable;
use crate::data::writer::{drain, BundleWriters};
use crate::domain::{Sid, TimeFrame};
use crate::error::BundleError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Ingest parameters for one CSV directory.
#[derive(Debug, Clone, PartialEq)]
pub struct CsvDirBundle {
    pub tframe: TimeFrame,
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    pub exchange: String,
    pub show_progress: bool,
}

impl Default for CsvDirBundle {
    fn default() -> Self {
        Self::new(TimeFrame::Daily)
    }
}

/// What one run produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestSummary {
    pub tframe: TimeFrame,
    pub symbols: Vec<String>,
    pub bar_rows: usize,
    pub split_count: usize,
    pub dividend_count: usize,
    pub fundamentals_rows: usize,
    /// BLAKE3 over the serialized equities, splits, dividends and fundamentals.
    pub dataset_hash: String,
}

impl CsvDirBundle {
    pub fn new(tframe: TimeFrame) -> Self {
        Self {
            tframe,
            start: None,
            end: None,
            exchange: DEFAULT_EXCHANGE.to_string(),
            show_progress: false,
        }
    }

    pub fn from_config(config: &IngestConfig) -> Self {
        Self {
            tframe: config.tframe,
            start: config.start,
            end: config.end,
            exchange: config.exchange.clone(),
            show_progress: config.show_progress,
        }
    }

    pub fn with_range(mut self, start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        self.start = start;
        self.end = end;
        self
    }

    pub fn with_exchange(mut self, exchange: impl Into<String>) -> Self {
        self.exchange = exchange.into();
        self
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    /// Run the whole ingest against `csvdir`.
    ///
    /// Nothing is written when the scan fails. Bars go out first, then
    /// equities, adjustments and fundamentals, each exactly once.
    pub fn ingest(
        &self,
        csvdir: &Path,
        writers: &mut BundleWriters<'_>,
    ) -> Result<IngestSummary, BundleError> {
        let price_dir = resolve_price_dir(csvdir, self.tframe);
        let symbols = scan_symbols(&price_dir)?;
        info!(
            dir = %price_dir.display(),
            tframe = %self.tframe,
            symbols = symbols.len(),
            "ingesting csv directory"
        );

        let fundamentals_dir = csvdir.join(FUNDAMENTALS_DIR);
        let fundamentals_dir = fundamentals_dir.is_dir().then_some(fundamentals_dir);

        let mut pricing = PricingIter {
            price_dir,
            fundamentals_dir,
            symbols: &symbols,
            next_sid: 0,
            start: self.start,
            end: self.end,
            extractor: EventExtractor::with_capacity(symbols.len()),
            bar_rows: 0,
            failure: None,
        };

        writers
            .bars_for(self.tframe)
            .write(&mut pricing, self.show_progress)?;
        let leftover = drain(&mut pricing)?;
        if leftover > 0 {
            debug!(leftover, "bar writer stopped early, drained remaining symbols");
        }
        if let Some(reason) = pricing.failure.take() {
            return Err(BundleError::store(format!(
                "bar writer ignored a failed symbol: {reason}"
            )));
        }

        let bar_rows = pricing.bar_rows;
        let tables = pricing.extractor.finish();
        let equities = EquityTable::new(self.exchange.clone(), tables.records.clone());

        writers.asset_db.write_equities(&equities)?;
        writers.adjustments.write(&tables.splits, &tables.dividends)?;
        writers.fundamentals.write(&tables.fundamentals)?;

        let summary = IngestSummary {
            tframe: self.tframe,
            dataset_hash: dataset_hash(&equities, &tables)?,
            symbols,
            bar_rows,
            split_count: tables.splits.len(),
            dividend_count: tables.dividends.len(),
            fundamentals_rows: tables.fundamentals.len(),
        };
        info!(
            symbols = summary.symbols.len(),
            bar_rows = summary.bar_rows,
            splits = summary.split_count,
            dividends = summary.dividend_count,
            fundamentals = summary.fundamentals_rows,
            hash = %summary.dataset_hash,
            "ingest complete"
        );
        Ok(summary)
    }
}

fn dataset_hash(equities: &EquityTable, tables: &ExtractedTables) -> Result<String, BundleError> {
    let payload = serde_json::to_vec(&(
        equities,
        &tables.splits,
        &tables.dividends,
        &tables.fundamentals,
    ))
    .map_err(|e| BundleError::store(format!("hash serialization: {e}")))?;
    Ok(blake3::hash(&payload).to_hex().to_string())
}

/// Lazily parses symbols in sid order, feeding the extractor as it goes.
///
/// The first error is yielded once, then the iterator is exhausted.
struct PricingIter<'a> {
    price_dir: PathBuf,
    fundamentals_dir: Option<PathBuf>,
    symbols: &'a [String],
    next_sid: usize,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
    extractor: EventExtractor,
    bar_rows: usize,
    failure: Option<String>,
}

impl PricingIter<'_> {
    fn load(&mut self, sid: Sid, symbol: &str) -> Result<PriceTable, BundleError> {
        let path = self.price_dir.join(format!("{symbol}{CSV_EXTENSION}"));
        let mut table = read_price_csv(&path, symbol)?;
        table.restrict(self.start, self.end);
        if table.is_empty() {
            return Err(BundleError::data_format(
                &path,
                "no rows inside the requested date range",
            ));
        }

        let fundamentals = self.fundamentals_for(symbol)?;
        self.extractor.absorb(sid, &table, fundamentals)?;
        self.bar_rows += table.len();
        debug!(sid, symbol, rows = table.len(), "parsed symbol");
        Ok(table)
    }

    fn fundamentals_for(&self, symbol: &str) -> Result<Option<FundamentalsFile>, BundleError> {
        let Some(dir) = self.fundamentals_dir.as_ref() else {
            return Ok(None);
        };
        let path = dir.join(format!("{symbol}{CSV_EXTENSION}"));
        if !path.is_file() {
            warn!(symbol, "no fundamentals file, skipping");
            return Ok(None);
        }
        read_fundamentals_csv(&path).map(Some)
    }
}

impl Iterator for PricingIter<'_> {
    type Item = Result<(Sid, PriceTable), BundleError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failure.is_some() {
            return None;
        }
        let symbols = self.symbols;
        let symbol = symbols.get(self.next_sid)?;
        let sid = self.next_sid as Sid;
        self.next_sid += 1;
        match self.load(sid, symbol) {
            Ok(table) => Some(Ok((sid, table))),
            Err(e) => {
                self.failure = Some(e.to_string());
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_config_copies_run_parameters() {
        let config = IngestConfig {
            tframe: TimeFrame::Minute,
            start: NaiveDate::from_ymd_opt(2020, 1, 1),
            exchange: "TEST".into(),
            show_progress: true,
            ..IngestConfig::default()
        };
        let bundle = CsvDirBundle::from_config(&config);
        assert_eq!(bundle.tframe, TimeFrame::Minute);
        assert_eq!(bundle.start, NaiveDate::from_ymd_opt(2020, 1, 1));
        assert_eq!(bundle.exchange, "TEST");
        assert!(bundle.show_progress);
    }

    #[test]
    fn default_bundle_is_daily_csvdir() {
        let bundle = CsvDirBundle::default();
        assert_eq!(bundle.tframe, TimeFrame::Daily);
        assert_eq!(bundle.exchange, "CSVDIR");
        assert!(bundle.start.is_none());
    }
}
