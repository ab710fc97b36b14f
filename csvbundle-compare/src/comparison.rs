//! Element-wise comparison of one bar field between two daily bar readers.
//!
//! A run moves `Init -> Loaded -> Compared`. Results go to a [`ResultStore`]
//! as each asset finishes, so a failure part-way keeps earlier assets.

use crate::error::CompareError;
use crate::result_store::ResultStore;
use chrono::NaiveDate;
use csvbundle_core::calendar::TradingCalendar;
use csvbundle_core::data::{AssetFinder, DailyBarReader, Equity, SessionMatrix};
use csvbundle_core::domain::{BarField, Sid};
use csvbundle_core::BundleError;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonState {
    Init,
    Loaded,
    Compared,
}

/// Outcome of one `compare()` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComparisonSummary {
    pub processed: usize,
    pub with_diff: Vec<Sid>,
    pub mismatched_sessions: usize,
}

/// Both readers' values on a date where they disagree.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnmatchedValue {
    pub date: NaiveDate,
    pub value_a: f64,
    pub value_b: f64,
}

/// Equal, or both missing.
pub fn values_match(a: f64, b: f64) -> bool {
    a == b || (a.is_nan() && b.is_nan())
}

/// Every asset the finder knows, sorted by sid.
pub fn all_assets(finder: &dyn AssetFinder) -> Result<Vec<Equity>, CompareError> {
    let mut assets = finder.retrieve_all()?;
    assets.sort_by_key(|a| a.sid);
    Ok(assets)
}

struct Loaded {
    sessions: Vec<NaiveDate>,
    data_a: SessionMatrix,
    data_b: SessionMatrix,
}

pub struct DailyBarComparison<'a> {
    results: ResultStore,
    calendar: Arc<dyn TradingCalendar>,
    reader_a: &'a dyn DailyBarReader,
    reader_b: &'a dyn DailyBarReader,
    start: NaiveDate,
    end: NaiveDate,
    assets: Vec<Equity>,
    field: BarField,
    state: ComparisonState,
    loaded: Option<Loaded>,
}

impl<'a> DailyBarComparison<'a> {
    /// Set up a run writing into `rootdir`. The field defaults to volume.
    pub fn new(
        rootdir: impl Into<PathBuf>,
        calendar: Arc<dyn TradingCalendar>,
        reader_a: &'a dyn DailyBarReader,
        reader_b: &'a dyn DailyBarReader,
        start: NaiveDate,
        end: NaiveDate,
        assets: Vec<Equity>,
    ) -> Result<Self, CompareError> {
        if start > end {
            return Err(BundleError::config(format!("start {start} is after end {end}")).into());
        }
        Ok(Self {
            results: ResultStore::open(rootdir)?,
            calendar,
            reader_a,
            reader_b,
            start,
            end,
            assets,
            field: BarField::Volume,
            state: ComparisonState::Init,
            loaded: None,
        })
    }

    /// Compare `field` instead. Drops anything already loaded.
    pub fn with_field(mut self, field: BarField) -> Self {
        self.field = field;
        self.state = ComparisonState::Init;
        self.loaded = None;
        self
    }

    pub fn state(&self) -> ComparisonState {
        self.state
    }

    pub fn field(&self) -> BarField {
        self.field
    }

    pub fn assets(&self) -> &[Equity] {
        &self.assets
    }

    pub fn rootdir(&self) -> &Path {
        self.results.rootdir()
    }

    pub fn results(&self) -> &ResultStore {
        &self.results
    }

    /// Read the field from both readers over the run's sessions.
    pub fn load(&mut self) -> Result<(), CompareError> {
        self.loaded = Some(self.fetch()?);
        self.state = ComparisonState::Loaded;
        Ok(())
    }

    /// Compare every asset over the overlap of its lifetime and the run window.
    ///
    /// Loads first when needed. Each asset is appended to `processed.txt`;
    /// assets with a mismatch also get `{sid}.json` and a `with_diff.txt` line.
    pub fn compare(&mut self) -> Result<ComparisonSummary, CompareError> {
        if self.loaded.is_none() {
            self.load()?;
        }
        let Some(loaded) = self.loaded.as_ref() else {
            return Err(CompareError::InvalidState("arrays not loaded".into()));
        };

        let mut summary = ComparisonSummary {
            processed: 0,
            with_diff: Vec::new(),
            mismatched_sessions: 0,
        };

        for (i, asset) in self.assets.iter().enumerate() {
            let window = asset_window(&loaded.sessions, asset, self.start, self.end);
            let a = &loaded.data_a.column(i)[window.clone()];
            let b = &loaded.data_b.column(i)[window.clone()];
            let diff_dates: Vec<NaiveDate> = a
                .iter()
                .zip(b)
                .enumerate()
                .filter(|(_, (x, y))| !values_match(**x, **y))
                .map(|(k, _)| loaded.sessions[window.start + k])
                .collect();

            if !diff_dates.is_empty() {
                debug!(sid = asset.sid, mismatches = diff_dates.len(), "asset differs");
                self.results.write_dates(asset.sid, &diff_dates)?;
                self.results.add_has_diff(asset.sid)?;
                summary.with_diff.push(asset.sid);
                summary.mismatched_sessions += diff_dates.len();
            }
            self.results.add_processed(asset.sid)?;
            summary.processed += 1;
        }

        self.state = ComparisonState::Compared;
        info!(
            field = %self.field,
            processed = summary.processed,
            with_diff = summary.with_diff.len(),
            rootdir = %self.results.rootdir().display(),
            "comparison complete"
        );
        Ok(summary)
    }

    /// Mismatched dates for every sid in `with_diff.txt`, read back from disk.
    pub fn where_unmatched(&self) -> Result<BTreeMap<Sid, Vec<NaiveDate>>, CompareError> {
        let mut out = BTreeMap::new();
        for sid in self.results.with_diff()? {
            out.insert(sid, self.results.read_dates(sid)?);
        }
        Ok(out)
    }

    /// Both readers' values at every persisted mismatch date.
    ///
    /// Reloads the arrays so the values reflect the readers as they are now.
    /// Sids outside this run's assets are ignored.
    pub fn unmatched_values(&self) -> Result<BTreeMap<Sid, Vec<UnmatchedValue>>, CompareError> {
        let unmatched = self.where_unmatched()?;
        if unmatched.is_empty() {
            return Ok(BTreeMap::new());
        }
        let loaded = self.fetch()?;

        let mut out = BTreeMap::new();
        for (i, asset) in self.assets.iter().enumerate() {
            let Some(dates) = unmatched.get(&asset.sid) else {
                continue;
            };
            let mut values = Vec::with_capacity(dates.len());
            for date in dates {
                match loaded.sessions.binary_search(date) {
                    Ok(s) => values.push(UnmatchedValue {
                        date: *date,
                        value_a: loaded.data_a.get(s, i),
                        value_b: loaded.data_b.get(s, i),
                    }),
                    Err(_) => warn!(sid = asset.sid, %date, "recorded mismatch is outside the run window"),
                }
            }
            out.insert(asset.sid, values);
        }
        Ok(out)
    }

    /// Sids recorded in `processed.txt`.
    pub fn processed(&self) -> Result<BTreeSet<Sid>, CompareError> {
        Ok(self.results.processed()?.into_iter().collect())
    }

    fn fetch(&self) -> Result<Loaded, CompareError> {
        let sessions = self.calendar.sessions_in_range(self.start, self.end);
        let sids: Vec<Sid> = self.assets.iter().map(|a| a.sid).collect();
        let data_a = self.reader_a.load_raw_arrays(self.field, &sessions, &sids)?;
        let data_b = self.reader_b.load_raw_arrays(self.field, &sessions, &sids)?;

        let expected = (sessions.len(), sids.len());
        for (name, data) in [("a", &data_a), ("b", &data_b)] {
            if data.shape() != expected {
                return Err(CompareError::InvalidState(format!(
                    "reader {name} returned {:?}, expected {expected:?}",
                    data.shape()
                )));
            }
        }
        debug!(
            field = %self.field,
            sessions = sessions.len(),
            assets = sids.len(),
            "loaded comparison arrays"
        );
        Ok(Loaded {
            sessions,
            data_a,
            data_b,
        })
    }
}

/// Session offsets covering `[max(asset.start, start), min(asset.end, end)]`.
fn asset_window(sessions: &[NaiveDate], asset: &Equity, start: NaiveDate, end: NaiveDate) -> Range<usize> {
    let lo = asset.start_date.max(start);
    let hi = asset.end_date.min(end);
    let first = sessions.partition_point(|d| *d < lo);
    let last = sessions.partition_point(|d| *d <= hi);
    first..last.max(first)
}
