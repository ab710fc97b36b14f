//! Integration tests for the daily bar comparator.
//!
//! Tests:
//! 1. Identical readers leave `with_diff` empty and process every asset
//! 2. X/Y scenario: one mismatch on Y is persisted and read back
//! 3. `unmatched_values` reports both readers' values
//! 4. A reader failure keeps earlier progress and aborts the run
//! 5. Assets are compared over their lifetime only

use chrono::NaiveDate;
use csvbundle_compare::{
    all_assets, CompareError, ComparisonState, DailyBarComparison, ResultStore,
};
use csvbundle_core::calendar::{CalendarRegistry, TradingCalendar};
use csvbundle_core::data::{AssetFinder, DailyBarReader, Equity, SessionMatrix};
use csvbundle_core::domain::{BarField, Sid};
use csvbundle_core::BundleError;
use std::cell::Cell;
use std::collections::BTreeMap;
use std::sync::Arc;

// ──────────────────────────────────────────────
// In-memory reader
// ──────────────────────────────────────────────

#[derive(Default)]
struct MapReader {
    values: BTreeMap<(Sid, NaiveDate), f64>,
    /// Fail on this call number (1-based), if set.
    fail_on_call: Option<usize>,
    calls: Cell<usize>,
}

impl MapReader {
    fn with(mut self, sid: Sid, date: NaiveDate, value: f64) -> Self {
        self.values.insert((sid, date), value);
        self
    }
}

impl DailyBarReader for MapReader {
    fn load_raw_arrays(
        &self,
        field: BarField,
        sessions: &[NaiveDate],
        sids: &[Sid],
    ) -> Result<SessionMatrix, BundleError> {
        self.calls.set(self.calls.get() + 1);
        if self.fail_on_call == Some(self.calls.get()) {
            return Err(BundleError::store("reader went away"));
        }
        let mut m = SessionMatrix::filled(sessions.to_vec(), sids.to_vec(), field.missing_value());
        for (a, sid) in sids.iter().enumerate() {
            for (s, d) in sessions.iter().enumerate() {
                if let Some(v) = self.values.get(&(*sid, *d)) {
                    m.set(s, a, *v);
                }
            }
        }
        Ok(m)
    }
}

struct Finder(Vec<Equity>);

impl AssetFinder for Finder {
    fn retrieve_all(&self) -> Result<Vec<Equity>, BundleError> {
        Ok(self.0.clone())
    }
}

// ──────────────────────────────────────────────
// Fixtures
// ──────────────────────────────────────────────

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn nyse() -> Arc<dyn TradingCalendar> {
    CalendarRegistry::bootstrap(&BTreeMap::new())
        .unwrap()
        .resolve("NYSE")
        .unwrap()
}

fn equity(sid: Sid, symbol: &str, start: NaiveDate, end: NaiveDate) -> Equity {
    Equity {
        sid,
        symbol: symbol.into(),
        start_date: start,
        end_date: end,
        exchange: "CSVDIR".into(),
    }
}

/// Week of 2020-01-06 (Mon) to 2020-01-10 (Fri).
fn week() -> Vec<NaiveDate> {
    (6..=10).map(|d| date(2020, 1, d)).collect()
}

/// X = sid 0, Y = sid 1, both trading all week with volume 100 + day.
fn xy_reader() -> MapReader {
    let mut reader = MapReader::default();
    for d in week() {
        let v = 100.0 + d.format("%d").to_string().parse::<f64>().unwrap();
        reader = reader.with(0, d, v).with(1, d, v);
    }
    reader
}

fn xy_assets() -> Vec<Equity> {
    vec![
        equity(0, "X", date(2020, 1, 6), date(2020, 1, 10)),
        equity(1, "Y", date(2020, 1, 6), date(2020, 1, 10)),
    ]
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

#[test]
fn identical_readers_have_no_diffs() {
    let tmp = tempfile::tempdir().unwrap();
    let a = xy_reader();
    let b = xy_reader();

    let mut cmp = DailyBarComparison::new(
        tmp.path(),
        nyse(),
        &a,
        &b,
        date(2020, 1, 6),
        date(2020, 1, 10),
        xy_assets(),
    )
    .unwrap();
    assert_eq!(cmp.state(), ComparisonState::Init);
    let summary = cmp.compare().unwrap();

    assert_eq!(cmp.state(), ComparisonState::Compared);
    assert_eq!(summary.processed, 2);
    assert!(summary.with_diff.is_empty());
    assert!(cmp.where_unmatched().unwrap().is_empty());
    assert_eq!(cmp.processed().unwrap().into_iter().collect::<Vec<_>>(), vec![0, 1]);
    assert!(cmp.unmatched_values().unwrap().is_empty());
}

#[test]
fn xy_scenario_persists_the_single_mismatch() {
    let tmp = tempfile::tempdir().unwrap();
    let a = xy_reader();
    let b = xy_reader().with(1, date(2020, 1, 8), 999.0);

    let mut cmp = DailyBarComparison::new(
        tmp.path(),
        nyse(),
        &a,
        &b,
        date(2020, 1, 6),
        date(2020, 1, 10),
        xy_assets(),
    )
    .unwrap();
    cmp.load().unwrap();
    assert_eq!(cmp.state(), ComparisonState::Loaded);
    let summary = cmp.compare().unwrap();

    assert_eq!(summary.with_diff, vec![1]);
    assert_eq!(summary.mismatched_sessions, 1);

    let results = ResultStore::open(tmp.path()).unwrap();
    assert_eq!(results.processed().unwrap(), vec![0, 1]);
    assert_eq!(results.with_diff().unwrap(), vec![1]);
    assert_eq!(
        std::fs::read_to_string(tmp.path().join("1.json")).unwrap(),
        r#"["2020-01-08"]"#
    );
    assert!(!tmp.path().join("0.json").exists());

    let unmatched = cmp.where_unmatched().unwrap();
    assert_eq!(unmatched.len(), 1);
    assert_eq!(unmatched[&1], vec![date(2020, 1, 8)]);
}

#[test]
fn unmatched_values_reports_both_sides() {
    let tmp = tempfile::tempdir().unwrap();
    let a = xy_reader();
    let b = xy_reader().with(1, date(2020, 1, 8), 999.0);

    let mut cmp = DailyBarComparison::new(
        tmp.path(),
        nyse(),
        &a,
        &b,
        date(2020, 1, 6),
        date(2020, 1, 10),
        xy_assets(),
    )
    .unwrap();
    cmp.compare().unwrap();

    let values = cmp.unmatched_values().unwrap();
    let y = &values[&1];
    assert_eq!(y.len(), 1);
    assert_eq!(y[0].date, date(2020, 1, 8));
    assert_eq!(y[0].value_a, 108.0);
    assert_eq!(y[0].value_b, 999.0);
}

#[test]
fn last_day_of_the_lifetime_is_compared() {
    let tmp = tempfile::tempdir().unwrap();
    let a = xy_reader();
    let b = xy_reader().with(0, date(2020, 1, 10), 1.0);

    let mut cmp = DailyBarComparison::new(
        tmp.path(),
        nyse(),
        &a,
        &b,
        date(2020, 1, 6),
        date(2020, 1, 10),
        xy_assets(),
    )
    .unwrap();
    let summary = cmp.compare().unwrap();
    assert_eq!(summary.with_diff, vec![0]);
    assert_eq!(cmp.where_unmatched().unwrap()[&0], vec![date(2020, 1, 10)]);
}

#[test]
fn differences_outside_the_lifetime_are_ignored() {
    let tmp = tempfile::tempdir().unwrap();
    let a = xy_reader();
    let b = xy_reader().with(0, date(2020, 1, 6), 0.0);
    let assets = vec![equity(0, "X", date(2020, 1, 7), date(2020, 1, 10))];

    let mut cmp = DailyBarComparison::new(
        tmp.path(),
        nyse(),
        &a,
        &b,
        date(2020, 1, 6),
        date(2020, 1, 10),
        assets,
    )
    .unwrap();
    assert!(cmp.compare().unwrap().with_diff.is_empty());
}

#[test]
fn missing_bars_on_both_sides_match() {
    let tmp = tempfile::tempdir().unwrap();
    let a = MapReader::default().with(0, date(2020, 1, 6), 1.0);
    let b = MapReader::default().with(0, date(2020, 1, 6), 1.0);

    let mut cmp = DailyBarComparison::new(
        tmp.path(),
        nyse(),
        &a,
        &b,
        date(2020, 1, 6),
        date(2020, 1, 10),
        vec![equity(0, "X", date(2020, 1, 6), date(2020, 1, 10))],
    )
    .unwrap()
    .with_field(BarField::Close);
    assert_eq!(cmp.field(), BarField::Close);
    assert!(cmp.compare().unwrap().with_diff.is_empty());
}

#[test]
fn reader_failure_aborts_before_any_append() {
    let tmp = tempfile::tempdir().unwrap();
    let a = xy_reader();
    let b = MapReader {
        fail_on_call: Some(1),
        ..xy_reader()
    };

    let mut cmp = DailyBarComparison::new(
        tmp.path(),
        nyse(),
        &a,
        &b,
        date(2020, 1, 6),
        date(2020, 1, 10),
        xy_assets(),
    )
    .unwrap();
    let err = cmp.compare().unwrap_err();
    assert!(matches!(err, CompareError::Bundle(_)));
    assert_eq!(cmp.state(), ComparisonState::Init);
    assert!(!tmp.path().join("processed.txt").exists());
}

#[test]
fn earlier_progress_survives_a_later_failure() {
    let tmp = tempfile::tempdir().unwrap();
    let a = xy_reader();
    let b = MapReader {
        fail_on_call: Some(2),
        ..xy_reader().with(1, date(2020, 1, 8), 999.0)
    };

    let mut cmp = DailyBarComparison::new(
        tmp.path(),
        nyse(),
        &a,
        &b,
        date(2020, 1, 6),
        date(2020, 1, 10),
        xy_assets(),
    )
    .unwrap();
    cmp.compare().unwrap();

    // The reload inside unmatched_values hits the failing call.
    assert!(cmp.unmatched_values().is_err());
    assert_eq!(cmp.where_unmatched().unwrap()[&1], vec![date(2020, 1, 8)]);
    assert_eq!(cmp.processed().unwrap().len(), 2);
}

#[test]
fn all_assets_sorts_by_sid() {
    let finder = Finder(vec![
        equity(2, "C", date(2020, 1, 6), date(2020, 1, 10)),
        equity(0, "A", date(2020, 1, 6), date(2020, 1, 10)),
    ]);
    let sids: Vec<Sid> = all_assets(&finder).unwrap().iter().map(|e| e.sid).collect();
    assert_eq!(sids, vec![0, 2]);
}

#[test]
fn inverted_window_is_rejected() {
    let tmp = tempfile::tempdir().unwrap();
    let a = xy_reader();
    let result = DailyBarComparison::new(
        tmp.path(),
        nyse(),
        &a,
        &a,
        date(2020, 1, 10),
        date(2020, 1, 6),
        xy_assets(),
    );
    assert!(result.is_err());
}
