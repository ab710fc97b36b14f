//! Per-symbol CSV parsing into a time-indexed price table.
//!
//! The first column is the index. Rows are sorted ascending by it before
//! anything downstream sees them. Any parse failure names the file and
//! aborts the run.

use crate::data::schema::{ColumnLayout, PriceSchema};
use crate::domain::{BarField, Timestamp};
use crate::error::BundleError;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::Serialize;
use std::fs::File;
use std::io::Read;
use std::path::Path;

const DATETIME_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y"];

/// Parse an index cell. Offsets are normalized to UTC; bare dates land at midnight.
pub fn parse_timestamp(raw: &str) -> Option<Timestamp> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_utc());
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(ts);
        }
    }
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

/// One symbol's bars, sorted by `index`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceTable {
    pub symbol: String,
    pub index: Vec<Timestamp>,
    pub open: Vec<f64>,
    pub high: Vec<f64>,
    pub low: Vec<f64>,
    pub close: Vec<f64>,
    pub volume: Vec<f64>,
    /// Present when the CSV has a `split` column. Neutral value 1.0.
    pub split: Option<Vec<f64>>,
    /// Present when the CSV has a `dividend` column. Neutral value 0.0.
    pub dividend: Option<Vec<f64>>,
}

impl PriceTable {
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn first_timestamp(&self) -> Option<Timestamp> {
        self.index.first().copied()
    }

    pub fn last_timestamp(&self) -> Option<Timestamp> {
        self.index.last().copied()
    }

    /// Drop rows whose date falls outside `[start, end]`.
    pub fn restrict(&mut self, start: Option<NaiveDate>, end: Option<NaiveDate>) {
        if start.is_none() && end.is_none() {
            return;
        }
        let keep: Vec<bool> = self
            .index
            .iter()
            .map(|ts| {
                let d = ts.date();
                start.map_or(true, |s| d >= s) && end.map_or(true, |e| d <= e)
            })
            .collect();

        retain_by(&mut self.index, &keep);
        retain_by(&mut self.open, &keep);
        retain_by(&mut self.high, &keep);
        retain_by(&mut self.low, &keep);
        retain_by(&mut self.close, &keep);
        retain_by(&mut self.volume, &keep);
        if let Some(split) = self.split.as_mut() {
            retain_by(split, &keep);
        }
        if let Some(dividend) = self.dividend.as_mut() {
            retain_by(dividend, &keep);
        }
    }
}

fn retain_by<T>(values: &mut Vec<T>, keep: &[bool]) {
    let mut flags = keep.iter();
    values.retain(|_| flags.next().copied().unwrap_or(false));
}

/// A parsed row before columnar layout.
struct Row {
    ts: Timestamp,
    ohlcv: [f64; 5],
    split: f64,
    dividend: f64,
}

/// Read and parse `<symbol>.csv`.
pub fn read_price_csv(path: &Path, symbol: &str) -> Result<PriceTable, BundleError> {
    let file = File::open(path).map_err(|e| BundleError::io(path, e))?;
    parse_price_csv(file, path, symbol)
}

/// Parse price CSV content. `path` is only used in error messages.
pub fn parse_price_csv<R: Read>(reader: R, path: &Path, symbol: &str) -> Result<PriceTable, BundleError> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = rdr
        .headers()
        .map_err(|e| BundleError::data_format(path, format!("read header: {e}")))?
        .clone();
    let layout = PriceSchema::locate(&headers, path)?;

    let mut rows = Vec::new();
    for (i, record) in rdr.records().enumerate() {
        // Line 1 is the header.
        let line = i + 2;
        let record =
            record.map_err(|e| BundleError::data_format(path, format!("line {line}: {e}")))?;
        rows.push(parse_row(&record, &layout, &headers, line, path)?);
    }

    if rows.is_empty() {
        return Err(BundleError::data_format(path, "no data rows"));
    }

    rows.sort_by_key(|r| r.ts);
    Ok(into_table(symbol, rows, &layout))
}

fn parse_row(
    record: &csv::StringRecord,
    layout: &ColumnLayout,
    headers: &csv::StringRecord,
    line: usize,
    path: &Path,
) -> Result<Row, BundleError> {
    let cell = |idx: usize| record.get(idx).unwrap_or("");
    let number = |idx: usize, neutral: f64| -> Result<f64, BundleError> {
        let raw = cell(idx);
        if raw.is_empty() {
            return Ok(neutral);
        }
        raw.parse::<f64>().map_err(|_| {
            let column = headers.get(idx).unwrap_or("?");
            BundleError::data_format(
                path,
                format!("line {line}: invalid number '{raw}' in column '{column}'"),
            )
        })
    };

    let raw_ts = cell(layout.index);
    let ts = parse_timestamp(raw_ts).ok_or_else(|| {
        BundleError::data_format(path, format!("line {line}: unparseable date '{raw_ts}'"))
    })?;

    Ok(Row {
        ts,
        ohlcv: [
            number(layout.open, f64::NAN)?,
            number(layout.high, f64::NAN)?,
            number(layout.low, f64::NAN)?,
            number(layout.close, f64::NAN)?,
            number(layout.volume, BarField::Volume.missing_value())?,
        ],
        split: layout.split.map(|i| number(i, 1.0)).transpose()?.unwrap_or(1.0),
        dividend: layout.dividend.map(|i| number(i, 0.0)).transpose()?.unwrap_or(0.0),
    })
}

fn into_table(symbol: &str, rows: Vec<Row>, layout: &ColumnLayout) -> PriceTable {
    let n = rows.len();
    let mut table = PriceTable {
        symbol: symbol.to_string(),
        index: Vec::with_capacity(n),
        open: Vec::with_capacity(n),
        high: Vec::with_capacity(n),
        low: Vec::with_capacity(n),
        close: Vec::with_capacity(n),
        volume: Vec::with_capacity(n),
        split: layout.split.map(|_| Vec::with_capacity(n)),
        dividend: layout.dividend.map(|_| Vec::with_capacity(n)),
    };

    for row in rows {
        let [open, high, low, close, volume] = row.ohlcv;
        table.index.push(row.ts);
        table.open.push(open);
        table.high.push(high);
        table.low.push(low);
        table.close.push(close);
        table.volume.push(volume);
        if let Some(split) = table.split.as_mut() {
            split.push(row.split);
        }
        if let Some(dividend) = table.dividend.as_mut() {
            dividend.push(row.dividend);
        }
    }

    table
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(content: &str) -> Result<PriceTable, BundleError> {
        parse_price_csv(content.as_bytes(), Path::new("TEST.csv"), "TEST")
    }

    fn ts(y: i32, m: u32, d: u32) -> Timestamp {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    #[test]
    fn timestamp_formats() {
        assert_eq!(parse_timestamp("2020-01-02"), Some(ts(2020, 1, 2)));
        assert_eq!(parse_timestamp("2020/01/02"), Some(ts(2020, 1, 2)));
        assert_eq!(parse_timestamp("01/02/2020"), Some(ts(2020, 1, 2)));
        assert_eq!(
            parse_timestamp("2020-01-02 09:31:00"),
            ts(2020, 1, 2).checked_add_signed(chrono::Duration::minutes(571))
        );
        assert_eq!(
            parse_timestamp("2020-01-02T14:31:00+00:00"),
            parse_timestamp("2020-01-02 09:31:00-05:00".replace(' ', "T").as_str())
        );
        assert_eq!(parse_timestamp("yesterday"), None);
    }

    #[test]
    fn sorts_rows_by_index() {
        let table = parse(
            "date,open,high,low,close,volume\n\
             2020-01-03,3,3,3,3,300\n\
             2020-01-01,1,1,1,1,100\n\
             2020-01-02,2,2,2,2,200\n",
        )
        .unwrap();
        assert_eq!(table.index, vec![ts(2020, 1, 1), ts(2020, 1, 2), ts(2020, 1, 3)]);
        assert_eq!(table.volume, vec![100.0, 200.0, 300.0]);
        assert!(table.split.is_none());
        assert!(table.dividend.is_none());
    }

    #[test]
    fn optional_columns_follow_the_sort() {
        let table = parse(
            "date,open,high,low,close,volume,split,dividend\n\
             2020-01-02,2,2,2,2,200,2.0,\n\
             2020-01-01,1,1,1,1,100,,0.5\n",
        )
        .unwrap();
        assert_eq!(table.split, Some(vec![1.0, 2.0]));
        assert_eq!(table.dividend, Some(vec![0.5, 0.0]));
    }

    #[test]
    fn empty_price_cell_is_nan() {
        let table = parse("date,open,high,low,close,volume\n2020-01-01,1,,1,1,100\n").unwrap();
        assert!(table.high[0].is_nan());
    }

    #[test]
    fn empty_volume_reads_like_a_missing_session() {
        let table = parse("date,open,high,low,close,volume\n2020-01-01,1,1,1,1,\n").unwrap();
        assert_eq!(table.volume, vec![BarField::Volume.missing_value()]);
    }

    #[test]
    fn extra_columns_are_ignored() {
        let table =
            parse("date,open,high,low,close,volume,adj_close\n2020-01-01,1,1,1,1,100,0.9\n").unwrap();
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn malformed_date_fails_with_file_name() {
        let err = parse("date,open,high,low,close,volume\nnot-a-date,1,1,1,1,1\n").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("TEST.csv"), "{msg}");
        assert!(msg.contains("not-a-date"), "{msg}");
    }

    #[test]
    fn malformed_number_fails() {
        let err = parse("date,open,high,low,close,volume\n2020-01-01,1,1,1,abc,1\n").unwrap_err();
        assert!(err.to_string().contains("'close'"));
    }

    #[test]
    fn ragged_row_fails() {
        assert!(parse("date,open,high,low,close,volume\n2020-01-01,1,1\n").is_err());
    }

    #[test]
    fn header_only_fails() {
        let err = parse("date,open,high,low,close,volume\n").unwrap_err();
        assert!(err.to_string().contains("no data rows"));
    }

    #[test]
    fn empty_file_fails() {
        assert!(parse("").is_err());
    }

    #[test]
    fn restrict_drops_rows_outside_window() {
        let mut table = parse(
            "date,open,high,low,close,volume,split\n\
             2020-01-01,1,1,1,1,100,1\n\
             2020-01-02,2,2,2,2,200,2\n\
             2020-01-03,3,3,3,3,300,1\n",
        )
        .unwrap();
        table.restrict(NaiveDate::from_ymd_opt(2020, 1, 2), None);
        assert_eq!(table.index, vec![ts(2020, 1, 2), ts(2020, 1, 3)]);
        assert_eq!(table.split, Some(vec![2.0, 1.0]));
        assert_eq!(table.close, vec![2.0, 3.0]);
    }
}
