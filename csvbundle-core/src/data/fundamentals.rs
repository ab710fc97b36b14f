//! Per-symbol fundamentals CSVs and the date × sid reindexing used by readers.
//!
//! Layout: `{csvdir}/fundamentals/{SYMBOL}.csv`. The second column holds the
//! date; every other column is kept as a field.

use crate::data::parse::parse_timestamp;
use crate::data::reader::SessionMatrix;
use crate::data::tables::{FieldValue, FundamentalsTable};
use crate::domain::Sid;
use crate::error::BundleError;
use chrono::NaiveDate;
use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Position of the date column in a fundamentals file.
pub const DATE_COLUMN: usize = 1;

/// One fundamentals file before sid tagging.
#[derive(Debug, Clone, PartialEq)]
pub struct FundamentalsFile {
    pub columns: Vec<String>,
    /// `(date, values)` with values aligned to `columns`, sorted by date.
    pub rows: Vec<(NaiveDate, Vec<FieldValue>)>,
}

pub fn read_fundamentals_csv(path: &Path) -> Result<FundamentalsFile, BundleError> {
    let file = File::open(path).map_err(|e| BundleError::io(path, e))?;
    parse_fundamentals_csv(file, path)
}

pub fn parse_fundamentals_csv<R: Read>(reader: R, path: &Path) -> Result<FundamentalsFile, BundleError> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = rdr
        .headers()
        .map_err(|e| BundleError::data_format(path, format!("read header: {e}")))?
        .clone();
    if headers.len() <= DATE_COLUMN {
        return Err(BundleError::data_format(
            path,
            "fundamentals need at least two columns (the second is the date)",
        ));
    }

    let columns: Vec<String> = headers
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != DATE_COLUMN)
        .map(|(_, h)| h.to_string())
        .collect();

    let mut rows = Vec::new();
    for (i, record) in rdr.records().enumerate() {
        let line = i + 2;
        let record =
            record.map_err(|e| BundleError::data_format(path, format!("line {line}: {e}")))?;
        let raw_date = record.get(DATE_COLUMN).unwrap_or("");
        let date = parse_timestamp(raw_date)
            .map(|ts| ts.date())
            .ok_or_else(|| {
                BundleError::data_format(path, format!("line {line}: unparseable date '{raw_date}'"))
            })?;
        let values = record
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != DATE_COLUMN)
            .map(|(_, cell)| FieldValue::parse(cell))
            .collect();
        rows.push((date, values));
    }

    rows.sort_by_key(|(date, _)| *date);
    Ok(FundamentalsFile { columns, rows })
}

/// Reindex fundamentals to `dates` × `sids`, one matrix per requested column.
///
/// Cells match on exact date. Anything absent, missing or textual reads NaN.
/// When a `(sid, date)` pair repeats, the later row wins.
pub fn reindex(
    table: &FundamentalsTable,
    columns: &[String],
    dates: &[NaiveDate],
    sids: &[Sid],
) -> Result<BTreeMap<String, SessionMatrix>, BundleError> {
    for column in columns {
        if !table.columns.contains(column) {
            return Err(BundleError::config(format!(
                "unknown fundamentals column '{column}'"
            )));
        }
    }

    let date_pos: HashMap<NaiveDate, usize> =
        dates.iter().enumerate().map(|(i, d)| (*d, i)).collect();
    let sid_pos: HashMap<Sid, usize> = sids.iter().enumerate().map(|(i, s)| (*s, i)).collect();

    let mut out: BTreeMap<String, SessionMatrix> = columns
        .iter()
        .map(|c| (c.clone(), SessionMatrix::filled(dates.to_vec(), sids.to_vec(), f64::NAN)))
        .collect();

    for row in &table.rows {
        let (Some(&d), Some(&a)) = (date_pos.get(&row.date), sid_pos.get(&row.sid)) else {
            continue;
        };
        for (column, matrix) in out.iter_mut() {
            let value = row
                .fields
                .get(column)
                .and_then(FieldValue::as_f64)
                .unwrap_or(f64::NAN);
            matrix.set(d, a, value);
        }
    }

    Ok(out)
}
