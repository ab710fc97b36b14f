//! Tables handed to the bundle writers.

use crate::domain::{Sid, Timestamp};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Per-symbol lifetime. Row position in the table is the sid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolRecord {
    pub symbol: String,
    /// First trade.
    pub start_date: Timestamp,
    /// Last trade.
    pub end_date: Timestamp,
    /// The day after the last trade.
    pub auto_close_date: Timestamp,
}

/// Symbol records plus the exchange tag, as written to the asset database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquityTable {
    pub exchange: String,
    pub records: Vec<SymbolRecord>,
}

impl EquityTable {
    pub fn new(exchange: impl Into<String>, records: Vec<SymbolRecord>) -> Self {
        Self {
            exchange: exchange.into(),
            records,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn sid_of(&self, symbol: &str) -> Option<Sid> {
        self.records
            .iter()
            .position(|r| r.symbol == symbol)
            .map(|i| i as Sid)
    }

    /// Records as assets with their sids attached.
    pub fn equities(&self) -> Vec<Equity> {
        self.records
            .iter()
            .enumerate()
            .map(|(sid, r)| Equity {
                sid: sid as Sid,
                symbol: r.symbol.clone(),
                start_date: r.start_date.date(),
                end_date: r.end_date.date(),
                exchange: self.exchange.clone(),
            })
            .collect()
    }
}

/// An asset as seen by readers: sid plus trading lifetime in session dates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Equity {
    pub sid: Sid,
    pub symbol: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub exchange: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitEvent {
    pub effective_date: Timestamp,
    pub ratio: f64,
    pub sid: Sid,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DividendEvent {
    pub ex_date: Timestamp,
    pub record_date: Option<Timestamp>,
    pub declared_date: Option<Timestamp>,
    pub pay_date: Option<Timestamp>,
    pub amount: f64,
    pub sid: Sid,
}

impl DividendEvent {
    /// A dividend known only by its ex-date.
    pub fn ex_date_only(ex_date: Timestamp, amount: f64, sid: Sid) -> Self {
        Self {
            ex_date,
            record_date: None,
            declared_date: None,
            pay_date: None,
            amount,
            sid,
        }
    }
}

/// A fundamentals cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Number(f64),
    Text(String),
    Missing,
}

impl FieldValue {
    /// Empty cells are missing, numeric cells are numbers, anything else is text.
    pub fn parse(raw: &str) -> Self {
        if raw.is_empty() {
            FieldValue::Missing
        } else if let Ok(v) = raw.parse::<f64>() {
            FieldValue::Number(v)
        } else {
            FieldValue::Text(raw.to_string())
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Number(v) => Some(*v),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FundamentalRow {
    pub sid: Sid,
    pub date: NaiveDate,
    pub fields: BTreeMap<String, FieldValue>,
}

static MISSING: FieldValue = FieldValue::Missing;

/// All fundamentals rows. `columns` is the union of every file's columns in
/// first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FundamentalsTable {
    pub columns: Vec<String>,
    pub rows: Vec<FundamentalRow>,
}

impl FundamentalsTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn value(&self, row: usize, column: &str) -> &FieldValue {
        self.rows
            .get(row)
            .and_then(|r| r.fields.get(column))
            .unwrap_or(&MISSING)
    }
}
