//! Metadata and corporate-action extraction from parsed price tables.
//!
//! Each builder accumulates rows in sid order and materializes its table once
//! in `finish`.

use crate::data::fundamentals::FundamentalsFile;
use crate::data::parse::PriceTable;
use crate::data::tables::{
    DividendEvent, FundamentalRow, FundamentalsTable, SplitEvent, SymbolRecord,
};
use crate::domain::Sid;
use crate::error::BundleError;
use chrono::Duration;
use std::collections::BTreeMap;

/// Lifetime of one symbol. `None` for an empty table.
pub fn symbol_record(table: &PriceTable) -> Option<SymbolRecord> {
    let start_date = table.first_timestamp()?;
    let end_date = table.last_timestamp()?;
    Some(SymbolRecord {
        symbol: table.symbol.clone(),
        start_date,
        end_date,
        auto_close_date: end_date + Duration::days(1),
    })
}

#[derive(Debug, Default)]
pub struct SymbolRecordBuilder {
    records: Vec<SymbolRecord>,
}

impl SymbolRecordBuilder {
    pub fn with_capacity(n: usize) -> Self {
        Self {
            records: Vec::with_capacity(n),
        }
    }

    /// Append the record for `sid`. Sids must arrive as 0, 1, 2, ...
    pub fn push(&mut self, sid: Sid, table: &PriceTable) -> Result<(), BundleError> {
        if sid as usize != self.records.len() {
            return Err(BundleError::store(format!(
                "sid {sid} for {} arrived out of order (expected {})",
                table.symbol,
                self.records.len()
            )));
        }
        let record = symbol_record(table).ok_or_else(|| {
            BundleError::store(format!("{} has no rows to derive dates from", table.symbol))
        })?;
        self.records.push(record);
        Ok(())
    }

    pub fn finish(self) -> Vec<SymbolRecord> {
        self.records
    }
}

#[derive(Debug, Default)]
pub struct SplitsBuilder {
    rows: Vec<SplitEvent>,
}

impl SplitsBuilder {
    /// One event per row whose `split` differs from 1.0.
    pub fn push_table(&mut self, sid: Sid, table: &PriceTable) {
        let Some(split) = table.split.as_ref() else {
            return;
        };
        self.rows.extend(
            table
                .index
                .iter()
                .zip(split)
                .filter(|(_, ratio)| **ratio != 1.0)
                .map(|(ts, ratio)| SplitEvent {
                    effective_date: *ts,
                    ratio: *ratio,
                    sid,
                }),
        );
    }

    pub fn finish(self) -> Vec<SplitEvent> {
        self.rows
    }
}

#[derive(Debug, Default)]
pub struct DividendsBuilder {
    rows: Vec<DividendEvent>,
}

impl DividendsBuilder {
    /// One event per row whose `dividend` differs from 0.0.
    pub fn push_table(&mut self, sid: Sid, table: &PriceTable) {
        let Some(dividend) = table.dividend.as_ref() else {
            return;
        };
        self.rows.extend(
            table
                .index
                .iter()
                .zip(dividend)
                .filter(|(_, amount)| **amount != 0.0)
                .map(|(ts, amount)| DividendEvent::ex_date_only(*ts, *amount, sid)),
        );
    }

    pub fn finish(self) -> Vec<DividendEvent> {
        self.rows
    }
}

#[derive(Debug, Default)]
pub struct FundamentalsBuilder {
    columns: Vec<String>,
    rows: Vec<FundamentalRow>,
}

impl FundamentalsBuilder {
    pub fn push_file(&mut self, sid: Sid, file: FundamentalsFile) {
        for column in &file.columns {
            if !self.columns.contains(column) {
                self.columns.push(column.clone());
            }
        }
        for (date, values) in file.rows {
            let fields: BTreeMap<String, _> = file.columns.iter().cloned().zip(values).collect();
            self.rows.push(FundamentalRow { sid, date, fields });
        }
    }

    pub fn finish(self) -> FundamentalsTable {
        FundamentalsTable {
            columns: self.columns,
            rows: self.rows,
        }
    }
}

/// Everything extracted from one ingest run.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedTables {
    pub records: Vec<SymbolRecord>,
    pub splits: Vec<SplitEvent>,
    pub dividends: Vec<DividendEvent>,
    pub fundamentals: FundamentalsTable,
}

/// Runs all builders over each symbol in sid order.
#[derive(Debug, Default)]
pub struct EventExtractor {
    records: SymbolRecordBuilder,
    splits: SplitsBuilder,
    dividends: DividendsBuilder,
    fundamentals: FundamentalsBuilder,
}

impl EventExtractor {
    pub fn with_capacity(n: usize) -> Self {
        Self {
            records: SymbolRecordBuilder::with_capacity(n),
            ..Self::default()
        }
    }

    pub fn absorb(
        &mut self,
        sid: Sid,
        table: &PriceTable,
        fundamentals: Option<FundamentalsFile>,
    ) -> Result<(), BundleError> {
        self.records.push(sid, table)?;
        self.splits.push_table(sid, table);
        self.dividends.push_table(sid, table);
        if let Some(file) = fundamentals {
            self.fundamentals.push_file(sid, file);
        }
        Ok(())
    }

    pub fn finish(self) -> ExtractedTables {
        ExtractedTables {
            records: self.records.finish(),
            splits: self.splits.finish(),
            dividends: self.dividends.finish(),
            fundamentals: self.fundamentals.finish(),
        }
    }
}
