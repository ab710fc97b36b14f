//! Reader-side contracts: raw session × asset arrays, asset lookup, fundamentals.

use crate::data::tables::Equity;
use crate::domain::{BarField, Sid};
use crate::error::BundleError;
use chrono::NaiveDate;
use std::collections::BTreeMap;

/// Dense session × asset array of `f64`.
///
/// Stored asset-major so one asset's history is a contiguous slice.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionMatrix {
    sessions: Vec<NaiveDate>,
    sids: Vec<Sid>,
    values: Vec<f64>,
}

impl SessionMatrix {
    pub fn filled(sessions: Vec<NaiveDate>, sids: Vec<Sid>, fill: f64) -> Self {
        let values = vec![fill; sessions.len() * sids.len()];
        Self {
            sessions,
            sids,
            values,
        }
    }

    /// Build from one column per asset. Every column must span all sessions.
    pub fn from_columns(
        sessions: Vec<NaiveDate>,
        sids: Vec<Sid>,
        columns: Vec<Vec<f64>>,
    ) -> Result<Self, BundleError> {
        if columns.len() != sids.len() {
            return Err(BundleError::store(format!(
                "{} columns for {} assets",
                columns.len(),
                sids.len()
            )));
        }
        let mut values = Vec::with_capacity(sessions.len() * sids.len());
        for (sid, column) in sids.iter().zip(&columns) {
            if column.len() != sessions.len() {
                return Err(BundleError::store(format!(
                    "sid {sid}: {} values for {} sessions",
                    column.len(),
                    sessions.len()
                )));
            }
            values.extend_from_slice(column);
        }
        Ok(Self {
            sessions,
            sids,
            values,
        })
    }

    pub fn sessions(&self) -> &[NaiveDate] {
        &self.sessions
    }

    pub fn sids(&self) -> &[Sid] {
        &self.sids
    }

    /// `(sessions, assets)`
    pub fn shape(&self) -> (usize, usize) {
        (self.sessions.len(), self.sids.len())
    }

    pub fn get(&self, session: usize, asset: usize) -> f64 {
        self.values[asset * self.sessions.len() + session]
    }

    pub fn set(&mut self, session: usize, asset: usize, value: f64) {
        let n = self.sessions.len();
        self.values[asset * n + session] = value;
    }

    /// One asset's values across all sessions.
    pub fn column(&self, asset: usize) -> &[f64] {
        let n = self.sessions.len();
        &self.values[asset * n..(asset + 1) * n]
    }

    pub fn column_mut(&mut self, asset: usize) -> &mut [f64] {
        let n = self.sessions.len();
        &mut self.values[asset * n..(asset + 1) * n]
    }
}

/// Loads daily bar values aligned to a session list.
pub trait DailyBarReader {
    /// One row per entry of `sessions`, one column per entry of `sids`.
    fn load_raw_arrays(
        &self,
        field: BarField,
        sessions: &[NaiveDate],
        sids: &[Sid],
    ) -> Result<SessionMatrix, BundleError>;
}

/// Lists the assets a bundle knows about.
pub trait AssetFinder {
    fn retrieve_all(&self) -> Result<Vec<Equity>, BundleError>;

    /// Assets for the given sids, in the order requested.
    fn retrieve_assets(&self, sids: &[Sid]) -> Result<Vec<Equity>, BundleError> {
        let all: BTreeMap<Sid, Equity> = self
            .retrieve_all()?
            .into_iter()
            .map(|e| (e.sid, e))
            .collect();
        sids.iter()
            .map(|sid| {
                all.get(sid)
                    .cloned()
                    .ok_or_else(|| BundleError::config(format!("unknown sid {sid}")))
            })
            .collect()
    }
}

/// Reads stored fundamentals as dense arrays.
pub trait FundamentalsReader {
    fn read(
        &self,
        columns: &[String],
        dates: &[NaiveDate],
        sids: &[Sid],
    ) -> Result<BTreeMap<String, SessionMatrix>, BundleError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dates(n: u32) -> Vec<NaiveDate> {
        (1..=n)
            .map(|d| NaiveDate::from_ymd_opt(2020, 1, d).unwrap())
            .collect()
    }

    #[test]
    fn columns_are_contiguous_per_asset() {
        let m = SessionMatrix::from_columns(
            dates(3),
            vec![7, 9],
            vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]],
        )
        .unwrap();
        assert_eq!(m.shape(), (3, 2));
        assert_eq!(m.column(1), &[4.0, 5.0, 6.0]);
        assert_eq!(m.get(2, 0), 3.0);
    }

    #[test]
    fn set_writes_one_cell() {
        let mut m = SessionMatrix::filled(dates(2), vec![1, 2], 0.0);
        m.set(1, 1, 5.0);
        assert_eq!(m.column(0), &[0.0, 0.0]);
        assert_eq!(m.column(1), &[0.0, 5.0]);
        m.column_mut(0)[0] = 3.0;
        assert_eq!(m.get(0, 0), 3.0);
    }

    #[test]
    fn short_column_is_rejected() {
        let err = SessionMatrix::from_columns(dates(3), vec![1], vec![vec![1.0]]);
        assert!(err.is_err());
    }

    struct TwoAssets;

    impl AssetFinder for TwoAssets {
        fn retrieve_all(&self) -> Result<Vec<Equity>, BundleError> {
            Ok((0..2)
                .map(|sid| Equity {
                    sid,
                    symbol: format!("S{sid}"),
                    start_date: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
                    end_date: NaiveDate::from_ymd_opt(2020, 1, 3).unwrap(),
                    exchange: "CSVDIR".into(),
                })
                .collect())
        }
    }

    #[test]
    fn retrieve_assets_keeps_request_order() {
        let assets = TwoAssets.retrieve_assets(&[1, 0]).unwrap();
        assert_eq!(assets[0].symbol, "S1");
        assert_eq!(assets[1].symbol, "S0");
        assert!(TwoAssets.retrieve_assets(&[5]).is_err());
    }
}
