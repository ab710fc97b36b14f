//! Parquet bundle store.
//!
//! Layout under the bundle root:
//! - `{daily,minute}/{sid}.parquet`: one bar file per sid
//! - `equities.parquet`, `splits.parquet`, `dividends.parquet`, `fundamentals.parquet`
//! - `bundle.json`: manifest of the last ingest
//!
//! Every file is written to a `.tmp` sibling and renamed into place. A full
//! ingest goes through [`BundleStore::ingest`], which builds the bundle in a
//! sibling working directory and swaps it in only once the manifest is written.

use crate::data::fundamentals::reindex;
use crate::data::ingest::{CsvDirBundle, IngestSummary};
use crate::data::parse::PriceTable;
use crate::data::reader::{AssetFinder, DailyBarReader, FundamentalsReader, SessionMatrix};
use crate::data::schema::{PriceSchema, CLOSE, DATE, HIGH, LOW, OPEN, VOLUME};
use crate::data::tables::{
    DividendEvent, Equity, EquityTable, FieldValue, FundamentalRow, FundamentalsTable, SplitEvent,
    SymbolRecord,
};
use crate::data::writer::{
    AdjustmentWriter, AssetDbWriter, BarWriter, BundleWriters, FundamentalsWriter, PricingStream,
};
use crate::domain::{BarField, Sid, TimeFrame, Timestamp};
use crate::error::BundleError;
use chrono::{DateTime, NaiveDate};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const EQUITIES_FILE: &str = "equities.parquet";
const SPLITS_FILE: &str = "splits.parquet";
const DIVIDENDS_FILE: &str = "dividends.parquet";
const FUNDAMENTALS_FILE: &str = "fundamentals.parquet";
const MANIFEST_FILE: &str = "bundle.json";

/// Progress is logged every this many symbols when enabled.
const PROGRESS_EVERY: usize = 100;

const SID: &str = "sid";

/// Stored fundamentals field columns carry this prefix so a source column
/// named `sid` or `date` never collides with the row keys.
const FIELD_PREFIX: &str = "field.";

/// Manifest sidecar describing the last ingest into a bundle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundleManifest {
    pub tframe: TimeFrame,
    pub symbols: Vec<String>,
    pub dataset_hash: String,
    pub written_at: chrono::NaiveDateTime,
}

/// A bundle directory on disk.
#[derive(Debug, Clone)]
pub struct BundleStore {
    root: PathBuf,
}

impl BundleStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `{root}/{tframe}/{sid}.parquet`
    pub fn bar_path(&self, tframe: TimeFrame, sid: Sid) -> PathBuf {
        self.root.join(tframe.as_str()).join(format!("{sid}.parquet"))
    }

    pub fn bar_writer(&self, tframe: TimeFrame) -> ParquetBarWriter {
        ParquetBarWriter {
            dir: self.root.join(tframe.as_str()),
        }
    }

    pub fn table_writer(&self) -> ParquetTableWriter {
        ParquetTableWriter {
            root: self.root.clone(),
        }
    }

    /// Ingest `csvdir` into this bundle, all or nothing.
    ///
    /// Everything is written to `{root}.tmp-{pid}` first. On success the old
    /// bundle is replaced as a whole; on failure the working directory is
    /// removed and the existing bundle is left untouched.
    pub fn ingest(&self, bundle: &CsvDirBundle, csvdir: &Path) -> Result<IngestSummary, BundleError> {
        let staging = self.sibling("tmp")?;
        if staging.exists() {
            fs::remove_dir_all(&staging).map_err(|e| BundleError::io(&staging, e))?;
        }
        let work = BundleStore::new(&staging);
        let result = work.ingest_in_place(bundle, csvdir).and_then(|summary| {
            self.replace_with(&staging)?;
            Ok(summary)
        });
        match result {
            Ok(summary) => {
                info!(root = %self.root.display(), symbols = summary.symbols.len(), "bundle swapped in");
                Ok(summary)
            }
            Err(e) => {
                if staging.exists() {
                    if let Err(cleanup) = fs::remove_dir_all(&staging) {
                        warn!(dir = %staging.display(), error = %cleanup, "could not remove working directory");
                    }
                }
                Err(e)
            }
        }
    }

    fn ingest_in_place(&self, bundle: &CsvDirBundle, csvdir: &Path) -> Result<IngestSummary, BundleError> {
        fs::create_dir_all(&self.root).map_err(|e| BundleError::io(&self.root, e))?;
        let mut daily = self.bar_writer(TimeFrame::Daily);
        let mut minute = self.bar_writer(TimeFrame::Minute);
        let mut assets = self.table_writer();
        let mut adjustments = self.table_writer();
        let mut fundamentals = self.table_writer();
        let mut writers = BundleWriters {
            asset_db: &mut assets,
            minute_bars: &mut minute,
            daily_bars: &mut daily,
            adjustments: &mut adjustments,
            fundamentals: &mut fundamentals,
        };
        let summary = bundle.ingest(csvdir, &mut writers)?;
        self.write_manifest(&summary)?;
        Ok(summary)
    }

    /// `{root}.{tag}-{pid}` next to the bundle root.
    fn sibling(&self, tag: &str) -> Result<PathBuf, BundleError> {
        let name = self.root.file_name().ok_or_else(|| {
            BundleError::config(format!(
                "bundle root {} has no final path component",
                self.root.display()
            ))
        })?;
        let mut name = name.to_os_string();
        name.push(format!(".{tag}-{}", std::process::id()));
        Ok(self.root.with_file_name(name))
    }

    /// Move `staging` to the root, putting the old bundle back if that fails.
    fn replace_with(&self, staging: &Path) -> Result<(), BundleError> {
        if !self.root.exists() {
            return fs::rename(staging, &self.root).map_err(|e| BundleError::io(&self.root, e));
        }
        let old = self.sibling("old")?;
        if old.exists() {
            fs::remove_dir_all(&old).map_err(|e| BundleError::io(&old, e))?;
        }
        fs::rename(&self.root, &old).map_err(|e| BundleError::io(&self.root, e))?;
        if let Err(e) = fs::rename(staging, &self.root) {
            let _ = fs::rename(&old, &self.root);
            return Err(BundleError::io(&self.root, e));
        }
        if let Err(e) = fs::remove_dir_all(&old) {
            warn!(dir = %old.display(), error = %e, "could not remove previous bundle");
        }
        Ok(())
    }

    pub fn write_manifest(&self, summary: &IngestSummary) -> Result<BundleManifest, BundleError> {
        let manifest = BundleManifest {
            tframe: summary.tframe,
            symbols: summary.symbols.clone(),
            dataset_hash: summary.dataset_hash.clone(),
            written_at: chrono::Local::now().naive_local(),
        };
        let json = serde_json::to_string_pretty(&manifest)
            .map_err(|e| BundleError::store(format!("manifest serialization: {e}")))?;
        let path = self.root.join(MANIFEST_FILE);
        let tmp = path.with_extension("json.tmp");
        fs::create_dir_all(&self.root).map_err(|e| BundleError::io(&self.root, e))?;
        fs::write(&tmp, json).map_err(|e| BundleError::io(&tmp, e))?;
        rename_into_place(&tmp, &path)?;
        Ok(manifest)
    }

    /// `None` when nothing has been ingested here yet.
    pub fn read_manifest(&self) -> Result<Option<BundleManifest>, BundleError> {
        let path = self.root.join(MANIFEST_FILE);
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path).map_err(|e| BundleError::io(&path, e))?;
        serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| BundleError::data_format(&path, format!("manifest: {e}")))
    }

    pub fn read_equities(&self) -> Result<EquityTable, BundleError> {
        let path = self.root.join(EQUITIES_FILE);
        let df = read_parquet(&path)?;
        let n = df.height();

        let sids = df.column(SID).and_then(|c| c.u32().cloned()).map_err(polars_err("equities sid"))?;
        let symbols = df
            .column("symbol")
            .and_then(|c| c.str().cloned())
            .map_err(polars_err("equities symbol"))?;
        let exchanges = df
            .column("exchange")
            .and_then(|c| c.str().cloned())
            .map_err(polars_err("equities exchange"))?;
        let start = timestamps(&df, "start_date")?;
        let end = timestamps(&df, "end_date")?;
        let auto_close = timestamps(&df, "auto_close_date")?;

        let mut records = Vec::with_capacity(n);
        for i in 0..n {
            if sids.get(i) != Some(i as Sid) {
                return Err(BundleError::data_format(
                    &path,
                    format!("row {i} carries sid {:?}", sids.get(i)),
                ));
            }
            records.push(SymbolRecord {
                symbol: required(symbols.get(i), &path, "symbol", i)?.to_string(),
                start_date: required(start[i], &path, "start_date", i)?,
                end_date: required(end[i], &path, "end_date", i)?,
                auto_close_date: required(auto_close[i], &path, "auto_close_date", i)?,
            });
        }
        let exchange = exchanges.get(0).unwrap_or_default().to_string();
        Ok(EquityTable::new(exchange, records))
    }

    pub fn read_adjustments(&self) -> Result<(Vec<SplitEvent>, Vec<DividendEvent>), BundleError> {
        let path = self.root.join(SPLITS_FILE);
        let df = read_parquet(&path)?;
        let dates = timestamps(&df, "effective_date")?;
        let ratios = df.column("ratio").and_then(|c| c.f64().cloned()).map_err(polars_err("split ratio"))?;
        let sids = df.column(SID).and_then(|c| c.u32().cloned()).map_err(polars_err("split sid"))?;
        let mut splits = Vec::with_capacity(df.height());
        for i in 0..df.height() {
            splits.push(SplitEvent {
                effective_date: required(dates[i], &path, "effective_date", i)?,
                ratio: ratios.get(i).unwrap_or(f64::NAN),
                sid: required(sids.get(i), &path, SID, i)?,
            });
        }

        let path = self.root.join(DIVIDENDS_FILE);
        let df = read_parquet(&path)?;
        let ex = timestamps(&df, "ex_date")?;
        let record = timestamps(&df, "record_date")?;
        let declared = timestamps(&df, "declared_date")?;
        let pay = timestamps(&df, "pay_date")?;
        let amounts = df.column("amount").and_then(|c| c.f64().cloned()).map_err(polars_err("dividend amount"))?;
        let sids = df.column(SID).and_then(|c| c.u32().cloned()).map_err(polars_err("dividend sid"))?;
        let mut dividends = Vec::with_capacity(df.height());
        for i in 0..df.height() {
            dividends.push(DividendEvent {
                ex_date: required(ex[i], &path, "ex_date", i)?,
                record_date: record[i],
                declared_date: declared[i],
                pay_date: pay[i],
                amount: amounts.get(i).unwrap_or(f64::NAN),
                sid: required(sids.get(i), &path, SID, i)?,
            });
        }

        Ok((splits, dividends))
    }

    /// Stored fundamentals. Mixed columns come back through [`FieldValue::parse`].
    pub fn read_fundamentals(&self) -> Result<FundamentalsTable, BundleError> {
        let path = self.root.join(FUNDAMENTALS_FILE);
        if !path.exists() {
            return Ok(FundamentalsTable::default());
        }
        let df = read_parquet(&path)?;
        let sids = df.column(SID).and_then(|c| c.u32().cloned()).map_err(polars_err("fundamentals sid"))?;
        let days = df
            .column(DATE)
            .and_then(|c| c.cast(&DataType::Int32))
            .map_err(polars_err("fundamentals date"))?;
        let days = days.i32().map_err(polars_err("fundamentals date"))?;

        let stored: Vec<String> = df
            .get_column_names()
            .into_iter()
            .skip(2)
            .map(|c| c.to_string())
            .collect();
        let columns = stored
            .iter()
            .map(|c| {
                c.strip_prefix(FIELD_PREFIX).map(str::to_string).ok_or_else(|| {
                    BundleError::data_format(&path, format!("unexpected fundamentals column '{c}'"))
                })
            })
            .collect::<Result<Vec<String>, BundleError>>()?;

        let mut rows: Vec<FundamentalRow> = (0..df.height())
            .map(|i| -> Result<FundamentalRow, BundleError> {
                Ok(FundamentalRow {
                    sid: required(sids.get(i), &path, SID, i)?,
                    date: epoch_date() + chrono::Duration::days(required(days.get(i), &path, DATE, i)? as i64),
                    fields: BTreeMap::new(),
                })
            })
            .collect::<Result<_, _>>()?;

        for (name, stored_name) in columns.iter().zip(&stored) {
            let column = df.column(stored_name).map_err(polars_err("fundamentals column"))?;
            match column.dtype() {
                DataType::Float64 => {
                    let ca = column.f64().map_err(polars_err("fundamentals column"))?;
                    for (row, value) in rows.iter_mut().zip(ca.iter()) {
                        if let Some(v) = value {
                            row.fields.insert(name.clone(), FieldValue::Number(v));
                        }
                    }
                }
                _ => {
                    let ca = column.str().map_err(polars_err("fundamentals column"))?;
                    for (row, value) in rows.iter_mut().zip(ca.iter()) {
                        if let Some(v) = value {
                            row.fields.insert(name.clone(), FieldValue::parse(v));
                        }
                    }
                }
            }
        }

        Ok(FundamentalsTable { columns, rows })
    }

    /// Bars of one sid as `(timestamp, value)` pairs for `field`.
    fn read_bar_field(
        &self,
        tframe: TimeFrame,
        sid: Sid,
        field: BarField,
    ) -> Result<Vec<(Timestamp, f64)>, BundleError> {
        let path = self.bar_path(tframe, sid);
        let df = read_parquet(&path)?;
        PriceSchema::validate(&df, &path)?;
        let index = timestamps(&df, DATE)?;
        let values = df
            .column(field.as_str())
            .and_then(|c| c.f64().cloned())
            .map_err(polars_err("bar field"))?;
        index
            .into_iter()
            .zip(values.iter())
            .enumerate()
            .map(|(i, (ts, v))| -> Result<(Timestamp, f64), BundleError> {
                Ok((
                    required(ts, &path, DATE, i)?,
                    v.unwrap_or_else(|| field.missing_value()),
                ))
            })
            .collect()
    }
}

impl AssetFinder for BundleStore {
    fn retrieve_all(&self) -> Result<Vec<Equity>, BundleError> {
        Ok(self.read_equities()?.equities())
    }
}

impl DailyBarReader for BundleStore {
    fn load_raw_arrays(
        &self,
        field: BarField,
        sessions: &[NaiveDate],
        sids: &[Sid],
    ) -> Result<SessionMatrix, BundleError> {
        let session_pos: HashMap<NaiveDate, usize> =
            sessions.iter().enumerate().map(|(i, d)| (*d, i)).collect();
        let mut matrix = SessionMatrix::filled(sessions.to_vec(), sids.to_vec(), field.missing_value());

        for (asset, sid) in sids.iter().enumerate() {
            let column = matrix.column_mut(asset);
            for (ts, value) in self.read_bar_field(TimeFrame::Daily, *sid, field)? {
                if let Some(&s) = session_pos.get(&ts.date()) {
                    column[s] = value;
                }
            }
        }
        debug!(
            field = %field,
            sessions = sessions.len(),
            assets = sids.len(),
            "loaded daily arrays"
        );
        Ok(matrix)
    }
}

impl FundamentalsReader for BundleStore {
    fn read(
        &self,
        columns: &[String],
        dates: &[NaiveDate],
        sids: &[Sid],
    ) -> Result<BTreeMap<String, SessionMatrix>, BundleError> {
        reindex(&self.read_fundamentals()?, columns, dates, sids)
    }
}

/// Writes one Parquet file per sid under a time-frame folder.
#[derive(Debug, Clone)]
pub struct ParquetBarWriter {
    dir: PathBuf,
}

impl BarWriter for ParquetBarWriter {
    fn write(&mut self, bars: &mut PricingStream<'_>, show_progress: bool) -> Result<(), BundleError> {
        fs::create_dir_all(&self.dir).map_err(|e| BundleError::io(&self.dir, e))?;
        let mut written = 0usize;
        for item in bars {
            let (sid, table) = item?;
            let mut df = bars_to_dataframe(&table)?;
            write_atomic(&self.dir.join(format!("{sid}.parquet")), &mut df)?;
            written += 1;
            if show_progress && written % PROGRESS_EVERY == 0 {
                info!(written, "bar files written");
            }
        }
        if show_progress {
            info!(written, dir = %self.dir.display(), "bar files done");
        }
        Ok(())
    }
}

/// Writes the asset, adjustment and fundamentals tables.
#[derive(Debug, Clone)]
pub struct ParquetTableWriter {
    root: PathBuf,
}

impl ParquetTableWriter {
    fn write_table(&self, name: &str, df: &mut DataFrame) -> Result<(), BundleError> {
        fs::create_dir_all(&self.root).map_err(|e| BundleError::io(&self.root, e))?;
        write_atomic(&self.root.join(name), df)
    }
}

impl AssetDbWriter for ParquetTableWriter {
    fn write_equities(&mut self, equities: &EquityTable) -> Result<(), BundleError> {
        let records = &equities.records;
        let mut df = DataFrame::new(vec![
            Column::new(SID.into(), (0..records.len() as Sid).collect::<Vec<_>>()),
            Column::new(
                "symbol".into(),
                records.iter().map(|r| r.symbol.clone()).collect::<Vec<_>>(),
            ),
            datetime_column("start_date", records.iter().map(|r| Some(r.start_date)))?,
            datetime_column("end_date", records.iter().map(|r| Some(r.end_date)))?,
            datetime_column("auto_close_date", records.iter().map(|r| Some(r.auto_close_date)))?,
            Column::new(
                "exchange".into(),
                vec![equities.exchange.clone(); records.len()],
            ),
        ])
        .map_err(polars_err("equities frame"))?;
        self.write_table(EQUITIES_FILE, &mut df)
    }
}

impl AdjustmentWriter for ParquetTableWriter {
    fn write(&mut self, splits: &[SplitEvent], dividends: &[DividendEvent]) -> Result<(), BundleError> {
        let mut df = DataFrame::new(vec![
            datetime_column("effective_date", splits.iter().map(|s| Some(s.effective_date)))?,
            Column::new("ratio".into(), splits.iter().map(|s| s.ratio).collect::<Vec<_>>()),
            Column::new(SID.into(), splits.iter().map(|s| s.sid).collect::<Vec<_>>()),
        ])
        .map_err(polars_err("splits frame"))?;
        self.write_table(SPLITS_FILE, &mut df)?;

        let mut df = DataFrame::new(vec![
            datetime_column("ex_date", dividends.iter().map(|d| Some(d.ex_date)))?,
            datetime_column("record_date", dividends.iter().map(|d| d.record_date))?,
            datetime_column("declared_date", dividends.iter().map(|d| d.declared_date))?,
            datetime_column("pay_date", dividends.iter().map(|d| d.pay_date))?,
            Column::new("amount".into(), dividends.iter().map(|d| d.amount).collect::<Vec<_>>()),
            Column::new(SID.into(), dividends.iter().map(|d| d.sid).collect::<Vec<_>>()),
        ])
        .map_err(polars_err("dividends frame"))?;
        self.write_table(DIVIDENDS_FILE, &mut df)
    }
}

impl FundamentalsWriter for ParquetTableWriter {
    fn write(&mut self, fundamentals: &FundamentalsTable) -> Result<(), BundleError> {
        let rows = &fundamentals.rows;
        let days: Vec<i32> = rows
            .iter()
            .map(|r| (r.date - epoch_date()).num_days() as i32)
            .collect();
        let mut columns = vec![
            Column::new(SID.into(), rows.iter().map(|r| r.sid).collect::<Vec<_>>()),
            Column::new(DATE.into(), days)
                .cast(&DataType::Date)
                .map_err(polars_err("fundamentals date cast"))?,
        ];

        for name in &fundamentals.columns {
            let stored_name = format!("{FIELD_PREFIX}{name}");
            let cells: Vec<&FieldValue> = (0..rows.len()).map(|i| fundamentals.value(i, name)).collect();
            let numeric = cells.iter().all(|v| !matches!(v, FieldValue::Text(_)));
            let column = if numeric {
                Column::new(
                    stored_name.as_str().into(),
                    cells.iter().map(|v| v.as_f64()).collect::<Vec<Option<f64>>>(),
                )
            } else {
                Column::new(
                    stored_name.as_str().into(),
                    cells
                        .iter()
                        .map(|v| match v {
                            FieldValue::Number(n) => Some(n.to_string()),
                            FieldValue::Text(s) => Some(s.clone()),
                            FieldValue::Missing => None,
                        })
                        .collect::<Vec<Option<String>>>(),
                )
            };
            columns.push(column);
        }

        let mut df = DataFrame::new(columns).map_err(polars_err("fundamentals frame"))?;
        self.write_table(FUNDAMENTALS_FILE, &mut df)
    }
}

// ── Parquet I/O helpers ─────────────────────────────────────────────

fn polars_err(context: &'static str) -> impl Fn(PolarsError) -> BundleError {
    move |e| BundleError::store(format!("{context}: {e}"))
}

fn epoch_date() -> NaiveDate {
    DateTime::UNIX_EPOCH.date_naive()
}

fn required<T>(value: Option<T>, path: &Path, column: &str, row: usize) -> Result<T, BundleError> {
    value.ok_or_else(|| BundleError::data_format(path, format!("null {column} at row {row}")))
}

fn datetime_column(
    name: &str,
    values: impl Iterator<Item = Option<Timestamp>>,
) -> Result<Column, BundleError> {
    let millis: Vec<Option<i64>> = values
        .map(|ts| ts.map(|t| t.and_utc().timestamp_millis()))
        .collect();
    Column::new(name.into(), millis)
        .cast(&DataType::Datetime(TimeUnit::Milliseconds, None))
        .map_err(polars_err("datetime cast"))
}

/// A datetime column read back as naive UTC timestamps.
fn timestamps(df: &DataFrame, name: &str) -> Result<Vec<Option<Timestamp>>, BundleError> {
    let millis = df
        .column(name)
        .and_then(|c| c.cast(&DataType::Int64))
        .map_err(polars_err("timestamp column"))?;
    let millis = millis.i64().map_err(polars_err("timestamp column"))?;
    Ok(millis
        .iter()
        .map(|ms| ms.and_then(DateTime::from_timestamp_millis).map(|dt| dt.naive_utc()))
        .collect())
}

fn bars_to_dataframe(table: &PriceTable) -> Result<DataFrame, BundleError> {
    DataFrame::new(vec![
        datetime_column(DATE, table.index.iter().copied().map(Some))?,
        Column::new(OPEN.into(), table.open.clone()),
        Column::new(HIGH.into(), table.high.clone()),
        Column::new(LOW.into(), table.low.clone()),
        Column::new(CLOSE.into(), table.close.clone()),
        Column::new(VOLUME.into(), table.volume.clone()),
    ])
    .map_err(polars_err("bar frame"))
}

fn write_atomic(path: &Path, df: &mut DataFrame) -> Result<(), BundleError> {
    let tmp = path.with_extension("parquet.tmp");
    let file = fs::File::create(&tmp).map_err(|e| BundleError::io(&tmp, e))?;
    ParquetWriter::new(file)
        .finish(df)
        .map_err(polars_err("write parquet"))?;
    rename_into_place(&tmp, path)
}

fn rename_into_place(tmp: &Path, path: &Path) -> Result<(), BundleError> {
    fs::rename(tmp, path).map_err(|e| {
        let _ = fs::remove_file(tmp);
        BundleError::io(path, e)
    })
}

fn read_parquet(path: &Path) -> Result<DataFrame, BundleError> {
    let file = fs::File::open(path).map_err(|e| BundleError::io(path, e))?;
    ParquetReader::new(file)
        .finish()
        .map_err(|e| BundleError::data_format(path, format!("read parquet: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::parse::parse_price_csv;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn ts(y: i32, m: u32, d: u32) -> Timestamp {
        date(y, m, d).and_hms_opt(0, 0, 0).unwrap()
    }

    fn sample_table() -> PriceTable {
        parse_price_csv(
            "date,open,high,low,close,volume\n\
             2020-01-02,10,11,9,10.5,100\n\
             2020-01-03,10.5,12,10,11,\n"
                .as_bytes(),
            Path::new("AAPL.csv"),
            "AAPL",
        )
        .unwrap()
    }

    #[test]
    fn bar_files_round_trip_through_the_daily_reader() {
        let tmp = tempfile::tempdir().unwrap();
        let store = BundleStore::new(tmp.path());
        let mut writer = store.bar_writer(TimeFrame::Daily);
        let items: Vec<Result<(Sid, PriceTable), BundleError>> = vec![Ok((0, sample_table()))];
        writer.write(&mut items.into_iter(), true).unwrap();
        assert!(store.bar_path(TimeFrame::Daily, 0).exists());

        let sessions = vec![date(2020, 1, 2), date(2020, 1, 3), date(2020, 1, 6)];
        let close = store.load_raw_arrays(BarField::Close, &sessions, &[0]).unwrap();
        assert_eq!(close.column(0)[..2], [10.5, 11.0]);
        assert!(close.get(2, 0).is_nan());

        let volume = store.load_raw_arrays(BarField::Volume, &sessions, &[0]).unwrap();
        assert_eq!(volume.get(0, 0), 100.0);
        // An empty volume cell and a session with no bar read the same.
        assert_eq!(volume.get(1, 0), volume.get(2, 0));
        assert_eq!(volume.get(2, 0), 0.0);
    }

    #[test]
    fn equities_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        let store = BundleStore::new(tmp.path());
        let table = EquityTable::new(
            "CSVDIR",
            vec![SymbolRecord {
                symbol: "AAPL".into(),
                start_date: ts(2020, 1, 2),
                end_date: ts(2020, 1, 3),
                auto_close_date: ts(2020, 1, 4),
            }],
        );
        store.table_writer().write_equities(&table).unwrap();
        assert_eq!(store.read_equities().unwrap(), table);

        let equities = store.retrieve_all().unwrap();
        assert_eq!(equities[0].start_date, date(2020, 1, 2));
        assert_eq!(equities[0].exchange, "CSVDIR");
    }

    #[test]
    fn adjustments_keep_null_dividend_dates() {
        let tmp = tempfile::tempdir().unwrap();
        let store = BundleStore::new(tmp.path());
        let splits = vec![SplitEvent {
            effective_date: ts(2020, 1, 2),
            ratio: 2.0,
            sid: 1,
        }];
        let dividends = vec![DividendEvent::ex_date_only(ts(2020, 1, 3), 0.25, 0)];
        AdjustmentWriter::write(&mut store.table_writer(), &splits, &dividends).unwrap();

        let (s, d) = store.read_adjustments().unwrap();
        assert_eq!(s, splits);
        assert_eq!(d, dividends);
    }

    #[test]
    fn empty_adjustments_still_write_files() {
        let tmp = tempfile::tempdir().unwrap();
        let store = BundleStore::new(tmp.path());
        AdjustmentWriter::write(&mut store.table_writer(), &[], &[]).unwrap();
        let (s, d) = store.read_adjustments().unwrap();
        assert!(s.is_empty());
        assert!(d.is_empty());
    }

    #[test]
    fn fundamentals_keep_numbers_and_text() {
        let tmp = tempfile::tempdir().unwrap();
        let store = BundleStore::new(tmp.path());
        let table = FundamentalsTable {
            columns: vec!["pe".into(), "sector".into()],
            rows: vec![
                FundamentalRow {
                    sid: 0,
                    date: date(2020, 1, 2),
                    fields: BTreeMap::from([
                        ("pe".to_string(), FieldValue::Number(12.5)),
                        ("sector".to_string(), FieldValue::Text("tech".into())),
                    ]),
                },
                FundamentalRow {
                    sid: 1,
                    date: date(2020, 1, 3),
                    fields: BTreeMap::from([("sector".to_string(), FieldValue::Number(7.0))]),
                },
            ],
        };
        FundamentalsWriter::write(&mut store.table_writer(), &table).unwrap();

        let back = store.read_fundamentals().unwrap();
        assert_eq!(back.columns, table.columns);
        assert_eq!(back.value(0, "pe"), &FieldValue::Number(12.5));
        assert_eq!(back.value(0, "sector"), &FieldValue::Text("tech".into()));
        assert_eq!(back.value(1, "pe"), &FieldValue::Missing);
        assert_eq!(back.value(1, "sector"), &FieldValue::Number(7.0));

        let pe = store
            .read(&["pe".to_string()], &[date(2020, 1, 2)], &[0, 1])
            .unwrap();
        assert_eq!(pe["pe"].get(0, 0), 12.5);
        assert!(pe["pe"].get(0, 1).is_nan());
    }

    #[test]
    fn fundamentals_columns_named_like_row_keys_survive() {
        let tmp = tempfile::tempdir().unwrap();
        let store = BundleStore::new(tmp.path());
        let table = FundamentalsTable {
            columns: vec!["sid".into(), "date".into(), "pe".into()],
            rows: vec![FundamentalRow {
                sid: 3,
                date: date(2020, 1, 2),
                fields: BTreeMap::from([
                    ("sid".to_string(), FieldValue::Number(0.0)),
                    ("date".to_string(), FieldValue::Text("Q4".into())),
                    ("pe".to_string(), FieldValue::Number(25.0)),
                ]),
            }],
        };
        FundamentalsWriter::write(&mut store.table_writer(), &table).unwrap();

        let back = store.read_fundamentals().unwrap();
        assert_eq!(back, table);
        assert_eq!(back.rows[0].sid, 3);
    }

    #[test]
    fn missing_fundamentals_file_reads_empty() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(BundleStore::new(tmp.path()).read_fundamentals().unwrap().is_empty());
    }

    #[test]
    fn missing_bar_file_is_an_io_error() {
        let tmp = tempfile::tempdir().unwrap();
        let store = BundleStore::new(tmp.path());
        let err = store
            .load_raw_arrays(BarField::Close, &[date(2020, 1, 2)], &[3])
            .unwrap_err();
        assert!(matches!(err, BundleError::Io { .. }));
    }

    #[test]
    fn manifest_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        let store = BundleStore::new(tmp.path());
        assert!(store.read_manifest().unwrap().is_none());
        let summary = IngestSummary {
            tframe: TimeFrame::Daily,
            symbols: vec!["AAPL".into()],
            bar_rows: 2,
            split_count: 0,
            dividend_count: 0,
            fundamentals_rows: 0,
            dataset_hash: "abc".into(),
        };
        let written = store.write_manifest(&summary).unwrap();
        assert_eq!(store.read_manifest().unwrap(), Some(written));
    }
}
