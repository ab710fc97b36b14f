//! CSV ingestion, bundle tables, writer/reader contracts and the Parquet store.

pub mod extract;
pub mod fundamentals;
pub mod ingest;
pub mod parse;
pub mod reader;
pub mod scan;
pub mod schema;
pub mod store;
pub mod tables;
pub mod writer;

pub use extract::{EventExtractor, ExtractedTables};
pub use fundamentals::{read_fundamentals_csv, FundamentalsFile};
pub use ingest::{CsvDirBundle, IngestSummary};
pub use parse::{read_price_csv, PriceTable};
pub use reader::{AssetFinder, DailyBarReader, FundamentalsReader, SessionMatrix};
pub use scan::scan_symbols;
pub use schema::PriceSchema;
pub use store::{BundleManifest, BundleStore, ParquetBarWriter, ParquetTableWriter};
pub use tables::{
    DividendEvent, Equity, EquityTable, FieldValue, FundamentalRow, FundamentalsTable,
    SplitEvent, SymbolRecord,
};
pub use writer::{
    AdjustmentWriter, AssetDbWriter, BarWriter, BundleWriters, FundamentalsWriter, PricingStream,
};
