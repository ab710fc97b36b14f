//! csvbundle CLI: ingest, compare, and bundle inspection commands.
//!
//! Commands:
//! - `ingest`: turn a CSV directory into a Parquet bundle
//! - `compare`: diff one bar field between two bundles, persisting results
//! - `unmatched`: read back persisted mismatches (optionally with values)
//! - `bundle status`: print the manifest of a bundle

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use csvbundle_compare::{all_assets, CompareConfig, DailyBarComparison};
use csvbundle_core::calendar::CalendarRegistry;
use csvbundle_core::config::IngestConfig;
use csvbundle_core::data::{AssetFinder, BundleStore, CsvDirBundle};
use csvbundle_core::domain::{BarField, Sid, TimeFrame};
use std::path::{Path, PathBuf};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "csvbundle",
    about = "CSV directory ingestion and daily bar comparison"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest a directory of <symbol>.csv files into a Parquet bundle.
    Ingest {
        /// Path to a TOML ingest config. Flags override its values.
        #[arg(long)]
        config: Option<PathBuf>,

        /// CSV root. Falls back to the config, then $CSVDIR.
        #[arg(long)]
        csvdir: Option<PathBuf>,

        /// Bar granularity: daily or minute.
        #[arg(long)]
        tframe: Option<String>,

        /// Drop rows before this date (YYYY-MM-DD).
        #[arg(long)]
        start: Option<String>,

        /// Drop rows after this date (YYYY-MM-DD).
        #[arg(long)]
        end: Option<String>,

        /// Bundle output directory.
        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// Log bar writer progress.
        #[arg(long, default_value_t = false)]
        show_progress: bool,
    },
    /// Compare one bar field between two bundles.
    Compare {
        #[command(flatten)]
        args: CompareArgs,
    },
    /// Show persisted mismatches of a previous comparison.
    Unmatched {
        #[command(flatten)]
        args: CompareArgs,

        /// Reload both bundles and print the differing values.
        #[arg(long, default_value_t = false)]
        values: bool,
    },
    /// Bundle inspection commands.
    Bundle {
        #[command(subcommand)]
        action: BundleAction,
    },
}

#[derive(Subcommand)]
enum BundleAction {
    /// Print the manifest of the last ingest.
    Status {
        /// Bundle directory.
        #[arg(long, default_value = "bundle")]
        bundle: PathBuf,
    },
}

#[derive(Args)]
struct CompareArgs {
    /// Path to a TOML compare config. Flags override its values.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Result directory.
    #[arg(long)]
    rootdir: Option<PathBuf>,

    #[arg(long)]
    bundle_a: Option<PathBuf>,

    #[arg(long)]
    bundle_b: Option<PathBuf>,

    /// First session (YYYY-MM-DD).
    #[arg(long)]
    start: Option<String>,

    /// Last session (YYYY-MM-DD).
    #[arg(long)]
    end: Option<String>,

    /// open, high, low, close or volume.
    #[arg(long)]
    field: Option<String>,

    /// Calendar name or alias.
    #[arg(long)]
    calendar: Option<String>,

    /// Only these sids, comma-separated.
    #[arg(long, value_delimiter = ',')]
    assets: Vec<Sid>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Ingest {
            config,
            csvdir,
            tframe,
            start,
            end,
            output_dir,
            show_progress,
        } => run_ingest(config, csvdir, tframe, start, end, output_dir, show_progress),
        Commands::Compare { args } => run_compare(args),
        Commands::Unmatched { args, values } => run_unmatched(args, values),
        Commands::Bundle { action } => match action {
            BundleAction::Status { bundle } => run_bundle_status(&bundle),
        },
    };

    if let Err(e) = result {
        error!("{e:#}");
        std::process::exit(1);
    }
}

fn parse_date(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").with_context(|| format!("invalid date '{raw}'"))
}

#[allow(clippy::too_many_arguments)]
fn run_ingest(
    config_path: Option<PathBuf>,
    csvdir: Option<PathBuf>,
    tframe: Option<String>,
    start: Option<String>,
    end: Option<String>,
    output_dir: Option<PathBuf>,
    show_progress: bool,
) -> Result<()> {
    let mut config = match config_path {
        Some(path) => IngestConfig::from_file(&path)?,
        None => IngestConfig::default(),
    };
    if csvdir.is_some() {
        config.csvdir = csvdir;
    }
    if let Some(tframe) = tframe {
        config.tframe = tframe.parse::<TimeFrame>()?;
    }
    if let Some(start) = start {
        config.start = Some(parse_date(&start)?);
    }
    if let Some(end) = end {
        config.end = Some(parse_date(&end)?);
    }
    if let Some(output_dir) = output_dir {
        config.output_dir = output_dir;
    }
    config.show_progress |= show_progress;
    config.validate()?;

    let registry = CalendarRegistry::bootstrap(&config.calendar_aliases)?;
    let calendar = registry.resolve(&config.exchange)?;
    info!(exchange = %config.exchange, calendar = calendar.name(), "calendar resolved");

    let csvdir = config.resolve_csvdir()?;
    let store = BundleStore::new(&config.output_dir);
    let summary = store.ingest(&CsvDirBundle::from_config(&config), &csvdir)?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn compare_config(args: CompareArgs) -> Result<CompareConfig> {
    let mut config = match args.config {
        Some(path) => CompareConfig::from_file(&path)?,
        None => {
            let (Some(rootdir), Some(bundle_a), Some(bundle_b), Some(start), Some(end)) = (
                args.rootdir.clone(),
                args.bundle_a.clone(),
                args.bundle_b.clone(),
                args.start.as_deref(),
                args.end.as_deref(),
            ) else {
                bail!("without --config, --rootdir, --bundle-a, --bundle-b, --start and --end are required");
            };
            CompareConfig::new(rootdir, bundle_a, bundle_b, parse_date(start)?, parse_date(end)?)
        }
    };

    if let Some(rootdir) = args.rootdir {
        config.rootdir = rootdir;
    }
    if let Some(bundle_a) = args.bundle_a {
        config.bundle_a = bundle_a;
    }
    if let Some(bundle_b) = args.bundle_b {
        config.bundle_b = bundle_b;
    }
    if let Some(start) = args.start {
        config.start = parse_date(&start)?;
    }
    if let Some(end) = args.end {
        config.end = parse_date(&end)?;
    }
    if let Some(field) = args.field {
        config.field = field.parse::<BarField>()?;
    }
    if let Some(calendar) = args.calendar {
        config.calendar = calendar;
    }
    if !args.assets.is_empty() {
        config.assets = Some(args.assets);
    }
    config.validate()?;
    Ok(config)
}

/// Build the comparison described by `config` and hand it to `f`.
fn with_comparison<T>(
    config: &CompareConfig,
    f: impl FnOnce(&mut DailyBarComparison<'_>) -> Result<T>,
) -> Result<T> {
    let store_a = BundleStore::new(&config.bundle_a);
    let store_b = BundleStore::new(&config.bundle_b);
    let registry = CalendarRegistry::bootstrap(&config.calendar_aliases)?;
    let calendar = registry.resolve(&config.calendar)?;

    let assets = match &config.assets {
        Some(sids) => store_a.retrieve_assets(sids)?,
        None => all_assets(&store_a)?,
    };
    info!(
        bundle_a = %config.bundle_a.display(),
        bundle_b = %config.bundle_b.display(),
        assets = assets.len(),
        field = %config.field,
        "comparison configured"
    );

    let mut comparison = DailyBarComparison::new(
        &config.rootdir,
        calendar,
        &store_a,
        &store_b,
        config.start,
        config.end,
        assets,
    )?
    .with_field(config.field);
    f(&mut comparison)
}

fn run_compare(args: CompareArgs) -> Result<()> {
    let config = compare_config(args)?;
    let summary = with_comparison(&config, |cmp| Ok(cmp.compare()?))?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn run_unmatched(args: CompareArgs, values: bool) -> Result<()> {
    let config = compare_config(args)?;
    let json = with_comparison(&config, |cmp| {
        if values {
            Ok(serde_json::to_string_pretty(&cmp.unmatched_values()?)?)
        } else {
            Ok(serde_json::to_string_pretty(&cmp.where_unmatched()?)?)
        }
    })?;
    println!("{json}");
    Ok(())
}

fn run_bundle_status(bundle: &Path) -> Result<()> {
    let store = BundleStore::new(bundle);
    let Some(manifest) = store.read_manifest()? else {
        bail!("no bundle manifest under {}", bundle.display());
    };
    println!("Bundle:    {}", bundle.display());
    println!("Frame:     {}", manifest.tframe);
    println!("Symbols:   {}", manifest.symbols.len());
    println!("Hash:      {}", manifest.dataset_hash);
    println!("Written:   {}", manifest.written_at);

    let equities = store.read_equities()?;
    for equity in equities.equities() {
        println!(
            "  {:>5}  {:<10} {} .. {}",
            equity.sid, equity.symbol, equity.start_date, equity.end_date
        );
    }
    Ok(())
}
