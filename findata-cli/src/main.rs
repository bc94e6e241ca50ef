//! findata CLI — collect provider datasets and inspect the Parquet store.
//!
//! Commands:
//! - `collect` — fetch every dataset described by a TOML run file (or the defaults)
//! - `stocks` — fetch Yahoo Finance prices
//! - `fred` — fetch FRED economic series
//! - `world-bank` — fetch World Bank indicators
//! - `factors` — fetch a Fama-French factor dataset
//! - `status` — report what the data directory holds

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use findata_core::config::CollectRequest;
use findata_core::data::DatasetStatus;
use findata_core::{DataCollector, Interval, ParquetStore, WorldBankIndicator};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(
    name = "findata",
    about = "findata CLI — financial and macroeconomic data collector"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Start date (YYYY-MM-DD). Defaults to 2010-01-01.
    #[arg(long, global = true)]
    start: Option<String>,

    /// End date (YYYY-MM-DD). Defaults to today.
    #[arg(long, global = true)]
    end: Option<String>,

    /// Output directory for Parquet files. Defaults to ./data/raw.
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Debug-level logging.
    #[arg(long, short, global = true, default_value_t = false)]
    verbose: bool,

    /// Emit logs as JSON lines.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch every dataset: stocks, economic indicators, World Bank data and factors.
    Collect {
        /// Path to a TOML run file. Sections left out use the defaults.
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Fetch adjusted prices from Yahoo Finance.
    Stocks {
        /// Tickers to fetch (e.g., SPY AGG GLD).
        #[arg(required = true)]
        tickers: Vec<String>,

        /// Bar interval: 1d, 5d, 1wk, 1mo or 3mo.
        #[arg(long, default_value = "1d")]
        interval: Interval,

        /// Leave out the dividends and stock_splits columns.
        #[arg(long, default_value_t = false)]
        no_dividends: bool,
    },
    /// Fetch economic series from FRED (reads FRED_API_KEY).
    Fred {
        /// Series ids (e.g., GDP UNRATE).
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Fetch World Bank indicators as a country/year panel.
    WorldBank {
        /// Indicator as ID=NAME (e.g., FP.CPI.TOTL.ZG=Inflation). Repeatable.
        #[arg(long = "indicator", required = true, value_parser = parse_indicator)]
        indicators: Vec<WorldBankIndicator>,

        /// ISO3 country code. Repeatable.
        #[arg(long = "country", required = true)]
        countries: Vec<String>,
    },
    /// Fetch a Fama-French factor dataset.
    Factors {
        /// Dataset name as published in the data library.
        #[arg(long, default_value = "F-F_Research_Data_Factors")]
        dataset: String,
    },
    /// Report the datasets in the data directory.
    Status,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.json_logs);

    let request = match &cli.command {
        Commands::Collect {
            config: Some(path),
        } => CollectRequest::from_file(path)?,
        _ => CollectRequest::default(),
    };
    let request = apply_overrides(request, &cli);

    match cli.command {
        Commands::Collect { .. } => run_collect(&request),
        Commands::Stocks {
            tickers,
            interval,
            no_dividends,
        } => {
            let collector = collector(&request)?;
            let tickers: Vec<&str> = tickers.iter().map(String::as_str).collect();
            let df = collector.stock_data(&tickers, interval, !no_dividends)?;
            print_shape("stocks", df.shape());
            Ok(())
        }
        Commands::Fred { ids } => {
            let collector = collector(&request)?;
            let ids: Vec<&str> = ids.iter().map(String::as_str).collect();
            let df = collector.economic_indicators(&ids)?;
            print_shape("economic", df.shape());
            Ok(())
        }
        Commands::WorldBank {
            indicators,
            countries,
        } => {
            let collector = collector(&request)?;
            let countries: Vec<&str> = countries.iter().map(String::as_str).collect();
            let df = collector.world_bank_data(&indicators, &countries)?;
            print_shape("world_bank", df.shape());
            Ok(())
        }
        Commands::Factors { dataset } => {
            let collector = collector(&request)?;
            let df = collector.fama_french_factors(&dataset)?;
            print_shape("factors", df.shape());
            Ok(())
        }
        Commands::Status => run_status(&request),
    }
}

fn init_logging(verbose: bool, json: bool) {
    let default = if verbose {
        "findata=debug,findata_core=debug,info"
    } else {
        "findata=info,findata_core=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let registry = tracing_subscriber::registry().with(filter);
    let layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);
    if json {
        registry.with(layer.json()).init();
    } else {
        registry.with(layer.compact()).init();
    }
}

/// Command-line dates and directory take precedence over the run file.
fn apply_overrides(mut request: CollectRequest, cli: &Cli) -> CollectRequest {
    if let Some(start) = &cli.start {
        request.collector.start_date = Some(start.clone());
    }
    if let Some(end) = &cli.end {
        request.collector.end_date = Some(end.clone());
    }
    if let Some(dir) = &cli.data_dir {
        request.collector.data_dir = Some(dir.clone());
    }
    request
}

fn collector(request: &CollectRequest) -> Result<DataCollector> {
    let config = request
        .collector_config()
        .context("invalid collector settings")?;
    Ok(DataCollector::new(config)?)
}

fn parse_indicator(s: &str) -> Result<WorldBankIndicator, String> {
    match s.split_once('=') {
        Some((id, name)) if !id.trim().is_empty() && !name.trim().is_empty() => {
            Ok(WorldBankIndicator::new(id.trim(), name.trim()))
        }
        _ => Err(format!("expected ID=NAME, got '{s}'")),
    }
}

fn run_collect(request: &CollectRequest) -> Result<()> {
    let collector = collector(request)?;
    let data = collector.all_data(request)?;

    for (name, df) in data.iter() {
        print_shape(name, df.shape());
    }
    println!();
    println!("Data saved to {}", collector.store().data_dir().display());
    Ok(())
}

fn print_shape(name: &str, (rows, cols): (usize, usize)) {
    println!("{name} data shape: ({rows}, {cols})");
}

fn run_status(request: &CollectRequest) -> Result<()> {
    let config = request.collector_config()?;
    let store = ParquetStore::new(&config.data_dir);
    if !store.data_dir().exists() {
        bail!("data directory does not exist: {}", store.data_dir().display());
    }

    let statuses = store.status();
    let present: Vec<&DatasetStatus> = statuses.iter().filter(|s| s.exists()).collect();
    let total_size: u64 = present.iter().filter_map(|s| s.size_bytes).sum();

    println!("Data directory: {}", store.data_dir().display());
    println!("Datasets: {}/{}", present.len(), statuses.len());
    println!("Total size: {}", format_size(total_size));
    println!();
    println!(
        "{:<22} {:<25} {:>8} {:>6} {:>10}  {:<19}",
        "Dataset", "Date Range", "Rows", "Cols", "Size", "Written"
    );
    println!("{}", "-".repeat(96));
    for status in &statuses {
        println!("{}", status_row(status));
    }
    Ok(())
}

fn status_row(status: &DatasetStatus) -> String {
    let name = status.dataset.file_stem();
    let Some(size) = status.size_bytes else {
        return format!("{name:<22} (missing)");
    };

    match &status.meta {
        Some(meta) => {
            let range = match (meta.start_date, meta.end_date) {
                (Some(start), Some(end)) => format!("{start} to {end}"),
                _ => "-".to_string(),
            };
            format!(
                "{:<22} {:<25} {:>8} {:>6} {:>10}  {:<19}",
                name,
                range,
                meta.rows,
                meta.columns.len(),
                format_size(size),
                meta.written_at.format("%Y-%m-%d %H:%M:%S"),
            )
        }
        None => format!(
            "{:<22} {:<25} {:>8} {:>6} {:>10}",
            name,
            "(no meta)",
            "-",
            "-",
            format_size(size)
        ),
    }
}

fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
