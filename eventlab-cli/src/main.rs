//! EventLab CLI — sweep and single-run commands.
//!
//! Commands:
//! - `sweep`: run every configuration of a TOML sweep file, appending rows to the results CSV
//! - `run`: run one configuration of a sweep file and print its summary

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use eventlab_runner::{load_market_data, DataSource, MultiBacktest, RunOutcome, SweepConfig};

#[derive(Parser)]
#[command(
    name = "eventlab",
    about = "EventLab CLI — discrete-event backtesting and parameter sweeps"
)]
struct Cli {
    /// Log filter used when RUST_LOG is unset (e.g., info, eventlab_core=debug).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args)]
struct DataArgs {
    /// Directory holding one `<SYMBOL>.csv` file per symbol.
    #[arg(long, conflicts_with = "synthetic")]
    bars_dir: Option<PathBuf>,

    /// Use deterministic synthetic bars instead of CSV files.
    #[arg(long, default_value_t = false)]
    synthetic: bool,

    /// Number of synthetic bars per symbol.
    #[arg(long, default_value_t = 1500)]
    bars: usize,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every configuration of a sweep file.
    Sweep {
        /// Path to the TOML sweep file.
        #[arg(long)]
        config: PathBuf,

        #[command(flatten)]
        data: DataArgs,

        /// Results file. Overrides `sweep.output` from the config.
        #[arg(long)]
        output: Option<PathBuf>,

        /// Run configurations one at a time.
        #[arg(long, default_value_t = false)]
        sequential: bool,
    },
    /// Run a single configuration and print its summary statistics.
    Run {
        /// Path to the TOML sweep file.
        #[arg(long)]
        config: PathBuf,

        /// Zero-based configuration index.
        #[arg(long, default_value_t = 0)]
        row: usize,

        #[command(flatten)]
        data: DataArgs,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level)?;

    match cli.command {
        Commands::Sweep {
            config,
            data,
            output,
            sequential,
        } => run_sweep(config, data, output, sequential),
        Commands::Run { config, row, data } => run_single(config, row, data),
    }
}

fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to init logging: {e}"))
}

fn data_source(args: &DataArgs) -> Result<DataSource> {
    match (&args.bars_dir, args.synthetic) {
        (Some(dir), _) => Ok(DataSource::CsvDir(dir.clone())),
        (None, true) => Ok(DataSource::synthetic(args.bars)),
        (None, false) => bail!("pass --bars-dir <DIR> or --synthetic"),
    }
}

fn load_config(path: &Path) -> Result<SweepConfig> {
    let config = SweepConfig::from_file(path)
        .with_context(|| format!("loading sweep config {}", path.display()))?;
    info!(
        path = %path.display(),
        kind = %config.strategy.kind,
        symbols = ?config.backtest.symbols,
        "config loaded"
    );
    Ok(config)
}

fn run_sweep(
    config_path: PathBuf,
    data: DataArgs,
    output: Option<PathBuf>,
    sequential: bool,
) -> Result<()> {
    let mut config = load_config(&config_path)?;
    if let Some(output) = output {
        config.sweep.output = output;
    }
    let source = data_source(&data)?;
    let market = load_market_data(&config, &source)?;

    let sweep = MultiBacktest::new(config, &market)
        .context("preparing sweep")?
        .with_parallelism(!sequential);
    let summary = sweep.run().context("sweep failed")?;

    println!();
    println!("=== Sweep Result ===");
    println!("Configurations: {}", summary.total);
    println!("Succeeded:      {}", summary.succeeded);
    println!("Failed:         {}", summary.failed.len());
    for (index, err) in &summary.failed {
        println!("  #{index}: {err}");
    }
    println!("Results:        {}", summary.output.display());
    Ok(())
}

fn run_single(config_path: PathBuf, row: usize, data: DataArgs) -> Result<()> {
    let config = load_config(&config_path)?;
    let source = data_source(&data)?;
    let market = load_market_data(&config, &source)?;

    let sweep = MultiBacktest::new(config, &market).context("preparing backtest")?;
    let outcome = sweep
        .run_row(row)
        .with_context(|| format!("configuration {row} failed"))?;
    print_outcome(&outcome);
    Ok(())
}

fn print_outcome(outcome: &RunOutcome) {
    let report = &outcome.report;
    println!();
    println!("=== Backtest Result ===");
    println!("Strategy:       {}", report.strategy);
    println!("Configuration:  #{} ({})", outcome.index, outcome.params.columns().join(", "));
    println!("Ticks:          {}", report.dispatch.ticks);
    println!("Signals:        {}", report.dispatch.signals);
    println!("Orders:         {}", report.dispatch.orders);
    println!("Fills:          {}", report.dispatch.fills);
    println!();
    println!("--- Performance ---");
    for (label, value) in &report.summary {
        println!("{:<16}{value}", format!("{label}:"));
    }
}
