//! TickVault CLI: download, plan, and archive status commands.
//!
//! Commands:
//! - `download`: fetch every configured instrument and merge into the archive
//! - `plan`: print the scheduled job list without fetching
//! - `status`: list archived series with their windows and bar counts

use anyhow::{Context, Result};
use chrono::Datelike;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tickvault_core::data::{ParquetStorage, Storage, YahooProvider};
use tickvault_core::engine::{Orchestrator, StdoutProgress};
use tickvault_core::{AppConfig, InstrumentConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "tickvault",
    about = "TickVault CLI: historical bar downloader and archive"
)]
struct Cli {
    /// Log at debug level (RUST_LOG overrides).
    #[arg(long, short, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args)]
struct RunArgs {
    /// Path to the TOML config file.
    #[arg(long)]
    config: PathBuf,

    /// First year to download. Defaults to the config value, then the current year.
    #[arg(long)]
    start_year: Option<i32>,

    /// Last year to download. Defaults to the config value, then the current year.
    #[arg(long)]
    end_year: Option<i32>,

    /// Restrict the run to these instrument codes (repeatable).
    #[arg(long = "instrument")]
    instruments: Vec<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Download configured instruments and merge them into the archive.
    Download {
        #[command(flatten)]
        run: RunArgs,

        /// Archive directory. Overrides the config value.
        #[arg(long)]
        data_dir: Option<PathBuf>,

        /// Backup archive directory. Overrides the config value.
        #[arg(long)]
        backup_dir: Option<PathBuf>,

        /// Provider calls allowed per day. Overrides the config value.
        #[arg(long)]
        allowance: Option<u32>,

        /// Fetch full windows even when the archive already covers them.
        #[arg(long, default_value_t = false)]
        force: bool,
    },
    /// Print the scheduled job list without fetching.
    Plan {
        #[command(flatten)]
        run: RunArgs,
    },
    /// List archived series.
    Status {
        /// Archive directory. Defaults to ./data.
        #[arg(long, default_value = "data")]
        data_dir: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Download {
            run,
            data_dir,
            backup_dir,
            allowance,
            force,
        } => run_download(run, data_dir, backup_dir, allowance, force),
        Commands::Plan { run } => run_plan(run),
        Commands::Status { data_dir } => run_status(&data_dir),
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_target(false)
        .init();
}

/// Config, selected instruments and the resolved year range.
fn load_run(run: &RunArgs) -> Result<(AppConfig, Vec<InstrumentConfig>, i32, i32)> {
    let config = AppConfig::from_file(&run.config)
        .with_context(|| format!("loading {}", run.config.display()))?;
    let instruments = config.select(&run.instruments)?;

    let this_year = chrono::Utc::now().year();
    let start_year = run
        .start_year
        .or(config.download.start_year)
        .unwrap_or(this_year);
    let end_year = run.end_year.or(config.download.end_year).unwrap_or(this_year);
    Ok((config, instruments, start_year, end_year))
}

fn run_download(
    run: RunArgs,
    data_dir: Option<PathBuf>,
    backup_dir: Option<PathBuf>,
    allowance: Option<u32>,
    force: bool,
) -> Result<()> {
    let (mut config, instruments, start_year, end_year) = load_run(&run)?;
    if let Some(dir) = data_dir {
        config.download.data_dir = dir;
    }
    if backup_dir.is_some() {
        config.download.backup_dir = backup_dir;
    }
    if allowance.is_some() {
        config.download.daily_allowance = allowance;
    }
    let settings = &config.download;
    info!(
        data_dir = %settings.data_dir.display(),
        backup = settings.backup_dir.is_some(),
        allowance = ?settings.daily_allowance,
        force,
        "starting download"
    );

    let mut provider = YahooProvider::new()?;
    if let Some(min_rows) = settings.min_rows {
        provider = provider.with_min_rows(min_rows);
    }
    let storage = Arc::new(ParquetStorage::new(&settings.data_dir));
    let backup = settings
        .backup_dir
        .as_ref()
        .map(|dir| Arc::new(ParquetStorage::new(dir)) as Arc<dyn Storage>);

    let orchestrator = Orchestrator::new(Arc::new(provider), storage)
        .with_backup(backup)
        .with_allowance(Arc::new(settings.allowance()))
        .with_retry(settings.retry_policy())
        .with_force(force);

    let summary = orchestrator.download(&instruments, start_year, end_year, &StdoutProgress)?;

    if summary.quota_exhausted {
        println!("Run stopped by provider quota; rerun later to continue.");
    }
    if !summary.all_succeeded() {
        for failure in &summary.failures {
            eprintln!("Error: {failure}");
        }
        std::process::exit(1);
    }

    Ok(())
}

fn run_plan(run: RunArgs) -> Result<()> {
    let (config, instruments, start_year, end_year) = load_run(&run)?;

    let provider = YahooProvider::new()?;
    let storage = Arc::new(ParquetStorage::new(&config.download.data_dir));
    let jobs = Orchestrator::new(Arc::new(provider), storage).plan(
        &instruments,
        start_year,
        end_year,
    )?;

    if jobs.is_empty() {
        println!("Nothing to download for {start_year}..={end_year}.");
        return Ok(());
    }

    println!(
        "{:<5} {:<14} {:<6} {:<12} {:<12} STATUS",
        "#", "SYMBOL", "PERIOD", "START", "END"
    );
    for (i, job) in jobs.iter().enumerate() {
        let status = match job.instrument().contract() {
            Some(c) if c.is_expired() => "expired",
            Some(_) => "active",
            None => "-",
        };
        println!(
            "{:<5} {:<14} {:<6} {:<12} {:<12} {status}",
            i + 1,
            job.instrument().symbol(),
            job.period().to_string(),
            job.start().date().to_string(),
            job.end().date().to_string(),
        );
    }
    println!("\n{} jobs", jobs.len());
    Ok(())
}

fn run_status(data_dir: &Path) -> Result<()> {
    if !data_dir.exists() {
        println!("Archive directory does not exist: {}", data_dir.display());
        return Ok(());
    }

    let series = ParquetStorage::new(data_dir).status()?;
    if series.is_empty() {
        println!("Archive is empty: {}", data_dir.display());
        return Ok(());
    }

    println!(
        "{:<14} {:<6} {:<20} {:<20} {:>8}  PROVIDER",
        "SYMBOL", "PERIOD", "FIRST BAR", "LAST BAR", "BARS"
    );
    for s in &series {
        println!(
            "{:<14} {:<6} {:<20} {:<20} {:>8}  {}",
            s.symbol,
            s.period.to_string(),
            s.first_bar.to_string(),
            s.last_bar.to_string(),
            s.bar_count,
            s.provider
        );
    }
    println!("\n{} series in {}", series.len(), data_dir.display());
    Ok(())
}
