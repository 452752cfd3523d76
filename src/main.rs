//! ETA tracker command line

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Local};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use eta_tracker::{
    config::AppConfig,
    email::SmtpMailer,
    errors::EtaTrackerError,
    pipeline::Pipeline,
    snapshot::{directory_status, SnapshotStore},
};

const SECONDS_PER_DAY: u64 = 86_400;

#[derive(Parser)]
#[command(name = "eta-tracker", version, about = "Vessel schedule tracker for the Hamburg terminals")]
struct Cli {
    /// Enable verbose debug logging
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Full pipeline: scrape, reconcile, export, sync, check ETAs
    Run {
        /// Custom CSV output path
        #[arg(long)]
        output: Option<PathBuf>,
        /// Only scrape, skip everything after it
        #[arg(long)]
        no_export: bool,
    },
    /// Only scrape terminals and save JSON snapshots
    Scrape,
    /// Export the latest snapshots as CSV (no scraping)
    Process {
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Sync the latest snapshots to the database (no scraping)
    Sync,
    /// Check watched vessels for ETA changes
    CheckEtas,
    /// Send a test email
    TestEmail { to: String },
    /// Delete old snapshot and debug files
    Clean {
        /// Max age in days (default from config)
        #[arg(long)]
        days: Option<u32>,
        /// Show what would be deleted
        #[arg(long)]
        dry_run: bool,
    },
    /// Show file counts and the latest export
    Status,
}

#[tokio::main]
async fn main() -> Result<(), EtaTrackerError> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = AppConfig::load()?;
    let _guard = init_logging(&config.logging.dir, cli.debug);
    config.validate()?;
    if cli.debug {
        info!("Debug mode enabled");
    }

    match cli.command {
        Command::Run { output, no_export } => {
            let pipeline = Pipeline::new(config)?;
            if no_export {
                let (eurogate, hhla) = pipeline.run_scrape().await;
                println!("Done: {} Eurogate + {} HHLA", eurogate.len(), hhla.len());
                return Ok(());
            }

            let summary = pipeline.run_full(output.as_deref()).await;
            println!("Pipeline complete!");
            println!("  Eurogate: {} vessels", summary.eurogate_count);
            println!("  HHLA:     {} vessels", summary.hhla_count);
            println!("  Total:    {} records ({} matched)", summary.total, summary.matched_pairs);
            match &summary.export_path {
                Some(path) => println!("  CSV:      {}", path.display()),
                None => println!("  CSV:      not written"),
            }
            println!("  Time:     {}s", summary.elapsed_seconds);
            match &summary.sync {
                Some(sync) if sync.ok => println!("  Database: {} events synced", sync.total_synced),
                Some(sync) => println!(
                    "  Database: {}",
                    sync.error.as_deref().unwrap_or("sync failed")
                ),
                None => println!("  Database: skipped"),
            }
            if let Some(watchlist) = &summary.watchlist {
                println!(
                    "  Watchlist: {} checked, {} changed, {} notified, {} errors",
                    watchlist.checked, watchlist.changed, watchlist.notified, watchlist.errors
                );
            }
            for error in &summary.errors {
                println!("  Failed:   {}", error);
            }
        }
        Command::Scrape => {
            let pipeline = Pipeline::new(config)?;
            let (eurogate, hhla) = pipeline.run_scrape().await;
            println!("Done: {} Eurogate + {} HHLA", eurogate.len(), hhla.len());
        }
        Command::Process { output } => {
            let pipeline = Pipeline::new(config)?;
            let path = pipeline.run_process_from_latest(output.as_deref())?;
            println!("CSV saved: {}", path.display());
        }
        Command::Sync => {
            let pipeline = Pipeline::new(config)?;
            let result = pipeline.run_sync_from_latest().await?;
            if result.ok {
                println!("Synced {} events", result.total_synced);
                println!("  Eurogate: {}", result.eurogate_synced);
                println!("  HHLA:     {}", result.hhla_synced);
            } else {
                println!("Sync failed: {}", result.error.as_deref().unwrap_or("unknown error"));
            }
        }
        Command::CheckEtas => {
            let pipeline = Pipeline::new(config)?;
            let summary = pipeline.check_etas().await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Command::TestEmail { to } => {
            let mailer = SmtpMailer::from_config(config.smtp.as_ref())?;
            mailer.send_test(&to).await?;
            println!("Test email sent to {}", to);
        }
        Command::Clean { days, dry_run } => {
            let max_days = days.unwrap_or(config.clean.max_age_days);
            println!("Cleaning files older than {} days", max_days);
            let store = SnapshotStore::new(&config.storage);
            let report = store.clean(
                Duration::from_secs(u64::from(max_days) * SECONDS_PER_DAY),
                dry_run,
            )?;
            if report.files.is_empty() {
                println!("Nothing to clean.");
            } else {
                let action = if dry_run { "Would delete" } else { "Deleted" };
                println!("{} {} files ({} bytes)", action, report.files.len(), report.bytes);
            }
        }
        Command::Status => print_status(&config),
    }

    Ok(())
}

fn print_status(config: &AppConfig) {
    let store = SnapshotStore::new(&config.storage);
    let mut directories = store.status();
    directories.push(directory_status("Logs", &config.logging.dir));
    for dir in directories {
        match dir.files {
            Some(count) => println!("  {}: {} files", dir.label, count),
            None => println!("  {}: not created yet", dir.label),
        }
    }

    let export = &config.processor.export_path;
    match std::fs::metadata(export).and_then(|m| m.modified()) {
        Ok(modified) => {
            let modified: DateTime<Local> = modified.into();
            println!("\n  Latest export: {}", export.display());
            println!("  Last updated: {}", modified.format("%Y-%m-%d %H:%M:%S"));
        }
        Err(_) => println!("\n  No export generated yet"),
    }

    match config.smtp.as_ref().filter(|s| !s.address.is_empty()) {
        Some(smtp) => println!("\n  Email: {}", smtp.address),
        None => println!("\n  Email: not configured"),
    }
    match &config.database {
        Some(_) => println!("  Database: configured"),
        None => println!("  Database: not configured"),
    }
}

/// Console logging plus a daily rotating file in `log_dir`.
///
/// File logging is skipped with a warning when the directory is not
/// writable. The returned guard flushes the file writer on drop.
fn init_logging(log_dir: &Path, debug: bool) -> Option<WorkerGuard> {
    let default_filter = if debug {
        "debug,eta_tracker=debug,sqlx=warn"
    } else {
        "info,eta_tracker=info,sqlx=warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let writable = std::fs::create_dir_all(log_dir).is_ok() && {
        let probe = log_dir.join(".eta_tracker_write_test");
        let ok = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&probe)
            .is_ok();
        let _ = std::fs::remove_file(&probe);
        ok
    };

    let (file_layer, guard) = if writable {
        let file_appender = tracing_appender::rolling::daily(log_dir, "eta-tracker.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        let layer = tracing_subscriber::fmt::layer()
            .with_writer(non_blocking)
            .with_ansi(false)
            .with_target(true);
        (Some(layer), Some(guard))
    } else {
        eprintln!(
            "Warning: Could not write to log directory {}, file logging disabled",
            log_dir.display()
        );
        (None, None)
    };

    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    guard
}
