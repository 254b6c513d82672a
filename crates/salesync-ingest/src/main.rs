//! Salesync - sale-order extract ingestion service

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use salesync_common::logging::{init_logging, LogConfig, LogLevel};
use salesync_common::signal::shutdown_signal;
use salesync_ingest::scheduler::next_fire_time;
use salesync_ingest::{IngestConfig, IngestPipeline, IngestScheduler};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "salesync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Run a single ingestion pass and exit
    #[arg(long)]
    once: bool,

    /// Cron expression overriding SALESYNC_SCHEDULE
    #[arg(long, value_name = "CRON")]
    schedule: Option<String>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Validate configuration, print it with secrets masked, and show the next run
    CheckConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let log_config = LogConfig::builder()
        .level(if cli.verbose { LogLevel::Debug } else { LogLevel::Info })
        .log_file_prefix("salesync")
        .filter_directives("sqlx=warn,suppaftp=warn")
        .build()
        .merge_env()?;
    let _logging = init_logging(&log_config)?;

    let mut config = IngestConfig::from_env().context("Failed to load configuration")?;
    if cli.once {
        config.schedule.run_once = true;
    }
    if let Some(schedule) = cli.schedule {
        config.schedule.expression = schedule;
    }
    config.validate()?;

    if let Some(Commands::CheckConfig) = cli.command {
        return check_config(&config);
    }

    info!(
        remote = ?config.remote.kind,
        prefixes = ?config.app.file_prefixes,
        run_once = config.schedule.run_once,
        "Starting salesync"
    );
    if config.schedule.retry_interval_secs > 0 {
        info!(
            "Retry interval configured to {:?}; failed files are retried on the next tick",
            config.retry_interval()
        );
    }

    let run_once = config.schedule.run_once;
    let scheduler = IngestScheduler::new(IngestPipeline::new(Arc::new(config)));

    if run_once {
        let summary = scheduler.run_once().await?;
        info!(
            processed = summary.succeeded(),
            failed = summary.failed(),
            skipped = summary.skipped(),
            "Single run finished"
        );
    } else {
        scheduler.run_recurring(shutdown_signal()).await?;
    }

    Ok(())
}

fn check_config(config: &IngestConfig) -> Result<()> {
    println!("{:#?}", config);
    if config.schedule.run_once {
        println!("Mode: run once");
    } else {
        match next_fire_time(&config.schedule.expression, &Local::now())? {
            Some(next) => println!("Next run: {}", next.format("%Y-%m-%d %H:%M:%S %:z")),
            None => println!("Schedule '{}' never fires", config.schedule.expression),
        }
    }
    Ok(())
}
