//! Salesync Ingest Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Scheduled ingestion of pipe-delimited sale-order extracts from a remote
//! drop directory into Postgres.
//!
//! # Components
//!
//! - **remote**: listing and downloading over SFTP, FTP or from a mounted directory
//! - **ledger**: append-only record of processing attempts (idempotency gate)
//! - **parser**: typed header/item/summary records from one extract file
//! - **store**: one transaction per file
//! - **orchestrator**: one pass over every configured prefix
//! - **pipeline**: a run with its own database pool and remote session
//! - **scheduler**: one-shot or cron-driven runs
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use salesync_ingest::{IngestConfig, IngestPipeline};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Arc::new(IngestConfig::from_env()?);
//!     let summary = IngestPipeline::new(config).run().await?;
//!     println!("{} files processed", summary.succeeded());
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod ledger;
pub mod models;
pub mod orchestrator;
pub mod parser;
pub mod pipeline;
pub mod remote;
pub mod scheduler;
pub mod store;

pub use config::IngestConfig;
pub use error::{IngestError, IngestResult};
pub use ledger::{IngestionLedger, LedgerEntry, PgLedger, ProcessingStatus};
pub use models::{FileCategory, ParsedBatch};
pub use orchestrator::{FileOutcome, Orchestrator, RunSummary};
pub use parser::RecordParser;
pub use pipeline::IngestPipeline;
pub use scheduler::{IngestScheduler, ScheduledRun};
pub use store::{PgRecordStore, RecordStore};
