//! One ingestion run over every configured prefix
//!
//! Per prefix: locate the newest file, consult the ledger, download, parse,
//! persist, record the outcome, remove the local copy. Prefixes are handled
//! strictly in order and independently of each other.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::config::AppConfig;
use crate::error::{IngestError, IngestResult};
use crate::ledger::{IngestionLedger, LedgerEntry};
use crate::parser::RecordParser;
use crate::remote::{locate_latest, RemoteFileSystem};
use crate::store::RecordStore;

/// Prefix of the ledger message for transfer failures
pub const DOWNLOAD_FAILED: &str = "download failed";

/// Prefix of the ledger message for parse and persist failures
pub const PROCESSING_FAILED: &str = "processing failed";

/// What happened to one prefix during a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum FileOutcome {
    /// No remote file matched the prefix
    NotFound { prefix: String },
    /// The remote directory could not be listed
    LocateFailed { prefix: String, error: String },
    /// The newest file already has a `success` ledger entry
    Skipped { filename: String },
    Succeeded { filename: String, records: usize },
    Failed { filename: String, error: String },
}

/// Outcome of one run, in prefix order
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub outcomes: Vec<FileOutcome>,
    pub elapsed: Duration,
}

impl RunSummary {
    fn count(&self, pred: impl Fn(&FileOutcome) -> bool) -> usize {
        self.outcomes.iter().filter(|o| pred(o)).count()
    }

    pub fn succeeded(&self) -> usize {
        self.count(|o| matches!(o, FileOutcome::Succeeded { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, FileOutcome::Failed { .. } | FileOutcome::LocateFailed { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, FileOutcome::Skipped { .. }))
    }

    pub fn not_found(&self) -> usize {
        self.count(|o| matches!(o, FileOutcome::NotFound { .. }))
    }

    pub fn records(&self) -> usize {
        self.outcomes
            .iter()
            .map(|o| match o {
                FileOutcome::Succeeded { records, .. } => *records,
                _ => 0,
            })
            .sum()
    }
}

/// Drives a run against one open remote session
pub struct Orchestrator<'a> {
    app: &'a AppConfig,
    remote: &'a dyn RemoteFileSystem,
    ledger: &'a dyn IngestionLedger,
    store: &'a dyn RecordStore,
    parser: RecordParser,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        app: &'a AppConfig,
        remote: &'a dyn RemoteFileSystem,
        ledger: &'a dyn IngestionLedger,
        store: &'a dyn RecordStore,
    ) -> Self {
        Self {
            app,
            remote,
            ledger,
            store,
            parser: RecordParser::new(),
        }
    }

    /// Process every prefix; individual failures never abort the run
    pub async fn run(&self) -> RunSummary {
        let started = Instant::now();
        let mut summary = RunSummary::default();

        for prefix in &self.app.file_prefixes {
            let outcome = self
                .process_prefix(prefix)
                .instrument(info_span!("prefix", prefix = %prefix))
                .await;
            summary.outcomes.push(outcome);
        }

        summary.elapsed = started.elapsed();
        info!(
            processed = summary.succeeded(),
            failed = summary.failed(),
            skipped = summary.skipped(),
            not_found = summary.not_found(),
            records = summary.records(),
            "Run finished: {} files processed in {:?}",
            summary.succeeded(),
            summary.elapsed
        );
        summary
    }

    async fn process_prefix(&self, prefix: &str) -> FileOutcome {
        debug!("Looking for newest file");
        let latest = match locate_latest(self.remote, prefix).await {
            Ok(latest) => latest,
            Err(IngestError::NotFound(_)) => {
                info!("No remote file matches prefix");
                return FileOutcome::NotFound {
                    prefix: prefix.to_string(),
                };
            },
            Err(e) => {
                error!("Failed to locate newest file: {}", e);
                return FileOutcome::LocateFailed {
                    prefix: prefix.to_string(),
                    error: e.to_string(),
                };
            },
        };
        let filename = latest.name;

        // A failed lookup is not a reason to skip; the attempt is still recorded
        match self.ledger.was_processed(&filename).await {
            Ok(true) => {
                info!(filename = %filename, "Already processed, skipping");
                return FileOutcome::Skipped { filename };
            },
            Ok(false) => {},
            Err(e) => warn!(filename = %filename, "Ledger check failed, processing anyway: {}", e),
        }

        info!(
            filename = %filename,
            size = latest.size,
            modified = %latest.modified,
            "Found newest file"
        );

        let remote_path = self.remote.remote_path(&filename);
        let local_path = self.app.download_dir.join(&filename);

        if let Err(e) = self.remote.download(&remote_path, &local_path).await {
            error!(filename = %filename, "Download failed: {}", e);
            // A transfer that broke off midway leaves a partial copy
            if tokio::fs::try_exists(&local_path).await.unwrap_or(false) {
                remove_local_copy(&local_path).await;
            }
            let message = format!("{}: {}", DOWNLOAD_FAILED, e);
            self.record(LedgerEntry::failed(&filename, &message)).await;
            return FileOutcome::Failed {
                filename,
                error: message,
            };
        }

        let outcome = match self.ingest(&local_path, &filename).await {
            Ok(records) => {
                info!(filename = %filename, records, "File processed");
                self.record(LedgerEntry::success(&filename, records)).await;
                FileOutcome::Succeeded { filename, records }
            },
            Err(e) => {
                error!(filename = %filename, "Processing failed: {}", e);
                let message = format!("{}: {}", PROCESSING_FAILED, e);
                self.record(LedgerEntry::failed(&filename, &message)).await;
                FileOutcome::Failed {
                    filename,
                    error: message,
                }
            },
        };

        remove_local_copy(&local_path).await;
        outcome
    }

    /// Parse the downloaded copy and persist it in one transaction
    async fn ingest(&self, local_path: &Path, filename: &str) -> IngestResult<usize> {
        let parser = self.parser;
        let path: PathBuf = local_path.to_path_buf();
        let source_file = filename.to_string();

        let batch = tokio::task::spawn_blocking(move || parser.parse_file(&path, &source_file))
            .await
            .map_err(|e| IngestError::Io(std::io::Error::other(format!("parse task failed: {}", e))))??;

        debug!(filename, category = %batch.category(), records = batch.len(), "Persisting batch");
        self.store.persist(&batch).await
    }

    async fn record(&self, entry: LedgerEntry) {
        if let Err(e) = self.ledger.record(&entry).await {
            error!(filename = %entry.filename, status = %entry.status, "Failed to write ledger entry: {}", e);
        }
    }
}

async fn remove_local_copy(local_path: &Path) {
    match tokio::fs::remove_file(local_path).await {
        Ok(()) => debug!("Removed local copy {}", local_path.display()),
        Err(e) => warn!("Failed to remove local copy {}: {}", local_path.display(), e),
    }
}
