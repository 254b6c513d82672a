//! Shared fixtures for the ingestion integration tests
//!
//! - in-memory ledger and record store with failure injection
//! - a remote wrapper that counts and optionally fails downloads
//! - writers for pipe-delimited extract files with controlled mtimes

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use salesync_ingest::config::AppConfig;
use salesync_ingest::error::{IngestError, IngestResult};
use salesync_ingest::ledger::{IngestionLedger, LedgerEntry, ProcessingStatus};
use salesync_ingest::models::ParsedBatch;
use salesync_ingest::remote::{RemoteFileDescriptor, RemoteFileSystem};
use salesync_ingest::store::RecordStore;

pub const HEADER_COLUMNS: &str =
    "DocNo|OnDate|DeliveryDate|SOCustomerId|CustomerName|Status|TerritoryCode|TotalAmount|TotalVat|Remark";

pub const ITEM_COLUMNS: &str = "DocNo|ItemId|ProductCode|SOProductId|SKUUnitTypeId|Quantity|Price|Amount|Vat|VatRate|ItemType|OrderRank|RefItemId|IONumber";

pub const SUMMARY_COLUMNS: &str = "HeaderCount|ItemCount";

pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let _ = fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,salesync_ingest=debug,sqlx=warn")),
        )
        .with_test_writer()
        .try_init();
}

pub fn app_config(download_dir: &Path, prefixes: &[&str]) -> AppConfig {
    AppConfig {
        download_dir: download_dir.to_path_buf(),
        file_prefixes: prefixes.iter().map(|p| p.to_string()).collect(),
    }
}

// ============================================================================
// Fixture files
// ============================================================================

/// Write `lines` as a file in `dir`, with its mtime `age_minutes` in the past
pub fn write_extract(dir: &Path, name: &str, lines: &[String], age_minutes: u64) -> PathBuf {
    let path = dir.join(name);
    let mut body = lines.join("\n");
    body.push('\n');
    std::fs::write(&path, body).unwrap();

    let mtime = SystemTime::now() - Duration::from_secs(age_minutes * 60);
    let file = std::fs::File::options().write(true).open(&path).unwrap();
    file.set_modified(mtime).unwrap();
    path
}

pub fn header_lines(rows: usize) -> Vec<String> {
    let mut lines = vec![HEADER_COLUMNS.to_string()];
    for i in 1..=rows {
        lines.push(format!(
            "SO-{i:04}|2024-03-05 09:00:00|06/03/2024|C{i:02}|Customer {i}|OPEN|T01|\"1,{i:03}.50\"|70.00|"
        ));
    }
    lines
}

pub fn item_lines(rows: usize) -> Vec<String> {
    let mut lines = vec![ITEM_COLUMNS.to_string()];
    for i in 1..=rows {
        lines.push(item_row(i));
    }
    lines
}

pub fn item_row(i: usize) -> String {
    format!("SO-0001|{i}|P-{i:03}|SP{i}|EA|2|50.00|100.00|7.00|7|N|{i}||IO-9")
}

pub fn summary_lines(headers: i32, items: i32) -> Vec<String> {
    vec![SUMMARY_COLUMNS.to_string(), format!("{headers}|{items}")]
}

pub fn staged_files(dir: &Path) -> Vec<String> {
    match std::fs::read_dir(dir) {
        Ok(entries) => entries
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect(),
        Err(_) => Vec::new(),
    }
}

// ============================================================================
// In-memory ledger
// ============================================================================

#[derive(Default)]
pub struct MemoryLedger {
    entries: Mutex<Vec<LedgerEntry>>,
    fail_lookups: bool,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ledger whose `was_processed` always errors
    pub fn failing_lookups() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            fail_lookups: true,
        }
    }

    pub fn seed(&self, entry: LedgerEntry) {
        self.entries.lock().unwrap().push(entry);
    }

    pub fn entries(&self) -> Vec<LedgerEntry> {
        self.entries.lock().unwrap().clone()
    }

    pub fn entries_for(&self, filename: &str) -> Vec<LedgerEntry> {
        self.entries()
            .into_iter()
            .filter(|e| e.filename == filename)
            .collect()
    }
}

#[async_trait]
impl IngestionLedger for MemoryLedger {
    async fn was_processed(&self, filename: &str) -> IngestResult<bool> {
        if self.fail_lookups {
            return Err(IngestError::Ledger(sqlx::Error::PoolTimedOut));
        }
        Ok(self
            .entries
            .lock()
            .unwrap()
            .iter()
            .any(|e| e.filename == filename && e.status == ProcessingStatus::Success))
    }

    async fn record(&self, entry: &LedgerEntry) -> IngestResult<()> {
        self.entries.lock().unwrap().push(entry.clone());
        Ok(())
    }
}

// ============================================================================
// In-memory record store
// ============================================================================

/// Keeps committed batches; can be told to fail on the Nth record of a batch
#[derive(Default)]
pub struct MemoryStore {
    committed: Mutex<Vec<ParsedBatch>>,
    fail_at_record: Option<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail on record `n` (1-based) of any batch at least that long
    pub fn failing_at(n: usize) -> Self {
        Self {
            committed: Mutex::new(Vec::new()),
            fail_at_record: Some(n),
        }
    }

    pub fn committed(&self) -> Vec<ParsedBatch> {
        self.committed.lock().unwrap().clone()
    }

    pub fn committed_records(&self) -> usize {
        self.committed().iter().map(ParsedBatch::len).sum()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn persist(&self, batch: &ParsedBatch) -> IngestResult<usize> {
        if let Some(n) = self.fail_at_record {
            if batch.len() >= n {
                // Nothing reaches `committed`, as with a rolled-back transaction
                return Err(IngestError::Persistence {
                    category: batch.category(),
                    inserted: n - 1,
                    failed_at: n,
                    source: sqlx::Error::Protocol(format!("constraint violated by record {n}")),
                });
            }
        }
        self.committed.lock().unwrap().push(batch.clone());
        Ok(batch.len())
    }
}

// ============================================================================
// Remote wrapper
// ============================================================================

/// Delegates to an inner remote, counting downloads and optionally failing them
pub struct TrackingRemote<R> {
    inner: R,
    downloads: AtomicUsize,
    fail_downloads_of: Option<String>,
}

impl<R: RemoteFileSystem + 'static> TrackingRemote<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            downloads: AtomicUsize::new(0),
            fail_downloads_of: None,
        }
    }

    /// Fail every download whose remote path contains `needle`, after a partial write
    pub fn failing_downloads_of(inner: R, needle: &str) -> Self {
        Self {
            inner,
            downloads: AtomicUsize::new(0),
            fail_downloads_of: Some(needle.to_string()),
        }
    }

    pub fn downloads(&self) -> usize {
        self.downloads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<R: RemoteFileSystem + 'static> RemoteFileSystem for TrackingRemote<R> {
    async fn list(&self) -> IngestResult<Vec<RemoteFileDescriptor>> {
        self.inner.list().await
    }

    fn remote_path(&self, filename: &str) -> String {
        self.inner.remote_path(filename)
    }

    async fn download(&self, remote_path: &str, local_path: &Path) -> IngestResult<u64> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        if let Some(needle) = &self.fail_downloads_of {
            if remote_path.contains(needle.as_str()) {
                // Break off after a partial write, as a dropped connection would
                std::fs::create_dir_all(local_path.parent().unwrap()).unwrap();
                std::fs::write(local_path, b"HeaderCount|ItemC").unwrap();
                return Err(IngestError::Transfer {
                    path: remote_path.to_string(),
                    message: "connection reset by peer".to_string(),
                });
            }
        }
        self.inner.download(remote_path, local_path).await
    }

    async fn close(&self) -> IngestResult<()> {
        self.inner.close().await
    }
}
