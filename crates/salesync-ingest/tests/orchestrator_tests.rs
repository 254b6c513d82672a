//! Orchestrator behaviour against a local remote directory and in-memory fakes

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use common::*;
use salesync_ingest::ledger::{LedgerEntry, ProcessingStatus};
use salesync_ingest::models::ParsedBatch;
use salesync_ingest::orchestrator::{FileOutcome, Orchestrator, DOWNLOAD_FAILED, PROCESSING_FAILED};
use salesync_ingest::remote::LocalDirRemote;

const PREFIXES: [&str; 3] = ["saleorder_summary_", "saleorder_item_", "saleorder_header_"];

struct Fixture {
    remote_dir: tempfile::TempDir,
    staging_dir: tempfile::TempDir,
}

impl Fixture {
    fn new() -> Self {
        init_tracing();
        Self {
            remote_dir: tempfile::tempdir().unwrap(),
            staging_dir: tempfile::tempdir().unwrap(),
        }
    }

    fn remote_path(&self) -> &std::path::Path {
        self.remote_dir.path()
    }

    fn staging(&self) -> std::path::PathBuf {
        self.staging_dir.path().join("downloaded_files")
    }

    async fn remote(&self) -> TrackingRemote<LocalDirRemote> {
        TrackingRemote::new(LocalDirRemote::open(self.remote_path()).await.unwrap())
    }
}

#[tokio::test]
async fn test_processes_newest_file_for_every_prefix() {
    let fx = Fixture::new();
    write_extract(fx.remote_path(), "saleorder_summary_20240301_0800.txt", &summary_lines(1, 1), 30);
    write_extract(fx.remote_path(), "saleorder_summary_20240301_0830.txt", &summary_lines(2, 3), 10);
    write_extract(fx.remote_path(), "saleorder_item_20240301_0830.txt", &item_lines(3), 10);
    write_extract(fx.remote_path(), "saleorder_header_20240301_0830.txt", &header_lines(2), 10);

    let app = app_config(&fx.staging(), &PREFIXES);
    let remote = fx.remote().await;
    let ledger = MemoryLedger::new();
    let store = MemoryStore::new();

    let summary = Orchestrator::new(&app, &remote, &ledger, &store).run().await;

    assert_eq!(
        summary.outcomes,
        vec![
            FileOutcome::Succeeded {
                filename: "saleorder_summary_20240301_0830.txt".to_string(),
                records: 1,
            },
            FileOutcome::Succeeded {
                filename: "saleorder_item_20240301_0830.txt".to_string(),
                records: 3,
            },
            FileOutcome::Succeeded {
                filename: "saleorder_header_20240301_0830.txt".to_string(),
                records: 2,
            },
        ]
    );
    assert_eq!(summary.records(), 6);

    let committed = store.committed();
    let ParsedBatch::Summaries(summaries) = &committed[0] else {
        panic!("first batch should be summaries");
    };
    assert_eq!(summaries[0].header_count, 2);
    assert_eq!(summaries[0].source_file, "saleorder_summary_20240301_0830.txt");

    let entries = ledger.entries();
    assert_eq!(entries.len(), 3);
    assert!(entries.iter().all(|e| e.status == ProcessingStatus::Success));
    assert_eq!(ledger.entries_for("saleorder_item_20240301_0830.txt")[0].record_count, 3);

    assert!(staged_files(&fx.staging()).is_empty(), "local copies must be removed");
}

#[tokio::test]
async fn test_already_processed_file_is_skipped_without_download() {
    let fx = Fixture::new();
    write_extract(fx.remote_path(), "saleorder_summary_20240301.txt", &summary_lines(1, 2), 5);

    let app = app_config(&fx.staging(), &["saleorder_summary_"]);
    let remote = fx.remote().await;
    let ledger = MemoryLedger::new();
    ledger.seed(LedgerEntry::success("saleorder_summary_20240301.txt", 1));
    let store = MemoryStore::new();

    let summary = Orchestrator::new(&app, &remote, &ledger, &store).run().await;

    assert_eq!(
        summary.outcomes,
        vec![FileOutcome::Skipped {
            filename: "saleorder_summary_20240301.txt".to_string()
        }]
    );
    assert_eq!(remote.downloads(), 0);
    assert_eq!(store.committed_records(), 0);
    assert_eq!(ledger.entries().len(), 1, "a skip writes no ledger entry");
}

#[tokio::test]
async fn test_earlier_failure_does_not_block_retry() {
    let fx = Fixture::new();
    write_extract(fx.remote_path(), "saleorder_summary_20240301.txt", &summary_lines(4, 8), 5);

    let app = app_config(&fx.staging(), &["saleorder_summary_"]);
    let remote = fx.remote().await;
    let ledger = MemoryLedger::new();
    ledger.seed(LedgerEntry::failed("saleorder_summary_20240301.txt", "download failed: timeout"));
    let store = MemoryStore::new();

    let summary = Orchestrator::new(&app, &remote, &ledger, &store).run().await;

    assert_eq!(summary.succeeded(), 1);
    let history = ledger.entries_for("saleorder_summary_20240301.txt");
    let statuses: Vec<ProcessingStatus> = history.iter().map(|e| e.status).collect();
    assert_eq!(statuses, vec![ProcessingStatus::Failed, ProcessingStatus::Success]);
}

#[tokio::test]
async fn test_short_item_row_fails_whole_file() {
    let fx = Fixture::new();
    let mut lines = item_lines(6);
    // Row 5 keeps only its first 12 columns
    lines[5] = item_row(5).split('|').take(12).collect::<Vec<_>>().join("|");
    write_extract(fx.remote_path(), "saleorder_item_20240301.txt", &lines, 5);

    let app = app_config(&fx.staging(), &["saleorder_item_"]);
    let remote = fx.remote().await;
    let ledger = MemoryLedger::new();
    let store = MemoryStore::new();

    let summary = Orchestrator::new(&app, &remote, &ledger, &store).run().await;

    assert_eq!(summary.failed(), 1);
    assert_eq!(store.committed_records(), 0);

    let entries = ledger.entries_for("saleorder_item_20240301.txt");
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].status, ProcessingStatus::Failed);
    assert_eq!(entries[0].record_count, 0);
    let message = entries[0].error_message.as_deref().unwrap();
    assert!(message.starts_with(PROCESSING_FAILED), "{message}");
    assert!(message.contains("Row 5 has 12 columns"), "{message}");

    assert!(staged_files(&fx.staging()).is_empty());
}

#[tokio::test]
async fn test_persistence_failure_commits_nothing() {
    let fx = Fixture::new();
    write_extract(fx.remote_path(), "saleorder_item_20240301.txt", &item_lines(5), 5);

    let app = app_config(&fx.staging(), &["saleorder_item_"]);
    let remote = fx.remote().await;
    let ledger = MemoryLedger::new();
    let store = MemoryStore::failing_at(3);

    let summary = Orchestrator::new(&app, &remote, &ledger, &store).run().await;

    assert_eq!(store.committed_records(), 0);
    let FileOutcome::Failed { error, .. } = &summary.outcomes[0] else {
        panic!("expected failure, got {:?}", summary.outcomes[0]);
    };
    assert!(error.contains("record 3"), "{error}");

    let entries = ledger.entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].record_count, 0);
    assert!(staged_files(&fx.staging()).is_empty());
}

#[tokio::test]
async fn test_download_failure_is_recorded_and_run_continues() {
    let fx = Fixture::new();
    write_extract(fx.remote_path(), "saleorder_summary_20240301.txt", &summary_lines(1, 1), 5);
    write_extract(fx.remote_path(), "saleorder_header_20240301.txt", &header_lines(1), 5);

    let app = app_config(&fx.staging(), &["saleorder_summary_", "saleorder_header_"]);
    let remote = TrackingRemote::failing_downloads_of(
        LocalDirRemote::open(fx.remote_path()).await.unwrap(),
        "saleorder_summary_",
    );
    let ledger = MemoryLedger::new();
    let store = MemoryStore::new();

    let summary = Orchestrator::new(&app, &remote, &ledger, &store).run().await;

    assert_eq!(summary.failed(), 1);
    assert_eq!(summary.succeeded(), 1);

    let failed = ledger.entries_for("saleorder_summary_20240301.txt");
    assert_eq!(failed.len(), 1);
    let message = failed[0].error_message.as_deref().unwrap();
    assert!(message.starts_with(DOWNLOAD_FAILED), "{message}");
    assert!(message.contains("connection reset by peer"), "{message}");
    assert!(staged_files(&fx.staging()).is_empty(), "partial copy must be removed");
}

#[tokio::test]
async fn test_missing_prefix_does_not_block_later_prefixes() {
    let fx = Fixture::new();
    write_extract(fx.remote_path(), "saleorder_header_20240301.txt", &header_lines(3), 5);

    let app = app_config(&fx.staging(), &PREFIXES);
    let remote = fx.remote().await;
    let ledger = MemoryLedger::new();
    let store = MemoryStore::new();

    let summary = Orchestrator::new(&app, &remote, &ledger, &store).run().await;

    assert_eq!(summary.not_found(), 2);
    assert_eq!(summary.succeeded(), 1);
    assert_eq!(store.committed_records(), 3);
    assert_eq!(ledger.entries().len(), 1, "not-found prefixes leave no ledger entry");
}

#[tokio::test]
async fn test_ledger_lookup_failure_still_processes() {
    let fx = Fixture::new();
    write_extract(fx.remote_path(), "saleorder_summary_20240301.txt", &summary_lines(1, 1), 5);

    let app = app_config(&fx.staging(), &["saleorder_summary_"]);
    let remote = fx.remote().await;
    let ledger = MemoryLedger::failing_lookups();
    let store = MemoryStore::new();

    let summary = Orchestrator::new(&app, &remote, &ledger, &store).run().await;

    assert_eq!(summary.succeeded(), 1);
    assert_eq!(ledger.entries().len(), 1);
}

#[tokio::test]
async fn test_unrecognised_category_fails_and_cleans_up() {
    let fx = Fixture::new();
    write_extract(fx.remote_path(), "saleorder_lines_20240301.txt", &summary_lines(1, 1), 5);

    let app = app_config(&fx.staging(), &["saleorder_lines_"]);
    let remote = fx.remote().await;
    let ledger = MemoryLedger::new();
    let store = MemoryStore::new();

    let summary = Orchestrator::new(&app, &remote, &ledger, &store).run().await;

    assert_eq!(summary.failed(), 1);
    assert_eq!(remote.downloads(), 1);
    let entries = ledger.entries_for("saleorder_lines_20240301.txt");
    assert!(entries[0]
        .error_message
        .as_deref()
        .unwrap()
        .contains("Unrecognised file category"));
    assert!(staged_files(&fx.staging()).is_empty());
}
