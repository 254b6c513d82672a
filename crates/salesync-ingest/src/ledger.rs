//! Append-only processing ledger
//!
//! One row per processing attempt. A filename counts as processed once any
//! `success` row exists for it; `failed` rows are kept as an audit trail and
//! never block a later attempt.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::debug;

use crate::error::{IngestError, IngestResult};

/// Outcome of one processing attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingStatus {
    Success,
    Failed,
}

impl ProcessingStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ProcessingStatus::Success => "success",
            ProcessingStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ProcessingStatus {
    type Err = IngestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(ProcessingStatus::Success),
            "failed" => Ok(ProcessingStatus::Failed),
            other => Err(IngestError::Config(format!("Unknown ledger status: {}", other))),
        }
    }
}

/// A ledger row as stored
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEntry {
    pub filename: String,
    pub status: ProcessingStatus,
    pub record_count: i64,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    pub fn success(filename: impl Into<String>, record_count: usize) -> Self {
        Self {
            filename: filename.into(),
            status: ProcessingStatus::Success,
            record_count: i64::try_from(record_count).unwrap_or(i64::MAX),
            error_message: None,
            created_at: Utc::now(),
        }
    }

    /// Failed attempts always credit zero records
    pub fn failed(filename: impl Into<String>, error_message: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            status: ProcessingStatus::Failed,
            record_count: 0,
            error_message: Some(error_message.into()),
            created_at: Utc::now(),
        }
    }
}

/// Idempotency gate and audit log
#[async_trait]
pub trait IngestionLedger: Send + Sync {
    /// True iff a `success` entry exists for exactly this filename
    async fn was_processed(&self, filename: &str) -> IngestResult<bool>;

    /// Append one entry; prior entries are never touched
    async fn record(&self, entry: &LedgerEntry) -> IngestResult<()>;
}

/// Ledger backed by the `ledger` table
#[derive(Clone)]
pub struct PgLedger {
    pool: PgPool,
}

impl PgLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Every attempt for `filename`, oldest first
    pub async fn history(&self, filename: &str) -> IngestResult<Vec<LedgerEntry>> {
        let rows: Vec<(String, String, i64, Option<String>, DateTime<Utc>)> = sqlx::query_as(
            r#"
            SELECT filename, status, record_count, error_message, created_at
            FROM ledger
            WHERE filename = $1
            ORDER BY created_at, id
            "#,
        )
        .bind(filename)
        .fetch_all(&self.pool)
        .await
        .map_err(IngestError::Ledger)?;

        rows.into_iter()
            .map(|(filename, status, record_count, error_message, created_at)| {
                Ok(LedgerEntry {
                    filename,
                    status: status.parse()?,
                    record_count,
                    error_message,
                    created_at,
                })
            })
            .collect()
    }
}

#[async_trait]
impl IngestionLedger for PgLedger {
    async fn was_processed(&self, filename: &str) -> IngestResult<bool> {
        let processed: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM ledger WHERE filename = $1 AND status = 'success'
            )
            "#,
        )
        .bind(filename)
        .fetch_one(&self.pool)
        .await
        .map_err(IngestError::Ledger)?;

        debug!(filename, processed, "Checked ledger");
        Ok(processed)
    }

    async fn record(&self, entry: &LedgerEntry) -> IngestResult<()> {
        sqlx::query(
            r#"
            INSERT INTO ledger (filename, status, record_count, error_message, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(&entry.filename)
        .bind(entry.status.as_str())
        .bind(entry.record_count)
        .bind(&entry.error_message)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await
        .map_err(IngestError::Ledger)?;

        debug!(
            filename = %entry.filename,
            status = %entry.status,
            record_count = entry.record_count,
            "Recorded ledger entry"
        );
        Ok(())
    }
}
