//! Ingestion error types

use thiserror::Error;

use crate::models::FileCategory;

/// Result type alias for ingestion operations
pub type IngestResult<T> = std::result::Result<T, IngestError>;

/// Everything that can go wrong between the remote server and the database
///
/// Only [`IngestError::Connectivity`], [`IngestError::Migration`] and
/// [`IngestError::Io`] raised while preparing a run abort the whole run; the
/// rest are scoped to one prefix or one file and end up in the ledger.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Failed to connect to {target}: {message}")]
    Connectivity { target: &'static str, message: String },

    #[error("No remote file starts with '{0}'")]
    NotFound(String),

    #[error("Failed to list remote directory {path}: {message}")]
    Listing { path: String, message: String },

    #[error("Failed to download {path}: {message}")]
    Transfer { path: String, message: String },

    #[error("Unrecognised file category: {0}")]
    Classification(String),

    #[error("File has no header row")]
    MissingHeader,

    #[error("Header row has {found} columns, expected at least {expected}")]
    HeaderTooShort { expected: usize, found: usize },

    #[error("Row {row} has {found} columns, expected at least {expected}")]
    RowTooShort { row: usize, expected: usize, found: usize },

    #[error("Failed to read row {row}: {source}")]
    Read {
        row: usize,
        #[source]
        source: csv::Error,
    },

    #[error("Failed to persist {category} record {failed_at} ({inserted} inserted before rollback): {source}")]
    Persistence {
        category: FileCategory,
        inserted: usize,
        failed_at: usize,
        #[source]
        source: sqlx::Error,
    },

    #[error("Ledger error: {0}")]
    Ledger(#[source] sqlx::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Schedule error: {0}")]
    Schedule(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl IngestError {
    /// True for the parse-stage failures a malformed file produces
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            IngestError::Classification(_)
                | IngestError::MissingHeader
                | IngestError::HeaderTooShort { .. }
                | IngestError::RowTooShort { .. }
                | IngestError::Read { .. }
        )
    }
}
