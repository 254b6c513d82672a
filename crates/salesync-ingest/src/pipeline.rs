//! A single run with its own connections
//!
//! Each run opens a fresh database pool (and applies pending migrations) and
//! a fresh remote session, prepares the staging directory, hands everything
//! to the [`Orchestrator`], and releases both connections afterwards whatever
//! the per-file outcomes were.

use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::config::IngestConfig;
use crate::error::{IngestError, IngestResult};
use crate::ledger::PgLedger;
use crate::orchestrator::{Orchestrator, RunSummary};
use crate::remote::{connector_for, RemoteConnector};
use crate::store::PgRecordStore;

/// Everything needed to start a run; cheap to clone into scheduled jobs
#[derive(Clone)]
pub struct IngestPipeline {
    config: Arc<IngestConfig>,
    connector: Arc<dyn RemoteConnector>,
}

impl IngestPipeline {
    pub fn new(config: Arc<IngestConfig>) -> Self {
        let connector: Arc<dyn RemoteConnector> = Arc::from(connector_for(&config.remote));
        Self { config, connector }
    }

    /// Use a specific transport instead of the configured one
    pub fn with_connector(config: Arc<IngestConfig>, connector: Arc<dyn RemoteConnector>) -> Self {
        Self { config, connector }
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    /// Execute one run
    ///
    /// Errors are only returned when the run could not start: database,
    /// migrations, remote session or staging directory.
    pub async fn run(&self) -> IngestResult<RunSummary> {
        let run_id = Uuid::new_v4();
        self.run_inner().instrument(info_span!("run", %run_id)).await
    }

    async fn run_inner(&self) -> IngestResult<RunSummary> {
        info!("Starting ingestion run");

        let pool = self.connect_database().await?;

        let remote = match self.connector.connect().await {
            Ok(remote) => remote,
            Err(e) => {
                pool.close().await;
                return Err(e);
            },
        };
        info!("Remote session established");

        let result = async {
            tokio::fs::create_dir_all(&self.config.app.download_dir).await?;

            let ledger = PgLedger::new(pool.clone());
            let store = PgRecordStore::new(pool.clone());
            let orchestrator =
                Orchestrator::new(&self.config.app, remote.as_ref(), &ledger, &store);
            Ok::<_, IngestError>(orchestrator.run().await)
        }
        .await;

        if let Err(e) = remote.close().await {
            warn!("Failed to close remote session: {}", e);
        }
        pool.close().await;
        debug!("Run connections released");

        result
    }

    async fn connect_database(&self) -> IngestResult<PgPool> {
        let db = &self.config.database;
        let pool = PgPoolOptions::new()
            .max_connections(db.max_connections)
            .acquire_timeout(self.config.connect_timeout())
            .connect(&db.url)
            .await
            .map_err(|e| IngestError::Connectivity {
                target: "database",
                message: e.to_string(),
            })?;
        info!("Database connection pool established");

        if let Err(e) = run_migrations(&pool).await {
            pool.close().await;
            return Err(e);
        }
        Ok(pool)
    }
}

/// Apply any pending schema migrations
pub async fn run_migrations(pool: &PgPool) -> IngestResult<()> {
    sqlx::migrate!("../../migrations").run(pool).await?;
    debug!("Database migrations up to date");
    Ok(())
}
