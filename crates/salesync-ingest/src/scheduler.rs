//! Run cadence
//!
//! One-shot mode runs the pipeline once and returns. Recurring mode registers
//! the cron expression with `tokio-cron-scheduler`, starts it, fires one run
//! immediately instead of waiting for the first tick, and stays resident until
//! the shutdown future resolves.
//!
//! Expressions are evaluated in the host's local time zone, and validated
//! with the same `croner` options the engine fires them with, so day-of-week
//! `0` is Sunday and `1` is Monday.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Local, TimeZone};
use croner::Cron;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info, warn};

use crate::config::ScheduleConfig;
use crate::error::{IngestError, IngestResult};
use crate::orchestrator::RunSummary;
use crate::pipeline::IngestPipeline;

/// Upper bound on concurrent runs when runs are allowed to overlap
const MAX_OVERLAPPING_RUNS: u32 = 64;

/// Accept classic five-field cron by prepending a seconds field
///
/// Six/seven-field expressions and `@hourly`-style shortcuts pass through.
pub fn normalize_cron_expression(expression: &str) -> String {
    let trimmed = expression.trim();
    if trimmed.starts_with('@') {
        return trimmed.to_string();
    }
    let fields: Vec<&str> = trimmed.split_whitespace().collect();
    if fields.len() == 5 {
        format!("0 {}", fields.join(" "))
    } else {
        fields.join(" ")
    }
}

/// Parse the way the cron engine does, so anything accepted here will fire
pub fn parse_schedule(expression: &str) -> IngestResult<Cron> {
    let normalized = normalize_cron_expression(expression);
    Cron::new(&normalized)
        .with_seconds_required()
        .with_dom_and_dow()
        .parse()
        .map_err(|e| IngestError::Schedule(format!("invalid cron expression '{}': {}", expression, e)))
}

/// First fire time strictly after `after`, in `after`'s time zone
pub fn next_fire_time<Tz: TimeZone>(
    expression: &str,
    after: &DateTime<Tz>,
) -> IngestResult<Option<DateTime<Tz>>> {
    Ok(parse_schedule(expression)?.find_next_occurrence(after, false).ok())
}

/// One ingestion pass, as the scheduler drives it
#[async_trait]
pub trait ScheduledRun: Send + Sync {
    async fn run(&self) -> IngestResult<RunSummary>;
}

#[async_trait]
impl ScheduledRun for IngestPipeline {
    async fn run(&self) -> IngestResult<RunSummary> {
        IngestPipeline::run(self).await
    }
}

/// Gate around runs
///
/// When exclusive, a second run attempted while one is in flight is refused
/// rather than queued. When not exclusive, runs may overlap up to a fixed cap.
/// Either way [`RunLock::wait_idle`] resolves once nothing is in flight.
#[derive(Clone)]
pub struct RunLock {
    slots: Arc<Semaphore>,
    capacity: u32,
}

/// Held for the duration of a run
pub struct RunPermit {
    _permit: OwnedSemaphorePermit,
}

impl RunLock {
    pub fn new(exclusive: bool) -> Self {
        let capacity = if exclusive { 1 } else { MAX_OVERLAPPING_RUNS };
        Self {
            slots: Arc::new(Semaphore::new(capacity as usize)),
            capacity,
        }
    }

    pub fn try_acquire(&self) -> Option<RunPermit> {
        Arc::clone(&self.slots)
            .try_acquire_owned()
            .ok()
            .map(|permit| RunPermit { _permit: permit })
    }

    /// Resolve once no run is in flight
    pub async fn wait_idle(&self) {
        // Acquire every slot and immediately release them
        let _ = self.slots.acquire_many(self.capacity).await;
    }
}

/// Drives runs on the configured cadence
pub struct IngestScheduler {
    runner: Arc<dyn ScheduledRun>,
    expression: String,
    lock: RunLock,
}

impl IngestScheduler {
    pub fn new(pipeline: IngestPipeline) -> Self {
        let schedule = pipeline.config().schedule.clone();
        Self::with_runner(Arc::new(pipeline), &schedule)
    }

    pub fn with_runner(runner: Arc<dyn ScheduledRun>, schedule: &ScheduleConfig) -> Self {
        Self {
            runner,
            expression: schedule.expression.clone(),
            lock: RunLock::new(schedule.exclusive_runs),
        }
    }

    /// Run once in the foreground
    pub async fn run_once(&self) -> IngestResult<RunSummary> {
        info!("Running a single ingestion pass");
        self.runner.run().await
    }

    /// Stay resident until `shutdown` resolves, then wait for in-flight runs
    ///
    /// Fails only if the cron expression is invalid or the engine cannot start.
    pub async fn run_recurring<F>(&self, shutdown: F) -> IngestResult<()>
    where
        F: Future<Output = ()>,
    {
        parse_schedule(&self.expression)?;
        let normalized = normalize_cron_expression(&self.expression);

        let mut engine = JobScheduler::new().await.map_err(schedule_error)?;

        let runner = Arc::clone(&self.runner);
        let lock = self.lock.clone();
        let job = Job::new_async_tz(normalized.as_str(), Local, move |_uuid, _scheduler| {
            let runner = Arc::clone(&runner);
            let lock = lock.clone();
            Box::pin(async move {
                dispatch(runner.as_ref(), &lock, "cron").await;
            })
        })
        .map_err(schedule_error)?;
        engine.add(job).await.map_err(schedule_error)?;
        engine.start().await.map_err(schedule_error)?;
        info!(schedule = %self.expression, "Cron scheduler started");

        // Don't wait for the first natural tick
        let runner = Arc::clone(&self.runner);
        let lock = self.lock.clone();
        tokio::spawn(async move {
            dispatch(runner.as_ref(), &lock, "startup").await;
        });

        match next_fire_time(&self.expression, &Local::now())? {
            Some(next) => info!("Next scheduled run at {}", next.format("%Y-%m-%d %H:%M:%S %:z")),
            None => warn!(schedule = %self.expression, "Schedule has no upcoming fire time"),
        }
        info!("Running as a background service, waiting for shutdown signal");

        shutdown.await;

        info!("Shutdown requested, stopping scheduler");
        if let Err(e) = engine.shutdown().await {
            warn!("Cron scheduler did not shut down cleanly: {}", e);
        }
        self.lock.wait_idle().await;
        info!("Scheduler stopped");
        Ok(())
    }
}

/// Run under the lock, logging rather than returning failures
async fn dispatch(runner: &dyn ScheduledRun, lock: &RunLock, trigger: &'static str) {
    let Some(_permit) = lock.try_acquire() else {
        warn!(trigger, "Previous run still in progress, skipping this tick");
        return;
    };

    match runner.run().await {
        Ok(summary) => info!(
            trigger,
            processed = summary.succeeded(),
            failed = summary.failed(),
            "Scheduled run complete"
        ),
        Err(e) => error!(trigger, "Scheduled run aborted: {}", e),
    }
}

fn schedule_error(e: tokio_cron_scheduler::JobSchedulerError) -> IngestError {
    IngestError::Schedule(e.to_string())
}
