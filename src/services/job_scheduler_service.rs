use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use chrono_tz::US::Eastern;
use dashmap::DashMap;
use sqlx::PgPool;
use tokio_cron_scheduler::{Job, JobScheduler};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::db::job_queries;
use crate::errors::AppError;
use crate::external::earnings_calendar::EarningsCalendarProvider;
use crate::external::options_data::OptionsDataProvider;
use crate::external::sentiment_provider::SentimentProvider;
use crate::jobs::{self, JobOutcome};
use crate::services::budget_tracker::BudgetTracker;
use crate::services::circuit_breaker::CircuitBreaker;
use crate::services::clock::{Clock, MarketCalendar};
use crate::services::hybrid_cache::HybridCache;
use crate::services::moves_store::MovesStore;
use crate::services::notifier::DigestSink;
use crate::services::rate_limiter::RateLimiter;
use crate::services::sentiment_store::SentimentStore;
use crate::settings::Settings;

/// Everything a job needs, wired once at startup and cloned per run.
#[derive(Clone)]
pub struct JobContext {
    pub pool: PgPool,
    pub settings: Arc<Settings>,
    pub clock: Arc<dyn Clock>,
    pub market_calendar: Arc<MarketCalendar>,
    pub cache: Arc<HybridCache>,
    pub moves: Arc<dyn MovesStore>,
    pub sentiment_store: Arc<dyn SentimentStore>,
    pub budget: Arc<BudgetTracker>,
    pub earnings_provider: Arc<dyn EarningsCalendarProvider>,
    pub options_provider: Arc<dyn OptionsDataProvider>,
    /// Sentiment sources in priority order; the first is the paid one.
    pub sentiment_providers: Vec<Arc<dyn SentimentProvider>>,
    pub sink: Arc<dyn DigestSink>,
    pub calendar_limiter: Arc<RateLimiter>,
    pub options_limiter: Arc<RateLimiter>,
    pub sentiment_limiter: Arc<RateLimiter>,
    pub options_breaker: Arc<CircuitBreaker>,
    pub sentiment_breaker: Arc<CircuitBreaker>,
    pub cancel: CancellationToken,
}

/// The 12 scheduled jobs with their Eastern-time cron specs
/// (sec min hour day month weekday).
const SCHEDULE: &[(&str, &str, &str)] = &[
    ("pre-market-prep", "0 30 5 * * MON-FRI", "Weekdays 05:30 ET"),
    ("sentiment-scan", "0 30 6 * * MON-FRI", "Weekdays 06:30 ET"),
    ("morning-digest", "0 30 7 * * MON-FRI", "Weekdays 07:30 ET"),
    ("market-open-refresh", "0 0 10 * * MON-FRI", "Weekdays 10:00 ET"),
    ("pre-trade-refresh", "0 30 14 * * MON-FRI", "Weekdays 14:30 ET"),
    ("after-hours-check", "0 30 16 * * MON-FRI", "Weekdays 16:30 ET"),
    ("outcome-recorder", "0 0 19 * * MON-FRI", "Weekdays 19:00 ET"),
    ("evening-summary", "0 0 20 * * MON-FRI", "Weekdays 20:00 ET"),
    ("weekly-backfill", "0 0 4 * * SAT", "Saturday 04:00 ET"),
    ("weekly-backup", "0 0 3 * * SUN", "Sunday 03:00 ET"),
    ("weekly-cleanup", "0 30 3 * * SUN", "Sunday 03:30 ET"),
    ("calendar-sync", "0 0 4 * * SUN", "Sunday 04:00 ET"),
];

/// Drain window granted to in-flight jobs on shutdown.
const SHUTDOWN_DRAIN: Duration = Duration::from_secs(30);

pub struct JobSchedulerService {
    scheduler: JobScheduler,
    context: JobContext,
    in_flight: Arc<DashMap<&'static str, ()>>,
}

impl JobSchedulerService {
    pub async fn new(context: JobContext) -> Result<Self, AppError> {
        let scheduler = JobScheduler::new()
            .await
            .map_err(|e| AppError::External(format!("Failed to create scheduler: {}", e)))?;

        Ok(Self {
            scheduler,
            context,
            in_flight: Arc::new(DashMap::new()),
        })
    }

    /// Register all jobs and start firing. Cron specs are interpreted in
    /// US-Eastern, so a 07:30 job stays at 07:30 local across DST shifts.
    pub async fn start(&mut self) -> Result<(), AppError> {
        info!("🚀 Starting job scheduler ({} jobs, US-Eastern)", SCHEDULE.len());

        for &(job_name, cron_spec, description) in SCHEDULE {
            self.schedule_job(job_name, cron_spec, description).await?;
        }

        self.scheduler
            .start()
            .await
            .map_err(|e| AppError::External(format!("Failed to start scheduler: {}", e)))?;

        info!("✅ Job scheduler started");
        Ok(())
    }

    async fn schedule_job(
        &mut self,
        job_name: &'static str,
        cron_spec: &str,
        description: &str,
    ) -> Result<(), AppError> {
        let context = self.context.clone();
        let in_flight = self.in_flight.clone();

        let job = Job::new_async_tz(cron_spec, Eastern, move |_uuid, _scheduler| {
            let context = context.clone();
            let in_flight = in_flight.clone();
            Box::pin(async move {
                execute_job(job_name, context, in_flight).await;
            })
        })
        .map_err(|e| AppError::External(format!("Failed to create job {}: {}", job_name, e)))?;

        self.scheduler
            .add(job)
            .await
            .map_err(|e| AppError::External(format!("Failed to add job {}: {}", job_name, e)))?;

        info!("📅 Scheduled: {} - {} [cron: {}]", job_name, description, cron_spec);
        Ok(())
    }

    /// Fire one job immediately, outside its schedule. Used by the admin
    /// surface; the overrun guard still applies.
    pub async fn run_now(&self, job_name: &'static str) {
        execute_job(job_name, self.context.clone(), self.in_flight.clone()).await;
    }

    /// Cancel in-flight jobs, give them a bounded drain window, then stop
    /// the scheduler.
    pub async fn stop(&mut self) -> Result<(), AppError> {
        info!("🛑 Stopping job scheduler...");
        self.context.cancel.cancel();

        let deadline = tokio::time::Instant::now() + SHUTDOWN_DRAIN;
        while !self.in_flight.is_empty() && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        if !self.in_flight.is_empty() {
            let stuck: Vec<_> = self.in_flight.iter().map(|e| *e.key()).collect();
            warn!(?stuck, "Jobs still running at end of drain window");
        }

        self.scheduler
            .shutdown()
            .await
            .map_err(|e| AppError::External(format!("Failed to stop scheduler: {}", e)))?;
        info!("✅ Job scheduler stopped");
        Ok(())
    }
}

/// Run one job with overrun protection and job_runs tracking. Per-job
/// errors are recorded, never propagated; the scheduler must outlive any
/// single bad run.
async fn execute_job(
    job_name: &'static str,
    context: JobContext,
    in_flight: Arc<DashMap<&'static str, ()>>,
) {
    // Overrun policy: skip this fire if the previous run is still going.
    if in_flight.insert(job_name, ()).is_some() {
        warn!(job = job_name, "Previous invocation still running; skipping this fire");
        if let Err(e) = job_queries::record_job_overrun(&context.pool, job_name).await {
            error!(job = job_name, error = %e, "Failed to record overrun");
        }
        return;
    }

    info!(job = job_name, "🏃 Starting job");
    let started_at = Utc::now();

    let job_id = match job_queries::record_job_start(&context.pool, job_name).await {
        Ok(id) => Some(id),
        Err(e) => {
            error!(job = job_name, error = %e, "Failed to record job start");
            None
        }
    };

    // A panicking handler is a programmer error; contain it to this run.
    let pool = context.pool.clone();
    let handle = tokio::spawn(async move { jobs::run(job_name, context).await });
    let result: Result<JobOutcome, AppError> = match handle.await {
        Ok(result) => result,
        Err(join_error) => Err(AppError::External(format!("job panicked: {}", join_error))),
    };

    let duration_ms = (Utc::now() - started_at).num_milliseconds();

    match result {
        Ok(outcome) => {
            info!(
                job = job_name,
                processed = outcome.items_processed,
                failed = outcome.items_failed,
                duration_ms,
                "✅ Job completed"
            );
            if !outcome.failed_tickers.is_empty() {
                warn!(job = job_name, failed_tickers = ?outcome.failed_tickers, "Per-ticker failures");
            }
            if let Some(telegram_error) = &outcome.telegram_error {
                warn!(job = job_name, error = %telegram_error, "Digest sink error");
            }
            if let Some(job_id) = job_id {
                if let Err(e) = job_queries::record_job_success(
                    &pool,
                    job_id,
                    outcome.items_processed,
                    outcome.items_failed,
                    duration_ms,
                )
                .await
                {
                    error!(job = job_name, error = %e, "Failed to record job success");
                }
            }
        }
        Err(e) => {
            error!(job = job_name, error = %e, duration_ms, "❌ Job failed");
            if let Some(job_id) = job_id {
                if let Err(db_err) =
                    job_queries::record_job_failure(&pool, job_id, &e.to_string(), duration_ms)
                        .await
                {
                    error!(job = job_name, error = %db_err, "Failed to record job failure");
                }
            }
        }
    }

    in_flight.remove(job_name);
}
