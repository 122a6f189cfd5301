//! The scheduled jobs and their shared pipeline fragments.
//!
//! Every job follows the same failure policy: a per-ticker problem is
//! logged and collected into `failed_tickers`, a job-level problem becomes
//! an error outcome, and nothing escapes past the runner.

pub mod after_hours_check_job;
pub mod calendar_sync_job;
pub mod evening_summary_job;
pub mod market_open_refresh_job;
pub mod morning_digest_job;
pub mod outcome_recorder_job;
pub mod pre_market_prep_job;
pub mod pre_trade_refresh_job;
pub mod sentiment_scan_job;
pub mod weekly_backfill_job;
pub mod weekly_backup_job;
pub mod weekly_cleanup_job;

use chrono::{Duration, NaiveDate};

use crate::errors::AppError;
use crate::external::earnings_calendar::{CalendarHorizon, EarningsCalendarProvider};
use crate::models::EarningsEvent;
use crate::services::clock::Clock;
use crate::services::job_scheduler_service::JobContext;
use crate::services::moves_store::MovesStore;

/// Sleep inserted every N vendor calls, on top of the token buckets.
pub const RATE_LIMIT_BATCH_SIZE: usize = 5;
pub const RATE_LIMIT_DELAY_MS: u64 = 500;

/// Result surfaced from a job run into logs and the job_runs table.
#[derive(Debug, Default)]
pub struct JobOutcome {
    pub items_processed: i32,
    pub items_failed: i32,
    pub failed_tickers: Vec<String>,
    pub telegram_error: Option<String>,
}

impl JobOutcome {
    pub fn processed(items_processed: i32) -> Self {
        Self {
            items_processed,
            ..Default::default()
        }
    }
}

/// Dispatch a job by name. Unknown names are a validation error, not a panic.
pub async fn run(job_name: &str, ctx: JobContext) -> Result<JobOutcome, AppError> {
    match job_name {
        "pre-market-prep" => pre_market_prep_job::run(ctx).await,
        "sentiment-scan" => sentiment_scan_job::run(ctx).await,
        "morning-digest" => morning_digest_job::run(ctx).await,
        "market-open-refresh" => market_open_refresh_job::run(ctx).await,
        "pre-trade-refresh" => pre_trade_refresh_job::run(ctx).await,
        "after-hours-check" => after_hours_check_job::run(ctx).await,
        "outcome-recorder" => outcome_recorder_job::run(ctx).await,
        "evening-summary" => evening_summary_job::run(ctx).await,
        "weekly-backfill" => weekly_backfill_job::run(ctx).await,
        "weekly-backup" => weekly_backup_job::run(ctx).await,
        "weekly-cleanup" => weekly_cleanup_job::run(ctx).await,
        "calendar-sync" => calendar_sync_job::run(ctx).await,
        other => Err(AppError::Validation(format!("Unknown job: {}", other))),
    }
}

/// Fetch the earnings calendar through the cache, falling back to the
/// stored table when the vendor is down, and to `None` when the response is
/// genuinely empty. Absence means "skip this run", never "fail the job".
pub async fn fetch_earnings(
    ctx: &JobContext,
    job_name: &str,
    horizon: CalendarHorizon,
) -> Result<Option<Vec<EarningsEvent>>, AppError> {
    let cache_key = format!("earnings_calendar:{}", horizon.as_str());

    if let Some(events) = ctx.cache.get_json::<Vec<EarningsEvent>>(&cache_key).await {
        return Ok(Some(events));
    }

    tokio::select! {
        _ = ctx.cancel.cancelled() => return Ok(None),
        _ = ctx.calendar_limiter.acquire(1) => {}
    }

    match ctx.earnings_provider.get_earnings_calendar(horizon).await {
        Ok(events) if events.is_empty() => {
            tracing::warn!(job = job_name, "Empty earnings calendar from vendor");
            Ok(None)
        }
        Ok(events) => {
            ctx.cache
                .set_json(
                    &cache_key,
                    &events,
                    Duration::hours(ctx.settings.cache.calendar_ttl_hours),
                )
                .await;
            for event in &events {
                if let Err(e) = crate::db::earnings_queries::upsert_event(&ctx.pool, event).await {
                    tracing::warn!(ticker = %event.ticker, error = %e, "Failed to persist calendar event");
                }
            }
            Ok(Some(events))
        }
        Err(e) => {
            // Stale-on-error: the stored calendar beats nothing at all.
            tracing::warn!(job = job_name, error = %e, "Calendar vendor unavailable; trying stored calendar");
            let today = ctx.clock.today_eastern();
            let horizon_days = match horizon {
                CalendarHorizon::ThreeMonth => 92,
                CalendarHorizon::SixMonth => 183,
                CalendarHorizon::TwelveMonth => 366,
            };
            match crate::db::earnings_queries::events_between(
                &ctx.pool,
                today,
                today + Duration::days(horizon_days),
            )
            .await
            {
                Ok(stored) if !stored.is_empty() => Ok(Some(stored)),
                Ok(_) => Ok(None),
                Err(db_err) => {
                    tracing::error!(job = job_name, error = %db_err, "Stored calendar also unavailable");
                    Ok(None)
                }
            }
        }
    }
}

/// Restrict events to today + the next `days - 1` dates in Eastern.
pub fn upcoming_earnings(
    ctx: &JobContext,
    events: &[EarningsEvent],
    days: i64,
) -> (Vec<EarningsEvent>, Vec<NaiveDate>) {
    let today = ctx.clock.today_eastern();
    let target_dates: Vec<NaiveDate> = (0..days).map(|i| today + Duration::days(i)).collect();

    let upcoming = events
        .iter()
        .filter(|e| target_dates.contains(&e.report_date))
        .cloned()
        .collect();
    (upcoming, target_dates)
}

/// Events reporting today (Eastern). DMH announcements stay included until
/// explicit timing filters exist.
pub fn todays_earnings(ctx: &JobContext, events: &[EarningsEvent]) -> Vec<EarningsEvent> {
    let today = ctx.clock.today_eastern();
    events
        .iter()
        .filter(|e| e.report_date == today)
        .cloned()
        .collect()
}

/// Intersect with the tracked universe. History is the only reliable
/// analyzability signal, so everything else is filtered out here.
pub async fn filter_tracked(
    ctx: &JobContext,
    events: Vec<EarningsEvent>,
) -> Result<Vec<EarningsEvent>, AppError> {
    let tracked = ctx.moves.tracked_universe().await?;
    Ok(events
        .into_iter()
        .filter(|e| tracked.contains(&e.ticker))
        .collect())
}

/// Belt-and-suspenders delay over the token buckets: a short sleep every
/// batch of vendor calls.
pub async fn rate_limit_tick(api_calls: usize) {
    if api_calls > 0 && api_calls % RATE_LIMIT_BATCH_SIZE == 0 {
        tokio::time::sleep(std::time::Duration::from_millis(RATE_LIMIT_DELAY_MS)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Ticker;
    use crate::test_support::harness;
    use std::sync::atomic::Ordering;

    fn event(ticker: &str, date: &str) -> EarningsEvent {
        EarningsEvent::new(Ticker::new(ticker).unwrap(), date.parse().unwrap())
    }

    #[tokio::test]
    async fn test_unknown_job_is_validation_error() {
        let h = harness(vec![]);
        let result = run("no-such-job", h.ctx.clone()).await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_upcoming_earnings_window() {
        let h = harness(vec![]);
        // Harness clock: 2026-08-03 Eastern
        let events = vec![
            event("AAA", "2026-08-03"),
            event("BBB", "2026-08-05"),
            event("CCC", "2026-08-06"),
            event("DDD", "2026-08-10"),
        ];
        let (upcoming, dates) = upcoming_earnings(&h.ctx, &events, 4);
        assert_eq!(dates.len(), 4);
        let tickers: Vec<&str> = upcoming.iter().map(|e| e.ticker.as_str()).collect();
        assert_eq!(tickers, vec!["AAA", "BBB", "CCC"]);
    }

    #[tokio::test]
    async fn test_filter_tracked_drops_unknown_symbols() {
        let h = harness(vec![]);
        h.moves.seed("AAPL", &[4.0, 5.0, 6.0, 5.0]);
        h.moves.seed("MSFT", &[3.0, 4.0, 5.0, 4.0]);

        let events = vec![
            event("AAPL", "2026-08-04"),
            event("ZZZZ", "2026-08-04"),
            event("MSFT", "2026-08-04"),
        ];
        let tracked = filter_tracked(&h.ctx, events).await.unwrap();
        let tickers: Vec<&str> = tracked.iter().map(|e| e.ticker.as_str()).collect();
        assert_eq!(tickers, vec!["AAPL", "MSFT"]);
    }

    #[tokio::test]
    async fn test_fetch_earnings_caches_vendor_response() {
        let h = harness(vec![]);
        h.earnings.events.lock().push(event("AAPL", "2026-08-04"));

        let first = fetch_earnings(&h.ctx, "test", CalendarHorizon::ThreeMonth)
            .await
            .unwrap();
        assert_eq!(first.unwrap().len(), 1);
        assert_eq!(h.earnings.calls.load(Ordering::SeqCst), 1);

        // Second read comes from cache, not the vendor
        let second = fetch_earnings(&h.ctx, "test", CalendarHorizon::ThreeMonth)
            .await
            .unwrap();
        assert_eq!(second.unwrap().len(), 1);
        assert_eq!(h.earnings.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_fetch_earnings_empty_is_absence_not_error() {
        let h = harness(vec![]);
        let result = fetch_earnings(&h.ctx, "test", CalendarHorizon::ThreeMonth)
            .await
            .unwrap();
        assert!(result.is_none());
    }
}
