//! Pre-market prep (05:30 ET).
//!
//! Builds the VRP snapshot for tickers reporting today and over the next
//! three days, so later jobs start from cached evaluations instead of cold
//! vendor calls.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::errors::AppError;
use crate::external::earnings_calendar::CalendarHorizon;
use crate::jobs::{self, JobOutcome};
use crate::services::clock::Clock;
use crate::services::job_scheduler_service::JobContext;
use crate::services::pipeline::{self, VrpEvaluation};

const MAX_PRE_MARKET_TICKERS: usize = 30;
const UPCOMING_DAYS: i64 = 4;

/// One snapshot row cached for the rest of the trading day.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotEntry {
    pub ticker: String,
    pub earnings_date: chrono::NaiveDate,
    pub evaluation: VrpEvaluation,
}

pub fn snapshot_cache_key(date: chrono::NaiveDate) -> String {
    format!("vrp_snapshot:{}", date)
}

pub async fn run(ctx: JobContext) -> Result<JobOutcome, AppError> {
    let events = match jobs::fetch_earnings(&ctx, "pre-market-prep", CalendarHorizon::ThreeMonth)
        .await?
    {
        Some(events) => events,
        None => return Ok(JobOutcome::default()),
    };

    let (upcoming, target_dates) = jobs::upcoming_earnings(&ctx, &events, UPCOMING_DAYS);
    let tracked = jobs::filter_tracked(&ctx, upcoming).await?;
    info!(
        candidates = tracked.len(),
        ?target_dates,
        "Pre-market prep evaluating upcoming reporters"
    );

    let mut snapshot = Vec::new();
    let mut outcome = JobOutcome::default();
    let mut api_calls = 0usize;

    for event in tracked.into_iter().take(MAX_PRE_MARKET_TICKERS) {
        if ctx.cancel.is_cancelled() {
            break;
        }

        match pipeline::evaluate_vrp(&ctx, &event.ticker, event.report_date).await {
            Ok(Some(evaluation)) => {
                // Feed today's ATM IV into the rank history while we have it
                if let Some(iv) = evaluation.atm_iv {
                    if let Err(e) = crate::db::iv_log_queries::record_iv(
                        &ctx.pool,
                        &event.ticker,
                        ctx.clock.today_eastern(),
                        iv,
                    )
                    .await
                    {
                        warn!(ticker = %event.ticker, error = %e, "Failed to record IV observation");
                    }
                }

                snapshot.push(SnapshotEntry {
                    ticker: event.ticker.to_string(),
                    earnings_date: event.report_date,
                    evaluation,
                });
                outcome.items_processed += 1;
            }
            Ok(None) => {}
            Err(e) => {
                warn!(ticker = %event.ticker, error = %e, "Pre-market evaluation failed");
                outcome.items_failed += 1;
                outcome.failed_tickers.push(event.ticker.to_string());
            }
        }

        api_calls += 2;
        jobs::rate_limit_tick(api_calls).await;
    }

    ctx.cache
        .set_json(
            &snapshot_cache_key(ctx.clock.today_eastern()),
            &snapshot,
            chrono::Duration::hours(18),
        )
        .await;

    info!(snapshot_size = snapshot.len(), "Pre-market snapshot cached");
    Ok(outcome)
}
