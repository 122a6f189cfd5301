//! Sentiment scan (06:30 ET).
//!
//! Walks the pre-market VRP snapshot from strongest ratio down and fetches
//! AI sentiment for the top candidates, strictly under the budget gate.
//! Results land in the sentiment store so the digest can read them hot.

use tracing::info;

use crate::errors::AppError;
use crate::jobs::pre_market_prep_job::{snapshot_cache_key, SnapshotEntry};
use crate::jobs::JobOutcome;
use crate::models::{Ticker, VrpTier};
use crate::services::clock::Clock;
use crate::services::job_scheduler_service::JobContext;
use crate::services::pipeline::{self, Candidate};

pub async fn run(ctx: JobContext) -> Result<JobOutcome, AppError> {
    let snapshot: Vec<SnapshotEntry> = ctx
        .cache
        .get_json(&snapshot_cache_key(ctx.clock.today_eastern()))
        .await
        .unwrap_or_default();

    if snapshot.is_empty() {
        info!("No pre-market snapshot; nothing to scan");
        return Ok(JobOutcome::default());
    }

    let mut candidates: Vec<Candidate> = snapshot
        .iter()
        .filter(|entry| entry.evaluation.vrp.tier != VrpTier::Skip)
        .filter_map(|entry| {
            Ticker::new(&entry.ticker).ok().map(|ticker| Candidate {
                ticker,
                earnings_date: entry.earnings_date,
            })
        })
        .collect();
    candidates.dedup();

    let outcome = pipeline::build_digest(&ctx, candidates).await;
    info!(
        enriched = outcome.entries.len(),
        paid_calls = outcome.paid_sentiment_calls,
        cache_hits = outcome.sentiment_cache_hits,
        "Sentiment scan complete"
    );

    Ok(JobOutcome {
        items_processed: outcome.entries.len() as i32,
        items_failed: outcome.failed_tickers.len() as i32,
        failed_tickers: outcome.failed_tickers,
        telegram_error: None,
    })
}
