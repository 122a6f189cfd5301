//! Outcome recorder (19:00 ET).
//!
//! Closes the feedback loop: for recent reporters, pull the realized daily
//! bar, write the historical move, and fill the sentiment-history outcome
//! exactly once. Prediction correctness is derived here, never hand-set.

use chrono::{Duration, NaiveDate};
use tracing::{info, warn};

use crate::errors::AppError;
use crate::external::options_data::{DailyBar, OptionsDataProvider};
use crate::jobs::{self, JobOutcome};
use crate::models::{ActualDirection, HistoricalMove, Ticker};
use crate::services::clock::Clock;
use crate::services::job_scheduler_service::JobContext;
use crate::services::moves_store::MovesStore;
use crate::services::sentiment_store::SentimentStore;

const MAX_OUTCOME_TICKERS: usize = 30;
/// How far back the job looks for reactions it has not recorded yet.
const LOOKBACK_DAYS: i64 = 7;

pub async fn run(ctx: JobContext) -> Result<JobOutcome, AppError> {
    let today = ctx.clock.today_eastern();
    let pending = ctx.sentiment_store.pending_outcomes(today).await?;

    let recent: Vec<_> = pending
        .into_iter()
        .filter(|record| today - record.earnings_date <= Duration::days(LOOKBACK_DAYS))
        .take(MAX_OUTCOME_TICKERS)
        .collect();

    if recent.is_empty() {
        info!("No pending sentiment outcomes to record");
    }

    let mut outcome = JobOutcome::default();
    let mut api_calls = 0usize;

    for record in recent {
        if ctx.cancel.is_cancelled() {
            break;
        }

        match record_one(&ctx, &record.ticker, record.earnings_date).await {
            Ok(true) => outcome.items_processed += 1,
            Ok(false) => {
                // Reaction bar not published yet; try again tomorrow
                info!(ticker = %record.ticker, date = %record.earnings_date, "Reaction bar not available yet");
            }
            Err(e) => {
                warn!(ticker = %record.ticker, error = %e, "Outcome recording failed");
                outcome.items_failed += 1;
                outcome.failed_tickers.push(record.ticker.to_string());
            }
        }

        api_calls += 1;
        jobs::rate_limit_tick(api_calls).await;
    }

    // Reporters from the last session without a sentiment row still get
    // their realized move recorded; the history table feeds future VRP.
    if let Ok(Some(events)) = jobs::fetch_earnings(
        &ctx,
        "outcome-recorder",
        crate::external::earnings_calendar::CalendarHorizon::ThreeMonth,
    )
    .await
    {
        let last_session = ctx.market_calendar.previous_trading_day(today);
        let reporters: Vec<_> = events
            .into_iter()
            .filter(|e| e.report_date == last_session)
            .collect();
        let tracked = jobs::filter_tracked(&ctx, reporters).await?;

        for event in tracked.into_iter().take(MAX_OUTCOME_TICKERS) {
            if ctx.cancel.is_cancelled() {
                break;
            }
            let already = ctx
                .moves
                .recorded_dates(&event.ticker)
                .await?
                .contains(&event.report_date);
            if already {
                continue;
            }
            match record_one(&ctx, &event.ticker, event.report_date).await {
                Ok(true) => outcome.items_processed += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!(ticker = %event.ticker, error = %e, "Move recording failed");
                    outcome.items_failed += 1;
                    outcome.failed_tickers.push(event.ticker.to_string());
                }
            }
            api_calls += 1;
            jobs::rate_limit_tick(api_calls).await;
        }
    }

    info!(
        recorded = outcome.items_processed,
        failed = outcome.items_failed,
        "Outcome recording complete"
    );
    Ok(outcome)
}

/// Record one ticker's reaction. Returns false when the bar data is not
/// available yet.
async fn record_one(
    ctx: &JobContext,
    ticker: &Ticker,
    earnings_date: NaiveDate,
) -> Result<bool, AppError> {
    tokio::select! {
        _ = ctx.cancel.cancelled() => return Ok(false),
        _ = ctx.options_limiter.acquire(1) => {}
    }

    // Window wide enough to hold the pre-earnings close and the reaction day
    let start = earnings_date - Duration::days(7);
    let end = earnings_date + Duration::days(3);
    let bars = match ctx.options_provider.get_daily_bars(ticker, start, end).await {
        Ok(bars) => bars,
        Err(e) => {
            return Err(AppError::External(format!(
                "daily bars unavailable for {}: {}",
                ticker, e
            )))
        }
    };

    let Some((prev_bar, reaction_bar)) = split_reaction(&bars, earnings_date) else {
        return Ok(false);
    };

    let Some(mv) = HistoricalMove::from_prices(
        ticker.clone(),
        earnings_date,
        prev_bar.close,
        reaction_bar.open,
        reaction_bar.high,
        reaction_bar.low,
        reaction_bar.close,
        Some(prev_bar.volume),
        Some(reaction_bar.volume),
    ) else {
        return Ok(false);
    };

    ctx.moves.upsert(&mv).await?;

    let close_move = mv.close_move_pct.unwrap_or(0.0);
    let updated = ctx
        .sentiment_store
        .record_outcome(
            ticker,
            earnings_date,
            close_move,
            ActualDirection::from_move(close_move),
            None,
        )
        .await?;

    if !updated {
        warn!(%ticker, %earnings_date, "No sentiment row matched the recorded outcome");
    }
    Ok(true)
}

/// Find the pre-earnings close bar and the reaction bar. The reaction day
/// is the first trading day on or after the earnings date with data.
fn split_reaction<'a>(
    bars: &'a [DailyBar],
    earnings_date: NaiveDate,
) -> Option<(&'a DailyBar, &'a DailyBar)> {
    let reaction = bars.iter().find(|bar| bar.date >= earnings_date)?;
    let prev = bars.iter().rev().find(|bar| bar.date < reaction.date)?;
    Some((prev, reaction))
}
