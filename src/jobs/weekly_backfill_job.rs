//! Weekly backfill (Saturday 04:00 ET).
//!
//! Walks recent calendar history for tracked tickers and fills any
//! historical-move rows the outcome recorder missed (vendor outages, late
//! bar publication, new tickers).

use chrono::Duration;
use tracing::{info, warn};

use crate::db::earnings_queries;
use crate::errors::AppError;
use crate::external::options_data::{DailyBar, OptionsDataProvider};
use crate::jobs::{self, JobOutcome};
use crate::models::{HistoricalMove, Ticker};
use crate::services::clock::Clock;
use crate::services::job_scheduler_service::JobContext;
use crate::services::moves_store::MovesStore;

const MAX_BACKFILL_TICKERS: usize = 60;
const BACKFILL_WINDOW_DAYS: i64 = 60;

pub async fn run(ctx: JobContext) -> Result<JobOutcome, AppError> {
    let today = ctx.clock.today_eastern();
    let window_start = today - Duration::days(BACKFILL_WINDOW_DAYS);

    let past_events =
        match earnings_queries::events_between(&ctx.pool, window_start, today - Duration::days(1))
            .await
        {
            Ok(events) => events,
            Err(e) => {
                warn!(error = %e, "Stored calendar unavailable; nothing to backfill");
                return Ok(JobOutcome::default());
            }
        };

    let tracked = jobs::filter_tracked(&ctx, past_events).await?;

    let mut outcome = JobOutcome::default();
    let mut api_calls = 0usize;
    let mut examined = 0usize;

    for event in tracked {
        if examined >= MAX_BACKFILL_TICKERS || ctx.cancel.is_cancelled() {
            break;
        }

        let recorded = ctx.moves.recorded_dates(&event.ticker).await?;
        if recorded.contains(&event.report_date) {
            continue;
        }
        examined += 1;

        tokio::select! {
            _ = ctx.cancel.cancelled() => break,
            _ = ctx.options_limiter.acquire(1) => {}
        }

        let start = event.report_date - Duration::days(7);
        let end = event.report_date + Duration::days(3);
        match ctx
            .options_provider
            .get_daily_bars(&event.ticker, start, end)
            .await
        {
            Ok(bars) => match backfill_move(&bars, &event.ticker, event.report_date) {
                Some(mv) => {
                    ctx.moves.upsert(&mv).await?;
                    outcome.items_processed += 1;
                }
                None => {
                    info!(ticker = %event.ticker, date = %event.report_date, "No usable bars for gap");
                }
            },
            Err(e) => {
                warn!(ticker = %event.ticker, error = %e, "Backfill bar fetch failed");
                outcome.items_failed += 1;
                outcome.failed_tickers.push(event.ticker.to_string());
            }
        }

        api_calls += 1;
        jobs::rate_limit_tick(api_calls).await;
    }

    info!(
        backfilled = outcome.items_processed,
        failed = outcome.items_failed,
        "Weekly backfill complete"
    );
    Ok(outcome)
}

fn backfill_move(
    bars: &[DailyBar],
    ticker: &Ticker,
    earnings_date: chrono::NaiveDate,
) -> Option<HistoricalMove> {
    let reaction = bars.iter().find(|bar| bar.date >= earnings_date)?;
    let prev = bars.iter().rev().find(|bar| bar.date < reaction.date)?;
    HistoricalMove::from_prices(
        ticker.clone(),
        earnings_date,
        prev.close,
        reaction.open,
        reaction.high,
        reaction.low,
        reaction.close,
        Some(prev.volume),
        Some(reaction.volume),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(date: &str, open: f64, high: f64, low: f64, close: f64) -> DailyBar {
        DailyBar {
            date: date.parse().unwrap(),
            open,
            high,
            low,
            close,
            volume: 500_000,
        }
    }

    #[test]
    fn test_backfill_move_spans_weekend() {
        // Friday close, Monday reaction
        let bars = vec![
            bar("2026-07-24", 99.0, 100.5, 98.0, 100.0),
            bar("2026-07-27", 104.0, 108.0, 103.0, 106.0),
        ];
        let mv = backfill_move(
            &bars,
            &Ticker::new("NVDA").unwrap(),
            "2026-07-25".parse().unwrap(),
        )
        .unwrap();
        assert!((mv.close_move_pct.unwrap() - 6.0).abs() < 1e-9);
        assert_eq!(mv.earnings_date, "2026-07-25".parse().unwrap());
    }

    #[test]
    fn test_backfill_move_needs_both_sides() {
        let bars = vec![bar("2026-07-27", 104.0, 108.0, 103.0, 106.0)];
        assert!(backfill_move(
            &bars,
            &Ticker::new("NVDA").unwrap(),
            "2026-07-25".parse().unwrap()
        )
        .is_none());
    }
}
