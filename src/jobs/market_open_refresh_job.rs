//! Market-open refresh (10:00 ET).
//!
//! Invalidates pre-open chain caches for today's reporters and re-primes
//! prices in one batch call, so the pre-trade window works from post-open
//! quotes.

use tracing::{info, warn};

use crate::errors::AppError;
use crate::external::earnings_calendar::CalendarHorizon;
use crate::external::options_data::OptionsDataProvider;
use crate::jobs::{self, JobOutcome};
use crate::models::Ticker;
use crate::services::clock::Clock;
use crate::services::job_scheduler_service::JobContext;

pub async fn run(ctx: JobContext) -> Result<JobOutcome, AppError> {
    if ctx
        .market_calendar
        .is_non_trading_day(ctx.clock.today_eastern())
    {
        info!("Non-trading day; skipping market-open refresh");
        return Ok(JobOutcome::default());
    }

    let events =
        match jobs::fetch_earnings(&ctx, "market-open-refresh", CalendarHorizon::ThreeMonth)
            .await?
        {
            Some(events) => events,
            None => return Ok(JobOutcome::default()),
        };

    let todays = jobs::todays_earnings(&ctx, &events);
    let tracked = jobs::filter_tracked(&ctx, todays).await?;
    if tracked.is_empty() {
        return Ok(JobOutcome::default());
    }

    // Drop stale pre-open chains so the next evaluation re-fetches
    for event in &tracked {
        let key = format!("option_chain:{}:{}", event.ticker, event.report_date);
        ctx.cache.delete(&key).await;
    }

    let tickers: Vec<Ticker> = tracked.iter().map(|e| e.ticker.clone()).collect();

    tokio::select! {
        _ = ctx.cancel.cancelled() => return Ok(JobOutcome::default()),
        _ = ctx.options_limiter.acquire(1) => {}
    }

    let refreshed = match ctx.options_provider.get_stock_prices_batch(&tickers).await {
        Ok(prices) => {
            let ttl = chrono::Duration::seconds(ctx.settings.cache.stock_price_ttl_secs);
            let writes = prices.iter().map(|(ticker, price)| {
                let key = format!("stock_price:{}", ticker);
                let cache = &ctx.cache;
                async move { cache.set_json(&key, price, ttl).await }
            });
            futures::future::join_all(writes).await;
            prices.len()
        }
        Err(e) => {
            warn!(error = %e, "Batch price refresh failed");
            0
        }
    };

    info!(refreshed, "Market-open refresh complete");
    Ok(JobOutcome::processed(refreshed as i32))
}
