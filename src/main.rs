use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use ivcrush_backend::app;
use ivcrush_backend::db::budget_queries::PgBudgetStore;
use ivcrush_backend::db::cache_queries::PgCacheStore;
use ivcrush_backend::external::earnings_calendar::AlphaVantageCalendarClient;
use ivcrush_backend::external::options_data::TradierClient;
use ivcrush_backend::external::sentiment_provider::{PerplexityClient, SentimentProvider};
use ivcrush_backend::logging::{init_logging, LoggingConfig};
use ivcrush_backend::services::budget_tracker::BudgetTracker;
use ivcrush_backend::services::circuit_breaker::CircuitBreaker;
use ivcrush_backend::services::clock::{Clock, MarketCalendar, SystemClock};
use ivcrush_backend::services::hybrid_cache::HybridCache;
use ivcrush_backend::services::job_scheduler_service::{JobContext, JobSchedulerService};
use ivcrush_backend::services::moves_store::PgMovesStore;
use ivcrush_backend::services::notifier::{DigestSink, NoopSink, TelegramNotifier};
use ivcrush_backend::services::rate_limiter::RateLimiter;
use ivcrush_backend::services::sentiment_store::PgSentimentStore;
use ivcrush_backend::settings::Settings;
use ivcrush_backend::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::load().map_err(anyhow::Error::msg)?;
    settings.validate().map_err(anyhow::Error::msg)?;

    init_logging(LoggingConfig::from_env()).map_err(|e| anyhow::anyhow!(e.to_string()))?;

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(settings.database_url.expose())
        .await?;
    sqlx::migrate!("./migrations").run(&pool).await?;

    let settings = Arc::new(settings);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let cache = Arc::new(HybridCache::new(
        Arc::new(PgCacheStore::new(pool.clone())),
        clock.clone(),
        settings.cache.l1_max_entries,
    ));
    let budget = Arc::new(BudgetTracker::new(
        Arc::new(PgBudgetStore::new(pool.clone())),
        clock.clone(),
        settings.budget.clone(),
    ));

    // Vendor clients. Calendar and options data are mandatory; sentiment and
    // the sink degrade gracefully when unconfigured.
    let earnings_provider = Arc::new(
        AlphaVantageCalendarClient::new(&settings.vendors)
            .map_err(|e| anyhow::anyhow!("calendar vendor: {}", e))?,
    );
    let options_provider = Arc::new(
        TradierClient::new(&settings.vendors)
            .map_err(|e| anyhow::anyhow!("options vendor: {}", e))?,
    );

    let mut sentiment_providers: Vec<Arc<dyn SentimentProvider>> = Vec::new();
    match PerplexityClient::new(&settings.vendors, settings.budget.cost_per_call) {
        Ok(client) => sentiment_providers.push(Arc::new(client)),
        Err(e) => tracing::warn!(error = %e, "Paid sentiment disabled"),
    }

    let sink: Arc<dyn DigestSink> = match TelegramNotifier::new(&settings.vendors) {
        Ok(notifier) => Arc::new(notifier),
        Err(e) => {
            tracing::warn!(error = %e, "Digest sink unconfigured; messages will be dropped");
            Arc::new(NoopSink::default())
        }
    };

    let ctx = JobContext {
        pool: pool.clone(),
        settings: settings.clone(),
        clock: clock.clone(),
        market_calendar: Arc::new(MarketCalendar::default()),
        cache,
        moves: Arc::new(PgMovesStore::new(pool.clone())),
        sentiment_store: Arc::new(PgSentimentStore::new(
            pool.clone(),
            clock.clone(),
            settings.pipeline.sentiment_cache_ttl_hours,
        )),
        budget,
        earnings_provider,
        options_provider,
        sentiment_providers,
        sink,
        // Free-tier calendar quota is ~25/day; keep a slow drip
        calendar_limiter: Arc::new(RateLimiter::new("calendar", 5, 1.0 / 60.0)),
        options_limiter: Arc::new(RateLimiter::new("options", 60, 2.0)),
        sentiment_limiter: Arc::new(RateLimiter::new("sentiment", 5, 0.2)),
        options_breaker: Arc::new(CircuitBreaker::new("options", 5, 2, Duration::from_secs(60))),
        sentiment_breaker: Arc::new(CircuitBreaker::new(
            "sentiment",
            5,
            2,
            Duration::from_secs(120),
        )),
        cancel: CancellationToken::new(),
    };

    let mut scheduler = JobSchedulerService::new(ctx.clone()).await?;
    scheduler.start().await?;

    let app = app::create_app(AppState { ctx });
    let addr = SocketAddr::from(([0, 0, 0, 0], settings.server.port));
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("🚀 IV Crush backend running at http://{}/", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
        })
        .await?;

    scheduler.stop().await?;
    Ok(())
}
