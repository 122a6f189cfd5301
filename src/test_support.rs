//! Shared fakes for unit tests: in-memory stores, canned vendors, and a
//! fully wired JobContext that never touches the network or the database.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone, Utc};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::external::earnings_calendar::{CalendarHorizon, EarningsCalendarProvider};
use crate::external::options_data::{DailyBar, OptionsDataProvider};
use crate::external::sentiment_provider::{SentimentAnalysis, SentimentProvider};
use crate::external::VendorError;
use crate::models::{
    EarningsEvent, OptionChain, OptionQuote, OptionType, SentimentDirection, SentimentSource,
    Ticker,
};
use crate::services::budget_tracker::test_support::InMemoryBudgetStore;
use crate::services::budget_tracker::BudgetTracker;
use crate::services::circuit_breaker::CircuitBreaker;
use crate::services::clock::{Clock, FixedClock, MarketCalendar};
use crate::services::hybrid_cache::{HybridCache, InMemoryCacheStore};
use crate::services::job_scheduler_service::JobContext;
use crate::services::moves_store::test_support::InMemoryMovesStore;
use crate::services::moves_store::MovesStore;
use crate::services::notifier::NoopSink;
use crate::services::rate_limiter::RateLimiter;
use crate::services::sentiment_store::test_support::InMemorySentimentStore;
use crate::services::sentiment_store::SentimentStore;
use crate::settings::{BudgetSettings, Secret, Settings};

pub struct FakeEarningsProvider {
    pub events: Mutex<Vec<EarningsEvent>>,
    pub fail: AtomicBool,
    pub calls: AtomicUsize,
}

impl FakeEarningsProvider {
    pub fn with_events(events: Vec<EarningsEvent>) -> Self {
        Self {
            events: Mutex::new(events),
            fail: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl EarningsCalendarProvider for FakeEarningsProvider {
    async fn get_earnings_calendar(
        &self,
        _horizon: CalendarHorizon,
    ) -> Result<Vec<EarningsEvent>, VendorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(VendorError::external("calendar vendor down"));
        }
        Ok(self.events.lock().clone())
    }
}

pub struct FakeOptionsProvider {
    pub chains: Mutex<HashMap<Ticker, OptionChain>>,
    pub bars: Mutex<HashMap<Ticker, Vec<DailyBar>>>,
    pub fail_all: AtomicBool,
    pub chain_calls: AtomicUsize,
}

impl Default for FakeOptionsProvider {
    fn default() -> Self {
        Self {
            chains: Mutex::new(HashMap::new()),
            bars: Mutex::new(HashMap::new()),
            fail_all: AtomicBool::new(false),
            chain_calls: AtomicUsize::new(0),
        }
    }
}

impl FakeOptionsProvider {
    /// Seed a chain whose ATM straddle prices `implied_move_pct`.
    pub fn seed_chain(&self, ticker: &str, underlying: f64, implied_move_pct: f64) {
        let ticker = Ticker::new(ticker).unwrap();
        let leg_mid = underlying * implied_move_pct / 100.0 / 2.0;
        let quote = |option_type| OptionQuote {
            strike: underlying,
            option_type,
            bid: Some(leg_mid - 0.05),
            ask: Some(leg_mid + 0.05),
            open_interest: 1200,
            volume: 300,
            implied_volatility: Some(55.0),
        };
        let chain = OptionChain {
            ticker: ticker.clone(),
            expiration: "2026-08-21".parse().unwrap(),
            underlying_price: underlying,
            quotes: vec![quote(OptionType::Call), quote(OptionType::Put)],
        };
        self.chains.lock().insert(ticker, chain);
    }

    pub fn seed_bars(&self, ticker: &str, bars: Vec<DailyBar>) {
        self.bars.lock().insert(Ticker::new(ticker).unwrap(), bars);
    }
}

#[async_trait]
impl OptionsDataProvider for FakeOptionsProvider {
    async fn get_stock_price(&self, ticker: &Ticker) -> Result<f64, VendorError> {
        if self.fail_all.load(Ordering::SeqCst) {
            return Err(VendorError::external("options vendor down"));
        }
        self.chains
            .lock()
            .get(ticker)
            .map(|c| c.underlying_price)
            .ok_or_else(|| VendorError::no_data("no quote"))
    }

    async fn get_stock_prices_batch(
        &self,
        tickers: &[Ticker],
    ) -> Result<HashMap<Ticker, f64>, VendorError> {
        if self.fail_all.load(Ordering::SeqCst) {
            return Err(VendorError::external("options vendor down"));
        }
        let chains = self.chains.lock();
        Ok(tickers
            .iter()
            .filter_map(|t| chains.get(t).map(|c| (t.clone(), c.underlying_price)))
            .collect())
    }

    async fn get_expirations(&self, ticker: &Ticker) -> Result<Vec<NaiveDate>, VendorError> {
        if self.fail_all.load(Ordering::SeqCst) {
            return Err(VendorError::external("options vendor down"));
        }
        self.chains
            .lock()
            .get(ticker)
            .map(|c| vec![c.expiration])
            .ok_or_else(|| VendorError::no_data("no expirations"))
    }

    async fn get_option_chain(
        &self,
        ticker: &Ticker,
        _expiration: NaiveDate,
    ) -> Result<OptionChain, VendorError> {
        self.chain_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_all.load(Ordering::SeqCst) {
            return Err(VendorError::external("options vendor down"));
        }
        self.chains
            .lock()
            .get(ticker)
            .cloned()
            .ok_or_else(|| VendorError::no_data("no chain"))
    }

    async fn get_daily_bars(
        &self,
        ticker: &Ticker,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailyBar>, VendorError> {
        if self.fail_all.load(Ordering::SeqCst) {
            return Err(VendorError::external("options vendor down"));
        }
        Ok(self
            .bars
            .lock()
            .get(ticker)
            .map(|bars| {
                bars.iter()
                    .filter(|b| b.date >= start && b.date <= end)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

pub struct FakeSentimentProvider {
    pub source: SentimentSource,
    pub cost: f64,
    pub score: f64,
    pub direction: SentimentDirection,
    pub calls: AtomicUsize,
    pub fail: AtomicBool,
}

impl FakeSentimentProvider {
    pub fn paid(score: f64, direction: SentimentDirection) -> Self {
        Self {
            source: SentimentSource::PaidAi,
            cost: 0.01,
            score,
            direction,
            calls: AtomicUsize::new(0),
            fail: AtomicBool::new(false),
        }
    }

    pub fn web_search(score: f64, direction: SentimentDirection) -> Self {
        Self {
            source: SentimentSource::WebSearch,
            cost: 0.0,
            score,
            direction,
            calls: AtomicUsize::new(0),
            fail: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl SentimentProvider for FakeSentimentProvider {
    fn source(&self) -> SentimentSource {
        self.source
    }

    fn cost_per_call(&self) -> f64 {
        self.cost
    }

    async fn fetch(
        &self,
        _ticker: &Ticker,
        _earnings_date: NaiveDate,
    ) -> Result<SentimentAnalysis, VendorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(VendorError::external("sentiment vendor down"));
        }
        Ok(SentimentAnalysis {
            direction: self.direction,
            score: self.score,
            catalysts: "catalyst".to_string(),
            risks: "risk".to_string(),
            raw_text: format!("Direction: {}\nScore: {}", self.direction.as_str(), self.score),
        })
    }
}

pub struct TestHarness {
    pub ctx: JobContext,
    pub clock: Arc<FixedClock>,
    pub moves: Arc<InMemoryMovesStore>,
    pub sentiment_store: Arc<InMemorySentimentStore>,
    pub budget_store: Arc<InMemoryBudgetStore>,
    pub earnings: Arc<FakeEarningsProvider>,
    pub options: Arc<FakeOptionsProvider>,
    pub sink: Arc<NoopSink>,
}

/// Build a JobContext over in-memory components. The pool is lazy and is
/// never touched as long as tests stick to the trait-backed stores.
pub fn harness(sentiment_providers: Vec<Arc<dyn SentimentProvider>>) -> TestHarness {
    let mut settings = Settings::default();
    settings.database_url = Secret::new("postgres://localhost/unused");
    settings.budget = BudgetSettings {
        daily_call_ceiling: 40,
        monthly_cost_ceiling: 5.0,
        cost_per_call: 0.01,
    };

    let clock = Arc::new(FixedClock::at(
        Utc.with_ymd_and_hms(2026, 8, 3, 13, 0, 0).unwrap(),
    ));
    let moves = Arc::new(InMemoryMovesStore::default());
    let sentiment_store = Arc::new(InMemorySentimentStore::new(clock.clone(), 3));
    let budget_store = Arc::new(InMemoryBudgetStore::default());
    let earnings = Arc::new(FakeEarningsProvider::with_events(Vec::new()));
    let options = Arc::new(FakeOptionsProvider::default());
    let sink = Arc::new(NoopSink::default());

    let pool = sqlx::postgres::PgPoolOptions::new()
        .connect_lazy("postgres://localhost/unused")
        .expect("lazy pool");

    let ctx = JobContext {
        pool,
        settings: Arc::new(settings.clone()),
        clock: clock.clone() as Arc<dyn Clock>,
        market_calendar: Arc::new(MarketCalendar::default()),
        cache: Arc::new(HybridCache::new(
            Arc::new(InMemoryCacheStore::default()),
            clock.clone() as Arc<dyn Clock>,
            256,
        )),
        moves: moves.clone() as Arc<dyn MovesStore>,
        sentiment_store: sentiment_store.clone() as Arc<dyn SentimentStore>,
        budget: Arc::new(BudgetTracker::new(
            budget_store.clone(),
            clock.clone() as Arc<dyn Clock>,
            settings.budget.clone(),
        )),
        earnings_provider: earnings.clone() as Arc<dyn EarningsCalendarProvider>,
        options_provider: options.clone() as Arc<dyn OptionsDataProvider>,
        sentiment_providers,
        sink: sink.clone() as Arc<dyn crate::services::notifier::DigestSink>,
        calendar_limiter: Arc::new(RateLimiter::new("calendar", 25, 1.0)),
        options_limiter: Arc::new(RateLimiter::new("options", 60, 10.0)),
        sentiment_limiter: Arc::new(RateLimiter::new("sentiment", 10, 1.0)),
        options_breaker: Arc::new(CircuitBreaker::new(
            "options",
            5,
            2,
            std::time::Duration::from_secs(60),
        )),
        sentiment_breaker: Arc::new(CircuitBreaker::new(
            "sentiment",
            5,
            2,
            std::time::Duration::from_secs(60),
        )),
        cancel: CancellationToken::new(),
    };

    TestHarness {
        ctx,
        clock,
        moves,
        sentiment_store,
        budget_store,
        earnings,
        options,
        sink,
    }
}
