use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, NaiveDate};
use sqlx::PgPool;

use crate::db::sentiment_queries::{self, AccuracyStats};
use crate::models::{
    ActualDirection, SentimentDirection, SentimentRecord, SentimentSource, TradeOutcome, Ticker,
};
use crate::services::clock::Clock;

/// The sentiment substrate plays two roles over one table: a short-TTL hot
/// cache read and a permanent prediction/outcome history. Hot reads apply
/// the TTL; history rows themselves never expire.
#[async_trait]
pub trait SentimentStore: Send + Sync {
    /// Freshest non-expired entry for the key, preferring paid-AI over
    /// web-search when both are fresh.
    async fn hot_get(
        &self,
        ticker: &Ticker,
        earnings_date: NaiveDate,
    ) -> Result<Option<SentimentRecord>, sqlx::Error>;

    async fn record_sentiment(&self, record: &SentimentRecord) -> Result<(), sqlx::Error>;

    /// Fill outcome fields once; derives `prediction_correct`. Returns false
    /// when no sentiment row exists for the key.
    async fn record_outcome(
        &self,
        ticker: &Ticker,
        earnings_date: NaiveDate,
        actual_move_pct: f64,
        actual_direction: ActualDirection,
        trade_outcome: Option<TradeOutcome>,
    ) -> Result<bool, sqlx::Error>;

    async fn pending_outcomes(
        &self,
        before_date: NaiveDate,
    ) -> Result<Vec<SentimentRecord>, sqlx::Error>;

    /// Every row from `since` onward, resolved and pending alike. Used by
    /// the backup job; history rows never expire, so this is the whole
    /// ledger.
    async fn all_records(&self, since: NaiveDate) -> Result<Vec<SentimentRecord>, sqlx::Error>;

    async fn accuracy_stats(&self) -> Result<AccuracyStats, sqlx::Error>;

    async fn counts_by_source(&self) -> Result<Vec<(String, i64)>, sqlx::Error>;
}

/// Pick the record a hot read should return: prefer paid-AI, fall back to
/// web-search, then anything else, freshest first within a source.
pub fn choose_hot(mut fresh: Vec<SentimentRecord>) -> Option<SentimentRecord> {
    fn source_rank(source: SentimentSource) -> u8 {
        match source {
            SentimentSource::PaidAi => 0,
            SentimentSource::WebSearch => 1,
            SentimentSource::VendorNews => 2,
            SentimentSource::Manual => 3,
        }
    }

    fresh.sort_by(|a, b| {
        source_rank(a.source)
            .cmp(&source_rank(b.source))
            .then(b.collected_at.cmp(&a.collected_at))
    });
    fresh.into_iter().next()
}

pub struct PgSentimentStore {
    pool: PgPool,
    clock: Arc<dyn Clock>,
    hot_ttl: Duration,
}

impl PgSentimentStore {
    pub fn new(pool: PgPool, clock: Arc<dyn Clock>, hot_ttl_hours: i64) -> Self {
        Self {
            pool,
            clock,
            hot_ttl: Duration::hours(hot_ttl_hours),
        }
    }
}

#[async_trait]
impl SentimentStore for PgSentimentStore {
    async fn hot_get(
        &self,
        ticker: &Ticker,
        earnings_date: NaiveDate,
    ) -> Result<Option<SentimentRecord>, sqlx::Error> {
        let cutoff = self.clock.now_utc() - self.hot_ttl;
        let fresh =
            sentiment_queries::get_fresh_records(&self.pool, ticker, earnings_date, cutoff).await?;
        Ok(choose_hot(fresh))
    }

    async fn record_sentiment(&self, record: &SentimentRecord) -> Result<(), sqlx::Error> {
        sentiment_queries::upsert_sentiment(&self.pool, record).await
    }

    async fn record_outcome(
        &self,
        ticker: &Ticker,
        earnings_date: NaiveDate,
        actual_move_pct: f64,
        actual_direction: ActualDirection,
        trade_outcome: Option<TradeOutcome>,
    ) -> Result<bool, sqlx::Error> {
        let updated = sentiment_queries::record_outcome(
            &self.pool,
            ticker,
            earnings_date,
            actual_move_pct,
            actual_direction,
            trade_outcome,
            self.clock.now_utc(),
        )
        .await?;

        Ok(updated.is_some())
    }

    async fn pending_outcomes(
        &self,
        before_date: NaiveDate,
    ) -> Result<Vec<SentimentRecord>, sqlx::Error> {
        sentiment_queries::pending_outcomes(&self.pool, before_date).await
    }

    async fn all_records(&self, since: NaiveDate) -> Result<Vec<SentimentRecord>, sqlx::Error> {
        sentiment_queries::all_records(&self.pool, since).await
    }

    async fn accuracy_stats(&self) -> Result<AccuracyStats, sqlx::Error> {
        sentiment_queries::accuracy_stats(&self.pool).await
    }

    async fn counts_by_source(&self) -> Result<Vec<(String, i64)>, sqlx::Error> {
        sentiment_queries::counts_by_source(&self.pool).await
    }
}

#[cfg(test)]
pub mod test_support {
    use std::collections::HashMap;

    use chrono::{DateTime, Utc};
    use parking_lot::Mutex;

    use super::*;

    /// In-memory store mirroring the table semantics, with an injectable
    /// clock cutoff for hot reads.
    pub struct InMemorySentimentStore {
        pub records: Mutex<HashMap<(Ticker, NaiveDate), SentimentRecord>>,
        pub clock: Arc<dyn Clock>,
        pub hot_ttl: Duration,
    }

    impl InMemorySentimentStore {
        pub fn new(clock: Arc<dyn Clock>, hot_ttl_hours: i64) -> Self {
            Self {
                records: Mutex::new(HashMap::new()),
                clock,
                hot_ttl: Duration::hours(hot_ttl_hours),
            }
        }

        fn fresh_cutoff(&self) -> DateTime<Utc> {
            self.clock.now_utc() - self.hot_ttl
        }
    }

    #[async_trait]
    impl SentimentStore for InMemorySentimentStore {
        async fn hot_get(
            &self,
            ticker: &Ticker,
            earnings_date: NaiveDate,
        ) -> Result<Option<SentimentRecord>, sqlx::Error> {
            let cutoff = self.fresh_cutoff();
            let fresh: Vec<SentimentRecord> = self
                .records
                .lock()
                .values()
                .filter(|r| {
                    r.ticker == *ticker
                        && r.earnings_date == earnings_date
                        && r.collected_at >= cutoff
                })
                .cloned()
                .collect();
            Ok(choose_hot(fresh))
        }

        async fn record_sentiment(&self, record: &SentimentRecord) -> Result<(), sqlx::Error> {
            self.records
                .lock()
                .insert((record.ticker.clone(), record.earnings_date), record.clone());
            Ok(())
        }

        async fn record_outcome(
            &self,
            ticker: &Ticker,
            earnings_date: NaiveDate,
            actual_move_pct: f64,
            actual_direction: ActualDirection,
            trade_outcome: Option<TradeOutcome>,
        ) -> Result<bool, sqlx::Error> {
            let mut records = self.records.lock();
            match records.get_mut(&(ticker.clone(), earnings_date)) {
                Some(record) => {
                    record.actual_move_pct = Some(actual_move_pct);
                    record.actual_direction = Some(actual_direction);
                    record.prediction_correct = SentimentRecord::derive_prediction_correct(
                        record.sentiment_direction,
                        actual_direction,
                    );
                    record.trade_outcome = trade_outcome;
                    Ok(true)
                }
                None => Ok(false),
            }
        }

        async fn pending_outcomes(
            &self,
            before_date: NaiveDate,
        ) -> Result<Vec<SentimentRecord>, sqlx::Error> {
            let mut pending: Vec<SentimentRecord> = self
                .records
                .lock()
                .values()
                .filter(|r| r.actual_move_pct.is_none() && r.earnings_date < before_date)
                .cloned()
                .collect();
            pending.sort_by_key(|r| r.earnings_date);
            Ok(pending)
        }

        async fn all_records(
            &self,
            since: NaiveDate,
        ) -> Result<Vec<SentimentRecord>, sqlx::Error> {
            let mut records: Vec<SentimentRecord> = self
                .records
                .lock()
                .values()
                .filter(|r| r.earnings_date >= since)
                .cloned()
                .collect();
            records.sort_by(|a, b| {
                a.earnings_date
                    .cmp(&b.earnings_date)
                    .then(a.ticker.cmp(&b.ticker))
            });
            Ok(records)
        }

        async fn accuracy_stats(&self) -> Result<AccuracyStats, sqlx::Error> {
            let records = self.records.lock();
            let mut stats = AccuracyStats {
                total_records: records.len() as i64,
                ..Default::default()
            };
            for record in records.values() {
                if record.has_outcome() {
                    stats.with_outcomes += 1;
                }
                if let Some(correct) = record.prediction_correct {
                    stats.predictions_made += 1;
                    if correct {
                        stats.predictions_correct += 1;
                    }
                }
            }
            Ok(stats)
        }

        async fn counts_by_source(&self) -> Result<Vec<(String, i64)>, sqlx::Error> {
            let mut counts: HashMap<String, i64> = HashMap::new();
            for record in self.records.lock().values() {
                *counts.entry(record.source.as_str().to_string()).or_default() += 1;
            }
            let mut counts: Vec<_> = counts.into_iter().collect();
            counts.sort();
            Ok(counts)
        }
    }
}
