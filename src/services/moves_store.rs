use std::collections::HashSet;

use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::PgPool;

use crate::db::historical_move_queries;
use crate::models::{HistoricalMove, Ticker};

/// Owner of the historical-moves table. Behind a trait so the pipeline can
/// be exercised against an in-memory fake.
#[async_trait]
pub trait MovesStore: Send + Sync {
    async fn upsert(&self, mv: &HistoricalMove) -> Result<(), sqlx::Error>;

    /// Newest-first history for a ticker.
    async fn moves(&self, ticker: &Ticker) -> Result<Vec<HistoricalMove>, sqlx::Error>;

    /// Absolute intraday move percentages, newest first.
    async fn move_pcts(&self, ticker: &Ticker) -> Result<Vec<f64>, sqlx::Error>;

    /// Mean |intraday move|, absent below `min_count` observations.
    async fn average_intraday_move(
        &self,
        ticker: &Ticker,
        min_count: usize,
    ) -> Result<Option<f64>, sqlx::Error>;

    async fn tracked_universe(&self) -> Result<HashSet<Ticker>, sqlx::Error>;

    async fn recorded_dates(&self, ticker: &Ticker) -> Result<HashSet<NaiveDate>, sqlx::Error>;
}

pub struct PgMovesStore {
    pool: PgPool,
}

impl PgMovesStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MovesStore for PgMovesStore {
    async fn upsert(&self, mv: &HistoricalMove) -> Result<(), sqlx::Error> {
        historical_move_queries::upsert_move(&self.pool, mv).await
    }

    async fn moves(&self, ticker: &Ticker) -> Result<Vec<HistoricalMove>, sqlx::Error> {
        historical_move_queries::get_moves(&self.pool, ticker).await
    }

    async fn move_pcts(&self, ticker: &Ticker) -> Result<Vec<f64>, sqlx::Error> {
        historical_move_queries::get_move_pcts(&self.pool, ticker).await
    }

    async fn average_intraday_move(
        &self,
        ticker: &Ticker,
        min_count: usize,
    ) -> Result<Option<f64>, sqlx::Error> {
        historical_move_queries::average_intraday_move(&self.pool, ticker, min_count).await
    }

    async fn tracked_universe(&self) -> Result<HashSet<Ticker>, sqlx::Error> {
        historical_move_queries::tracked_universe(&self.pool).await
    }

    async fn recorded_dates(&self, ticker: &Ticker) -> Result<HashSet<NaiveDate>, sqlx::Error> {
        historical_move_queries::recorded_dates(&self.pool, ticker).await
    }
}

#[cfg(test)]
pub mod test_support {
    use parking_lot::Mutex;

    use super::*;

    #[derive(Default)]
    pub struct InMemoryMovesStore {
        pub rows: Mutex<Vec<HistoricalMove>>,
    }

    impl InMemoryMovesStore {
        pub fn with_history(ticker: &str, pcts: &[f64]) -> Self {
            let store = Self::default();
            store.seed(ticker, pcts);
            store
        }

        pub fn seed(&self, ticker: &str, pcts: &[f64]) {
            let ticker = Ticker::new(ticker).unwrap();
            let mut rows = self.rows.lock();
            for (i, pct) in pcts.iter().enumerate() {
                rows.push(HistoricalMove {
                    ticker: ticker.clone(),
                    earnings_date: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap()
                        + chrono::Duration::days(90 * i as i64),
                    prev_close: Some(100.0),
                    reaction_open: None,
                    reaction_high: None,
                    reaction_low: None,
                    reaction_close: None,
                    gap_move_pct: None,
                    intraday_move_pct: Some(*pct),
                    close_move_pct: None,
                    volume_before: None,
                    volume_reaction: None,
                });
            }
        }
    }

    #[async_trait]
    impl MovesStore for InMemoryMovesStore {
        async fn upsert(&self, mv: &HistoricalMove) -> Result<(), sqlx::Error> {
            let mut rows = self.rows.lock();
            rows.retain(|r| !(r.ticker == mv.ticker && r.earnings_date == mv.earnings_date));
            rows.push(mv.clone());
            Ok(())
        }

        async fn moves(&self, ticker: &Ticker) -> Result<Vec<HistoricalMove>, sqlx::Error> {
            let mut moves: Vec<HistoricalMove> = self
                .rows
                .lock()
                .iter()
                .filter(|r| r.ticker == *ticker)
                .cloned()
                .collect();
            moves.sort_by(|a, b| b.earnings_date.cmp(&a.earnings_date));
            Ok(moves)
        }

        async fn move_pcts(&self, ticker: &Ticker) -> Result<Vec<f64>, sqlx::Error> {
            Ok(self
                .moves(ticker)
                .await?
                .iter()
                .filter_map(|m| m.intraday_move_pct)
                .map(f64::abs)
                .collect())
        }

        async fn average_intraday_move(
            &self,
            ticker: &Ticker,
            min_count: usize,
        ) -> Result<Option<f64>, sqlx::Error> {
            let pcts = self.move_pcts(ticker).await?;
            if pcts.len() < min_count {
                return Ok(None);
            }
            Ok(Some(pcts.iter().sum::<f64>() / pcts.len() as f64))
        }

        async fn tracked_universe(&self) -> Result<HashSet<Ticker>, sqlx::Error> {
            Ok(self.rows.lock().iter().map(|r| r.ticker.clone()).collect())
        }

        async fn recorded_dates(
            &self,
            ticker: &Ticker,
        ) -> Result<HashSet<NaiveDate>, sqlx::Error> {
            Ok(self
                .rows
                .lock()
                .iter()
                .filter(|r| r.ticker == *ticker)
                .map(|r| r.earnings_date)
                .collect())
        }
    }
}
