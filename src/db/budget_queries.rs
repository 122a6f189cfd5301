use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{PgPool, Row};

/// Durable store behind the budget tracker. A trait so tests can substitute
/// a failing or in-memory ledger.
#[async_trait]
pub trait BudgetStore: Send + Sync {
    /// Today's `(calls, cost)` or `None` when no row exists yet.
    async fn day_usage(&self, day: NaiveDate) -> Result<Option<(i64, f64)>, sqlx::Error>;

    /// Total cost across the given month (1-based).
    async fn month_cost(&self, year: i32, month: u32) -> Result<f64, sqlx::Error>;

    /// One transaction: ensure the day row exists, then bump calls by one
    /// and cost by `cost`.
    async fn record(&self, day: NaiveDate, cost: f64, now: DateTime<Utc>)
        -> Result<(), sqlx::Error>;
}

pub struct PgBudgetStore {
    pool: PgPool,
}

impl PgBudgetStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BudgetStore for PgBudgetStore {
    async fn day_usage(&self, day: NaiveDate) -> Result<Option<(i64, f64)>, sqlx::Error> {
        let row = sqlx::query("SELECT calls, cost FROM api_budget WHERE date = $1")
            .bind(day)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|row| Ok((row.try_get("calls")?, row.try_get("cost")?)))
            .transpose()
    }

    async fn month_cost(&self, year: i32, month: u32) -> Result<f64, sqlx::Error> {
        let row = sqlx::query(
            r#"
            SELECT COALESCE(SUM(cost), 0.0) AS month_cost
            FROM api_budget
            WHERE EXTRACT(YEAR FROM date) = $1
              AND EXTRACT(MONTH FROM date) = $2
            "#,
        )
        .bind(year as i64)
        .bind(month as i64)
        .fetch_one(&self.pool)
        .await?;

        row.try_get("month_cost")
    }

    async fn record(
        &self,
        day: NaiveDate,
        cost: f64,
        now: DateTime<Utc>,
    ) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO api_budget (date, calls, cost, last_updated)
            VALUES ($1, 0, 0.0, $2)
            ON CONFLICT (date) DO NOTHING
            "#,
        )
        .bind(day)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            UPDATE api_budget
            SET calls = calls + 1,
                cost = cost + $2,
                last_updated = $3
            WHERE date = $1
            "#,
        )
        .bind(day)
        .bind(cost)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await
    }
}
