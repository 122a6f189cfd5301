use chrono::NaiveDate;
use sqlx::{PgPool, Row};

use crate::models::Ticker;

/// Record one implied-volatility observation, replacing any earlier value
/// for the same day.
pub async fn record_iv(
    pool: &PgPool,
    ticker: &Ticker,
    day: NaiveDate,
    iv_value: f64,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO iv_log (ticker, log_date, iv_value, recorded_at)
        VALUES ($1, $2, $3, NOW())
        ON CONFLICT (ticker, log_date) DO UPDATE SET
            iv_value = EXCLUDED.iv_value,
            recorded_at = NOW()
        "#,
    )
    .bind(ticker.as_str())
    .bind(day)
    .bind(iv_value)
    .execute(pool)
    .await?;

    Ok(())
}

/// IV rank: percentile of `current_iv` against the trailing year of
/// observations, in [0, 100]. `None` without enough history.
pub async fn iv_rank(
    pool: &PgPool,
    ticker: &Ticker,
    current_iv: f64,
    as_of: NaiveDate,
    min_observations: usize,
) -> Result<Option<f64>, sqlx::Error> {
    let one_year_ago = as_of - chrono::Duration::days(365);

    let rows = sqlx::query(
        r#"
        SELECT iv_value FROM iv_log
        WHERE ticker = $1 AND log_date BETWEEN $2 AND $3
        "#,
    )
    .bind(ticker.as_str())
    .bind(one_year_ago)
    .bind(as_of)
    .fetch_all(pool)
    .await?;

    let values: Vec<f64> = rows
        .iter()
        .filter_map(|row| row.try_get::<f64, _>("iv_value").ok())
        .collect();

    if values.len() < min_observations {
        return Ok(None);
    }

    let below = values.iter().filter(|v| **v < current_iv).count();
    Ok(Some(below as f64 / values.len() as f64 * 100.0))
}

/// Prune observations older than the cutoff; returns rows deleted.
pub async fn prune_before(pool: &PgPool, cutoff: NaiveDate) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM iv_log WHERE log_date < $1")
        .bind(cutoff)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}
