use chrono::NaiveDate;
use sqlx::{PgPool, Row};

use crate::models::{EarningsEvent, EarningsTiming, Ticker};

fn row_to_event(row: &sqlx::postgres::PgRow) -> Result<EarningsEvent, sqlx::Error> {
    let raw_ticker: String = row.try_get("ticker")?;
    let ticker = Ticker::new(&raw_ticker)
        .map_err(|e| sqlx::Error::Decode(format!("bad ticker in earnings_calendar: {}", e).into()))?;
    let raw_timing: String = row.try_get("timing")?;

    Ok(EarningsEvent {
        ticker,
        report_date: row.try_get("report_date")?,
        timing: EarningsTiming::parse(&raw_timing),
        confirmed: row.try_get("confirmed")?,
        source_id: row.try_get("source_id")?,
        estimate: row.try_get("estimate")?,
        updated_at: row.try_get("updated_at")?,
    })
}

/// Upsert a calendar event. Only timing/confirmed/estimate move on conflict.
pub async fn upsert_event(pool: &PgPool, event: &EarningsEvent) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO earnings_calendar (ticker, report_date, timing, confirmed, source_id, estimate, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, NOW())
        ON CONFLICT (ticker, report_date) DO UPDATE SET
            timing = EXCLUDED.timing,
            confirmed = EXCLUDED.confirmed,
            estimate = EXCLUDED.estimate,
            updated_at = NOW()
        "#,
    )
    .bind(event.ticker.as_str())
    .bind(event.report_date)
    .bind(event.timing.as_str())
    .bind(event.confirmed)
    .bind(&event.source_id)
    .bind(event.estimate)
    .execute(pool)
    .await?;

    Ok(())
}

/// Stored calendar slice, used as the stale fallback when the vendor is
/// unavailable.
pub async fn events_between(
    pool: &PgPool,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<Vec<EarningsEvent>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT ticker, report_date, timing, confirmed, source_id, estimate, updated_at
        FROM earnings_calendar
        WHERE report_date BETWEEN $1 AND $2
        ORDER BY report_date, ticker
        "#,
    )
    .bind(start)
    .bind(end)
    .fetch_all(pool)
    .await?;

    rows.iter().map(row_to_event).collect()
}
