use std::collections::HashSet;

use chrono::NaiveDate;
use sqlx::{PgPool, Row};

use crate::models::{HistoricalMove, Ticker};

fn row_to_move(row: &sqlx::postgres::PgRow) -> Result<HistoricalMove, sqlx::Error> {
    let raw_ticker: String = row.try_get("ticker")?;
    let ticker = Ticker::new(&raw_ticker)
        .map_err(|e| sqlx::Error::Decode(format!("bad ticker in historical_moves: {}", e).into()))?;

    Ok(HistoricalMove {
        ticker,
        earnings_date: row.try_get("earnings_date")?,
        prev_close: row.try_get("prev_close")?,
        reaction_open: row.try_get("reaction_open")?,
        reaction_high: row.try_get("reaction_high")?,
        reaction_low: row.try_get("reaction_low")?,
        reaction_close: row.try_get("reaction_close")?,
        gap_move_pct: row.try_get("gap_move_pct")?,
        intraday_move_pct: row.try_get("intraday_move_pct")?,
        close_move_pct: row.try_get("close_move_pct")?,
        volume_before: row.try_get("volume_before")?,
        volume_reaction: row.try_get("volume_reaction")?,
    })
}

/// Replace-on-conflict by (ticker, earnings_date).
pub async fn upsert_move(pool: &PgPool, mv: &HistoricalMove) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO historical_moves (
            ticker, earnings_date, prev_close, reaction_open, reaction_high,
            reaction_low, reaction_close, gap_move_pct, intraday_move_pct,
            close_move_pct, volume_before, volume_reaction, recorded_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, NOW())
        ON CONFLICT (ticker, earnings_date) DO UPDATE SET
            prev_close = EXCLUDED.prev_close,
            reaction_open = EXCLUDED.reaction_open,
            reaction_high = EXCLUDED.reaction_high,
            reaction_low = EXCLUDED.reaction_low,
            reaction_close = EXCLUDED.reaction_close,
            gap_move_pct = EXCLUDED.gap_move_pct,
            intraday_move_pct = EXCLUDED.intraday_move_pct,
            close_move_pct = EXCLUDED.close_move_pct,
            volume_before = EXCLUDED.volume_before,
            volume_reaction = EXCLUDED.volume_reaction,
            recorded_at = NOW()
        "#,
    )
    .bind(mv.ticker.as_str())
    .bind(mv.earnings_date)
    .bind(mv.prev_close)
    .bind(mv.reaction_open)
    .bind(mv.reaction_high)
    .bind(mv.reaction_low)
    .bind(mv.reaction_close)
    .bind(mv.gap_move_pct)
    .bind(mv.intraday_move_pct)
    .bind(mv.close_move_pct)
    .bind(mv.volume_before)
    .bind(mv.volume_reaction)
    .execute(pool)
    .await?;

    Ok(())
}

/// Chronological list for a ticker, newest first.
pub async fn get_moves(pool: &PgPool, ticker: &Ticker) -> Result<Vec<HistoricalMove>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT ticker, earnings_date, prev_close, reaction_open, reaction_high,
               reaction_low, reaction_close, gap_move_pct, intraday_move_pct,
               close_move_pct, volume_before, volume_reaction
        FROM historical_moves
        WHERE ticker = $1
        ORDER BY earnings_date DESC
        "#,
    )
    .bind(ticker.as_str())
    .fetch_all(pool)
    .await?;

    rows.iter().map(row_to_move).collect()
}

/// Absolute intraday move percentages for a ticker, newest first. Rows with
/// a missing percentage are skipped.
pub async fn get_move_pcts(pool: &PgPool, ticker: &Ticker) -> Result<Vec<f64>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT intraday_move_pct
        FROM historical_moves
        WHERE ticker = $1 AND intraday_move_pct IS NOT NULL
        ORDER BY earnings_date DESC
        "#,
    )
    .bind(ticker.as_str())
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .filter_map(|row| row.try_get::<f64, _>("intraday_move_pct").ok())
        .map(f64::abs)
        .collect())
}

/// Mean |intraday move| across the ticker's history, or `None` below the
/// observation floor.
pub async fn average_intraday_move(
    pool: &PgPool,
    ticker: &Ticker,
    min_count: usize,
) -> Result<Option<f64>, sqlx::Error> {
    let pcts = get_move_pcts(pool, ticker).await?;
    if pcts.len() < min_count {
        return Ok(None);
    }
    Ok(Some(pcts.iter().sum::<f64>() / pcts.len() as f64))
}

/// Distinct tickers with recorded history. This set is the whitelist that
/// keeps OTC and foreign symbols out of every downstream job.
pub async fn tracked_universe(pool: &PgPool) -> Result<HashSet<Ticker>, sqlx::Error> {
    let rows = sqlx::query("SELECT DISTINCT ticker FROM historical_moves")
        .fetch_all(pool)
        .await?;

    Ok(rows
        .iter()
        .filter_map(|row| row.try_get::<String, _>("ticker").ok())
        .filter_map(|raw| Ticker::new(&raw).ok())
        .collect())
}

/// Earnings dates already recorded for a ticker, for backfill gap detection.
pub async fn recorded_dates(
    pool: &PgPool,
    ticker: &Ticker,
) -> Result<HashSet<NaiveDate>, sqlx::Error> {
    let rows = sqlx::query("SELECT earnings_date FROM historical_moves WHERE ticker = $1")
        .bind(ticker.as_str())
        .fetch_all(pool)
        .await?;

    Ok(rows
        .iter()
        .filter_map(|row| row.try_get::<NaiveDate, _>("earnings_date").ok())
        .collect())
}
