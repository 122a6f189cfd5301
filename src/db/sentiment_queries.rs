use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{PgPool, Row};

use crate::models::{
    ActualDirection, SentimentDirection, SentimentRecord, SentimentSource, TradeOutcome, Ticker,
};

fn row_to_record(row: &sqlx::postgres::PgRow) -> Result<SentimentRecord, sqlx::Error> {
    let raw_ticker: String = row.try_get("ticker")?;
    let ticker = Ticker::new(&raw_ticker)
        .map_err(|e| sqlx::Error::Decode(format!("bad ticker in sentiment_history: {}", e).into()))?;

    let raw_source: String = row.try_get("source")?;
    let source = SentimentSource::parse(&raw_source)
        .ok_or_else(|| sqlx::Error::Decode(format!("unknown source '{}'", raw_source).into()))?;

    let raw_direction: String = row.try_get("sentiment_direction")?;
    let raw_actual: Option<String> = row.try_get("actual_direction")?;
    let raw_outcome: Option<String> = row.try_get("trade_outcome")?;

    Ok(SentimentRecord {
        ticker,
        earnings_date: row.try_get("earnings_date")?,
        collected_at: row.try_get("collected_at")?,
        source,
        sentiment_text: row.try_get("sentiment_text")?,
        sentiment_score: row.try_get("sentiment_score")?,
        sentiment_direction: SentimentDirection::parse(&raw_direction),
        vrp_ratio: row.try_get("vrp_ratio")?,
        implied_move_pct: row.try_get("implied_move_pct")?,
        actual_move_pct: row.try_get("actual_move_pct")?,
        actual_direction: raw_actual.as_deref().and_then(ActualDirection::parse),
        prediction_correct: row.try_get("prediction_correct")?,
        trade_outcome: raw_outcome.as_deref().and_then(TradeOutcome::parse),
    })
}

/// Insert-or-replace the pre-earnings portion of a record. Outcome columns
/// are left untouched on conflict so a re-fetch cannot clobber a recorded
/// outcome.
pub async fn upsert_sentiment(pool: &PgPool, record: &SentimentRecord) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO sentiment_history (
            ticker, earnings_date, collected_at, source, sentiment_text,
            sentiment_score, sentiment_direction, vrp_ratio, implied_move_pct,
            updated_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $3)
        ON CONFLICT (ticker, earnings_date) DO UPDATE SET
            collected_at = EXCLUDED.collected_at,
            source = EXCLUDED.source,
            sentiment_text = EXCLUDED.sentiment_text,
            sentiment_score = EXCLUDED.sentiment_score,
            sentiment_direction = EXCLUDED.sentiment_direction,
            vrp_ratio = EXCLUDED.vrp_ratio,
            implied_move_pct = EXCLUDED.implied_move_pct,
            updated_at = EXCLUDED.collected_at
        "#,
    )
    .bind(record.ticker.as_str())
    .bind(record.earnings_date)
    .bind(record.collected_at)
    .bind(record.source.as_str())
    .bind(&record.sentiment_text)
    .bind(record.sentiment_score)
    .bind(record.sentiment_direction.as_str())
    .bind(record.vrp_ratio)
    .bind(record.implied_move_pct)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn get_record(
    pool: &PgPool,
    ticker: &Ticker,
    earnings_date: NaiveDate,
) -> Result<Option<SentimentRecord>, sqlx::Error> {
    let row = sqlx::query(
        "SELECT * FROM sentiment_history WHERE ticker = $1 AND earnings_date = $2",
    )
    .bind(ticker.as_str())
    .bind(earnings_date)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(row_to_record).transpose()
}

/// Fresh records for the hot-cache read: collected within the TTL window.
pub async fn get_fresh_records(
    pool: &PgPool,
    ticker: &Ticker,
    earnings_date: NaiveDate,
    collected_after: DateTime<Utc>,
) -> Result<Vec<SentimentRecord>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT * FROM sentiment_history
        WHERE ticker = $1 AND earnings_date = $2 AND collected_at >= $3
        ORDER BY collected_at DESC
        "#,
    )
    .bind(ticker.as_str())
    .bind(earnings_date)
    .bind(collected_after)
    .fetch_all(pool)
    .await?;

    rows.iter().map(row_to_record).collect()
}

/// Fill outcome columns. Returns the stored prediction direction, or `None`
/// when no matching sentiment row exists.
pub async fn record_outcome(
    pool: &PgPool,
    ticker: &Ticker,
    earnings_date: NaiveDate,
    actual_move_pct: f64,
    actual_direction: ActualDirection,
    trade_outcome: Option<TradeOutcome>,
    now: DateTime<Utc>,
) -> Result<Option<SentimentDirection>, sqlx::Error> {
    let mut tx = pool.begin().await?;

    let row = sqlx::query(
        "SELECT sentiment_direction FROM sentiment_history WHERE ticker = $1 AND earnings_date = $2",
    )
    .bind(ticker.as_str())
    .bind(earnings_date)
    .fetch_optional(&mut *tx)
    .await?;

    let direction = match row {
        Some(row) => {
            let raw: String = row.try_get("sentiment_direction")?;
            SentimentDirection::parse(&raw)
        }
        None => {
            tx.rollback().await?;
            return Ok(None);
        }
    };

    let prediction_correct =
        SentimentRecord::derive_prediction_correct(direction, actual_direction);

    sqlx::query(
        r#"
        UPDATE sentiment_history
        SET actual_move_pct = $3,
            actual_direction = $4,
            prediction_correct = $5,
            trade_outcome = $6,
            updated_at = $7
        WHERE ticker = $1 AND earnings_date = $2
        "#,
    )
    .bind(ticker.as_str())
    .bind(earnings_date)
    .bind(actual_move_pct)
    .bind(actual_direction.as_str())
    .bind(prediction_correct)
    .bind(trade_outcome.map(|o| o.as_str()))
    .bind(now)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(Some(direction))
}

/// Full history slice, resolved and pending rows alike, oldest first.
pub async fn all_records(
    pool: &PgPool,
    since: NaiveDate,
) -> Result<Vec<SentimentRecord>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT * FROM sentiment_history
        WHERE earnings_date >= $1
        ORDER BY earnings_date, ticker
        "#,
    )
    .bind(since)
    .fetch_all(pool)
    .await?;

    rows.iter().map(row_to_record).collect()
}

/// Records still waiting for their post-earnings outcome.
pub async fn pending_outcomes(
    pool: &PgPool,
    before_date: NaiveDate,
) -> Result<Vec<SentimentRecord>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT * FROM sentiment_history
        WHERE actual_move_pct IS NULL AND earnings_date < $1
        ORDER BY earnings_date
        "#,
    )
    .bind(before_date)
    .fetch_all(pool)
    .await?;

    rows.iter().map(row_to_record).collect()
}

#[derive(Debug, Clone, Default)]
pub struct DirectionAccuracy {
    pub total: i64,
    pub correct: i64,
    pub avg_move: Option<f64>,
}

#[derive(Debug, Clone, Default)]
pub struct AccuracyStats {
    pub total_records: i64,
    pub with_outcomes: i64,
    pub predictions_made: i64,
    pub predictions_correct: i64,
    pub bullish: DirectionAccuracy,
    pub bearish: DirectionAccuracy,
    pub neutral: DirectionAccuracy,
}

impl AccuracyStats {
    pub fn accuracy(&self) -> Option<f64> {
        if self.predictions_made > 0 {
            Some(self.predictions_correct as f64 / self.predictions_made as f64)
        } else {
            None
        }
    }
}

pub async fn accuracy_stats(pool: &PgPool) -> Result<AccuracyStats, sqlx::Error> {
    let overall = sqlx::query(
        r#"
        SELECT
            COUNT(*) AS total_records,
            COUNT(actual_move_pct) AS with_outcomes,
            COUNT(prediction_correct) AS predictions_made,
            COUNT(*) FILTER (WHERE prediction_correct) AS predictions_correct
        FROM sentiment_history
        "#,
    )
    .fetch_one(pool)
    .await?;

    let mut stats = AccuracyStats {
        total_records: overall.try_get("total_records")?,
        with_outcomes: overall.try_get("with_outcomes")?,
        predictions_made: overall.try_get("predictions_made")?,
        predictions_correct: overall.try_get("predictions_correct")?,
        ..Default::default()
    };

    let rows = sqlx::query(
        r#"
        SELECT sentiment_direction,
               COUNT(*) AS total,
               COUNT(*) FILTER (WHERE prediction_correct) AS correct,
               AVG(actual_move_pct) AS avg_move
        FROM sentiment_history
        WHERE actual_move_pct IS NOT NULL
        GROUP BY sentiment_direction
        "#,
    )
    .fetch_all(pool)
    .await?;

    for row in rows {
        let direction: String = row.try_get("sentiment_direction")?;
        let entry = DirectionAccuracy {
            total: row.try_get("total")?,
            correct: row.try_get("correct")?,
            avg_move: row.try_get("avg_move")?,
        };
        match direction.as_str() {
            "bullish" => stats.bullish = entry,
            "bearish" => stats.bearish = entry,
            "neutral" => stats.neutral = entry,
            _ => {}
        }
    }

    Ok(stats)
}

/// Per-source record counts for the status summary.
pub async fn counts_by_source(pool: &PgPool) -> Result<Vec<(String, i64)>, sqlx::Error> {
    let rows = sqlx::query(
        "SELECT source, COUNT(*) AS cnt FROM sentiment_history GROUP BY source ORDER BY source",
    )
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| Ok((row.try_get("source")?, row.try_get("cnt")?)))
        .collect()
}
