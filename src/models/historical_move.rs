use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::ticker::Ticker;

/// One realized earnings reaction for a ticker.
///
/// Rows are immutable once written except by an explicit recompute
/// (weekly-backfill). The `DISTINCT ticker` projection of this table is the
/// tracked universe used to whitelist symbols across every job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalMove {
    pub ticker: Ticker,
    pub earnings_date: NaiveDate,
    pub prev_close: Option<f64>,
    pub reaction_open: Option<f64>,
    pub reaction_high: Option<f64>,
    pub reaction_low: Option<f64>,
    pub reaction_close: Option<f64>,
    /// Open vs previous close, percent.
    pub gap_move_pct: Option<f64>,
    /// High-to-low range on the reaction day relative to previous close, percent.
    pub intraday_move_pct: Option<f64>,
    /// Close vs previous close, percent.
    pub close_move_pct: Option<f64>,
    pub volume_before: Option<i64>,
    pub volume_reaction: Option<i64>,
}

impl HistoricalMove {
    /// Derive the percentage fields from raw prices. Returns `None` when the
    /// previous close is missing or non-positive.
    pub fn from_prices(
        ticker: Ticker,
        earnings_date: NaiveDate,
        prev_close: f64,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume_before: Option<i64>,
        volume_reaction: Option<i64>,
    ) -> Option<Self> {
        if prev_close <= 0.0 {
            return None;
        }

        let gap_move_pct = (open - prev_close) / prev_close * 100.0;
        let intraday_move_pct = (high - low) / prev_close * 100.0;
        let close_move_pct = (close - prev_close) / prev_close * 100.0;

        Some(Self {
            ticker,
            earnings_date,
            prev_close: Some(prev_close),
            reaction_open: Some(open),
            reaction_high: Some(high),
            reaction_low: Some(low),
            reaction_close: Some(close),
            gap_move_pct: Some(gap_move_pct),
            intraday_move_pct: Some(intraday_move_pct),
            close_move_pct: Some(close_move_pct),
            volume_before,
            volume_reaction,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[test]
    fn test_from_prices_derives_percentages() {
        let mv = HistoricalMove::from_prices(
            Ticker::new("NVDA").unwrap(),
            date("2026-02-25"),
            100.0,
            104.0,
            106.0,
            98.0,
            105.0,
            None,
            None,
        )
        .unwrap();

        assert!((mv.gap_move_pct.unwrap() - 4.0).abs() < 1e-9);
        assert!((mv.intraday_move_pct.unwrap() - 8.0).abs() < 1e-9);
        assert!((mv.close_move_pct.unwrap() - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_from_prices_rejects_bad_prev_close() {
        let mv = HistoricalMove::from_prices(
            Ticker::new("NVDA").unwrap(),
            date("2026-02-25"),
            0.0,
            104.0,
            106.0,
            98.0,
            105.0,
            None,
            None,
        );
        assert!(mv.is_none());
    }
}
