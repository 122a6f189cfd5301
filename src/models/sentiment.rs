use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::ticker::Ticker;

/// Where a sentiment text came from. Closed set; vendor free-text that does
/// not match parses to nothing rather than a new variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SentimentSource {
    PaidAi,
    WebSearch,
    VendorNews,
    Manual,
}

impl SentimentSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            SentimentSource::PaidAi => "paid_ai",
            SentimentSource::WebSearch => "web_search",
            SentimentSource::VendorNews => "vendor_news",
            SentimentSource::Manual => "manual",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "paid_ai" => Some(SentimentSource::PaidAi),
            "web_search" => Some(SentimentSource::WebSearch),
            "vendor_news" => Some(SentimentSource::VendorNews),
            "manual" => Some(SentimentSource::Manual),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SentimentDirection {
    Bullish,
    Bearish,
    Neutral,
    Unknown,
}

impl SentimentDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            SentimentDirection::Bullish => "bullish",
            SentimentDirection::Bearish => "bearish",
            SentimentDirection::Neutral => "neutral",
            SentimentDirection::Unknown => "unknown",
        }
    }

    /// Parsing vendor text defaults to `Unknown` rather than failing.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "bullish" => SentimentDirection::Bullish,
            "bearish" => SentimentDirection::Bearish,
            "neutral" => SentimentDirection::Neutral,
            _ => SentimentDirection::Unknown,
        }
    }

    /// Classify a score into a direction using the ±0.2 thresholds.
    pub fn from_score(score: f64) -> Self {
        if score >= 0.2 {
            SentimentDirection::Bullish
        } else if score <= -0.2 {
            SentimentDirection::Bearish
        } else {
            SentimentDirection::Neutral
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ActualDirection {
    Up,
    Down,
}

impl ActualDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActualDirection::Up => "UP",
            ActualDirection::Down => "DOWN",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_uppercase().as_str() {
            "UP" => Some(ActualDirection::Up),
            "DOWN" => Some(ActualDirection::Down),
            _ => None,
        }
    }

    pub fn from_move(move_pct: f64) -> Self {
        if move_pct >= 0.0 {
            ActualDirection::Up
        } else {
            ActualDirection::Down
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeOutcome {
    Win,
    Loss,
    Skip,
}

impl TradeOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeOutcome::Win => "WIN",
            TradeOutcome::Loss => "LOSS",
            TradeOutcome::Skip => "SKIP",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_uppercase().as_str() {
            "WIN" => Some(TradeOutcome::Win),
            "LOSS" => Some(TradeOutcome::Loss),
            "SKIP" => Some(TradeOutcome::Skip),
            _ => None,
        }
    }
}

/// Pre-earnings sentiment joined to its post-earnings outcome.
///
/// Created by enrichment with the outcome fields empty; the outcome-recorder
/// job fills them exactly once. `prediction_correct` is derived, never set
/// by callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentimentRecord {
    pub ticker: Ticker,
    pub earnings_date: NaiveDate,
    pub collected_at: DateTime<Utc>,
    pub source: SentimentSource,
    pub sentiment_text: String,
    pub sentiment_score: Option<f64>,
    pub sentiment_direction: SentimentDirection,
    pub vrp_ratio: Option<f64>,
    pub implied_move_pct: Option<f64>,
    pub actual_move_pct: Option<f64>,
    pub actual_direction: Option<ActualDirection>,
    pub prediction_correct: Option<bool>,
    pub trade_outcome: Option<TradeOutcome>,
}

impl SentimentRecord {
    pub fn has_outcome(&self) -> bool {
        self.actual_move_pct.is_some()
    }

    /// Derive correctness from the stored prediction and the realized
    /// direction. `Neutral`/`Unknown` predictions yield `None`.
    pub fn derive_prediction_correct(
        direction: SentimentDirection,
        actual: ActualDirection,
    ) -> Option<bool> {
        match direction {
            SentimentDirection::Bullish => Some(actual == ActualDirection::Up),
            SentimentDirection::Bearish => Some(actual == ActualDirection::Down),
            SentimentDirection::Neutral | SentimentDirection::Unknown => None,
        }
    }
}
