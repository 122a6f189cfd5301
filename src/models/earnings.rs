use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::ticker::Ticker;

/// When earnings are announced relative to market hours.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EarningsTiming {
    /// Before market open
    Bmo,
    /// After market close
    Amc,
    /// During market hours (rare)
    Dmh,
    Unknown,
}

impl EarningsTiming {
    pub fn as_str(&self) -> &'static str {
        match self {
            EarningsTiming::Bmo => "BMO",
            EarningsTiming::Amc => "AMC",
            EarningsTiming::Dmh => "DMH",
            EarningsTiming::Unknown => "UNKNOWN",
        }
    }

    /// Unknown values from vendors default to `Unknown` rather than failing.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_uppercase().as_str() {
            "BMO" => EarningsTiming::Bmo,
            "AMC" => EarningsTiming::Amc,
            "DMH" => EarningsTiming::Dmh,
            _ => EarningsTiming::Unknown,
        }
    }
}

/// An upcoming (or past) earnings announcement from the calendar vendor.
///
/// Keyed by `(ticker, report_date)`; only `timing`, `confirmed` and
/// `updated_at` are mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EarningsEvent {
    pub ticker: Ticker,
    pub report_date: NaiveDate,
    pub timing: EarningsTiming,
    pub confirmed: bool,
    pub source_id: Option<String>,
    pub estimate: Option<f64>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl EarningsEvent {
    pub fn new(ticker: Ticker, report_date: NaiveDate) -> Self {
        Self {
            ticker,
            report_date,
            timing: EarningsTiming::Unknown,
            confirmed: false,
            source_id: None,
            estimate: None,
            updated_at: None,
        }
    }
}
