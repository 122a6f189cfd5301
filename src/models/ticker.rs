use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::AppError;

/// Validated stock symbol: 1-5 ASCII letters, always uppercase.
///
/// Every ticker entering the system is normalized through this type before
/// any store or cache lookup.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Ticker(String);

impl Ticker {
    pub fn new(raw: &str) -> Result<Self, AppError> {
        let normalized = raw.trim().to_uppercase();

        if normalized.is_empty() {
            return Err(AppError::Validation("Ticker cannot be empty".to_string()));
        }
        if !normalized.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(AppError::Validation(format!(
                "Invalid ticker format: '{}'. Tickers must contain only letters",
                normalized
            )));
        }
        if normalized.len() > 5 {
            return Err(AppError::Validation(format!(
                "Invalid ticker format: '{}'. Tickers must be 1-5 characters (got {})",
                normalized,
                normalized.len()
            )));
        }

        Ok(Ticker(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Ticker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Ticker {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ticker::new(s)
    }
}

impl TryFrom<String> for Ticker {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Ticker::new(&value)
    }
}

impl From<Ticker> for String {
    fn from(value: Ticker) -> Self {
        value.0
    }
}
