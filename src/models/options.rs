use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::ticker::Ticker;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionType {
    Call,
    Put,
}

/// A single option quote from the chain vendor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionQuote {
    pub strike: f64,
    pub option_type: OptionType,
    pub bid: Option<f64>,
    pub ask: Option<f64>,
    pub open_interest: i64,
    pub volume: i64,
    /// Implied volatility in percent, when the vendor supplies greeks.
    pub implied_volatility: Option<f64>,
}

impl OptionQuote {
    /// Midpoint of bid/ask; `None` when either side is missing.
    pub fn mid(&self) -> Option<f64> {
        match (self.bid, self.ask) {
            (Some(bid), Some(ask)) if bid > 0.0 || ask > 0.0 => Some((bid + ask) / 2.0),
            _ => None,
        }
    }

    /// Bid-ask spread as a percentage of mid. Missing bid or ask yields a
    /// synthetic 100% spread so the liquidity engine rejects the quote.
    pub fn spread_pct(&self) -> f64 {
        match (self.bid, self.ask, self.mid()) {
            (Some(bid), Some(ask), Some(mid)) if mid > 0.0 => (ask - bid) / mid * 100.0,
            _ => 100.0,
        }
    }
}

/// Option chain for one ticker and expiration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionChain {
    pub ticker: Ticker,
    pub expiration: NaiveDate,
    pub underlying_price: f64,
    pub quotes: Vec<OptionQuote>,
}

impl OptionChain {
    /// Strike closest to the underlying price, or `None` for an empty chain.
    pub fn atm_strike(&self) -> Option<f64> {
        self.quotes
            .iter()
            .map(|q| q.strike)
            .min_by(|a, b| {
                let da = (a - self.underlying_price).abs();
                let db = (b - self.underlying_price).abs();
                da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal)
            })
    }

    pub fn quote_at(&self, strike: f64, option_type: OptionType) -> Option<&OptionQuote> {
        self.quotes
            .iter()
            .find(|q| q.option_type == option_type && (q.strike - strike).abs() < 1e-9)
    }
}

/// Implied move derived from the ATM straddle. Never persisted; recomputed
/// on demand from the chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImpliedMove {
    pub ticker: Ticker,
    pub expiration: NaiveDate,
    pub atm_strike: f64,
    pub call_mid: f64,
    pub put_mid: f64,
    pub straddle_cost: f64,
    pub implied_move_pct: f64,
    pub upper_bound: f64,
    pub lower_bound: f64,
}
