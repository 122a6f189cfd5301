use serde::{Deserialize, Serialize};

use crate::models::OptionQuote;
use crate::settings::LiquiditySettings;

/// Liquidity classification for a single option or straddle.
/// Ordered: Excellent > Good > Warning > Reject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LiquidityTier {
    Reject,
    Warning,
    Good,
    Excellent,
}

impl LiquidityTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            LiquidityTier::Excellent => "EXCELLENT",
            LiquidityTier::Good => "GOOD",
            LiquidityTier::Warning => "WARNING",
            LiquidityTier::Reject => "REJECT",
        }
    }

    /// Discrete score contribution. Reject is non-zero: some Reject trades
    /// still print, so the scorer may keep them.
    pub fn points(&self) -> f64 {
        match self {
            LiquidityTier::Excellent => 20.0,
            LiquidityTier::Good => 16.0,
            LiquidityTier::Warning => 12.0,
            LiquidityTier::Reject => 4.0,
        }
    }
}

fn classify_oi(oi: i64, t: &LiquiditySettings) -> LiquidityTier {
    if oi >= t.excellent_oi {
        LiquidityTier::Excellent
    } else if oi >= t.good_oi {
        LiquidityTier::Good
    } else if oi >= t.warning_oi {
        LiquidityTier::Warning
    } else {
        LiquidityTier::Reject
    }
}

fn classify_volume(volume: i64, t: &LiquiditySettings) -> LiquidityTier {
    if volume >= t.excellent_volume {
        LiquidityTier::Excellent
    } else if volume >= t.good_volume {
        LiquidityTier::Good
    } else if volume >= t.min_volume {
        LiquidityTier::Warning
    } else {
        LiquidityTier::Reject
    }
}

fn classify_spread(spread_pct: f64, t: &LiquiditySettings) -> LiquidityTier {
    if spread_pct <= t.excellent_spread_pct {
        LiquidityTier::Excellent
    } else if spread_pct <= t.good_spread_pct {
        LiquidityTier::Good
    } else if spread_pct <= t.warning_spread_pct {
        LiquidityTier::Warning
    } else {
        LiquidityTier::Reject
    }
}

/// Worst-of-three-axes classification: each axis (open interest, volume,
/// spread) is graded independently and the final tier is the minimum.
pub fn classify_tier(
    oi: i64,
    volume: i64,
    spread_pct: f64,
    thresholds: &LiquiditySettings,
) -> LiquidityTier {
    classify_oi(oi, thresholds)
        .min(classify_volume(volume, thresholds))
        .min(classify_spread(spread_pct, thresholds))
}

pub fn classify_quote(quote: &OptionQuote, thresholds: &LiquiditySettings) -> LiquidityTier {
    classify_tier(
        quote.open_interest,
        quote.volume,
        quote.spread_pct(),
        thresholds,
    )
}

/// Straddle tier is the worse of the two legs.
pub fn classify_straddle(
    call: &OptionQuote,
    put: &OptionQuote,
    thresholds: &LiquiditySettings,
) -> LiquidityTier {
    classify_quote(call, thresholds).min(classify_quote(put, thresholds))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::OptionType;

    fn thresholds() -> LiquiditySettings {
        LiquiditySettings::default()
    }

    fn quote(bid: Option<f64>, ask: Option<f64>, oi: i64, volume: i64) -> OptionQuote {
        OptionQuote {
            strike: 100.0,
            option_type: OptionType::Call,
            bid,
            ask,
            open_interest: oi,
            volume,
            implied_volatility: None,
        }
    }

    #[test]
    fn test_excellent_all_axes() {
        let tier = classify_tier(1000, 250, 3.0, &thresholds());
        assert_eq!(tier, LiquidityTier::Excellent);
    }

    #[test]
    fn test_spread_demotes_to_good() {
        let tier = classify_tier(1000, 250, 10.0, &thresholds());
        assert_eq!(tier, LiquidityTier::Good);
    }

    #[test]
    fn test_warning_oi() {
        let tier = classify_tier(200, 250, 5.0, &thresholds());
        assert_eq!(tier, LiquidityTier::Warning);
    }

    #[test]
    fn test_warning_spread() {
        let tier = classify_tier(1000, 250, 14.0, &thresholds());
        assert_eq!(tier, LiquidityTier::Warning);
    }

    #[test]
    fn test_reject_low_oi() {
        assert_eq!(classify_tier(30, 100, 5.0, &thresholds()), LiquidityTier::Reject);
    }

    #[test]
    fn test_reject_low_volume() {
        assert_eq!(classify_tier(1000, 10, 5.0, &thresholds()), LiquidityTier::Reject);
    }

    #[test]
    fn test_reject_wide_spread() {
        assert_eq!(classify_tier(1000, 250, 20.0, &thresholds()), LiquidityTier::Reject);
    }

    #[test]
    fn test_worst_axis_wins_both_ways() {
        assert_eq!(classify_tier(1000, 250, 13.0, &thresholds()), LiquidityTier::Warning);
        assert_eq!(classify_tier(200, 50, 5.0, &thresholds()), LiquidityTier::Warning);
    }

    #[test]
    fn test_missing_quote_rejects_via_synthetic_spread() {
        let q = quote(None, None, 5000, 500);
        assert_eq!(classify_quote(&q, &thresholds()), LiquidityTier::Reject);
    }

    #[test]
    fn test_straddle_takes_worse_leg() {
        let call = quote(Some(2.00), Some(2.10), 1000, 250); // Excellent
        let put = quote(Some(1.00), Some(1.20), 1000, 250); // Reject (18% spread)
        assert_eq!(
            classify_straddle(&call, &put, &thresholds()),
            LiquidityTier::Reject
        );
    }

    #[test]
    fn test_points_table() {
        assert_eq!(LiquidityTier::Excellent.points(), 20.0);
        assert_eq!(LiquidityTier::Good.points(), 16.0);
        assert_eq!(LiquidityTier::Warning.points(), 12.0);
        assert_eq!(LiquidityTier::Reject.points(), 4.0);
    }
}
