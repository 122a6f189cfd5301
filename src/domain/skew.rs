use crate::models::{OptionChain, OptionType, SkewBias};

/// Volatility skew around the money: put-wing IV minus call-wing IV,
/// normalized by the ATM average. Positive = puts richer (bearish demand).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SkewAnalysis {
    /// Normalized imbalance, roughly [-1, 1] for sane chains.
    pub measure: f64,
    pub bias: SkewBias,
}

const NEUTRAL_BAND: f64 = 0.15;
const WEAK_BAND: f64 = 0.35;
const MODERATE_BAND: f64 = 0.60;

/// Classify a normalized skew measure into the seven-level bias.
pub fn classify_skew(measure: f64) -> SkewBias {
    let magnitude = measure.abs();
    if magnitude <= NEUTRAL_BAND {
        return SkewBias::Neutral;
    }
    // Positive measure: puts expensive -> bearish demand
    if measure > 0.0 {
        if magnitude <= WEAK_BAND {
            SkewBias::WeakBearish
        } else if magnitude <= MODERATE_BAND {
            SkewBias::Bearish
        } else {
            SkewBias::StrongBearish
        }
    } else if magnitude <= WEAK_BAND {
        SkewBias::WeakBullish
    } else if magnitude <= MODERATE_BAND {
        SkewBias::Bullish
    } else {
        SkewBias::StrongBullish
    }
}

/// Compute skew from a chain's IV surface. Uses average put IV vs average
/// call IV across quoted strikes; `None` when the vendor sent no greeks.
pub fn analyze_chain(chain: &OptionChain) -> Option<SkewAnalysis> {
    let mut put_iv = Vec::new();
    let mut call_iv = Vec::new();

    for quote in &chain.quotes {
        if let Some(iv) = quote.implied_volatility {
            if iv > 0.0 {
                match quote.option_type {
                    OptionType::Put => put_iv.push(iv),
                    OptionType::Call => call_iv.push(iv),
                }
            }
        }
    }

    if put_iv.is_empty() || call_iv.is_empty() {
        return None;
    }

    let put_avg = put_iv.iter().sum::<f64>() / put_iv.len() as f64;
    let call_avg = call_iv.iter().sum::<f64>() / call_iv.len() as f64;
    let base = (put_avg + call_avg) / 2.0;
    if base <= 0.0 {
        return None;
    }

    let measure = (put_avg - call_avg) / base;
    Some(SkewAnalysis {
        measure,
        bias: classify_skew(measure),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{OptionQuote, Ticker};

    #[test]
    fn test_classify_bands() {
        assert_eq!(classify_skew(0.0), SkewBias::Neutral);
        assert_eq!(classify_skew(0.15), SkewBias::Neutral);
        assert_eq!(classify_skew(0.25), SkewBias::WeakBearish);
        assert_eq!(classify_skew(-0.25), SkewBias::WeakBullish);
        assert_eq!(classify_skew(0.5), SkewBias::Bearish);
        assert_eq!(classify_skew(-0.5), SkewBias::Bullish);
        assert_eq!(classify_skew(0.8), SkewBias::StrongBearish);
        assert_eq!(classify_skew(-0.8), SkewBias::StrongBullish);
    }

    fn iv_quote(option_type: OptionType, iv: f64) -> OptionQuote {
        OptionQuote {
            strike: 100.0,
            option_type,
            bid: Some(1.0),
            ask: Some(1.1),
            open_interest: 100,
            volume: 50,
            implied_volatility: Some(iv),
        }
    }

    #[test]
    fn test_analyze_chain_detects_put_richness() {
        let chain = OptionChain {
            ticker: Ticker::new("XYZ").unwrap(),
            expiration: "2026-08-21".parse().unwrap(),
            underlying_price: 100.0,
            quotes: vec![
                iv_quote(OptionType::Put, 60.0),
                iv_quote(OptionType::Call, 40.0),
            ],
        };
        let analysis = analyze_chain(&chain).unwrap();
        assert!(analysis.measure > 0.0);
        assert!(analysis.bias.is_bearish());
    }

    #[test]
    fn test_analyze_chain_without_greeks() {
        let chain = OptionChain {
            ticker: Ticker::new("XYZ").unwrap(),
            expiration: "2026-08-21".parse().unwrap(),
            underlying_price: 100.0,
            quotes: vec![OptionQuote {
                strike: 100.0,
                option_type: OptionType::Call,
                bid: Some(1.0),
                ask: Some(1.1),
                open_interest: 100,
                volume: 50,
                implied_volatility: None,
            }],
        };
        assert!(analyze_chain(&chain).is_none());
    }
}
