use crate::models::{ImpliedMove, OptionChain, OptionType};

/// Derive the implied move from the ATM straddle of a chain.
///
/// Returns `None` when the chain has no usable ATM straddle (missing legs,
/// missing quotes, non-positive underlying).
pub fn implied_move_from_chain(chain: &OptionChain) -> Option<ImpliedMove> {
    if chain.underlying_price <= 0.0 {
        return None;
    }

    let atm_strike = chain.atm_strike()?;
    let call_mid = chain.quote_at(atm_strike, OptionType::Call)?.mid()?;
    let put_mid = chain.quote_at(atm_strike, OptionType::Put)?.mid()?;

    let straddle_cost = call_mid + put_mid;
    if straddle_cost <= 0.0 {
        return None;
    }

    let implied_move_pct = straddle_cost / chain.underlying_price * 100.0;

    Some(ImpliedMove {
        ticker: chain.ticker.clone(),
        expiration: chain.expiration,
        atm_strike,
        call_mid,
        put_mid,
        straddle_cost,
        implied_move_pct,
        upper_bound: chain.underlying_price + straddle_cost,
        lower_bound: chain.underlying_price - straddle_cost,
    })
}

/// Use the real implied move when available; otherwise fall back to the
/// historical mean as a surrogate. The flag tells callers whether live
/// options priced the move.
pub fn implied_move_with_fallback(
    real: Option<&ImpliedMove>,
    historical_mean_pct: f64,
) -> (f64, bool) {
    match real {
        Some(im) => (im.implied_move_pct, true),
        None => (historical_mean_pct, false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{OptionQuote, Ticker};

    fn quote(strike: f64, option_type: OptionType, bid: f64, ask: f64) -> OptionQuote {
        OptionQuote {
            strike,
            option_type,
            bid: Some(bid),
            ask: Some(ask),
            open_interest: 1000,
            volume: 200,
            implied_volatility: Some(50.0),
        }
    }

    fn chain(underlying: f64) -> OptionChain {
        OptionChain {
            ticker: Ticker::new("NVDA").unwrap(),
            expiration: "2026-08-21".parse().unwrap(),
            underlying_price: underlying,
            quotes: vec![
                quote(95.0, OptionType::Call, 7.0, 7.2),
                quote(95.0, OptionType::Put, 1.4, 1.5),
                quote(100.0, OptionType::Call, 3.9, 4.1),
                quote(100.0, OptionType::Put, 3.9, 4.1),
                quote(105.0, OptionType::Call, 1.4, 1.5),
                quote(105.0, OptionType::Put, 7.0, 7.2),
            ],
        }
    }

    #[test]
    fn test_implied_move_from_atm_straddle() {
        let im = implied_move_from_chain(&chain(100.0)).unwrap();
        assert_eq!(im.atm_strike, 100.0);
        // straddle = 4.0 + 4.0 = 8.0 -> 8% of 100
        assert!((im.straddle_cost - 8.0).abs() < 1e-9);
        assert!((im.implied_move_pct - 8.0).abs() < 1e-9);
        assert!((im.upper_bound - 108.0).abs() < 1e-9);
        assert!((im.lower_bound - 92.0).abs() < 1e-9);
    }

    #[test]
    fn test_missing_leg_returns_none() {
        let mut c = chain(100.0);
        c.quotes.retain(|q| q.option_type == OptionType::Call);
        assert!(implied_move_from_chain(&c).is_none());
    }

    #[test]
    fn test_empty_chain_returns_none() {
        let mut c = chain(100.0);
        c.quotes.clear();
        assert!(implied_move_from_chain(&c).is_none());
    }

    #[test]
    fn test_fallback_marks_surrogate() {
        let im = implied_move_from_chain(&chain(100.0)).unwrap();
        assert_eq!(implied_move_with_fallback(Some(&im), 5.0), (8.0, true));
        assert_eq!(implied_move_with_fallback(None, 5.0), (5.0, false));
    }
}
