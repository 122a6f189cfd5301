use crate::models::{VrpResult, VrpTier};
use crate::settings::VrpSettings;

/// Volatility Risk Premium: how rich the option-implied move is versus the
/// ticker's realized earnings history.
///
/// Pure function: no I/O, no clock, identical output for identical input.
pub fn calculate_vrp(
    implied_move_pct: f64,
    historical_moves: &[f64],
    config: &VrpSettings,
) -> VrpResult {
    if historical_moves.len() < config.min_moves {
        return VrpResult::skip(format!(
            "insufficient history: {} moves, need {}",
            historical_moves.len(),
            config.min_moves
        ));
    }
    if implied_move_pct <= 0.0 {
        return VrpResult::skip("implied move must be positive");
    }

    let mean = historical_moves.iter().sum::<f64>() / historical_moves.len() as f64;
    if mean <= 0.0 {
        return VrpResult::skip("historical mean is not positive");
    }

    let ratio = implied_move_pct / mean;
    let tier = classify_ratio(ratio, config);
    let edge_score = (ratio - 1.0).max(0.0);

    let recommendation = match tier {
        VrpTier::Excellent => format!("{:.1}x premium over {:.1}% average move", ratio, mean),
        VrpTier::Good => format!("{:.1}x premium, solid edge", ratio),
        VrpTier::Marginal => format!("{:.1}x premium, thin edge", ratio),
        VrpTier::Skip => format!("{:.1}x premium below threshold", ratio),
    };

    VrpResult {
        ratio,
        tier,
        edge_score,
        recommendation,
    }
}

fn classify_ratio(ratio: f64, config: &VrpSettings) -> VrpTier {
    if ratio >= config.excellent_ratio {
        VrpTier::Excellent
    } else if ratio >= config.good_ratio {
        VrpTier::Good
    } else if ratio >= config.marginal_ratio {
        VrpTier::Marginal
    } else {
        VrpTier::Skip
    }
}

/// How tightly the historical moves cluster around their mean, in [0, 1].
/// 1 - coefficient of variation, floored at zero.
pub fn consistency_from_moves(historical_moves: &[f64]) -> Option<f64> {
    if historical_moves.len() < 2 {
        return None;
    }
    let n = historical_moves.len() as f64;
    let mean = historical_moves.iter().sum::<f64>() / n;
    if mean <= 0.0 {
        return None;
    }
    let variance = historical_moves
        .iter()
        .map(|m| (m - mean).powi(2))
        .sum::<f64>()
        / n;
    let cv = variance.sqrt() / mean;
    Some((1.0 - cv).clamp(0.0, 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> VrpSettings {
        VrpSettings::default()
    }

    #[test]
    fn test_insufficient_history_skips() {
        let result = calculate_vrp(10.0, &[5.0, 4.0, 6.0], &config());
        assert_eq!(result.tier, VrpTier::Skip);
        assert_eq!(result.ratio, 0.0);
        assert_eq!(result.edge_score, 0.0);
        assert!(result.recommendation.contains("insufficient history"));
    }

    #[test]
    fn test_ratio_and_edge() {
        // mean = 5.0, implied = 10.0 -> ratio 2.0
        let result = calculate_vrp(10.0, &[4.0, 5.0, 6.0, 5.0], &config());
        assert!((result.ratio - 2.0).abs() < 1e-9);
        assert!((result.edge_score - 1.0).abs() < 1e-9);
        assert_eq!(result.tier, VrpTier::Excellent);
    }

    #[test]
    fn test_tier_boundaries() {
        let history = [5.0, 5.0, 5.0, 5.0]; // mean 5.0
        let tier_of = |implied: f64| calculate_vrp(implied, &history, &config()).tier;

        assert_eq!(tier_of(10.0), VrpTier::Excellent); // ratio 2.0
        assert_eq!(tier_of(9.99), VrpTier::Good); // just under 2.0
        assert_eq!(tier_of(7.5), VrpTier::Good); // ratio 1.5
        assert_eq!(tier_of(7.49), VrpTier::Marginal); // just under 1.5
        assert_eq!(tier_of(6.0), VrpTier::Marginal); // ratio 1.2
        assert_eq!(tier_of(5.99), VrpTier::Skip); // just under 1.2
    }

    #[test]
    fn test_non_positive_inputs_skip() {
        let history = [5.0, 5.0, 5.0, 5.0];
        assert_eq!(calculate_vrp(0.0, &history, &config()).tier, VrpTier::Skip);
        assert_eq!(calculate_vrp(-1.0, &history, &config()).tier, VrpTier::Skip);
    }

    #[test]
    fn test_deterministic() {
        let history = [3.2, 4.8, 5.1, 6.3, 4.4];
        let a = calculate_vrp(8.7, &history, &config());
        let b = calculate_vrp(8.7, &history, &config());
        assert_eq!(a, b);
    }

    #[test]
    fn test_consistency_tight_cluster_is_high() {
        let tight = consistency_from_moves(&[5.0, 5.1, 4.9, 5.0]).unwrap();
        let loose = consistency_from_moves(&[1.0, 9.0, 2.0, 8.0]).unwrap();
        assert!(tight > 0.9);
        assert!(loose < tight);
    }

    #[test]
    fn test_consistency_needs_two_points() {
        assert!(consistency_from_moves(&[5.0]).is_none());
        assert!(consistency_from_moves(&[]).is_none());
    }
}
