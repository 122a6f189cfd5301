use crate::domain::liquidity::LiquidityTier;
use crate::models::CompositeScore;
use crate::settings::{ScoringSettings, VrpSettings};

/// Linear interpolation over ascending (x, y) anchors. Clamps outside the
/// anchor range; an input sitting exactly on an anchor returns its value
/// without going through the arithmetic.
fn interpolate(anchors: &[(f64, f64)], x: f64) -> f64 {
    let first = anchors[0];
    let last = anchors[anchors.len() - 1];
    if x <= first.0 {
        return first.1;
    }
    if x >= last.0 {
        return last.1;
    }
    for &(ax, ay) in anchors {
        if x == ax {
            return ay;
        }
    }
    for window in anchors.windows(2) {
        let (x0, y0) = window[0];
        let (x1, y1) = window[1];
        if x < x1 {
            return y0 + (x - x0) / (x1 - x0) * (y1 - y0);
        }
    }
    last.1
}

/// VRP subscore on the configured tier thresholds:
/// ratio = 1.0 -> 0, marginal -> 50, good -> 75, excellent -> 100.
pub fn vrp_score(ratio: Option<f64>, vrp: &VrpSettings) -> f64 {
    let ratio = match ratio {
        Some(r) if r > 0.0 => r,
        _ => return 0.0,
    };
    if ratio < 1.0 {
        return 0.0;
    }
    interpolate(
        &[
            (1.0, 0.0),
            (vrp.marginal_ratio, 50.0),
            (vrp.good_ratio, 75.0),
            (vrp.excellent_ratio, 100.0),
        ],
        ratio,
    )
}

/// Consistency subscore: 0.4 -> 50, 0.6 -> 75, >= 0.8 -> 100; below 0.4 no
/// credit at all.
pub fn consistency_score(consistency: Option<f64>) -> f64 {
    let c = match consistency {
        Some(c) => c,
        None => return 0.0,
    };
    if c < 0.4 {
        return 0.0;
    }
    interpolate(&[(0.4, 50.0), (0.6, 75.0), (0.8, 100.0)], c)
}

/// Liquidity subscore: discrete tier points rescaled to 0-100.
pub fn liquidity_score(tier: LiquidityTier) -> f64 {
    tier.points() * 5.0
}

/// Skew subscore: neutral band scores full marks, then linear decay.
/// |skew| = 0.5 lands near 50.
pub fn skew_score(skew: Option<f64>) -> f64 {
    // Missing skew data is treated as neutral rather than penalized.
    let magnitude = skew.map(f64::abs).unwrap_or(0.0);
    if magnitude <= 0.15 {
        return 100.0;
    }
    (100.0 - (magnitude - 0.15) * 150.0).max(0.0)
}

/// Weighted composite in [0, 100], rounded to one decimal.
pub fn composite_score(
    vrp_ratio: Option<f64>,
    consistency: Option<f64>,
    liquidity: LiquidityTier,
    skew: Option<f64>,
    scoring: &ScoringSettings,
    vrp: &VrpSettings,
) -> CompositeScore {
    let vrp_component = vrp_score(vrp_ratio, vrp);
    let consistency_component = consistency_score(consistency);
    let liquidity_component = liquidity_score(liquidity);
    let skew_component = skew_score(skew);

    let total = vrp_component * scoring.vrp_weight
        + consistency_component * scoring.consistency_weight
        + liquidity_component * scoring.liquidity_weight
        + skew_component * scoring.skew_weight;
    let total = (total * 10.0).round() / 10.0;

    CompositeScore {
        total,
        vrp_score: vrp_component,
        consistency_score: consistency_component,
        liquidity_score: liquidity_component,
        skew_score: skew_component,
        tradeable: total >= scoring.tradeable_threshold,
    }
}
