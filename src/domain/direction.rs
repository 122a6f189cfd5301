//! Sentiment-adjusted directional bias.
//!
//! Three rules cover the real cases:
//! 1. Neutral skew: sentiment breaks the tie.
//! 2. Skew and sentiment conflict: collapse to neutral (hedge).
//! 3. Otherwise the skew bias stands.
//!
//! Position sizing is contrarian: strong bullish sentiment correlates with
//! larger moves (reduce size), strong bearish with smaller moves (increase).

use crate::models::{AdjustedBias, DirectionAdjustment, DirectionRule, SentimentDirection, SkewBias};

const SENTIMENT_BULLISH_THRESHOLD: f64 = 0.2;
const SENTIMENT_BEARISH_THRESHOLD: f64 = -0.2;
const CONFIDENCE_DIVISOR: f64 = 0.5;
const STRONG_BULLISH_THRESHOLD: f64 = 0.5;
const STRONG_BEARISH_THRESHOLD: f64 = -0.5;
const SIZE_MODIFIER_BULLISH: f64 = 0.90;
const SIZE_MODIFIER_BEARISH: f64 = 1.10;

/// Contrarian position-sizing modifier from the sentiment score.
pub fn size_modifier(sentiment_score: f64) -> f64 {
    if sentiment_score >= STRONG_BULLISH_THRESHOLD {
        SIZE_MODIFIER_BULLISH
    } else if sentiment_score <= STRONG_BEARISH_THRESHOLD {
        SIZE_MODIFIER_BEARISH
    } else {
        1.0
    }
}

/// Collapse the seven-level skew bias to the five-level adjusted scale.
/// Weak variants count as their plain direction for conflict detection.
fn normalize_skew(skew: SkewBias) -> AdjustedBias {
    match skew {
        SkewBias::StrongBullish => AdjustedBias::StrongBullish,
        SkewBias::Bullish | SkewBias::WeakBullish => AdjustedBias::Bullish,
        SkewBias::Neutral => AdjustedBias::Neutral,
        SkewBias::Bearish | SkewBias::WeakBearish => AdjustedBias::Bearish,
        SkewBias::StrongBearish => AdjustedBias::StrongBearish,
    }
}

fn sentiment_direction_from(score: f64, explicit: Option<SentimentDirection>) -> SentimentDirection {
    if let Some(direction) = explicit {
        if direction != SentimentDirection::Unknown {
            return direction;
        }
    }
    if score >= SENTIMENT_BULLISH_THRESHOLD {
        SentimentDirection::Bullish
    } else if score <= SENTIMENT_BEARISH_THRESHOLD {
        SentimentDirection::Bearish
    } else {
        SentimentDirection::Neutral
    }
}

fn confidence(
    sentiment_score: f64,
    rule: DirectionRule,
    sentiment_direction: SentimentDirection,
    normalized: AdjustedBias,
) -> f64 {
    let strength = (sentiment_score.abs() / CONFIDENCE_DIVISOR).min(1.0);

    match rule {
        DirectionRule::BothNeutral => 0.3 + strength * 0.2,
        DirectionRule::TiebreakBullish
        | DirectionRule::TiebreakBearish
        | DirectionRule::ConflictHedge => strength,
        DirectionRule::SkewDominates => {
            let aligns = (normalized.is_bullish()
                && sentiment_direction == SentimentDirection::Bullish)
                || (normalized.is_bearish() && sentiment_direction == SentimentDirection::Bearish);
            if aligns {
                (0.6 + strength * 0.4).min(1.0)
            } else {
                0.6
            }
        }
    }
}

/// Adjust a skew-derived bias using the sentiment signal.
pub fn adjust_direction(
    skew_bias: SkewBias,
    sentiment_score: f64,
    sentiment_direction: Option<SentimentDirection>,
) -> DirectionAdjustment {
    let normalized = normalize_skew(skew_bias);
    let sent_dir = sentiment_direction_from(sentiment_score, sentiment_direction);

    // Rule 1: neutral skew, sentiment breaks the tie
    if normalized == AdjustedBias::Neutral {
        let (rule, adjusted) = match sent_dir {
            SentimentDirection::Bullish => (DirectionRule::TiebreakBullish, AdjustedBias::Bullish),
            SentimentDirection::Bearish => (DirectionRule::TiebreakBearish, AdjustedBias::Bearish),
            _ => (DirectionRule::BothNeutral, AdjustedBias::Neutral),
        };
        return DirectionAdjustment {
            original_bias: skew_bias,
            sentiment_score,
            adjusted_bias: adjusted,
            rule_applied: rule,
            confidence: confidence(sentiment_score, rule, sent_dir, normalized),
            size_modifier: size_modifier(sentiment_score),
        };
    }

    // Rule 2: conflict, go neutral
    let conflict = (normalized.is_bullish() && sent_dir == SentimentDirection::Bearish)
        || (normalized.is_bearish() && sent_dir == SentimentDirection::Bullish);
    if conflict {
        let rule = DirectionRule::ConflictHedge;
        return DirectionAdjustment {
            original_bias: skew_bias,
            sentiment_score,
            adjusted_bias: AdjustedBias::Neutral,
            rule_applied: rule,
            confidence: confidence(sentiment_score, rule, sent_dir, normalized),
            size_modifier: size_modifier(sentiment_score),
        };
    }

    // Rule 3: skew stands
    let rule = DirectionRule::SkewDominates;
    DirectionAdjustment {
        original_bias: skew_bias,
        sentiment_score,
        adjusted_bias: normalized,
        rule_applied: rule,
        confidence: confidence(sentiment_score, rule, sent_dir, normalized),
        size_modifier: size_modifier(sentiment_score),
    }
}

/// Final direction when one or both inputs may be missing.
pub fn resolve_direction(
    skew_bias: Option<SkewBias>,
    sentiment_score: Option<f64>,
    sentiment_direction: Option<SentimentDirection>,
) -> AdjustedBias {
    match (skew_bias, sentiment_score) {
        (None, Some(score)) => {
            match sentiment_direction_from(score, sentiment_direction) {
                SentimentDirection::Bullish => AdjustedBias::Bullish,
                SentimentDirection::Bearish => AdjustedBias::Bearish,
                _ => AdjustedBias::Neutral,
            }
        }
        (None, None) => AdjustedBias::Neutral,
        (Some(skew), None) => match sentiment_direction {
            Some(_) => adjust_direction(skew, 0.0, sentiment_direction).adjusted_bias,
            None => normalize_skew(skew),
        },
        (Some(skew), Some(score)) => {
            adjust_direction(skew, score, sentiment_direction).adjusted_bias
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule1_neutral_skew_sentiment_breaks_tie() {
        let adj = adjust_direction(SkewBias::Neutral, 0.4, None);
        assert_eq!(adj.adjusted_bias, AdjustedBias::Bullish);
        assert_eq!(adj.rule_applied, DirectionRule::TiebreakBullish);

        let adj = adjust_direction(SkewBias::Neutral, -0.4, None);
        assert_eq!(adj.adjusted_bias, AdjustedBias::Bearish);
        assert_eq!(adj.rule_applied, DirectionRule::TiebreakBearish);

        let adj = adjust_direction(SkewBias::Neutral, 0.1, None);
        assert_eq!(adj.adjusted_bias, AdjustedBias::Neutral);
        assert_eq!(adj.rule_applied, DirectionRule::BothNeutral);
    }

    #[test]
    fn test_rule1_threshold_is_inclusive() {
        assert_eq!(
            adjust_direction(SkewBias::Neutral, 0.2, None).adjusted_bias,
            AdjustedBias::Bullish
        );
        assert_eq!(
            adjust_direction(SkewBias::Neutral, -0.2, None).adjusted_bias,
            AdjustedBias::Bearish
        );
    }

    #[test]
    fn test_rule2_conflict_hedges_to_neutral() {
        let adj = adjust_direction(SkewBias::Bullish, -0.5, None);
        assert_eq!(adj.adjusted_bias, AdjustedBias::Neutral);
        assert_eq!(adj.rule_applied, DirectionRule::ConflictHedge);

        let adj = adjust_direction(SkewBias::Bearish, 0.5, None);
        assert_eq!(adj.adjusted_bias, AdjustedBias::Neutral);
        assert_eq!(adj.rule_applied, DirectionRule::ConflictHedge);
    }

    #[test]
    fn test_rule2_weak_skew_still_conflicts() {
        let adj = adjust_direction(SkewBias::WeakBullish, -0.3, None);
        assert_eq!(adj.adjusted_bias, AdjustedBias::Neutral);
        assert_eq!(adj.rule_applied, DirectionRule::ConflictHedge);
    }

    #[test]
    fn test_rule3_skew_dominates_when_aligned_or_mild() {
        let adj = adjust_direction(SkewBias::StrongBullish, 0.6, None);
        assert_eq!(adj.adjusted_bias, AdjustedBias::StrongBullish);
        assert_eq!(adj.rule_applied, DirectionRule::SkewDominates);
        assert!(adj.confidence > 0.9);

        let adj = adjust_direction(SkewBias::Bearish, 0.0, None);
        assert_eq!(adj.adjusted_bias, AdjustedBias::Bearish);
        assert_eq!(adj.confidence, 0.6);
    }

    #[test]
    fn test_explicit_direction_overrides_score() {
        let adj = adjust_direction(SkewBias::Neutral, 0.0, Some(SentimentDirection::Bullish));
        assert_eq!(adj.adjusted_bias, AdjustedBias::Bullish);
    }

    #[test]
    fn test_size_modifier_thresholds() {
        assert_eq!(size_modifier(0.5), 0.90);
        assert_eq!(size_modifier(0.8), 0.90);
        assert_eq!(size_modifier(-0.5), 1.10);
        assert_eq!(size_modifier(-0.9), 1.10);
        assert_eq!(size_modifier(0.49), 1.0);
        assert_eq!(size_modifier(-0.49), 1.0);
        assert_eq!(size_modifier(0.0), 1.0);
    }

    #[test]
    fn test_high_bullish_warning_fires_at_070() {
        let warm = adjust_direction(SkewBias::Bullish, 0.7, None);
        assert!(warm.high_bullish_warning());

        let mild = adjust_direction(SkewBias::Bullish, 0.69, None);
        assert!(!mild.high_bullish_warning());
    }

    #[test]
    fn test_confidence_scales_with_sentiment_strength() {
        let weak = adjust_direction(SkewBias::Neutral, 0.25, None);
        let strong = adjust_direction(SkewBias::Neutral, 0.5, None);
        assert!(strong.confidence > weak.confidence);
        assert_eq!(strong.confidence, 1.0);
    }

    #[test]
    fn test_resolve_direction_with_missing_inputs() {
        assert_eq!(resolve_direction(None, None, None), AdjustedBias::Neutral);
        assert_eq!(
            resolve_direction(None, Some(0.4), None),
            AdjustedBias::Bullish
        );
        assert_eq!(
            resolve_direction(Some(SkewBias::Bearish), None, None),
            AdjustedBias::Bearish
        );
        assert_eq!(
            resolve_direction(Some(SkewBias::Bullish), Some(-0.6), None),
            AdjustedBias::Neutral
        );
    }
}
