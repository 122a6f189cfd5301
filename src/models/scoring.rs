use serde::{Deserialize, Serialize};

/// Directional bias from option-chain volatility skew, seven levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkewBias {
    StrongBearish,
    Bearish,
    WeakBearish,
    Neutral,
    WeakBullish,
    Bullish,
    StrongBullish,
}

impl SkewBias {
    pub fn is_bullish(&self) -> bool {
        matches!(
            self,
            SkewBias::WeakBullish | SkewBias::Bullish | SkewBias::StrongBullish
        )
    }

    pub fn is_bearish(&self) -> bool {
        matches!(
            self,
            SkewBias::WeakBearish | SkewBias::Bearish | SkewBias::StrongBearish
        )
    }

    pub fn is_neutral(&self) -> bool {
        *self == SkewBias::Neutral
    }
}

/// Five-level bias after sentiment adjustment. Weak variants collapse into
/// their plain counterpart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdjustedBias {
    StrongBullish,
    Bullish,
    Neutral,
    Bearish,
    StrongBearish,
}

impl AdjustedBias {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdjustedBias::StrongBullish => "strong_bullish",
            AdjustedBias::Bullish => "bullish",
            AdjustedBias::Neutral => "neutral",
            AdjustedBias::Bearish => "bearish",
            AdjustedBias::StrongBearish => "strong_bearish",
        }
    }

    pub fn is_bullish(&self) -> bool {
        matches!(self, AdjustedBias::Bullish | AdjustedBias::StrongBullish)
    }

    pub fn is_bearish(&self) -> bool {
        matches!(self, AdjustedBias::Bearish | AdjustedBias::StrongBearish)
    }
}

/// Which of the three direction rules fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DirectionRule {
    TiebreakBullish,
    TiebreakBearish,
    BothNeutral,
    ConflictHedge,
    SkewDominates,
}

/// Result of sentiment-adjusted direction calculation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectionAdjustment {
    pub original_bias: SkewBias,
    pub sentiment_score: f64,
    pub adjusted_bias: AdjustedBias,
    pub rule_applied: DirectionRule,
    /// 0-1, higher = more confident in the adjustment.
    pub confidence: f64,
    /// Contrarian sizing: 0.9 for strong bullish, 1.1 for strong bearish.
    pub size_modifier: f64,
}

impl DirectionAdjustment {
    /// Flag when sentiment is very bullish; correlates with larger tail moves.
    pub fn high_bullish_warning(&self) -> bool {
        self.sentiment_score >= 0.7
    }
}

/// Composite 0-100 score with its subcomponents kept for display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositeScore {
    pub total: f64,
    pub vrp_score: f64,
    pub consistency_score: f64,
    pub liquidity_score: f64,
    pub skew_score: f64,
    pub tradeable: bool,
}
