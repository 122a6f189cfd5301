use serde::{Deserialize, Serialize};

/// Quality tier for a VRP opportunity. Thresholds live in configuration,
/// not here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VrpTier {
    Excellent,
    Good,
    Marginal,
    Skip,
}

impl VrpTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            VrpTier::Excellent => "excellent",
            VrpTier::Good => "good",
            VrpTier::Marginal => "marginal",
            VrpTier::Skip => "skip",
        }
    }
}

/// Output of the VRP engine: implied move vs historical mean.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VrpResult {
    /// implied_move_pct / historical_mean_pct; 0.0 when skipped.
    pub ratio: f64,
    pub tier: VrpTier,
    /// max(0, ratio - 1.0): linear edge above break-even.
    pub edge_score: f64,
    pub recommendation: String,
}

impl VrpResult {
    pub fn skip(reason: impl Into<String>) -> Self {
        Self {
            ratio: 0.0,
            tier: VrpTier::Skip,
            edge_score: 0.0,
            recommendation: reason.into(),
        }
    }
}
