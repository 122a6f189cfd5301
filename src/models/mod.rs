pub mod earnings;
pub mod historical_move;
pub mod options;
pub mod scoring;
pub mod sentiment;
pub mod ticker;
pub mod vrp;

pub use earnings::{EarningsEvent, EarningsTiming};
pub use historical_move::HistoricalMove;
pub use options::{ImpliedMove, OptionChain, OptionQuote, OptionType};
pub use scoring::{AdjustedBias, CompositeScore, DirectionAdjustment, DirectionRule, SkewBias};
pub use sentiment::{
    ActualDirection, SentimentDirection, SentimentRecord, SentimentSource, TradeOutcome,
};
pub use ticker::Ticker;
pub use vrp::{VrpResult, VrpTier};
