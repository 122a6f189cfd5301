use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::domain::direction::{adjust_direction, resolve_direction};
use crate::domain::implied_move::{implied_move_from_chain, implied_move_with_fallback};
use crate::domain::liquidity::{classify_straddle, LiquidityTier};
use crate::domain::{scoring, skew, vrp};
use crate::models::{
    AdjustedBias, CompositeScore, DirectionAdjustment, ImpliedMove, OptionType, SentimentRecord,
    SkewBias, Ticker, VrpResult, VrpTier,
};
use crate::external::options_data::OptionsDataProvider;
use crate::external::sentiment_provider::SentimentProvider;
use crate::services::budget_tracker::BudgetVerdict;
use crate::services::circuit_breaker::BreakerError;
use crate::services::clock::Clock;
use crate::services::job_scheduler_service::JobContext;
use crate::services::moves_store::MovesStore;
use crate::services::sentiment_store::SentimentStore;

/// One (ticker, earnings date) pair entering the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Candidate {
    pub ticker: Ticker,
    pub earnings_date: NaiveDate,
}

/// Everything learned about one candidate from the options leg.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VrpEvaluation {
    pub vrp: VrpResult,
    pub implied_move_pct: f64,
    /// False when the implied move fell back to the historical mean.
    pub used_real_options: bool,
    pub historical_mean: f64,
    pub historical_count: usize,
    pub consistency: Option<f64>,
    pub skew_measure: Option<f64>,
    pub skew_bias: Option<SkewBias>,
    pub liquidity: Option<LiquidityTier>,
    pub atm_iv: Option<f64>,
}

/// A fully scored digest row.
#[derive(Debug, Clone)]
pub struct DigestEntry {
    pub ticker: Ticker,
    pub earnings_date: NaiveDate,
    pub evaluation: VrpEvaluation,
    pub sentiment: Option<SentimentRecord>,
    pub score: CompositeScore,
    pub direction: DirectionAdjustment,
}

impl DigestEntry {
    pub fn adjusted_bias(&self) -> AdjustedBias {
        self.direction.adjusted_bias
    }
}

#[derive(Debug, Default)]
pub struct PipelineOutcome {
    pub entries: Vec<DigestEntry>,
    pub evaluated: usize,
    pub skipped_insufficient_history: usize,
    pub below_floor: usize,
    pub sentiment_cache_hits: usize,
    pub paid_sentiment_calls: usize,
    pub failed_tickers: Vec<String>,
}

/// Full VRP evaluation for one ticker: history gate, rate-limited and
/// breaker-guarded chain fetch, implied-move fallback, VRP computation.
///
/// Returns `None` when the ticker has too little history to be analyzable.
/// A vendor failure is not an error here; it degrades to the historical
/// mean with `used_real_options = false`.
pub async fn evaluate_vrp(
    ctx: &JobContext,
    ticker: &Ticker,
    earnings_date: NaiveDate,
) -> Result<Option<VrpEvaluation>, sqlx::Error> {
    let min_moves = ctx.settings.vrp.min_moves;
    let pcts = ctx.moves.move_pcts(ticker).await?;
    if pcts.len() < min_moves {
        return Ok(None);
    }
    let historical_mean = pcts.iter().sum::<f64>() / pcts.len() as f64;

    let implied = fetch_real_implied_move(ctx, ticker, earnings_date).await;

    let (implied_move_pct, used_real_options) =
        implied_move_with_fallback(implied.as_ref().map(|(im, _)| im), historical_mean);

    let (skew_measure, skew_bias, liquidity, atm_iv) = match &implied {
        Some((im, chain)) => {
            let analysis = skew::analyze_chain(chain);
            let liquidity = chain
                .quote_at(im.atm_strike, OptionType::Call)
                .zip(chain.quote_at(im.atm_strike, OptionType::Put))
                .map(|(call, put)| classify_straddle(call, put, &ctx.settings.liquidity));
            let atm_iv = chain
                .quote_at(im.atm_strike, OptionType::Call)
                .and_then(|q| q.implied_volatility);
            (
                analysis.map(|a| a.measure),
                analysis.map(|a| a.bias),
                liquidity,
                atm_iv,
            )
        }
        None => (None, None, None, None),
    };

    let vrp_result = vrp::calculate_vrp(implied_move_pct, &pcts, &ctx.settings.vrp);

    Ok(Some(VrpEvaluation {
        vrp: vrp_result,
        implied_move_pct,
        used_real_options,
        historical_mean,
        historical_count: pcts.len(),
        consistency: vrp::consistency_from_moves(&pcts),
        skew_measure,
        skew_bias,
        liquidity,
        atm_iv,
    }))
}

/// Fetch the chain nearest the earnings date and derive the implied move.
/// Cached briefly; guarded by the options rate limiter and circuit breaker.
/// Any refusal or failure surfaces as `None`.
async fn fetch_real_implied_move(
    ctx: &JobContext,
    ticker: &Ticker,
    earnings_date: NaiveDate,
) -> Option<(ImpliedMove, crate::models::OptionChain)> {
    let cache_key = format!("option_chain:{}:{}", ticker, earnings_date);
    let cached: Option<crate::models::OptionChain> = ctx.cache.get_json(&cache_key).await;

    let chain = match cached {
        Some(chain) => chain,
        None => {
            // Cancellation is observable at the limiter and the HTTP call.
            tokio::select! {
                _ = ctx.cancel.cancelled() => return None,
                _ = ctx.options_limiter.acquire(1) => {}
            }

            let result = ctx
                .options_breaker
                .call(|| async {
                    let expirations = ctx.options_provider.get_expirations(ticker).await?;
                    let expiration = expirations
                        .into_iter()
                        .filter(|d| *d >= earnings_date)
                        .min()
                        .ok_or_else(|| {
                            crate::external::VendorError::no_data(format!(
                                "no expiration on or after {}",
                                earnings_date
                            ))
                        })?;
                    ctx.options_provider.get_option_chain(ticker, expiration).await
                })
                .await;

            match result {
                Ok(chain) => {
                    ctx.cache
                        .set_json(
                            &cache_key,
                            &chain,
                            chrono::Duration::seconds(ctx.settings.cache.option_chain_ttl_secs),
                        )
                        .await;
                    chain
                }
                Err(BreakerError::Open(name)) => {
                    tracing::warn!(%ticker, breaker = name, "Options circuit open; using historical fallback");
                    return None;
                }
                Err(BreakerError::Inner(e)) => {
                    tracing::warn!(%ticker, error = %e, "Option chain fetch failed; using historical fallback");
                    return None;
                }
            }
        }
    };

    let implied = implied_move_from_chain(&chain)?;
    Some((implied, chain))
}

/// Sentiment for one candidate: hot cache first, then providers in priority
/// order under the budget gate. Paid providers are skipped when the budget
/// is exhausted; free ones still run. Returns the record plus whether a
/// paid call was spent.
async fn enrich_sentiment(
    ctx: &JobContext,
    candidate: &Candidate,
    evaluation: &VrpEvaluation,
) -> (Option<SentimentRecord>, bool, bool) {
    match ctx
        .sentiment_store
        .hot_get(&candidate.ticker, candidate.earnings_date)
        .await
    {
        Ok(Some(record)) => return (Some(record), true, false),
        Ok(None) => {}
        Err(e) => {
            tracing::warn!(ticker = %candidate.ticker, error = %e, "Sentiment hot-cache read failed");
        }
    }

    for provider in &ctx.sentiment_providers {
        let paid = provider.cost_per_call() > 0.0;

        if paid {
            let verdict = ctx.budget.can_call().await;
            match &verdict {
                BudgetVerdict::Exhausted(reason) => {
                    tracing::info!(
                        ticker = %candidate.ticker,
                        %reason,
                        "Budget exhausted; skipping paid sentiment"
                    );
                    continue;
                }
                BudgetVerdict::Warn(status) => {
                    tracing::warn!(%status, "Sentiment budget nearing daily ceiling");
                }
                BudgetVerdict::Ok(_) => {}
            }
        }

        tokio::select! {
            _ = ctx.cancel.cancelled() => return (None, false, false),
            _ = ctx.sentiment_limiter.acquire(1) => {}
        }

        let fetched = ctx
            .sentiment_breaker
            .call(|| provider.fetch(&candidate.ticker, candidate.earnings_date))
            .await;

        match fetched {
            Ok(analysis) => {
                let record = SentimentRecord {
                    ticker: candidate.ticker.clone(),
                    earnings_date: candidate.earnings_date,
                    collected_at: ctx.clock.now_utc(),
                    source: provider.source(),
                    sentiment_text: analysis.raw_text,
                    sentiment_score: Some(analysis.score),
                    sentiment_direction: analysis.direction,
                    vrp_ratio: Some(evaluation.vrp.ratio),
                    implied_move_pct: Some(evaluation.implied_move_pct),
                    actual_move_pct: None,
                    actual_direction: None,
                    prediction_correct: None,
                    trade_outcome: None,
                };

                if let Err(e) = ctx.sentiment_store.record_sentiment(&record).await {
                    tracing::error!(ticker = %candidate.ticker, error = %e, "Failed to persist sentiment");
                }
                if paid {
                    if let Err(e) = ctx.budget.record_call(provider.cost_per_call()).await {
                        tracing::error!(error = %e, "Failed to record paid call against budget");
                    }
                }
                return (Some(record), false, paid);
            }
            Err(BreakerError::Open(name)) => {
                tracing::warn!(ticker = %candidate.ticker, breaker = name, "Sentiment circuit open");
            }
            Err(BreakerError::Inner(e)) => {
                tracing::warn!(ticker = %candidate.ticker, error = %e, "Sentiment fetch failed");
            }
        }
    }

    (None, false, false)
}

/// The single code path behind every digest-style job: evaluate, filter by
/// VRP floor, enrich the top of the book under the budget, score, rank,
/// truncate.
pub async fn build_digest(ctx: &JobContext, candidates: Vec<Candidate>) -> PipelineOutcome {
    let mut outcome = PipelineOutcome::default();
    let mut survivors: Vec<(Candidate, VrpEvaluation)> = Vec::new();

    for candidate in candidates {
        if ctx.cancel.is_cancelled() {
            break;
        }

        match evaluate_vrp(ctx, &candidate.ticker, candidate.earnings_date).await {
            Ok(Some(evaluation)) => {
                outcome.evaluated += 1;
                if evaluation.vrp.tier == VrpTier::Skip
                    || evaluation.vrp.ratio < ctx.settings.pipeline.vrp_ratio_floor
                {
                    outcome.below_floor += 1;
                    continue;
                }
                survivors.push((candidate, evaluation));
            }
            Ok(None) => {
                outcome.skipped_insufficient_history += 1;
            }
            Err(e) => {
                tracing::warn!(ticker = %candidate.ticker, error = %e, "Candidate evaluation failed");
                outcome.failed_tickers.push(candidate.ticker.to_string());
            }
        }
    }

    // Strongest signals first; only the top of the book gets sentiment.
    survivors.sort_by(|a, b| {
        b.1.vrp
            .ratio
            .partial_cmp(&a.1.vrp.ratio)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    // K = remaining daily budget capped by config. With a free provider in
    // the list the cap alone governs, since those calls cost nothing.
    let remaining_budget = match ctx.budget.status_summary().await {
        Ok(summary) => (summary.daily_ceiling - summary.calls_today).max(0) as usize,
        Err(_) => 0,
    };
    let cap = ctx.settings.pipeline.max_sentiment_calls;
    let has_free_provider = ctx
        .sentiment_providers
        .iter()
        .any(|p| p.cost_per_call() <= 0.0);
    let enrich_limit = if has_free_provider {
        cap
    } else {
        cap.min(remaining_budget)
    };

    let mut entries = Vec::new();
    for (index, (candidate, evaluation)) in survivors.into_iter().enumerate() {
        if ctx.cancel.is_cancelled() {
            break;
        }

        let (sentiment, cache_hit, paid) = if index < enrich_limit {
            enrich_sentiment(ctx, &candidate, &evaluation).await
        } else {
            // Past the budget cap only the hot cache is consulted.
            match ctx
                .sentiment_store
                .hot_get(&candidate.ticker, candidate.earnings_date)
                .await
            {
                Ok(record) => {
                    let hit = record.is_some();
                    (record, hit, false)
                }
                Err(_) => (None, false, false),
            }
        };
        if cache_hit {
            outcome.sentiment_cache_hits += 1;
        }
        if paid {
            outcome.paid_sentiment_calls += 1;
        }

        let score = scoring::composite_score(
            Some(evaluation.vrp.ratio),
            evaluation.consistency,
            evaluation.liquidity.unwrap_or(LiquidityTier::Reject),
            evaluation.skew_measure,
            &ctx.settings.scoring,
            &ctx.settings.vrp,
        );

        let sentiment_score = sentiment.as_ref().and_then(|s| s.sentiment_score);
        let direction = match (evaluation.skew_bias, sentiment_score) {
            (Some(skew_bias), Some(score)) => adjust_direction(
                skew_bias,
                score,
                sentiment.as_ref().map(|s| s.sentiment_direction),
            ),
            (skew_bias, score) => {
                // Degraded inputs still produce a usable direction.
                let bias = resolve_direction(
                    skew_bias,
                    score,
                    sentiment.as_ref().map(|s| s.sentiment_direction),
                );
                DirectionAdjustment {
                    original_bias: skew_bias.unwrap_or(SkewBias::Neutral),
                    sentiment_score: score.unwrap_or(0.0),
                    adjusted_bias: bias,
                    rule_applied: crate::models::DirectionRule::SkewDominates,
                    confidence: 0.5,
                    size_modifier: crate::domain::direction::size_modifier(score.unwrap_or(0.0)),
                }
            }
        };

        entries.push(DigestEntry {
            ticker: candidate.ticker,
            earnings_date: candidate.earnings_date,
            evaluation,
            sentiment,
            score,
            direction,
        });
    }

    // Composite desc, then earlier earnings date, then ticker.
    entries.sort_by(|a, b| {
        b.score
            .total
            .partial_cmp(&a.score.total)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.earnings_date.cmp(&b.earnings_date))
            .then(a.ticker.cmp(&b.ticker))
    });
    entries.truncate(ctx.settings.pipeline.max_digest_size);

    outcome.entries = entries;
    outcome
}
