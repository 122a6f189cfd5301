//! Pre-trade refresh (14:30 ET).
//!
//! Final pass before the typical entry window: re-runs the pipeline over
//! today's reporters with fresh chains and pushes an alert for each
//! tradeable candidate.

use tracing::{info, warn};

use crate::errors::AppError;
use crate::external::earnings_calendar::CalendarHorizon;
use crate::jobs::{self, JobOutcome};
use crate::services::job_scheduler_service::JobContext;
use crate::services::notifier::DigestSink;
use crate::services::pipeline::{self, Candidate, DigestEntry};

pub async fn run(ctx: JobContext) -> Result<JobOutcome, AppError> {
    let events =
        match jobs::fetch_earnings(&ctx, "pre-trade-refresh", CalendarHorizon::ThreeMonth).await? {
            Some(events) => events,
            None => return Ok(JobOutcome::default()),
        };

    let todays = jobs::todays_earnings(&ctx, &events);
    let tracked = jobs::filter_tracked(&ctx, todays).await?;

    // Entry decisions need live chains, not this morning's
    for event in &tracked {
        let key = format!("option_chain:{}:{}", event.ticker, event.report_date);
        ctx.cache.delete(&key).await;
    }

    let candidates: Vec<Candidate> = tracked
        .iter()
        .map(|event| Candidate {
            ticker: event.ticker.clone(),
            earnings_date: event.report_date,
        })
        .collect();

    let outcome = pipeline::build_digest(&ctx, candidates).await;

    let mut telegram_error = None;
    let tradeable: Vec<&DigestEntry> =
        outcome.entries.iter().filter(|e| e.score.tradeable).collect();
    for entry in &tradeable {
        let body = format_alert(entry);
        match ctx.sink.send_message(&body, "HTML").await {
            Ok(true) => {}
            Ok(false) => telegram_error = Some("sink rejected message".to_string()),
            Err(e) => {
                warn!(ticker = %entry.ticker, error = %e, "Alert send failed");
                telegram_error = Some(e.to_string());
            }
        }
    }

    info!(
        evaluated = outcome.evaluated,
        tradeable = tradeable.len(),
        "Pre-trade refresh complete"
    );

    Ok(JobOutcome {
        items_processed: outcome.entries.len() as i32,
        items_failed: outcome.failed_tickers.len() as i32,
        failed_tickers: outcome.failed_tickers,
        telegram_error,
    })
}

fn format_alert(entry: &DigestEntry) -> String {
    let emoji = if entry.score.total >= 80.0 {
        "🎯"
    } else if entry.score.total >= 70.0 {
        "📊"
    } else {
        "📈"
    };

    let size_note = if entry.direction.size_modifier < 1.0 {
        format!(
            "\n<b>Size:</b> {:.0}% (strong bullish sentiment, larger tail risk)",
            entry.direction.size_modifier * 100.0
        )
    } else if entry.direction.size_modifier > 1.0 {
        format!(
            "\n<b>Size:</b> {:.0}% (bearish sentiment priced in)",
            entry.direction.size_modifier * 100.0
        )
    } else {
        String::new()
    };

    format!(
        "{} <b>IV Crush Alert: {}</b>\n\n\
         <b>Score:</b> {:.1}/100\n\
         <b>VRP:</b> {:.1}x\n\
         <b>Implied Move:</b> {:.1}%\n\
         <b>Direction:</b> {}\n\
         <b>Liquidity:</b> {}{}\n\n\
         #ivcrush #{}",
        emoji,
        entry.ticker,
        entry.score.total,
        entry.evaluation.vrp.ratio,
        entry.evaluation.implied_move_pct,
        entry.direction.adjusted_bias.as_str().to_uppercase(),
        entry
            .evaluation
            .liquidity
            .map(|t| t.as_str())
            .unwrap_or("UNKNOWN"),
        size_note,
        entry.ticker.as_str().to_lowercase()
    )
}
