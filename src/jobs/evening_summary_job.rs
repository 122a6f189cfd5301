//! Evening summary (20:00 ET).
//!
//! End-of-day status to the sink: budget burn, prediction accuracy, and
//! where sentiment records came from.

use tracing::{info, warn};

use crate::errors::AppError;
use crate::jobs::JobOutcome;
use crate::services::clock::Clock;
use crate::services::job_scheduler_service::JobContext;
use crate::services::notifier::DigestSink;
use crate::services::sentiment_store::SentimentStore;

pub async fn run(ctx: JobContext) -> Result<JobOutcome, AppError> {
    let budget = ctx.budget.status_summary().await?;
    let accuracy = ctx.sentiment_store.accuracy_stats().await?;
    let by_source = ctx.sentiment_store.counts_by_source().await?;

    let accuracy_line = match accuracy.accuracy() {
        Some(rate) => format!(
            "{:.0}% ({}/{} predictions)",
            rate * 100.0,
            accuracy.predictions_correct,
            accuracy.predictions_made
        ),
        None => "n/a".to_string(),
    };

    let sources_line = if by_source.is_empty() {
        "none".to_string()
    } else {
        by_source
            .iter()
            .map(|(source, count)| format!("{} {}", source, count))
            .collect::<Vec<_>>()
            .join(", ")
    };

    let body = format!(
        "🌆 <b>IV Crush daily summary: {}</b>\n\n\
         <b>Budget:</b> {}/{} calls, ${:.2} today, ${:.2}/${:.2} this month\n\
         <b>Sentiment records:</b> {} total, {} awaiting outcomes\n\
         <b>Prediction accuracy:</b> {}\n\
         <b>By source:</b> {}",
        ctx.clock.today_eastern(),
        budget.calls_today,
        budget.daily_ceiling,
        budget.cost_today,
        budget.month_cost,
        budget.monthly_ceiling,
        accuracy.total_records,
        accuracy.total_records - accuracy.with_outcomes,
        accuracy_line,
        sources_line
    );

    let mut outcome = JobOutcome::processed(1);
    match ctx.sink.send_message(&body, "HTML").await {
        Ok(true) => info!("Evening summary sent"),
        Ok(false) => outcome.telegram_error = Some("sink rejected message".to_string()),
        Err(e) => {
            warn!(error = %e, "Evening summary send failed");
            outcome.telegram_error = Some(e.to_string());
        }
    }
    Ok(outcome)
}
