//! After-hours check (16:30 ET).
//!
//! Flags today's post-close reporters so outcomes can be watched overnight.
//! DMH and unknown-timing reporters stay included until the calendar vendor
//! supplies reliable timing.

use tracing::{info, warn};

use crate::errors::AppError;
use crate::external::earnings_calendar::CalendarHorizon;
use crate::jobs::{self, JobOutcome};
use crate::models::EarningsTiming;
use crate::services::clock::Clock;
use crate::services::job_scheduler_service::JobContext;
use crate::services::notifier::DigestSink;

pub async fn run(ctx: JobContext) -> Result<JobOutcome, AppError> {
    let events =
        match jobs::fetch_earnings(&ctx, "after-hours-check", CalendarHorizon::ThreeMonth).await? {
            Some(events) => events,
            None => return Ok(JobOutcome::default()),
        };

    let todays = jobs::todays_earnings(&ctx, &events);
    let tracked = jobs::filter_tracked(&ctx, todays).await?;

    let after_close: Vec<_> = tracked
        .into_iter()
        .filter(|e| {
            matches!(
                e.timing,
                EarningsTiming::Amc | EarningsTiming::Dmh | EarningsTiming::Unknown
            )
        })
        .collect();

    if after_close.is_empty() {
        info!("No post-close reporters to watch");
        return Ok(JobOutcome::default());
    }

    let symbols: Vec<&str> = after_close.iter().map(|e| e.ticker.as_str()).collect();
    info!(?symbols, "Post-close reporters announcing tonight");

    let body = format!(
        "🌙 <b>After-hours watch: {}</b>\n\n{}\n\nOutcomes will be recorded at 19:00 ET tomorrow.",
        ctx.clock.today_eastern(),
        symbols
            .iter()
            .map(|s| format!("• <b>{}</b>", s))
            .collect::<Vec<_>>()
            .join("\n")
    );

    let mut outcome = JobOutcome::processed(after_close.len() as i32);
    if let Err(e) = ctx.sink.send_message(&body, "HTML").await {
        warn!(error = %e, "After-hours notification failed");
        outcome.telegram_error = Some(e.to_string());
    }
    Ok(outcome)
}
