//! Morning digest (07:30 ET).
//!
//! The flagship job: earnings window, tracked filter, the full scoring
//! pipeline, then a ranked digest handed to the downstream sink. The sink
//! gets a best-effort message even when parts of the run failed.

use tracing::{info, warn};

use crate::errors::AppError;
use crate::external::earnings_calendar::CalendarHorizon;
use crate::jobs::{self, JobOutcome};
use crate::services::clock::Clock;
use crate::services::job_scheduler_service::JobContext;
use crate::services::notifier::DigestSink;
use crate::services::pipeline::{self, Candidate, DigestEntry, PipelineOutcome};

const UPCOMING_DAYS: i64 = 4;

pub async fn run(ctx: JobContext) -> Result<JobOutcome, AppError> {
    let events =
        match jobs::fetch_earnings(&ctx, "morning-digest", CalendarHorizon::ThreeMonth).await? {
            Some(events) => events,
            None => {
                let body = format!(
                    "📋 <b>IV Crush Digest: {}</b>\n\nNo qualified opportunities today.",
                    ctx.clock.today_eastern()
                );
                return Ok(send_digest_body(&ctx, body, JobOutcome::default()).await);
            }
        };

    let (upcoming, _) = jobs::upcoming_earnings(&ctx, &events, UPCOMING_DAYS);
    let tracked = jobs::filter_tracked(&ctx, upcoming).await?;

    let candidates: Vec<Candidate> = tracked
        .iter()
        .map(|event| Candidate {
            ticker: event.ticker.clone(),
            earnings_date: event.report_date,
        })
        .collect();

    let outcome = pipeline::build_digest(&ctx, candidates).await;
    info!(
        entries = outcome.entries.len(),
        evaluated = outcome.evaluated,
        below_floor = outcome.below_floor,
        failed = outcome.failed_tickers.len(),
        "Morning digest pipeline complete"
    );

    let body = format_digest(&ctx, &outcome);
    let job_outcome = JobOutcome {
        items_processed: outcome.entries.len() as i32,
        items_failed: outcome.failed_tickers.len() as i32,
        failed_tickers: outcome.failed_tickers.clone(),
        telegram_error: None,
    };
    Ok(send_digest_body(&ctx, body, job_outcome).await)
}

async fn send_digest_body(ctx: &JobContext, body: String, mut outcome: JobOutcome) -> JobOutcome {
    match ctx.sink.send_message(&body, "HTML").await {
        Ok(true) => {}
        Ok(false) => {
            warn!("Digest sink rejected the message");
            outcome.telegram_error = Some("sink rejected message".to_string());
        }
        Err(e) => {
            warn!(error = %e, "Digest sink send failed");
            outcome.telegram_error = Some(e.to_string());
        }
    }
    outcome
}

fn format_entry(entry: &DigestEntry) -> String {
    let warning = if entry.direction.high_bullish_warning() {
        " ⚠️"
    } else {
        ""
    };
    format!(
        "• <b>{}</b> ({}): Score {:.1}, VRP {:.1}x, IM {:.1}%, {}{}",
        entry.ticker,
        entry.earnings_date,
        entry.score.total,
        entry.evaluation.vrp.ratio,
        entry.evaluation.implied_move_pct,
        entry.direction.adjusted_bias.as_str().to_uppercase(),
        warning
    )
}

fn format_digest(ctx: &JobContext, outcome: &PipelineOutcome) -> String {
    let header = format!(
        "📋 <b>IV Crush Digest: {}</b>\n\n",
        ctx.clock.today_eastern()
    );

    if outcome.entries.is_empty() {
        let mut body = header + "No qualified opportunities today.";
        if !outcome.failed_tickers.is_empty() {
            body.push_str(&format!(
                "\n({} tickers failed evaluation)",
                outcome.failed_tickers.len()
            ));
        }
        return body;
    }

    let lines: Vec<String> = outcome.entries.iter().map(format_entry).collect();
    let mut body = header + &lines.join("\n");

    if !outcome.failed_tickers.is_empty() {
        body.push_str(&format!(
            "\n\n⚠️ {} tickers failed evaluation",
            outcome.failed_tickers.len()
        ));
    }
    body.push_str("\n\n#ivcrush #digest");
    body
}
