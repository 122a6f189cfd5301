//! Calendar sync (Sunday 04:00 ET).
//!
//! Forces a fresh pull of the earnings calendar and re-seeds both the cache
//! and the stored calendar table for the week ahead.

use tracing::info;

use crate::errors::AppError;
use crate::external::earnings_calendar::CalendarHorizon;
use crate::jobs::{self, JobOutcome};
use crate::services::job_scheduler_service::JobContext;

pub async fn run(ctx: JobContext) -> Result<JobOutcome, AppError> {
    let horizon = CalendarHorizon::ThreeMonth;

    // Drop the cached copy so the fetch below goes to the vendor
    ctx.cache
        .delete(&format!("earnings_calendar:{}", horizon.as_str()))
        .await;

    let events = match jobs::fetch_earnings(&ctx, "calendar-sync", horizon).await? {
        Some(events) => events,
        None => {
            info!("Calendar sync found nothing to store");
            return Ok(JobOutcome::default());
        }
    };

    info!(synced = events.len(), "Calendar sync complete");
    Ok(JobOutcome::processed(events.len() as i32))
}
