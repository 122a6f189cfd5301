//! Weekly cleanup (Sunday 03:30 ET).
//!
//! Bulk-deletes expired cache rows and prunes IV observations older than
//! the rank window needs.

use chrono::Duration;
use tracing::{info, warn};

use crate::db::iv_log_queries;
use crate::errors::AppError;
use crate::jobs::JobOutcome;
use crate::services::clock::Clock;
use crate::services::job_scheduler_service::JobContext;

/// IV rank looks back one year; keep a little slack beyond it.
const IV_RETENTION_DAYS: i64 = 400;

pub async fn run(ctx: JobContext) -> Result<JobOutcome, AppError> {
    let mut cleaned = 0u64;

    cleaned += ctx.cache.cleanup_expired().await;

    let cutoff = ctx.clock.today_eastern() - Duration::days(IV_RETENTION_DAYS);
    match iv_log_queries::prune_before(&ctx.pool, cutoff).await {
        Ok(pruned) => {
            if pruned > 0 {
                info!(pruned, %cutoff, "Pruned old IV observations");
            }
            cleaned += pruned;
        }
        Err(e) => warn!(error = %e, "IV log prune failed"),
    }

    info!(cleaned, "Weekly cleanup complete");
    Ok(JobOutcome::processed(cleaned as i32))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::harness;

    #[tokio::test]
    async fn test_cleanup_removes_expired_cache_rows() {
        let h = harness(vec![]);
        h.ctx
            .cache
            .set("stale", b"\"x\"".to_vec(), Duration::minutes(1))
            .await;
        h.ctx
            .cache
            .set("fresh", b"\"y\"".to_vec(), Duration::hours(12))
            .await;

        h.clock.advance(Duration::hours(1));

        let outcome = run(h.ctx.clone()).await.unwrap();
        // One expired cache row removed; IV prune hits the lazy pool and is
        // logged, not fatal
        assert_eq!(outcome.items_processed, 1);
        assert!(h.ctx.cache.get("fresh").await.is_some());
    }
}
