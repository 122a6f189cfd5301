//! Weekly backup (Sunday 03:00 ET).
//!
//! Snapshots the moves history and the prediction/outcome ledger to
//! date-stamped JSON files in the backup directory.

use std::path::PathBuf;

use tracing::{info, warn};

use crate::errors::AppError;
use crate::jobs::JobOutcome;
use crate::services::clock::Clock;
use crate::services::job_scheduler_service::JobContext;
use crate::services::moves_store::MovesStore;
use crate::services::sentiment_store::SentimentStore;

pub async fn run(ctx: JobContext) -> Result<JobOutcome, AppError> {
    let backup_dir = PathBuf::from(&ctx.settings.server.backup_dir);
    if let Err(e) = std::fs::create_dir_all(&backup_dir) {
        return Err(AppError::External(format!(
            "cannot create backup dir {}: {}",
            backup_dir.display(),
            e
        )));
    }

    let stamp = ctx.clock.today_eastern().format("%Y%m%d").to_string();
    let mut written = 0;

    // Historical moves for every tracked ticker
    let mut all_moves = Vec::new();
    for ticker in ctx.moves.tracked_universe().await? {
        match ctx.moves.moves(&ticker).await {
            Ok(mut moves) => all_moves.append(&mut moves),
            Err(e) => warn!(%ticker, error = %e, "Skipping ticker in backup"),
        }
    }
    let moves_path = backup_dir.join(format!("historical_moves_{}.json", stamp));
    match serde_json::to_vec_pretty(&all_moves) {
        Ok(bytes) => match std::fs::write(&moves_path, bytes) {
            Ok(()) => {
                info!(path = %moves_path.display(), rows = all_moves.len(), "Backed up historical moves");
                written += 1;
            }
            Err(e) => warn!(error = %e, "Failed to write moves backup"),
        },
        Err(e) => warn!(error = %e, "Failed to serialize moves backup"),
    }

    // The whole prediction/outcome ledger, resolved rows included
    let since = ctx.clock.today_eastern() - chrono::Duration::days(20 * 365);
    let records = ctx.sentiment_store.all_records(since).await?;
    let sentiment_path = backup_dir.join(format!("sentiment_history_{}.json", stamp));
    match serde_json::to_vec_pretty(&records) {
        Ok(bytes) => match std::fs::write(&sentiment_path, bytes) {
            Ok(()) => {
                info!(path = %sentiment_path.display(), rows = records.len(), "Backed up sentiment history");
                written += 1;
            }
            Err(e) => warn!(error = %e, "Failed to write sentiment backup"),
        },
        Err(e) => warn!(error = %e, "Failed to serialize sentiment backup"),
    }

    Ok(JobOutcome::processed(written))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::harness;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_backup_writes_snapshot_files() {
        let mut h = harness(vec![]);
        let dir = std::env::temp_dir().join(format!("ivcrush-backup-test-{}", std::process::id()));
        let mut settings = (*h.ctx.settings).clone();
        settings.server.backup_dir = dir.to_string_lossy().to_string();
        h.ctx.settings = Arc::new(settings);

        h.moves.seed("NVDA", &[4.0, 5.0, 6.0, 5.0]);

        let outcome = run(h.ctx.clone()).await.unwrap();
        assert_eq!(outcome.items_processed, 2);

        let stamp = h.ctx.clock.today_eastern().format("%Y%m%d").to_string();
        assert!(dir.join(format!("historical_moves_{}.json", stamp)).exists());
        assert!(dir.join(format!("sentiment_history_{}.json", stamp)).exists());

        std::fs::remove_dir_all(dir).ok();
    }

    #[tokio::test]
    async fn test_backup_includes_resolved_sentiment_rows() {
        use crate::models::{
            ActualDirection, SentimentDirection, SentimentRecord, SentimentSource, Ticker,
            TradeOutcome,
        };
        use crate::services::sentiment_store::SentimentStore;

        let mut h = harness(vec![]);
        let dir = std::env::temp_dir().join(format!(
            "ivcrush-backup-resolved-test-{}",
            std::process::id()
        ));
        let mut settings = (*h.ctx.settings).clone();
        settings.server.backup_dir = dir.to_string_lossy().to_string();
        h.ctx.settings = Arc::new(settings);

        // One prediction with its outcome already recorded
        let ticker = Ticker::new("NVDA").unwrap();
        let date: chrono::NaiveDate = "2026-07-30".parse().unwrap();
        h.sentiment_store
            .record_sentiment(&SentimentRecord {
                ticker: ticker.clone(),
                earnings_date: date,
                collected_at: h.ctx.clock.now_utc(),
                source: SentimentSource::PaidAi,
                sentiment_text: "bullish setup".to_string(),
                sentiment_score: Some(0.6),
                sentiment_direction: SentimentDirection::Bullish,
                vrp_ratio: Some(2.2),
                implied_move_pct: Some(8.0),
                actual_move_pct: None,
                actual_direction: None,
                prediction_correct: None,
                trade_outcome: None,
            })
            .await
            .unwrap();
        h.sentiment_store
            .record_outcome(&ticker, date, 5.2, ActualDirection::Up, Some(TradeOutcome::Win))
            .await
            .unwrap();

        run(h.ctx.clone()).await.unwrap();

        let stamp = h.ctx.clock.today_eastern().format("%Y%m%d").to_string();
        let dumped =
            std::fs::read_to_string(dir.join(format!("sentiment_history_{}.json", stamp)))
                .unwrap();
        assert!(dumped.contains("NVDA"));
        assert!(dumped.contains("prediction_correct"));
        assert!(dumped.contains("5.2"));

        std::fs::remove_dir_all(dir).ok();
    }
}
