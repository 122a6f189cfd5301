use axum::extract::State;
use axum::http::HeaderMap;
use axum::routing::post;
use axum::{Json, Router};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use crate::errors::AppError;
use crate::models::Ticker;
use crate::services::clock::Clock;
use crate::services::moves_store::MovesStore;
use crate::services::notifier::DigestSink;
use crate::services::sentiment_store::SentimentStore;
use crate::state::AppState;

/// Command input beyond this length is discarded, not processed.
const MAX_COMMAND_LENGTH: usize = 500;

/// Constant-time byte comparison; auth checks must not leak how much of the
/// key matched through timing.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

/// Check an `Authorization` header against the shared key. Basic auth
/// carries `base64(username:password)`; only the password is compared.
fn authorization_matches(value: &str, shared_key: &str) -> bool {
    if let Some(encoded) = value.strip_prefix("Basic ") {
        return BASE64
            .decode(encoded.trim())
            .ok()
            .and_then(|raw| String::from_utf8(raw).ok())
            .and_then(|decoded| {
                decoded
                    .split_once(':')
                    .map(|(_, password)| password.to_string())
            })
            .map(|password| constant_time_eq(password.as_bytes(), shared_key.as_bytes()))
            .unwrap_or(false);
    }
    if let Some(token) = value.strip_prefix("Bearer ") {
        return constant_time_eq(token.as_bytes(), shared_key.as_bytes());
    }
    false
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/alert", post(ingest_alert))
        .route("/bot", post(bot_webhook))
}

#[derive(Debug, Deserialize)]
struct AlertPayload {
    ticker: String,
    #[serde(default)]
    message: Option<String>,
}

/// Authenticated alert ingest. Fail-closed: with no shared key configured
/// the endpoint reports itself misconfigured rather than accepting input.
async fn ingest_alert(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<AlertPayload>,
) -> Result<Json<serde_json::Value>, AppError> {
    let shared_key = &state.ctx.settings.server.webhook_auth_key;
    if shared_key.is_empty() {
        return Err(AppError::Misconfigured(
            "alert ingest disabled: no shared key configured".to_string(),
        ));
    }

    let authorized = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(|value| authorization_matches(value, shared_key.expose()))
        .unwrap_or(false);
    if !authorized {
        warn!("Alert webhook rejected: missing or invalid credentials");
        return Err(AppError::Unauthorized);
    }

    let ticker = Ticker::new(&payload.ticker)?;
    info!(%ticker, "Alert ingested");

    if let Some(message) = payload.message.as_deref() {
        let trimmed: String = message.chars().take(MAX_COMMAND_LENGTH).collect();
        let body = format!("🔔 <b>Alert: {}</b>\n\n{}", ticker, trimmed);
        if let Err(e) = state.ctx.sink.send_message(&body, "HTML").await {
            warn!(error = %e, "Alert relay failed");
        }
    }

    Ok(Json(json!({ "ok": true, "ticker": ticker.as_str() })))
}

#[derive(Debug, Deserialize)]
struct BotUpdate {
    #[serde(default)]
    message: Option<BotMessage>,
}

#[derive(Debug, Deserialize)]
struct BotMessage {
    #[serde(default)]
    text: Option<String>,
}

/// Bot webhook guarded by the secret token header Telegram echoes back.
async fn bot_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(update): Json<BotUpdate>,
) -> Result<Json<serde_json::Value>, AppError> {
    let secret = &state.ctx.settings.server.bot_webhook_secret;
    if secret.is_empty() {
        return Err(AppError::Misconfigured(
            "bot webhook disabled: no secret token configured".to_string(),
        ));
    }

    let token_ok = headers
        .get("x-telegram-bot-api-secret-token")
        .and_then(|v| v.to_str().ok())
        .map(|value| constant_time_eq(value.as_bytes(), secret.expose().as_bytes()))
        .unwrap_or(false);
    if !token_ok {
        return Err(AppError::Unauthorized);
    }

    let raw = update
        .message
        .and_then(|m| m.text)
        .unwrap_or_default();
    let text: String = raw.chars().take(MAX_COMMAND_LENGTH).collect();

    let reply = match handle_command(&state, text.trim()).await {
        Ok(reply) => reply,
        Err(AppError::Validation(msg)) => format!("⚠️ {}", msg),
        Err(e) => {
            warn!(error = %e, "Bot command failed");
            "⚠️ Command failed, try again later.".to_string()
        }
    };

    if let Err(e) = state.ctx.sink.send_message(&reply, "HTML").await {
        warn!(error = %e, "Bot reply failed");
    }
    Ok(Json(json!({ "ok": true })))
}

async fn handle_command(state: &AppState, text: &str) -> Result<String, AppError> {
    let mut parts = text.split_whitespace();
    let command = parts.next().unwrap_or("");

    match command {
        "/health" => Ok("✅ Service healthy".to_string()),
        "/dashboard" => {
            let budget = state.ctx.budget.status_summary().await?;
            let accuracy = state.ctx.sentiment_store.accuracy_stats().await?;
            Ok(format!(
                "📊 <b>Dashboard</b>\n\
                 Budget: {}/{} calls, ${:.2}/${:.2} this month\n\
                 Sentiment records: {} ({} with outcomes)",
                budget.calls_today,
                budget.daily_ceiling,
                budget.month_cost,
                budget.monthly_ceiling,
                accuracy.total_records,
                accuracy.with_outcomes
            ))
        }
        "/analyze" => {
            let raw = parts
                .next()
                .ok_or_else(|| AppError::Validation("Usage: /analyze TICKER".to_string()))?;
            let ticker = Ticker::new(raw)?;
            analyze_reply(state, &ticker).await
        }
        "/whisper" | "/council" => {
            // Ticker still validated so bad input fails the same way everywhere
            if let Some(raw) = parts.next() {
                Ticker::new(raw)?;
            }
            Ok(format!(
                "{} is handled by the analysis assistant, not this service.",
                command
            ))
        }
        "" => Ok("Commands: /health, /analyze TICKER, /dashboard".to_string()),
        other => Ok(format!(
            "Unknown command {}. Commands: /health, /analyze TICKER, /dashboard",
            other
        )),
    }
}

/// Answer from today's cached snapshot; a webhook reply is not the place to
/// spend vendor quota.
async fn analyze_reply(state: &AppState, ticker: &Ticker) -> Result<String, AppError> {
    use crate::jobs::pre_market_prep_job::{snapshot_cache_key, SnapshotEntry};

    let snapshot: Vec<SnapshotEntry> = state
        .ctx
        .cache
        .get_json(&snapshot_cache_key(state.ctx.clock.today_eastern()))
        .await
        .unwrap_or_default();

    if let Some(entry) = snapshot.iter().find(|e| e.ticker == ticker.as_str()) {
        let mut reply = format!(
            "📈 <b>{}</b> ({})\nVRP {:.1}x ({}), implied move {:.1}%, history mean {:.1}%",
            entry.ticker,
            entry.earnings_date,
            entry.evaluation.vrp.ratio,
            entry.evaluation.vrp.tier.as_str(),
            entry.evaluation.implied_move_pct,
            entry.evaluation.historical_mean
        );
        if let Some(iv) = entry.evaluation.atm_iv {
            if let Ok(Some(rank)) = crate::db::iv_log_queries::iv_rank(
                &state.ctx.pool,
                ticker,
                iv,
                state.ctx.clock.today_eastern(),
                20,
            )
            .await
            {
                reply.push_str(&format!("\nIV rank: {:.0}", rank));
            }
        }
        return Ok(reply);
    }

    // Off-snapshot tickers still get their historical baseline
    let average = state
        .ctx
        .moves
        .average_intraday_move(ticker, state.ctx.settings.vrp.min_moves)
        .await?;
    match average {
        Some(avg) => Ok(format!(
            "No snapshot for {} today; it reports outside the current window. Historical average move: {:.1}%",
            ticker, avg
        )),
        None => Ok(format!(
            "No snapshot for {} today and not enough earnings history to analyze it.",
            ticker
        )),
    }
}
