use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;

use crate::services::clock::Clock;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(health_check))
}

async fn health_check(State(state): State<AppState>) -> Json<serde_json::Value> {
    let budget = state.ctx.budget.status_summary().await.ok();

    Json(json!({
        "status": "ok",
        "time_eastern": state.ctx.clock.now_eastern().to_rfc3339(),
        "budget": budget.map(|b| json!({
            "calls_today": b.calls_today,
            "daily_ceiling": b.daily_ceiling,
            "month_cost": b.month_cost,
        })),
        "options_breaker": format!("{:?}", state.ctx.options_breaker.state()),
        "sentiment_breaker": format!("{:?}", state.ctx.sentiment_breaker.state()),
    }))
}
