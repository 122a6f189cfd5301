use axum::http::{HeaderMap, HeaderValue};
use axum::response::IntoResponse;
use reqwest::StatusCode;
use thiserror::Error;

/// Category tag carried by vendor-facing errors so callers can pick a
/// fallback path without matching on message strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Timeout,
    RateLimit,
    NoData,
    External,
    Validation,
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Db(#[from] sqlx::Error),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Not found")]
    NotFound,
    #[error("Rate limited by external provider")]
    RateLimited,
    #[error("Circuit open for {0}")]
    CircuitOpen(String),
    #[error("Budget exhausted: {0}")]
    BudgetExhausted(String),
    #[error("External error: {0}")]
    External(String),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Service misconfigured: {0}")]
    Misconfigured(String),
    #[error("Unauthorized")]
    Unauthorized,
}

impl AppError {
    /// Errors that should be treated as "upstream unavailable": use stale
    /// data if present, otherwise skip the item. Never propagated out of a job.
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            AppError::RateLimited
                | AppError::CircuitOpen(_)
                | AppError::External(_)
                | AppError::NotFound
        )
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        match self {
            AppError::NotFound => (StatusCode::NOT_FOUND, "Not found").into_response(),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg).into_response(),
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized").into_response(),
            AppError::RateLimited => {
                let mut headers = HeaderMap::new();
                headers.insert("Retry-After", HeaderValue::from_static("60"));
                (StatusCode::TOO_MANY_REQUESTS, headers, "Rate limited").into_response()
            }
            AppError::Misconfigured(msg) => {
                (StatusCode::SERVICE_UNAVAILABLE, msg).into_response()
            }
            AppError::CircuitOpen(_) | AppError::External(_) | AppError::BudgetExhausted(_) => {
                (StatusCode::BAD_GATEWAY, self.to_string()).into_response()
            }
            AppError::Db(_) | AppError::Serialization(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response()
            }
        }
    }
}

impl From<String> for AppError {
    fn from(value: String) -> Self {
        AppError::Validation(value)
    }
}
