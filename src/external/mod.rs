pub mod earnings_calendar;
pub mod options_data;
pub mod sentiment_provider;

use std::time::Duration;

use thiserror::Error;

use crate::errors::ErrorKind;

/// Error returned by vendor clients. Carries a category tag so callers can
/// pick a fallback path without inspecting messages.
#[derive(Debug, Error)]
#[error("{kind:?}: {message}")]
pub struct VendorError {
    pub kind: ErrorKind,
    pub message: String,
}

impl VendorError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message)
    }

    pub fn rate_limit(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::RateLimit, message)
    }

    pub fn no_data(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NoData, message)
    }

    pub fn external(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::External, message)
    }

    pub fn is_transient(&self) -> bool {
        matches!(self.kind, ErrorKind::Timeout | ErrorKind::RateLimit | ErrorKind::External)
    }
}

impl From<reqwest::Error> for VendorError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            VendorError::timeout(err.to_string())
        } else if err.status().map(|s| s.as_u16() == 429).unwrap_or(false) {
            VendorError::rate_limit(err.to_string())
        } else {
            VendorError::external(err.to_string())
        }
    }
}

/// Retry a vendor call with exponential backoff. Only transient errors are
/// retried; validation and no-data errors surface immediately.
pub async fn with_retries<T, F, Fut>(max_attempts: u32, base_delay: Duration, mut call: F) -> Result<T, VendorError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, VendorError>>,
{
    let mut delay = base_delay;
    let mut attempt = 0;

    loop {
        attempt += 1;
        match call().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt < max_attempts => {
                tracing::warn!(
                    attempt,
                    max_attempts,
                    error = %err,
                    "Vendor call failed, retrying in {:?}",
                    delay
                );
                tokio::time::sleep(delay).await;
                delay *= 2;
            }
            Err(err) => return Err(err),
        }
    }
}

/// Read a response body with a hard size cap to keep a misbehaving vendor
/// from ballooning memory.
pub async fn read_capped_body(
    response: reqwest::Response,
    max_bytes: usize,
) -> Result<String, VendorError> {
    if let Some(len) = response.content_length() {
        if len as usize > max_bytes {
            return Err(VendorError::external(format!(
                "response body {} bytes exceeds cap {}",
                len, max_bytes
            )));
        }
    }
    let body = response.bytes().await?;
    if body.len() > max_bytes {
        return Err(VendorError::external(format!(
            "response body {} bytes exceeds cap {}",
            body.len(),
            max_bytes
        )));
    }
    String::from_utf8(body.to_vec())
        .map_err(|e| VendorError::external(format!("non-utf8 response: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_retries_transient_then_succeeds() {
        let attempts = AtomicU32::new(0);
        let result = with_retries(3, Duration::from_millis(1), || {
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(VendorError::timeout("slow"))
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_no_data_is_not_retried() {
        let attempts = AtomicU32::new(0);
        let result: Result<i32, _> = with_retries(5, Duration::from_millis(1), || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err(VendorError::no_data("empty calendar")) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let attempts = AtomicU32::new(0);
        let result: Result<i32, _> = with_retries(3, Duration::from_millis(1), || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err(VendorError::external("boom")) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }
}
