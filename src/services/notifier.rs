use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use crate::external::{with_retries, VendorError};
use crate::settings::VendorSettings;

/// Telegram API limit on message bodies.
const MAX_MESSAGE_LENGTH: usize = 4096;

/// Downstream sink for digests and alerts.
#[async_trait]
pub trait DigestSink: Send + Sync {
    /// Returns true when the sink accepted the message.
    async fn send_message(&self, body: &str, parse_mode: &str) -> Result<bool, VendorError>;
}

/// Truncate to the sink's limit, marking the cut.
pub fn truncate_message(text: &str) -> String {
    if text.len() <= MAX_MESSAGE_LENGTH {
        return text.to_string();
    }
    let mut cut = MAX_MESSAGE_LENGTH - 20;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}\n\n[...truncated]", &text[..cut])
}

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'a str,
}

/// Telegram Bot API sink.
pub struct TelegramNotifier {
    client: reqwest::Client,
    base_url: String,
    chat_id: String,
}

impl TelegramNotifier {
    pub fn new(settings: &VendorSettings) -> Result<Self, VendorError> {
        if settings.telegram_bot_token.is_empty() || settings.telegram_chat_id.is_empty() {
            return Err(VendorError::new(
                crate::errors::ErrorKind::Validation,
                "TELEGRAM_BOT_TOKEN or TELEGRAM_CHAT_ID not set",
            ));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.http_timeout_secs))
            .build()
            .map_err(VendorError::from)?;

        Ok(Self {
            client,
            base_url: format!(
                "https://api.telegram.org/bot{}",
                settings.telegram_bot_token.expose()
            ),
            chat_id: settings.telegram_chat_id.clone(),
        })
    }
}

#[async_trait]
impl DigestSink for TelegramNotifier {
    async fn send_message(&self, body: &str, parse_mode: &str) -> Result<bool, VendorError> {
        let text = truncate_message(body);
        tracing::debug!(length = text.len(), "Sending Telegram message");

        let response: serde_json::Value = with_retries(3, Duration::from_secs(2), || async {
            let request = SendMessageRequest {
                chat_id: &self.chat_id,
                text: &text,
                parse_mode,
            };
            let response = self
                .client
                .post(format!("{}/sendMessage", self.base_url))
                .json(&request)
                .send()
                .await
                .map_err(VendorError::from)?;

            if response.status().as_u16() == 429 {
                return Err(VendorError::rate_limit("telegram rate limited"));
            }
            let response = response.error_for_status().map_err(VendorError::from)?;
            response
                .json::<serde_json::Value>()
                .await
                .map_err(VendorError::from)
        })
        .await?;

        Ok(response
            .get("ok")
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false))
    }
}

/// Sink that swallows messages; used when no downstream is configured and
/// in tests.
#[derive(Default)]
pub struct NoopSink {
    pub sent: parking_lot::Mutex<Vec<String>>,
}

#[async_trait]
impl DigestSink for NoopSink {
    async fn send_message(&self, body: &str, _parse_mode: &str) -> Result<bool, VendorError> {
        self.sent.lock().push(body.to_string());
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_message_untouched() {
        assert_eq!(truncate_message("hello"), "hello");
    }

    #[test]
    fn test_long_message_truncated_with_marker() {
        let long = "x".repeat(MAX_MESSAGE_LENGTH + 500);
        let truncated = truncate_message(&long);
        assert!(truncated.len() <= MAX_MESSAGE_LENGTH);
        assert!(truncated.ends_with("[...truncated]"));
    }

    #[test]
    fn test_truncation_respects_char_boundaries() {
        let long = "é".repeat(MAX_MESSAGE_LENGTH);
        let truncated = truncate_message(&long);
        assert!(truncated.ends_with("[...truncated]"));
    }

    #[tokio::test]
    async fn test_noop_sink_records_messages() {
        let sink = NoopSink::default();
        assert!(sink.send_message("digest body", "HTML").await.unwrap());
        assert_eq!(sink.sent.lock().as_slice(), &["digest body".to_string()]);
    }
}
