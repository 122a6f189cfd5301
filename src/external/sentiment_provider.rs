use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::{with_retries, VendorError};
use crate::models::{SentimentDirection, SentimentSource, Ticker};
use crate::settings::VendorSettings;

/// Parsed sentiment analysis from a provider, before it becomes a
/// `SentimentRecord`.
#[derive(Debug, Clone, PartialEq)]
pub struct SentimentAnalysis {
    pub direction: SentimentDirection,
    pub score: f64,
    pub catalysts: String,
    pub risks: String,
    pub raw_text: String,
}

/// A sentiment source the pipeline can consult. Providers are tried in
/// priority order under the budget gate.
#[async_trait]
pub trait SentimentProvider: Send + Sync {
    fn source(&self) -> SentimentSource;

    /// Cost in dollars recorded against the budget per successful call.
    /// Zero for free sources.
    fn cost_per_call(&self) -> f64;

    async fn fetch(
        &self,
        ticker: &Ticker,
        earnings_date: NaiveDate,
    ) -> Result<SentimentAnalysis, VendorError>;
}

/// Parse the loose structured contract:
///
/// ```text
/// Direction: [bullish/bearish/neutral]
/// Score: [number -1 to +1]
/// Catalysts: ...
/// Risks: ...
/// ```
///
/// Every field is optional; missing fields fall back to
/// `{neutral, 0.0, "", ""}`. This function never fails.
pub fn parse_sentiment_response(text: &str) -> SentimentAnalysis {
    let mut analysis = SentimentAnalysis {
        direction: SentimentDirection::Neutral,
        score: 0.0,
        catalysts: String::new(),
        risks: String::new(),
        raw_text: text.to_string(),
    };

    let direction_re = Regex::new(r"(?i)Direction:\s*(bullish|bearish|neutral)").unwrap();
    if let Some(captures) = direction_re.captures(text) {
        analysis.direction = SentimentDirection::parse(&captures[1]);
    }

    let score_re = Regex::new(r"Score:\s*([+-]?\d*\.?\d+)").unwrap();
    if let Some(captures) = score_re.captures(text) {
        if let Ok(score) = captures[1].parse::<f64>() {
            analysis.score = score.clamp(-1.0, 1.0);
        }
    }

    let catalysts_re = Regex::new(r"(?is)Catalysts?:\s*(.+?)(?:\n|Risks?:|$)").unwrap();
    if let Some(captures) = catalysts_re.captures(text) {
        analysis.catalysts = captures[1].trim().to_string();
    }

    let risks_re = Regex::new(r"(?is)Risks?:\s*(.+?)(?:\n|$)").unwrap();
    if let Some(captures) = risks_re.captures(text) {
        analysis.risks = captures[1].trim().to_string();
    }

    analysis
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: String,
}

/// Paid AI sentiment client (Perplexity-style chat API).
pub struct PerplexityClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    cost_per_call: f64,
}

impl PerplexityClient {
    pub fn new(settings: &VendorSettings, cost_per_call: f64) -> Result<Self, VendorError> {
        if settings.perplexity_api_key.is_empty() {
            return Err(VendorError::new(
                crate::errors::ErrorKind::Validation,
                "PERPLEXITY_API_KEY not set",
            ));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.http_timeout_secs.max(60)))
            .build()
            .map_err(VendorError::from)?;

        Ok(Self {
            client,
            api_key: settings.perplexity_api_key.expose().to_string(),
            base_url: "https://api.perplexity.ai".to_string(),
            model: "sonar".to_string(),
            cost_per_call,
        })
    }

    fn prompt(ticker: &Ticker, earnings_date: NaiveDate) -> String {
        format!(
            "For {} earnings on {}, respond ONLY in this format:\n\
             Direction: [bullish/bearish/neutral]\n\
             Score: [number -1 to +1]\n\
             Catalysts: [2 bullets, max 10 words each]\n\
             Risks: [1 bullet, max 10 words]",
            ticker, earnings_date
        )
    }
}

#[async_trait]
impl SentimentProvider for PerplexityClient {
    fn source(&self) -> SentimentSource {
        SentimentSource::PaidAi
    }

    fn cost_per_call(&self) -> f64 {
        self.cost_per_call
    }

    async fn fetch(
        &self,
        ticker: &Ticker,
        earnings_date: NaiveDate,
    ) -> Result<SentimentAnalysis, VendorError> {
        tracing::info!(%ticker, %earnings_date, "Fetching AI sentiment");

        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage {
                role: "user",
                content: Self::prompt(ticker, earnings_date),
            }],
        };

        let response: ChatResponse = with_retries(3, Duration::from_secs(2), || async {
            let response = self
                .client
                .post(format!("{}/chat/completions", self.base_url))
                .bearer_auth(&self.api_key)
                .json(&request)
                .send()
                .await
                .map_err(VendorError::from)?;

            if response.status().as_u16() == 429 {
                return Err(VendorError::rate_limit("sentiment vendor rate limited"));
            }
            let response = response.error_for_status().map_err(VendorError::from)?;
            response.json::<ChatResponse>().await.map_err(VendorError::from)
        })
        .await?;

        let content = response
            .choices
            .first()
            .map(|c| c.message.content.as_str())
            .unwrap_or("");

        Ok(parse_sentiment_response(content))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_response() {
        let text = "Direction: bullish\n\
                    Score: 0.6\n\
                    Catalysts: AI demand, data center growth\n\
                    Risks: valuation stretched";
        let analysis = parse_sentiment_response(text);
        assert_eq!(analysis.direction, SentimentDirection::Bullish);
        assert!((analysis.score - 0.6).abs() < 1e-9);
        assert_eq!(analysis.catalysts, "AI demand, data center growth");
        assert_eq!(analysis.risks, "valuation stretched");
    }

    #[test]
    fn test_parse_negative_score() {
        let analysis = parse_sentiment_response("Direction: bearish\nScore: -0.45\n");
        assert_eq!(analysis.direction, SentimentDirection::Bearish);
        assert!((analysis.score - (-0.45)).abs() < 1e-9);
    }

    #[test]
    fn test_parse_missing_fields_defaults() {
        let analysis = parse_sentiment_response("The model rambled about something else.");
        assert_eq!(analysis.direction, SentimentDirection::Neutral);
        assert_eq!(analysis.score, 0.0);
        assert_eq!(analysis.catalysts, "");
        assert_eq!(analysis.risks, "");
    }

    #[test]
    fn test_parse_direction_is_case_insensitive() {
        let analysis = parse_sentiment_response("direction: BULLISH\nScore: +0.9");
        assert_eq!(analysis.direction, SentimentDirection::Bullish);
        assert!((analysis.score - 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_parse_clamps_out_of_range_score() {
        let analysis = parse_sentiment_response("Score: 3.5");
        assert_eq!(analysis.score, 1.0);
    }

    #[test]
    fn test_parse_never_panics_on_garbage() {
        for garbage in ["", "Score:", "Direction: sideways", "\n\n\n", "Score: ..."] {
            let analysis = parse_sentiment_response(garbage);
            assert_eq!(analysis.direction, SentimentDirection::Neutral);
        }
    }
}
