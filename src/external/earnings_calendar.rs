use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;

use super::{read_capped_body, with_retries, VendorError};
use crate::models::{EarningsEvent, Ticker};
use crate::settings::VendorSettings;

/// Calendar window supported by the vendor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalendarHorizon {
    ThreeMonth,
    SixMonth,
    TwelveMonth,
}

impl CalendarHorizon {
    pub fn as_str(&self) -> &'static str {
        match self {
            CalendarHorizon::ThreeMonth => "3month",
            CalendarHorizon::SixMonth => "6month",
            CalendarHorizon::TwelveMonth => "12month",
        }
    }
}

#[async_trait]
pub trait EarningsCalendarProvider: Send + Sync {
    async fn get_earnings_calendar(
        &self,
        horizon: CalendarHorizon,
    ) -> Result<Vec<EarningsEvent>, VendorError>;
}

/// Alpha Vantage earnings calendar client. The free tier allows ~25 calls a
/// day, so callers go through the hybrid cache with a 24h TTL.
pub struct AlphaVantageCalendarClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    max_response_bytes: usize,
}

impl AlphaVantageCalendarClient {
    pub fn new(settings: &VendorSettings) -> Result<Self, VendorError> {
        if settings.alphavantage_api_key.is_empty() {
            return Err(VendorError::new(
                crate::errors::ErrorKind::Validation,
                "ALPHAVANTAGE_API_KEY not set",
            ));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.http_timeout_secs))
            .build()
            .map_err(VendorError::from)?;

        Ok(Self {
            client,
            api_key: settings.alphavantage_api_key.expose().to_string(),
            base_url: "https://www.alphavantage.co/query".to_string(),
            max_response_bytes: settings.max_response_bytes,
        })
    }

    /// Parse the vendor's CSV payload. Rows with unusable symbols or dates
    /// are skipped, not fatal.
    fn parse_calendar_csv(csv_text: &str) -> Vec<EarningsEvent> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_reader(csv_text.as_bytes());

        let headers = match reader.headers() {
            Ok(h) => h.clone(),
            Err(_) => return Vec::new(),
        };
        let col = |name: &str| headers.iter().position(|h| h == name);
        let symbol_idx = col("symbol");
        let date_idx = col("reportDate");
        let estimate_idx = col("estimate");

        let (symbol_idx, date_idx) = match (symbol_idx, date_idx) {
            (Some(s), Some(d)) => (s, d),
            _ => return Vec::new(),
        };

        let mut events = Vec::new();
        for record in reader.records().flatten() {
            let ticker = match record.get(symbol_idx).and_then(|s| Ticker::new(s).ok()) {
                Some(t) => t,
                None => continue,
            };
            let report_date: NaiveDate = match record.get(date_idx).and_then(|d| d.parse().ok()) {
                Some(d) => d,
                None => continue,
            };
            let estimate = estimate_idx
                .and_then(|i| record.get(i))
                .and_then(|e| e.parse::<f64>().ok());

            let mut event = EarningsEvent::new(ticker, report_date);
            event.estimate = estimate;
            event.source_id = Some("alphavantage".to_string());
            events.push(event);
        }
        events
    }
}

#[async_trait]
impl EarningsCalendarProvider for AlphaVantageCalendarClient {
    async fn get_earnings_calendar(
        &self,
        horizon: CalendarHorizon,
    ) -> Result<Vec<EarningsEvent>, VendorError> {
        tracing::debug!(horizon = horizon.as_str(), "Fetching earnings calendar");

        let text = with_retries(3, Duration::from_secs(2), || async {
            let response = self
                .client
                .get(&self.base_url)
                .query(&[
                    ("function", "EARNINGS_CALENDAR"),
                    ("horizon", horizon.as_str()),
                    ("apikey", self.api_key.as_str()),
                ])
                .send()
                .await
                .map_err(VendorError::from)?;

            if response.status().as_u16() == 429 {
                return Err(VendorError::rate_limit("calendar vendor rate limited"));
            }
            let response = response.error_for_status().map_err(VendorError::from)?;
            let text = read_capped_body(response, self.max_response_bytes).await?;

            // Soft rate limit arrives as a JSON note instead of CSV
            if text.contains("rate limit") || text.contains("API call frequency") {
                return Err(VendorError::rate_limit("calendar vendor soft rate limit"));
            }
            Ok(text)
        })
        .await?;

        Ok(Self::parse_calendar_csv(&text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_calendar_csv() {
        let csv = "symbol,name,reportDate,fiscalDateEnding,estimate,currency\n\
                   AAPL,Apple Inc,2026-08-06,2026-06-30,1.42,USD\n\
                   MSFT,Microsoft,2026-08-12,2026-06-30,,USD\n";
        let events = AlphaVantageCalendarClient::parse_calendar_csv(csv);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].ticker.as_str(), "AAPL");
        assert_eq!(events[0].report_date, "2026-08-06".parse::<NaiveDate>().unwrap());
        assert_eq!(events[0].estimate, Some(1.42));
        assert_eq!(events[1].estimate, None);
    }

    #[test]
    fn test_parse_skips_bad_rows() {
        let csv = "symbol,name,reportDate,fiscalDateEnding,estimate,currency\n\
                   TOOLONGX,Bad,2026-08-06,2026-06-30,,USD\n\
                   GOOD,Fine,not-a-date,2026-06-30,,USD\n\
                   NVDA,NVIDIA,2026-08-26,2026-07-31,0.95,USD\n";
        let events = AlphaVantageCalendarClient::parse_calendar_csv(csv);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].ticker.as_str(), "NVDA");
    }

    #[test]
    fn test_parse_empty_body() {
        assert!(AlphaVantageCalendarClient::parse_calendar_csv("").is_empty());
    }
}
