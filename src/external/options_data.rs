use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;

use super::{with_retries, VendorError};
use crate::models::{OptionChain, OptionQuote, OptionType, Ticker};
use crate::settings::VendorSettings;

/// Hard vendor limit on symbols per batch quote call.
pub const MAX_BATCH_SYMBOLS: usize = 100;

/// One daily OHLC bar, used to compute realized earnings reactions.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DailyBar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
}

#[async_trait]
pub trait OptionsDataProvider: Send + Sync {
    async fn get_stock_price(&self, ticker: &Ticker) -> Result<f64, VendorError>;

    async fn get_stock_prices_batch(
        &self,
        tickers: &[Ticker],
    ) -> Result<HashMap<Ticker, f64>, VendorError>;

    async fn get_expirations(&self, ticker: &Ticker) -> Result<Vec<NaiveDate>, VendorError>;

    async fn get_option_chain(
        &self,
        ticker: &Ticker,
        expiration: NaiveDate,
    ) -> Result<OptionChain, VendorError>;

    /// Daily bars covering [start, end], oldest first.
    async fn get_daily_bars(
        &self,
        ticker: &Ticker,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailyBar>, VendorError>;
}

// Tradier wire format. Single-element lists arrive as bare objects, so the
// wrappers deserialize both shapes.

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> OneOrMany<T> {
    fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::One(item) => vec![item],
            OneOrMany::Many(items) => items,
        }
    }
}

#[derive(Debug, Deserialize)]
struct QuotesEnvelope {
    quotes: Option<QuotesBody>,
}

#[derive(Debug, Deserialize)]
struct QuotesBody {
    quote: Option<OneOrMany<TradierQuote>>,
}

#[derive(Debug, Deserialize)]
struct TradierQuote {
    symbol: String,
    last: Option<f64>,
    bid: Option<f64>,
    ask: Option<f64>,
}

impl TradierQuote {
    fn price(&self) -> Option<f64> {
        self.last.or_else(|| match (self.bid, self.ask) {
            (Some(bid), Some(ask)) => Some((bid + ask) / 2.0),
            _ => None,
        })
    }
}

#[derive(Debug, Deserialize)]
struct ExpirationsEnvelope {
    expirations: Option<ExpirationsBody>,
}

#[derive(Debug, Deserialize)]
struct ExpirationsBody {
    date: Option<OneOrMany<String>>,
}

#[derive(Debug, Deserialize)]
struct HistoryEnvelope {
    history: Option<HistoryBody>,
}

#[derive(Debug, Deserialize)]
struct HistoryBody {
    day: Option<OneOrMany<TradierDay>>,
}

#[derive(Debug, Deserialize)]
struct TradierDay {
    date: String,
    open: Option<f64>,
    high: Option<f64>,
    low: Option<f64>,
    close: Option<f64>,
    volume: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct ChainEnvelope {
    options: Option<ChainBody>,
}

#[derive(Debug, Deserialize)]
struct ChainBody {
    option: Option<OneOrMany<TradierOption>>,
}

#[derive(Debug, Deserialize)]
struct TradierOption {
    strike: f64,
    option_type: String,
    bid: Option<f64>,
    ask: Option<f64>,
    open_interest: Option<i64>,
    volume: Option<i64>,
    greeks: Option<TradierGreeks>,
}

#[derive(Debug, Deserialize)]
struct TradierGreeks {
    mid_iv: Option<f64>,
}

/// Tradier market-data client.
pub struct TradierClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    max_response_bytes: usize,
}

impl TradierClient {
    pub fn new(settings: &VendorSettings) -> Result<Self, VendorError> {
        if settings.tradier_api_key.is_empty() {
            return Err(VendorError::new(
                crate::errors::ErrorKind::Validation,
                "TRADIER_API_KEY not set",
            ));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.http_timeout_secs))
            .build()
            .map_err(VendorError::from)?;

        Ok(Self {
            client,
            api_key: settings.tradier_api_key.expose().to_string(),
            base_url: "https://api.tradier.com/v1".to_string(),
            max_response_bytes: settings.max_response_bytes,
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        endpoint: &str,
        params: &[(&str, String)],
    ) -> Result<T, VendorError> {
        let url = format!("{}/{}", self.base_url, endpoint);
        let body = with_retries(3, Duration::from_secs(2), || async {
            let response = self
                .client
                .get(&url)
                .bearer_auth(&self.api_key)
                .header("Accept", "application/json")
                .query(params)
                .send()
                .await
                .map_err(VendorError::from)?;

            if response.status().as_u16() == 429 {
                return Err(VendorError::rate_limit("options vendor rate limited"));
            }
            let response = response.error_for_status().map_err(VendorError::from)?;
            super::read_capped_body(response, self.max_response_bytes).await
        })
        .await?;

        serde_json::from_str(&body)
            .map_err(|e| VendorError::external(format!("bad response shape: {}", e)))
    }

    fn convert_option(raw: TradierOption) -> Option<OptionQuote> {
        let option_type = match raw.option_type.as_str() {
            "call" => OptionType::Call,
            "put" => OptionType::Put,
            _ => return None,
        };
        Some(OptionQuote {
            strike: raw.strike,
            option_type,
            bid: raw.bid,
            ask: raw.ask,
            open_interest: raw.open_interest.unwrap_or(0),
            volume: raw.volume.unwrap_or(0),
            implied_volatility: raw.greeks.and_then(|g| g.mid_iv.map(|iv| iv * 100.0)),
        })
    }
}

#[async_trait]
impl OptionsDataProvider for TradierClient {
    async fn get_stock_price(&self, ticker: &Ticker) -> Result<f64, VendorError> {
        let envelope: QuotesEnvelope = self
            .get_json("markets/quotes", &[("symbols", ticker.to_string())])
            .await?;

        envelope
            .quotes
            .and_then(|q| q.quote)
            .map(OneOrMany::into_vec)
            .and_then(|quotes| quotes.into_iter().find_map(|q| q.price()))
            .ok_or_else(|| VendorError::no_data(format!("no quote for {}", ticker)))
    }

    async fn get_stock_prices_batch(
        &self,
        tickers: &[Ticker],
    ) -> Result<HashMap<Ticker, f64>, VendorError> {
        let mut prices = HashMap::new();

        for chunk in tickers.chunks(MAX_BATCH_SYMBOLS) {
            let symbols = chunk
                .iter()
                .map(Ticker::as_str)
                .collect::<Vec<_>>()
                .join(",");
            let envelope: QuotesEnvelope = self
                .get_json("markets/quotes", &[("symbols", symbols)])
                .await?;

            let quotes = envelope
                .quotes
                .and_then(|q| q.quote)
                .map(OneOrMany::into_vec)
                .unwrap_or_default();

            for quote in quotes {
                if let (Ok(ticker), Some(price)) = (Ticker::new(&quote.symbol), quote.price()) {
                    prices.insert(ticker, price);
                }
            }
        }

        Ok(prices)
    }

    async fn get_expirations(&self, ticker: &Ticker) -> Result<Vec<NaiveDate>, VendorError> {
        let envelope: ExpirationsEnvelope = self
            .get_json("markets/options/expirations", &[("symbol", ticker.to_string())])
            .await?;

        let dates = envelope
            .expirations
            .and_then(|e| e.date)
            .map(OneOrMany::into_vec)
            .unwrap_or_default();

        Ok(dates.iter().filter_map(|d| d.parse().ok()).collect())
    }

    async fn get_option_chain(
        &self,
        ticker: &Ticker,
        expiration: NaiveDate,
    ) -> Result<OptionChain, VendorError> {
        let underlying_price = self.get_stock_price(ticker).await?;

        let envelope: ChainEnvelope = self
            .get_json(
                "markets/options/chains",
                &[
                    ("symbol", ticker.to_string()),
                    ("expiration", expiration.format("%Y-%m-%d").to_string()),
                    ("greeks", "true".to_string()),
                ],
            )
            .await?;

        let quotes: Vec<OptionQuote> = envelope
            .options
            .and_then(|o| o.option)
            .map(OneOrMany::into_vec)
            .unwrap_or_default()
            .into_iter()
            .filter_map(Self::convert_option)
            .collect();

        if quotes.is_empty() {
            return Err(VendorError::no_data(format!(
                "empty chain for {} {}",
                ticker, expiration
            )));
        }

        Ok(OptionChain {
            ticker: ticker.clone(),
            expiration,
            underlying_price,
            quotes,
        })
    }

    async fn get_daily_bars(
        &self,
        ticker: &Ticker,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailyBar>, VendorError> {
        let envelope: HistoryEnvelope = self
            .get_json(
                "markets/history",
                &[
                    ("symbol", ticker.to_string()),
                    ("interval", "daily".to_string()),
                    ("start", start.format("%Y-%m-%d").to_string()),
                    ("end", end.format("%Y-%m-%d").to_string()),
                ],
            )
            .await?;

        let days = envelope
            .history
            .and_then(|h| h.day)
            .map(OneOrMany::into_vec)
            .unwrap_or_default();

        let mut bars: Vec<DailyBar> = days
            .into_iter()
            .filter_map(|day| {
                Some(DailyBar {
                    date: day.date.parse().ok()?,
                    open: day.open?,
                    high: day.high?,
                    low: day.low?,
                    close: day.close?,
                    volume: day.volume.unwrap_or(0),
                })
            })
            .collect();
        bars.sort_by_key(|bar| bar.date);
        Ok(bars)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_price_prefers_last() {
        let quote = TradierQuote {
            symbol: "AAPL".into(),
            last: Some(200.0),
            bid: Some(199.0),
            ask: Some(201.0),
        };
        assert_eq!(quote.price(), Some(200.0));
    }

    #[test]
    fn test_quote_price_falls_back_to_mid() {
        let quote = TradierQuote {
            symbol: "AAPL".into(),
            last: None,
            bid: Some(199.0),
            ask: Some(201.0),
        };
        assert_eq!(quote.price(), Some(200.0));
    }

    #[test]
    fn test_single_quote_deserializes_as_bare_object() {
        let body = r#"{"quotes":{"quote":{"symbol":"AAPL","last":200.5}}}"#;
        let envelope: QuotesEnvelope = serde_json::from_str(body).unwrap();
        let quotes = envelope.quotes.unwrap().quote.unwrap().into_vec();
        assert_eq!(quotes.len(), 1);
        assert_eq!(quotes[0].price(), Some(200.5));
    }

    #[test]
    fn test_convert_option_maps_iv_to_percent() {
        let raw = TradierOption {
            strike: 100.0,
            option_type: "put".into(),
            bid: Some(1.0),
            ask: Some(1.2),
            open_interest: Some(500),
            volume: Some(40),
            greeks: Some(TradierGreeks { mid_iv: Some(0.45) }),
        };
        let quote = TradierClient::convert_option(raw).unwrap();
        assert_eq!(quote.option_type, OptionType::Put);
        assert!((quote.implied_volatility.unwrap() - 45.0).abs() < 1e-9);
    }

    #[test]
    fn test_convert_option_rejects_unknown_type() {
        let raw = TradierOption {
            strike: 100.0,
            option_type: "warrant".into(),
            bid: None,
            ask: None,
            open_interest: None,
            volume: None,
            greeks: None,
        };
        assert!(TradierClient::convert_option(raw).is_none());
    }
}
