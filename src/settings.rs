use std::fmt;
use std::path::Path;

use serde::Deserialize;

/// API key or token that must never appear in logs. `Debug` and `Display`
/// render a mask; the raw value is only reachable through `expose()`.
#[derive(Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Secret(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            write!(f, "<unset>")
        } else {
            write!(f, "***")
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VendorSettings {
    pub alphavantage_api_key: Secret,
    pub tradier_api_key: Secret,
    pub perplexity_api_key: Secret,
    pub telegram_bot_token: Secret,
    pub telegram_chat_id: String,
    /// Outbound HTTP timeout in seconds.
    pub http_timeout_secs: u64,
    /// Hard cap on vendor response bodies.
    pub max_response_bytes: usize,
}

impl Default for VendorSettings {
    fn default() -> Self {
        Self {
            alphavantage_api_key: Secret::default(),
            tradier_api_key: Secret::default(),
            perplexity_api_key: Secret::default(),
            telegram_bot_token: Secret::default(),
            telegram_chat_id: String::new(),
            http_timeout_secs: 30,
            max_response_bytes: 8 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BudgetSettings {
    pub daily_call_ceiling: i64,
    pub monthly_cost_ceiling: f64,
    /// Cost charged per paid sentiment call, in dollars.
    pub cost_per_call: f64,
}

impl Default for BudgetSettings {
    fn default() -> Self {
        Self {
            daily_call_ceiling: 40,
            monthly_cost_ceiling: 5.00,
            cost_per_call: 0.01,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VrpSettings {
    pub excellent_ratio: f64,
    pub good_ratio: f64,
    pub marginal_ratio: f64,
    pub min_moves: usize,
}

impl Default for VrpSettings {
    fn default() -> Self {
        Self {
            excellent_ratio: 2.0,
            good_ratio: 1.5,
            marginal_ratio: 1.2,
            min_moves: 4,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScoringSettings {
    pub vrp_weight: f64,
    pub consistency_weight: f64,
    pub liquidity_weight: f64,
    pub skew_weight: f64,
    pub tradeable_threshold: f64,
}

impl Default for ScoringSettings {
    fn default() -> Self {
        Self {
            vrp_weight: 0.40,
            consistency_weight: 0.25,
            liquidity_weight: 0.20,
            skew_weight: 0.15,
            tradeable_threshold: 55.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LiquiditySettings {
    pub excellent_oi: i64,
    pub good_oi: i64,
    pub warning_oi: i64,
    pub min_oi: i64,
    pub excellent_volume: i64,
    pub good_volume: i64,
    pub min_volume: i64,
    pub excellent_spread_pct: f64,
    pub good_spread_pct: f64,
    pub warning_spread_pct: f64,
    pub max_spread_pct: f64,
}

impl Default for LiquiditySettings {
    fn default() -> Self {
        Self {
            excellent_oi: 1000,
            good_oi: 500,
            warning_oi: 100,
            min_oi: 50,
            excellent_volume: 250,
            good_volume: 100,
            min_volume: 20,
            excellent_spread_pct: 5.0,
            good_spread_pct: 8.0,
            warning_spread_pct: 12.0,
            max_spread_pct: 15.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    /// Candidates below this VRP ratio are dropped before enrichment.
    pub vrp_ratio_floor: f64,
    /// Cap on paid sentiment fetches per pipeline run.
    pub max_sentiment_calls: usize,
    pub max_digest_size: usize,
    /// Days of upcoming earnings a digest run looks at (today + N-1).
    pub upcoming_days: i64,
    pub sentiment_cache_ttl_hours: i64,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            vrp_ratio_floor: 1.2,
            max_sentiment_calls: 15,
            max_digest_size: 10,
            upcoming_days: 4,
            sentiment_cache_ttl_hours: 3,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub l1_max_entries: usize,
    pub calendar_ttl_hours: i64,
    pub stock_price_ttl_secs: i64,
    pub option_chain_ttl_secs: i64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            l1_max_entries: 1000,
            calendar_ttl_hours: 24,
            stock_price_ttl_secs: 30,
            option_chain_ttl_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub port: u16,
    /// Directory the weekly-backup job writes snapshots into.
    pub backup_dir: String,
    /// Shared key for the alert-ingest endpoint. Requests are rejected as
    /// misconfigured when this is unset.
    pub webhook_auth_key: Secret,
    /// Secret token expected on bot webhook calls.
    pub bot_webhook_secret: Secret,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            port: 3000,
            backup_dir: "./backups".to_string(),
            webhook_auth_key: Secret::default(),
            bot_webhook_secret: Secret::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Settings {
    #[serde(skip)]
    pub database_url: Secret,
    pub vendors: VendorSettings,
    pub budget: BudgetSettings,
    pub vrp: VrpSettings,
    pub scoring: ScoringSettings,
    pub liquidity: LiquiditySettings,
    pub pipeline: PipelineSettings,
    pub cache: CacheSettings,
    pub server: ServerSettings,
}

impl Settings {
    /// Load settings: defaults, then the optional TOML file at `CONFIG_PATH`
    /// (or `./config.toml`), then environment variables on top.
    pub fn load() -> Result<Self, String> {
        let path = std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());

        let mut settings = if Path::new(&path).exists() {
            let raw = std::fs::read_to_string(&path)
                .map_err(|e| format!("Failed to read config file {}: {}", path, e))?;
            toml::from_str(&raw)
                .map_err(|e| format!("Failed to parse config file {}: {}", path, e))?
        } else {
            Settings::default()
        };

        settings.apply_env();
        Ok(settings)
    }

    fn apply_env(&mut self) {
        if let Ok(v) = std::env::var("DATABASE_URL") {
            self.database_url = Secret::new(v);
        }
        if let Ok(v) = std::env::var("ALPHAVANTAGE_API_KEY") {
            self.vendors.alphavantage_api_key = Secret::new(v);
        }
        if let Ok(v) = std::env::var("TRADIER_API_KEY") {
            self.vendors.tradier_api_key = Secret::new(v);
        }
        if let Ok(v) = std::env::var("PERPLEXITY_API_KEY") {
            self.vendors.perplexity_api_key = Secret::new(v);
        }
        if let Ok(v) = std::env::var("TELEGRAM_BOT_TOKEN") {
            self.vendors.telegram_bot_token = Secret::new(v);
        }
        if let Ok(v) = std::env::var("TELEGRAM_CHAT_ID") {
            self.vendors.telegram_chat_id = v;
        }
        if let Ok(v) = std::env::var("WEBHOOK_AUTH_KEY") {
            self.server.webhook_auth_key = Secret::new(v);
        }
        if let Ok(v) = std::env::var("BOT_WEBHOOK_SECRET") {
            self.server.bot_webhook_secret = Secret::new(v);
        }
        if let Some(v) = env_parse("PORT") {
            self.server.port = v;
        }
        if let Some(v) = env_parse("DAILY_CALL_CEILING") {
            self.budget.daily_call_ceiling = v;
        }
        if let Some(v) = env_parse("MONTHLY_COST_CEILING") {
            self.budget.monthly_cost_ceiling = v;
        }
        if let Some(v) = env_parse("MAX_DIGEST_SIZE") {
            self.pipeline.max_digest_size = v;
        }
    }

    /// Startup validation. Missing configuration is fatal here rather than a
    /// surprise at the first job run.
    pub fn validate(&self) -> Result<(), String> {
        if self.database_url.is_empty() {
            return Err("DATABASE_URL is not set".to_string());
        }
        if self.budget.daily_call_ceiling < 0 {
            return Err("daily_call_ceiling must be >= 0".to_string());
        }
        if self.budget.monthly_cost_ceiling < 0.0 {
            return Err("monthly_cost_ceiling must be >= 0".to_string());
        }
        let weight_sum = self.scoring.vrp_weight
            + self.scoring.consistency_weight
            + self.scoring.liquidity_weight
            + self.scoring.skew_weight;
        if (weight_sum - 1.0).abs() > 1e-6 {
            return Err(format!("scoring weights must sum to 1.0, got {}", weight_sum));
        }
        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_is_masked_in_debug() {
        let secret = Secret::new("sk-very-secret");
        assert_eq!(format!("{:?}", secret), "***");
        assert_eq!(format!("{:?}", Secret::default()), "<unset>");
    }

    #[test]
    fn test_defaults_validate_once_database_is_set() {
        let mut settings = Settings::default();
        assert!(settings.validate().is_err());

        settings.database_url = Secret::new("postgres://localhost/ivcrush");
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_bad_weights_rejected() {
        let mut settings = Settings::default();
        settings.database_url = Secret::new("postgres://localhost/ivcrush");
        settings.scoring.vrp_weight = 0.9;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_settings_debug_never_contains_raw_keys() {
        let mut settings = Settings::default();
        settings.vendors.perplexity_api_key = Secret::new("pplx-123456");
        let rendered = format!("{:?}", settings);
        assert!(!rendered.contains("pplx-123456"));
    }
}
