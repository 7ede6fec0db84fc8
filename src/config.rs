use config::{Config, ConfigBuilder, Environment, File, FileFormat};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::time::Duration;

use crate::entity::MonitorError;

/// Application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub price_feed: PriceFeedConfig,
    pub quote: QuoteConfig,
    pub execution: ExecutionConfig,
    pub scheduler: SchedulerConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PriceFeedProvider {
    CoinGecko,
    GeckoTerminal,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PriceFeedConfig {
    pub provider: PriceFeedProvider,
    /// Falls back to the provider's public endpoint
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    /// Header carrying `api_key`. Defaults to the one CoinGecko expects for
    /// the configured host.
    pub api_key_header: Option<String>,
    pub timeout_secs: u64,
}

impl PriceFeedConfig {
    pub fn api_key_header(&self) -> &str {
        match &self.api_key_header {
            Some(header) => header,
            None if self.base_url().contains("pro-api.coingecko.com") => "x-cg-pro-api-key",
            None => "x-cg-demo-api-key",
        }
    }

    pub fn base_url(&self) -> String {
        match (&self.base_url, self.provider) {
            (Some(url), _) => url.trim_end_matches('/').to_string(),
            (None, PriceFeedProvider::CoinGecko) => "https://api.coingecko.com/api/v3".to_string(),
            (None, PriceFeedProvider::GeckoTerminal) => {
                "https://api.geckoterminal.com/api/v2".to_string()
            }
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct QuoteConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub slippage_bps: u32,
    /// Maximum tolerated price impact, in percent
    pub max_price_impact: Decimal,
    /// Decimals used to convert order amounts into sell-token atomic units
    pub sell_token_decimals: u32,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    pub price_check_interval_secs: u64,
    pub price_check_rate_limit: u32,
    pub swap_rate_limit: u32,
    pub max_attempts: u32,
    pub backoff_base_secs: u64,
    pub drain_timeout_secs: u64,
    pub trigger_interval_slack_secs: u64,
}

impl SchedulerConfig {
    pub fn price_check_interval(&self) -> Duration {
        Duration::from_secs(self.price_check_interval_secs)
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_secs(self.backoff_base_secs)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.drain_timeout_secs)
    }

    /// Tolerance when deciding whether a trigger's polling interval elapsed
    pub fn trigger_interval_slack(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.trigger_interval_slack_secs.min(3600) as i64)
    }
}

impl AppConfig {
    /// Load configuration from defaults, an optional `monitor.toml` and the
    /// environment (`MONITOR__QUOTE__API_KEY`, ...). `DATABASE_URL` is honored
    /// as well.
    pub fn load() -> Result<Self, MonitorError> {
        let builder = Self::defaults()?
            .add_source(File::with_name("monitor").required(false))
            .add_source(
                Environment::with_prefix("MONITOR")
                    .separator("__")
                    .try_parsing(true),
            )
            .set_override_option("database.url", std::env::var("DATABASE_URL").ok())?;

        Ok(builder.build()?.try_deserialize()?)
    }

    /// Load configuration from defaults overlaid with a TOML document
    pub fn from_toml(toml: &str) -> Result<Self, MonitorError> {
        let builder = Self::defaults()?.add_source(File::from_str(toml, FileFormat::Toml));
        Ok(builder.build()?.try_deserialize()?)
    }

    fn defaults() -> Result<ConfigBuilder<config::builder::DefaultState>, MonitorError> {
        Ok(Config::builder()
            .set_default("database.max_connections", 10)?
            .set_default("price_feed.provider", "coingecko")?
            .set_default("price_feed.timeout_secs", 10)?
            .set_default("quote.base_url", "https://api.0x.org")?
            .set_default("quote.slippage_bps", 100)?
            .set_default("quote.max_price_impact", "5")?
            .set_default("quote.sell_token_decimals", 6)?
            .set_default("quote.timeout_secs", 15)?
            .set_default("execution.base_url", "https://api.enclave.money")?
            .set_default("execution.timeout_secs", 60)?
            .set_default("scheduler.price_check_interval_secs", 60)?
            .set_default("scheduler.price_check_rate_limit", 5)?
            .set_default("scheduler.swap_rate_limit", 1)?
            .set_default("scheduler.max_attempts", 3)?
            .set_default("scheduler.backoff_base_secs", 5)?
            .set_default("scheduler.drain_timeout_secs", 90)?
            .set_default("scheduler.trigger_interval_slack_secs", 5)?)
    }
}
