use async_trait::async_trait;
use log::{debug, error};
use reqwest::Client;
use rust_decimal::Decimal;
use std::str::FromStr;
use std::time::Duration;

use crate::config::PriceFeedConfig;
use crate::entity::MonitorError;
use crate::market::chains::{coingecko_platform, geckoterminal_network};
use crate::market::models::{CoinGeckoTokenPriceResponse, GeckoTerminalTokenResponse};

/// Source of current USD prices
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PriceOracle: Send + Sync {
    /// Current USD price of `token_address` on `chain_id`
    async fn current_price(&self, token_address: &str, chain_id: i64)
        -> Result<Decimal, MonitorError>;
}

fn build_client(timeout_secs: u64) -> Result<Client, MonitorError> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| MonitorError::HttpClient(e.to_string()))
}

/// Reads the non-2xx body for the error message
async fn feed_error(response: reqwest::Response) -> MonitorError {
    let status = response.status();
    let error_text = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    MonitorError::FeedUnavailable(format!("HTTP {}: {}", status, error_text))
}

fn positive_price(token: &str, price: Decimal) -> Result<Decimal, MonitorError> {
    if price <= Decimal::ZERO {
        return Err(MonitorError::MalformedFeedResponse {
            token: token.to_string(),
            reason: format!("non-positive price {}", price),
        });
    }
    Ok(price)
}

/// Extracts the USD price of `token` from a CoinGecko simple-price body
pub fn parse_coingecko_price(
    response: &CoinGeckoTokenPriceResponse,
    token: &str,
) -> Result<Decimal, MonitorError> {
    let usd = response
        .get(&token.to_lowercase())
        .and_then(|entry| entry.usd)
        .ok_or_else(|| MonitorError::MalformedFeedResponse {
            token: token.to_string(),
            reason: "missing usd price".to_string(),
        })?;

    let price = Decimal::try_from(usd).map_err(|e| MonitorError::MalformedFeedResponse {
        token: token.to_string(),
        reason: format!("unrepresentable price {}: {}", usd, e),
    })?;

    positive_price(token, price)
}

/// Extracts the USD price of `token` from a GeckoTerminal token body
pub fn parse_geckoterminal_price(
    response: &GeckoTerminalTokenResponse,
    token: &str,
) -> Result<Decimal, MonitorError> {
    let raw = response
        .data
        .as_ref()
        .and_then(|data| data.attributes.price_usd.as_deref())
        .ok_or_else(|| MonitorError::MalformedFeedResponse {
            token: token.to_string(),
            reason: "missing price_usd".to_string(),
        })?;

    let price = Decimal::from_str(raw)
        .or_else(|_| Decimal::from_scientific(raw))
        .map_err(|e| MonitorError::MalformedFeedResponse {
            token: token.to_string(),
            reason: format!("unparsable price_usd {:?}: {}", raw, e),
        })?;

    positive_price(token, price)
}

/// CoinGecko `simple/token_price` feed
pub struct CoinGeckoOracle {
    http_client: Client,
    config: PriceFeedConfig,
}

impl CoinGeckoOracle {
    pub fn new(config: PriceFeedConfig) -> Result<Self, MonitorError> {
        Ok(Self {
            http_client: build_client(config.timeout_secs)?,
            config,
        })
    }
}

#[async_trait]
impl PriceOracle for CoinGeckoOracle {
    async fn current_price(
        &self,
        token_address: &str,
        chain_id: i64,
    ) -> Result<Decimal, MonitorError> {
        let platform =
            coingecko_platform(chain_id).ok_or(MonitorError::UnsupportedChain(chain_id))?;
        let url = format!(
            "{}/simple/token_price/{}",
            self.config.base_url(),
            platform
        );

        let mut request = self
            .http_client
            .get(&url)
            .header("Accept", "application/json")
            .query(&[("contract_addresses", token_address), ("vs_currencies", "usd")]);
        if let Some(api_key) = &self.config.api_key {
            request = request.header(self.config.api_key_header(), api_key);
        }

        let response = request.send().await.map_err(|e| {
            error!("Price fetch failed for {} on {}: {}", token_address, chain_id, e);
            MonitorError::FeedUnavailable(e.to_string())
        })?;

        if !response.status().is_success() {
            return Err(feed_error(response).await);
        }

        let body: CoinGeckoTokenPriceResponse =
            response
                .json()
                .await
                .map_err(|e| MonitorError::MalformedFeedResponse {
                    token: token_address.to_string(),
                    reason: e.to_string(),
                })?;

        let price = parse_coingecko_price(&body, token_address)?;
        debug!("CoinGecko price for {} on {}: {}", token_address, platform, price);
        Ok(price)
    }
}

/// GeckoTerminal network token feed
pub struct GeckoTerminalOracle {
    http_client: Client,
    config: PriceFeedConfig,
}

impl GeckoTerminalOracle {
    pub fn new(config: PriceFeedConfig) -> Result<Self, MonitorError> {
        Ok(Self {
            http_client: build_client(config.timeout_secs)?,
            config,
        })
    }
}

#[async_trait]
impl PriceOracle for GeckoTerminalOracle {
    async fn current_price(
        &self,
        token_address: &str,
        chain_id: i64,
    ) -> Result<Decimal, MonitorError> {
        let network =
            geckoterminal_network(chain_id).ok_or(MonitorError::UnsupportedChain(chain_id))?;
        let url = format!(
            "{}/networks/{}/tokens/{}",
            self.config.base_url(),
            network,
            token_address
        );

        let response = self
            .http_client
            .get(&url)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| {
                error!("Price fetch failed for {} on {}: {}", token_address, chain_id, e);
                MonitorError::FeedUnavailable(e.to_string())
            })?;

        if !response.status().is_success() {
            return Err(feed_error(response).await);
        }

        let body: GeckoTerminalTokenResponse =
            response
                .json()
                .await
                .map_err(|e| MonitorError::MalformedFeedResponse {
                    token: token_address.to_string(),
                    reason: e.to_string(),
                })?;

        let price = parse_geckoterminal_price(&body, token_address)?;
        debug!("GeckoTerminal price for {} on {}: {}", token_address, network, price);
        Ok(price)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PriceFeedProvider;
    use rust_decimal_macros::dec;

    #[test]
    fn test_coingecko_lookup_is_case_insensitive() {
        let body: CoinGeckoTokenPriceResponse =
            serde_json::from_str(r#"{"0xabcdef": {"usd": 1.25}}"#).unwrap();
        assert_eq!(parse_coingecko_price(&body, "0xABCDEF").unwrap(), dec!(1.25));
    }

    #[test]
    fn test_coingecko_missing_token_is_malformed() {
        let body: CoinGeckoTokenPriceResponse =
            serde_json::from_str(r#"{"0xother": {"usd": 1.0}, "0xabc": {}}"#).unwrap();
        assert!(matches!(
            parse_coingecko_price(&body, "0xdead"),
            Err(MonitorError::MalformedFeedResponse { .. })
        ));
        assert!(matches!(
            parse_coingecko_price(&body, "0xabc"),
            Err(MonitorError::MalformedFeedResponse { .. })
        ));
    }

    #[test]
    fn test_geckoterminal_price_parsing() {
        let body: GeckoTerminalTokenResponse = serde_json::from_str(
            r#"{"data": {"id": "base_0xabc", "type": "token",
                "attributes": {"price_usd": "0.000123", "name": "Token", "symbol": "TKN"}}}"#,
        )
        .unwrap();
        assert_eq!(parse_geckoterminal_price(&body, "0xabc").unwrap(), dec!(0.000123));

        let sci: GeckoTerminalTokenResponse = serde_json::from_str(
            r#"{"data": {"id": "x", "attributes": {"price_usd": "1.5e-7"}}}"#,
        )
        .unwrap();
        assert_eq!(parse_geckoterminal_price(&sci, "0xabc").unwrap(), dec!(0.00000015));

        let empty: GeckoTerminalTokenResponse = serde_json::from_str(r#"{"data": null}"#).unwrap();
        assert!(parse_geckoterminal_price(&empty, "0xabc").is_err());
    }

    #[test]
    fn test_zero_price_is_rejected() {
        let body: CoinGeckoTokenPriceResponse =
            serde_json::from_str(r#"{"0xabc": {"usd": 0}}"#).unwrap();
        assert!(parse_coingecko_price(&body, "0xabc").is_err());
    }

    #[tokio::test]
    async fn test_unsupported_chain_fails_before_any_request() {
        let oracle = CoinGeckoOracle::new(PriceFeedConfig {
            provider: PriceFeedProvider::CoinGecko,
            base_url: Some("http://127.0.0.1:9".to_string()),
            api_key: None,
            api_key_header: None,
            timeout_secs: 1,
        })
        .unwrap();

        assert!(matches!(
            oracle.current_price("0xabc", 424242).await,
            Err(MonitorError::UnsupportedChain(424242))
        ));
    }
}
