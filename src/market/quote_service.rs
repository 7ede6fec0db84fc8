use async_trait::async_trait;
use log::{debug, info};
use reqwest::Client;
use rust_decimal::Decimal;
use std::str::FromStr;
use std::time::Duration;

use crate::config::QuoteConfig;
use crate::entity::{MonitorError, Quote, QuoteTransaction};
use crate::market::models::{ApiErrorResponse, ZeroXQuoteResponse};

/// Source of executable swap quotes
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SwapQuoteService: Send + Sync {
    /// Quote for selling `sell_amount` (atomic units) of `sell_token` for
    /// `buy_token`, executed by `taker`. The returned quote is validated.
    async fn get_quote(
        &self,
        sell_token: &str,
        buy_token: &str,
        sell_amount: &str,
        chain_id: i64,
        taker: &str,
    ) -> Result<Quote, MonitorError>;
}

fn parse_price(field: &str, raw: Option<&str>) -> Result<Decimal, MonitorError> {
    let raw = raw.ok_or_else(|| MonitorError::InvalidQuoteStructure(format!("missing {}", field)))?;
    let price = Decimal::from_str(raw)
        .or_else(|_| Decimal::from_scientific(raw))
        .map_err(|_| MonitorError::InvalidQuoteStructure(format!("unparsable {}: {}", field, raw)))?;
    if price <= Decimal::ZERO {
        return Err(MonitorError::InvalidQuoteStructure(format!(
            "non-positive {}: {}",
            field, raw
        )));
    }
    Ok(price)
}

/// Checks the aggregator response and turns it into a [`Quote`]
pub fn validate_quote(raw: ZeroXQuoteResponse) -> Result<Quote, MonitorError> {
    let (Some(transaction), Some(buy_amount), Some(min_buy_amount)) =
        (raw.transaction, raw.buy_amount, raw.min_buy_amount)
    else {
        return Err(MonitorError::InvalidQuoteStructure(
            "transaction, buyAmount and minBuyAmount are required".to_string(),
        ));
    };

    let buy_amount_value = i128::from_str(buy_amount.trim()).map_err(|_| {
        MonitorError::InvalidQuoteStructure(format!("unparsable buyAmount: {}", buy_amount))
    })?;
    if buy_amount_value <= 0 {
        return Err(MonitorError::NonPositiveBuyAmount(buy_amount));
    }

    let min_buy_amount = u128::from_str(min_buy_amount.trim()).map_err(|_| {
        MonitorError::InvalidQuoteStructure(format!("unparsable minBuyAmount: {}", min_buy_amount))
    })?;

    let price = parse_price("price", raw.price.as_deref())?;
    let guaranteed_price = parse_price("guaranteedPrice", raw.guaranteed_price.as_deref())?;

    Ok(Quote {
        buy_amount: buy_amount_value as u128,
        min_buy_amount,
        transaction: QuoteTransaction {
            to: transaction.to,
            data: transaction.data,
            value: transaction.value.unwrap_or_else(|| "0".to_string()),
            gas: transaction.gas,
            gas_price: transaction.gas_price,
        },
        price,
        guaranteed_price,
        allowance_target: raw.allowance_target,
    })
}

/// Rejects quotes whose price impact exceeds `max_percent`
pub fn check_price_impact(quote: &Quote, max_percent: Decimal) -> Result<Decimal, MonitorError> {
    let impact = quote.price_impact_percent();
    if impact > max_percent {
        return Err(MonitorError::PriceImpactExceeded {
            impact: impact.normalize(),
            max: max_percent.normalize(),
        });
    }
    Ok(impact)
}

/// 0x swap API (`/swap/permit2/quote`)
pub struct ZeroXQuoteService {
    http_client: Client,
    config: QuoteConfig,
}

impl ZeroXQuoteService {
    pub fn new(config: QuoteConfig) -> Result<Self, MonitorError> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| MonitorError::HttpClient(e.to_string()))?;
        Ok(Self {
            http_client,
            config,
        })
    }
}

#[async_trait]
impl SwapQuoteService for ZeroXQuoteService {
    async fn get_quote(
        &self,
        sell_token: &str,
        buy_token: &str,
        sell_amount: &str,
        chain_id: i64,
        taker: &str,
    ) -> Result<Quote, MonitorError> {
        let url = format!(
            "{}/swap/permit2/quote",
            self.config.base_url.trim_end_matches('/')
        );
        let chain_id_param = chain_id.to_string();
        let slippage_param = self.config.slippage_bps.to_string();
        let params = [
            ("chainId", chain_id_param.as_str()),
            ("sellToken", sell_token),
            ("buyToken", buy_token),
            ("sellAmount", sell_amount),
            ("taker", taker),
            ("slippageBps", slippage_param.as_str()),
        ];

        debug!("Requesting quote with parameters: {:?}", params);

        let mut request = self
            .http_client
            .get(&url)
            .header("0x-version", "v2")
            .query(&params);
        if let Some(api_key) = &self.config.api_key {
            request = request.header("0x-api-key", api_key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| MonitorError::QuoteUnavailable(format!("HTTP request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            let message = serde_json::from_str::<ApiErrorResponse>(&error_text)
                .map(|e| e.error)
                .unwrap_or(error_text);
            return Err(MonitorError::QuoteUnavailable(format!(
                "0x API error (HTTP {}): {}",
                status, message
            )));
        }

        let raw: ZeroXQuoteResponse = response.json().await.map_err(|e| {
            MonitorError::InvalidQuoteStructure(format!("Failed to parse quote response: {}", e))
        })?;

        let quote = validate_quote(raw)?;
        info!(
            "Quote received: sell_amount={}, buy_amount={}, min_buy_amount={}",
            sell_amount, quote.buy_amount, quote.min_buy_amount
        );

        Ok(quote)
    }
}
