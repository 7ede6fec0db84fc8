// Wire formats of the external price, quote and relay APIs
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// `GET /simple/token_price/{platform}`: keyed by lowercased contract address
pub type CoinGeckoTokenPriceResponse = HashMap<String, CoinGeckoTokenPrice>;

#[derive(Debug, Deserialize)]
pub struct CoinGeckoTokenPrice {
    pub usd: Option<f64>,
}

/// `GET /networks/{network}/tokens/{address}`
#[derive(Debug, Deserialize)]
pub struct GeckoTerminalTokenResponse {
    pub data: Option<GeckoTerminalToken>,
}

#[derive(Debug, Deserialize)]
pub struct GeckoTerminalToken {
    pub id: String,
    pub attributes: GeckoTerminalTokenAttributes,
}

#[derive(Debug, Deserialize)]
pub struct GeckoTerminalTokenAttributes {
    pub price_usd: Option<String>,
    pub name: Option<String>,
    pub symbol: Option<String>,
}

/// 0x swap quote. Every field is optional so structural validation can
/// report what is missing instead of failing deserialization.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZeroXQuoteResponse {
    pub buy_amount: Option<String>,
    pub min_buy_amount: Option<String>,
    pub transaction: Option<ZeroXTransaction>,
    pub price: Option<String>,
    pub guaranteed_price: Option<String>,
    pub allowance_target: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZeroXTransaction {
    pub to: String,
    pub data: String,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub gas: Option<String>,
    #[serde(default)]
    pub gas_price: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ApiErrorResponse {
    #[serde(alias = "reason", alias = "message")]
    pub error: String,
}

/// One call the relay executes from the smart wallet
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DelegatedAction {
    pub encoded_data: String,
    pub target_contract_address: String,
    pub value: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DelegateActionRequest<'a> {
    pub transaction_details: &'a [DelegatedAction],
    pub network: i64,
    pub wallet_address: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DelegateActionResponse {
    pub txn_hash: Option<String>,
}
