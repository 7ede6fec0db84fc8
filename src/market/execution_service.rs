use async_trait::async_trait;
use log::{error, info};
use reqwest::{Client, StatusCode};
use std::time::Duration;

use crate::config::ExecutionConfig;
use crate::entity::{MonitorError, QuoteTransaction};
use crate::market::models::{
    ApiErrorResponse, DelegateActionRequest, DelegateActionResponse, DelegatedAction,
};

impl From<&QuoteTransaction> for DelegatedAction {
    fn from(transaction: &QuoteTransaction) -> Self {
        Self {
            encoded_data: transaction.data.clone(),
            target_contract_address: transaction.to.clone(),
            value: transaction.value.clone(),
        }
    }
}

/// Relay that submits pre-authorized calls on behalf of a smart wallet
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ExecutionChannel: Send + Sync {
    /// Submits `actions` from `wallet_address` on `chain_id` and returns the
    /// transaction hash
    async fn delegate_action(
        &self,
        actions: &[DelegatedAction],
        chain_id: i64,
        wallet_address: &str,
    ) -> Result<String, MonitorError>;
}

/// Enclave delegated-action relay
pub struct EnclaveExecutionChannel {
    http_client: Client,
    config: ExecutionConfig,
}

impl EnclaveExecutionChannel {
    pub fn new(config: ExecutionConfig) -> Result<Self, MonitorError> {
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
impl ExecutionChannel for EnclaveExecutionChannel {
    async fn delegate_action(
        &self,
        actions: &[DelegatedAction],
        chain_id: i64,
        wallet_address: &str,
    ) -> Result<String, MonitorError> {
        let url = format!(
            "{}/v1/delegate-action",
            self.config.base_url.trim_end_matches('/')
        );
        let body = DelegateActionRequest {
            transaction_details: actions,
            network: chain_id,
            wallet_address,
        };

        info!(
            "Submitting {} delegated action(s) for {} on chain {}",
            actions.len(),
            wallet_address,
            chain_id
        );

        let mut request = self.http_client.post(&url).json(&body);
        if let Some(api_key) = &self.config.api_key {
            request = request.header("Authorization", api_key);
        }

        let response = request.send().await.map_err(|e| {
            error!("Delegated action request failed: {}", e);
            // Only a refused connection proves nothing reached the relay
            if e.is_connect() || e.is_builder() {
                MonitorError::SubmissionRejected(e.to_string())
            } else {
                MonitorError::SubmissionOutcomeUnknown(e.to_string())
            }
        })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            MonitorError::SubmissionOutcomeUnknown(format!(
                "Failed to read relay response (HTTP {}): {}",
                status, e
            ))
        })?;
        parse_relay_response(status, &body)
    }
}

/// Maps a relay reply to a transaction hash. A non-2xx status is a definite
/// rejection; a 2xx reply without a usable hash may still have been broadcast.
pub(crate) fn parse_relay_response(status: StatusCode, body: &str) -> Result<String, MonitorError> {
    if !status.is_success() {
        let message = serde_json::from_str::<ApiErrorResponse>(body)
            .map(|e| e.error)
            .unwrap_or_else(|_| body.to_string());
        return Err(MonitorError::SubmissionRejected(format!(
            "relay rejected submission (HTTP {}): {}",
            status, message
        )));
    }

    let result: DelegateActionResponse = serde_json::from_str(body).map_err(|e| {
        MonitorError::SubmissionOutcomeUnknown(format!("Failed to parse relay response: {}", e))
    })?;

    result
        .txn_hash
        .filter(|hash| !hash.is_empty())
        .ok_or_else(|| {
            MonitorError::SubmissionOutcomeUnknown(
                "relay accepted the request but returned no transaction hash".to_string(),
            )
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_from_quote_transaction() {
        let action = DelegatedAction::from(&QuoteTransaction {
            to: "0xrouter".to_string(),
            data: "0xcafe".to_string(),
            value: "0".to_string(),
            gas: Some("21000".to_string()),
            gas_price: None,
        });

        assert_eq!(action.target_contract_address, "0xrouter");
        assert_eq!(action.encoded_data, "0xcafe");
        assert_eq!(
            serde_json::to_value(&action).unwrap(),
            serde_json::json!({
                "encodedData": "0xcafe",
                "targetContractAddress": "0xrouter",
                "value": "0"
            })
        );
    }

    #[test]
    fn test_request_body_shape() {
        let actions = vec![DelegatedAction {
            encoded_data: "0x01".to_string(),
            target_contract_address: "0x02".to_string(),
            value: "0".to_string(),
        }];
        let body = DelegateActionRequest {
            transaction_details: &actions,
            network: 8453,
            wallet_address: "0xwallet",
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["network"], 8453);
        assert_eq!(json["walletAddress"], "0xwallet");
        assert_eq!(json["transactionDetails"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_relay_success_returns_hash() {
        let hash = parse_relay_response(StatusCode::OK, r#"{"txnHash":"0xabc"}"#).unwrap();
        assert_eq!(hash, "0xabc");
    }

    #[test]
    fn test_relay_error_status_is_a_rejection() {
        let err = parse_relay_response(
            StatusCode::BAD_REQUEST,
            r#"{"error":"insufficient allowance"}"#,
        )
        .unwrap_err();
        match err {
            MonitorError::SubmissionRejected(message) => {
                assert!(message.contains("insufficient allowance"));
                assert!(message.contains("400"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_relay_success_without_hash_is_unknown() {
        for body in [
            r#"{"status":"accepted"}"#,
            r#"{"txnHash":""}"#,
            "<html>gateway</html>",
        ] {
            let err = parse_relay_response(StatusCode::OK, body).unwrap_err();
            assert!(
                matches!(err, MonitorError::SubmissionOutcomeUnknown(_)),
                "body {} gave {:?}",
                body,
                err
            );
        }
    }
}
