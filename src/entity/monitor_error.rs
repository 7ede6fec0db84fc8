use rust_decimal::Decimal;

#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    #[error("Unsupported chain ID: {0}")]
    UnsupportedChain(i64),

    #[error("Price feed unavailable: {0}")]
    FeedUnavailable(String),

    #[error("Malformed price feed response for {token}: {reason}")]
    MalformedFeedResponse { token: String, reason: String },

    #[error("Quote service unavailable: {0}")]
    QuoteUnavailable(String),

    #[error("Invalid quote response structure: {0}")]
    InvalidQuoteStructure(String),

    #[error("Invalid buy amount in quote: {0}")]
    NonPositiveBuyAmount(String),

    #[error("Price impact too high: {impact}% (max {max}%)")]
    PriceImpactExceeded { impact: Decimal, max: Decimal },

    /// The relay definitely did not accept the transaction
    #[error("Swap submission rejected: {0}")]
    SubmissionRejected(String),

    /// The transaction may or may not have been broadcast
    #[error("Swap submission outcome unknown: {0}")]
    SubmissionOutcomeUnknown(String),

    #[error("Invalid order: {0}")]
    InvalidOrder(String),

    #[error("Order not found: {0}")]
    OrderNotFound(String),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Queue {0} is closed")]
    QueueClosed(String),

    #[error("Job panicked: {0}")]
    JobPanicked(String),

    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),
}

impl From<sqlx::Error> for MonitorError {
    fn from(err: sqlx::Error) -> Self {
        MonitorError::StoreUnavailable(err.to_string())
    }
}

impl MonitorError {
    /// Whether a later attempt of the same job can succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            MonitorError::FeedUnavailable(_)
                | MonitorError::QuoteUnavailable(_)
                | MonitorError::SubmissionRejected(_)
                | MonitorError::StoreUnavailable(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_retryable_classification() {
        assert!(MonitorError::SubmissionRejected("nonce too low".into()).is_retryable());
        assert!(MonitorError::StoreUnavailable("pool timed out".into()).is_retryable());
        assert!(!MonitorError::PriceImpactExceeded {
            impact: dec!(8),
            max: dec!(5)
        }
        .is_retryable());
        assert!(!MonitorError::InvalidQuoteStructure("missing transaction".into()).is_retryable());
        assert!(!MonitorError::SubmissionOutcomeUnknown("relay timed out".into()).is_retryable());
        assert!(!MonitorError::JobPanicked("index out of bounds".into()).is_retryable());
    }

    #[test]
    fn test_price_impact_message() {
        let err = MonitorError::PriceImpactExceeded {
            impact: dec!(8),
            max: dec!(5),
        };
        assert_eq!(err.to_string(), "Price impact too high: 8% (max 5%)");
    }
}
