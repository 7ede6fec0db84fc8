use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Status of a conditional swap order
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum OrderStatus {
    Pending,
    Executed,
    Failed,
}

impl OrderStatus {
    /// Executed and failed orders never change again
    pub fn is_terminal(&self) -> bool {
        !matches!(self, OrderStatus::Pending)
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderStatus::Pending => write!(f, "PENDING"),
            OrderStatus::Executed => write!(f, "EXECUTED"),
            OrderStatus::Failed => write!(f, "FAILED"),
        }
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(OrderStatus::Pending),
            "EXECUTED" => Ok(OrderStatus::Executed),
            "FAILED" => Ok(OrderStatus::Failed),
            other => Err(format!("Unknown order status: {}", other)),
        }
    }
}

impl TryFrom<String> for OrderStatus {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// A pending instruction to swap `sell_token` for `buy_token` once the USD
/// price of the buy token falls to or below `target_price`.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Order {
    pub id: String,
    pub amount: Decimal,
    pub target_price: Decimal,
    pub smart_wallet_address: String,
    pub sell_token: String,
    pub buy_token: String,
    pub chain_id: i64,
    #[sqlx(try_from = "String")]
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub executed_at: Option<DateTime<Utc>>,
    pub transaction_hash: Option<String>,
    pub executed_price: Option<Decimal>,
    pub error: Option<String>,
    pub submission_key: Option<String>,
}

impl Order {
    /// Builds a fresh pending order
    pub fn new(
        id: impl Into<String>,
        amount: Decimal,
        target_price: Decimal,
        smart_wallet_address: impl Into<String>,
        sell_token: impl Into<String>,
        buy_token: impl Into<String>,
        chain_id: i64,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            amount,
            target_price,
            smart_wallet_address: smart_wallet_address.into(),
            sell_token: sell_token.into(),
            buy_token: buy_token.into(),
            chain_id,
            status: OrderStatus::Pending,
            created_at: now,
            updated_at: now,
            executed_at: None,
            transaction_hash: None,
            executed_price: None,
            error: None,
            submission_key: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == OrderStatus::Pending
    }

    /// Buy when the price falls to or below the target
    pub fn is_triggered_by(&self, current_price: Decimal) -> bool {
        current_price <= self.target_price
    }
}

/// Partial update of an order row. `None` leaves the column untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderUpdate {
    pub status: Option<OrderStatus>,
    pub executed_at: Option<DateTime<Utc>>,
    pub transaction_hash: Option<String>,
    pub executed_price: Option<Decimal>,
    pub error: Option<String>,
    /// `Some(None)` clears the key
    pub submission_key: Option<Option<String>>,
}

impl OrderUpdate {
    pub fn executed(transaction_hash: impl Into<String>, executed_price: Decimal) -> Self {
        Self {
            status: Some(OrderStatus::Executed),
            executed_at: Some(Utc::now()),
            transaction_hash: Some(transaction_hash.into()),
            executed_price: Some(executed_price),
            ..Self::default()
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: Some(OrderStatus::Failed),
            error: Some(error.into()),
            ..Self::default()
        }
    }

    pub fn claim_submission(key: impl Into<String>) -> Self {
        Self {
            submission_key: Some(Some(key.into())),
            ..Self::default()
        }
    }

    /// Whether this update sets a submission key. A claim only applies to an
    /// order that holds no key yet.
    pub fn is_claim(&self) -> bool {
        matches!(self.submission_key, Some(Some(_)))
    }

    pub fn release_submission() -> Self {
        Self {
            submission_key: Some(None),
            ..Self::default()
        }
    }

    /// Applies the set fields onto an in-memory copy of the order
    pub fn apply_to(&self, order: &mut Order, now: DateTime<Utc>) {
        if let Some(status) = self.status {
            order.status = status;
        }
        if let Some(executed_at) = self.executed_at {
            order.executed_at = Some(executed_at);
        }
        if let Some(hash) = &self.transaction_hash {
            order.transaction_hash = Some(hash.clone());
        }
        if let Some(price) = self.executed_price {
            order.executed_price = Some(price);
        }
        if let Some(error) = &self.error {
            order.error = Some(error.clone());
        }
        if let Some(key) = &self.submission_key {
            order.submission_key = key.clone();
        }
        order.updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn order() -> Order {
        Order::new("o-1", dec!(10), dec!(100), "0xwallet", "0xsell", "0xbuy", 8453)
    }

    #[test]
    fn test_status_round_trip_through_strings() {
        for status in [OrderStatus::Pending, OrderStatus::Executed, OrderStatus::Failed] {
            assert_eq!(status.to_string().parse::<OrderStatus>().unwrap(), status);
        }
        assert!("CANCELLED".parse::<OrderStatus>().is_err());
    }

    #[test]
    fn test_trigger_condition_is_inclusive() {
        let order = order();
        assert!(order.is_triggered_by(dec!(95)));
        assert!(order.is_triggered_by(dec!(100)));
        assert!(!order.is_triggered_by(dec!(100.01)));
    }

    #[test]
    fn test_partial_update_only_touches_set_fields() {
        let mut order = order();
        order.submission_key = Some("key".to_string());
        let before = order.clone();
        let now = Utc::now();

        OrderUpdate::failed("boom").apply_to(&mut order, now);

        assert_eq!(order.status, OrderStatus::Failed);
        assert_eq!(order.error.as_deref(), Some("boom"));
        assert_eq!(order.submission_key, before.submission_key);
        assert_eq!(order.transaction_hash, None);
        assert_eq!(order.updated_at, now);

        OrderUpdate::release_submission().apply_to(&mut order, now);
        assert_eq!(order.submission_key, None);
    }

    #[test]
    fn test_only_key_setting_updates_are_claims() {
        assert!(OrderUpdate::claim_submission("exec-1").is_claim());
        assert!(!OrderUpdate::release_submission().is_claim());
        assert!(!OrderUpdate::failed("boom").is_claim());
    }
}
