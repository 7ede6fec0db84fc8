use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Watch-only price alert: no swap, only a log/match audit trail
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PriceTrigger {
    pub id: i64,
    pub fid: i64,
    pub wallet_address: String,
    pub token_address: String,
    pub chain_id: i64,
    pub usd_price: Decimal,
    pub interval_secs: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    /// Timestamp of the newest log row, derived when loading
    pub last_checked_at: Option<DateTime<Utc>>,
}

impl PriceTrigger {
    pub fn is_triggered_by(&self, current_price: Decimal) -> bool {
        current_price <= self.usd_price
    }

    /// A trigger is due once its polling interval has elapsed since the last
    /// check, give or take `slack` to absorb tick jitter.
    pub fn is_due(&self, now: DateTime<Utc>, slack: Duration) -> bool {
        match self.last_checked_at {
            None => true,
            Some(last) => {
                let interval = Duration::seconds(i64::from(self.interval_secs.max(0)));
                now - last + slack >= interval
            }
        }
    }
}

/// One row per poll, matching or not
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct TriggerLog {
    pub id: i64,
    pub trigger_id: i64,
    pub current_price: Decimal,
    pub check_result: bool,
    pub timestamp: DateTime<Utc>,
}

/// One row per confirmed match
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct TriggerMatch {
    pub id: i64,
    pub trigger_id: i64,
    pub current_price: Decimal,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn trigger(last_checked_at: Option<DateTime<Utc>>) -> PriceTrigger {
        PriceTrigger {
            id: 1,
            fid: 42,
            wallet_address: "0xwallet".to_string(),
            token_address: "0xtoken".to_string(),
            chain_id: 8453,
            usd_price: dec!(100),
            interval_secs: 60,
            is_active: true,
            created_at: Utc::now(),
            last_checked_at,
        }
    }

    #[test]
    fn test_never_checked_trigger_is_due() {
        assert!(trigger(None).is_due(Utc::now(), Duration::zero()));
    }

    #[test]
    fn test_due_respects_interval_and_slack() {
        let now = Utc::now();
        let recent = trigger(Some(now - Duration::seconds(30)));
        assert!(!recent.is_due(now, Duration::seconds(5)));

        let jittered = trigger(Some(now - Duration::seconds(57)));
        assert!(jittered.is_due(now, Duration::seconds(5)));
        assert!(!jittered.is_due(now, Duration::zero()));
    }

    #[test]
    fn test_threshold_matches_at_or_below() {
        let trigger = trigger(None);
        assert!(!trigger.is_triggered_by(dec!(120)));
        assert!(trigger.is_triggered_by(dec!(95)));
        assert!(trigger.is_triggered_by(dec!(100)));
    }
}
