use crate::entity::{MonitorError, Order, OrderUpdate, PriceTrigger, TriggerLog, TriggerMatch};
use crate::interactor::db;
use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::PgPool;
use std::sync::Arc;

/// Persistence boundary for orders
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Pending orders, oldest first
    async fn list_active_orders(&self) -> Result<Vec<Order>, MonitorError>;

    async fn find_order(&self, order_id: &str) -> Result<Option<Order>, MonitorError>;

    /// Partial update of a pending order, always stamping `updated_at`.
    /// Returns `false` when the order is missing or already terminal.
    async fn apply_update(&self, order_id: &str, update: &OrderUpdate)
        -> Result<bool, MonitorError>;
}

/// Persistence boundary for price triggers and their append-only history
#[async_trait]
pub trait TriggerStore: Send + Sync {
    /// Active triggers, oldest first
    async fn list_active_triggers(&self) -> Result<Vec<PriceTrigger>, MonitorError>;

    async fn record_log(
        &self,
        trigger_id: i64,
        current_price: Decimal,
        check_result: bool,
    ) -> Result<(), MonitorError>;

    /// Appends a match row and deactivates the trigger atomically.
    /// Returns `false` if the trigger was already inactive.
    async fn record_match(&self, trigger_id: i64, current_price: Decimal)
        -> Result<bool, MonitorError>;

    async fn trigger_logs(&self, trigger_id: i64) -> Result<Vec<TriggerLog>, MonitorError>;

    async fn trigger_matches(&self, trigger_id: i64) -> Result<Vec<TriggerMatch>, MonitorError>;
}

/// Postgres-backed store
#[derive(Clone)]
pub struct PgStore {
    db_pool: Arc<PgPool>,
}

impl PgStore {
    pub fn new(db_pool: Arc<PgPool>) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl OrderStore for PgStore {
    async fn list_active_orders(&self) -> Result<Vec<Order>, MonitorError> {
        Ok(db::get_active_orders(&self.db_pool).await?)
    }

    async fn find_order(&self, order_id: &str) -> Result<Option<Order>, MonitorError> {
        Ok(db::get_order_by_id(&self.db_pool, order_id).await?)
    }

    async fn apply_update(
        &self,
        order_id: &str,
        update: &OrderUpdate,
    ) -> Result<bool, MonitorError> {
        Ok(db::update_order(&self.db_pool, order_id, update).await?)
    }
}

#[async_trait]
impl TriggerStore for PgStore {
    async fn list_active_triggers(&self) -> Result<Vec<PriceTrigger>, MonitorError> {
        Ok(db::get_active_triggers(&self.db_pool).await?)
    }

    async fn record_log(
        &self,
        trigger_id: i64,
        current_price: Decimal,
        check_result: bool,
    ) -> Result<(), MonitorError> {
        db::insert_trigger_log(&self.db_pool, trigger_id, current_price, check_result).await?;
        Ok(())
    }

    async fn record_match(
        &self,
        trigger_id: i64,
        current_price: Decimal,
    ) -> Result<bool, MonitorError> {
        Ok(db::record_trigger_match(&self.db_pool, trigger_id, current_price).await?)
    }

    async fn trigger_logs(&self, trigger_id: i64) -> Result<Vec<TriggerLog>, MonitorError> {
        Ok(db::get_trigger_logs(&self.db_pool, trigger_id).await?)
    }

    async fn trigger_matches(&self, trigger_id: i64) -> Result<Vec<TriggerMatch>, MonitorError> {
        Ok(db::get_trigger_matches(&self.db_pool, trigger_id).await?)
    }
}
