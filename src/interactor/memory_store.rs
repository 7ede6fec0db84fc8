use crate::entity::{MonitorError, Order, OrderUpdate, PriceTrigger, TriggerLog, TriggerMatch};
use crate::interactor::store::{OrderStore, TriggerStore};
use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

/// Process-local store with the same semantics as the Postgres one.
/// Used for dry runs and as the test double of the pipeline.
#[derive(Default)]
pub struct InMemoryStore {
    orders: Mutex<HashMap<String, Order>>,
    triggers: Mutex<HashMap<i64, PriceTrigger>>,
    logs: Mutex<Vec<TriggerLog>>,
    matches: Mutex<Vec<TriggerMatch>>,
    next_row_id: AtomicI64,
    mutations: AtomicUsize,
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, MonitorError> {
    mutex
        .lock()
        .map_err(|_| MonitorError::StoreUnavailable("in-memory store lock poisoned".to_string()))
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_order(&self, order: Order) -> Result<(), MonitorError> {
        lock(&self.orders)?.insert(order.id.clone(), order);
        Ok(())
    }

    pub fn insert_trigger(&self, trigger: PriceTrigger) -> Result<(), MonitorError> {
        lock(&self.triggers)?.insert(trigger.id, trigger);
        Ok(())
    }

    pub fn trigger(&self, trigger_id: i64) -> Result<Option<PriceTrigger>, MonitorError> {
        Ok(lock(&self.triggers)?.get(&trigger_id).cloned())
    }

    /// Number of writes applied to orders and triggers, history rows excluded
    pub fn mutation_count(&self) -> usize {
        self.mutations.load(Ordering::SeqCst)
    }

    fn next_id(&self) -> i64 {
        self.next_row_id.fetch_add(1, Ordering::SeqCst) + 1
    }
}

#[async_trait]
impl OrderStore for InMemoryStore {
    async fn list_active_orders(&self) -> Result<Vec<Order>, MonitorError> {
        let mut active: Vec<Order> = lock(&self.orders)?
            .values()
            .filter(|o| o.is_pending())
            .cloned()
            .collect();
        active.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(active)
    }

    async fn find_order(&self, order_id: &str) -> Result<Option<Order>, MonitorError> {
        Ok(lock(&self.orders)?.get(order_id).cloned())
    }

    async fn apply_update(
        &self,
        order_id: &str,
        update: &OrderUpdate,
    ) -> Result<bool, MonitorError> {
        let mut orders = lock(&self.orders)?;
        match orders.get_mut(order_id) {
            Some(order)
                if order.is_pending() && !(update.is_claim() && order.submission_key.is_some()) =>
            {
                update.apply_to(order, Utc::now());
                self.mutations.fetch_add(1, Ordering::SeqCst);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl TriggerStore for InMemoryStore {
    async fn list_active_triggers(&self) -> Result<Vec<PriceTrigger>, MonitorError> {
        let logs = lock(&self.logs)?;
        let mut active: Vec<PriceTrigger> = lock(&self.triggers)?
            .values()
            .filter(|t| t.is_active)
            .cloned()
            .map(|mut t| {
                t.last_checked_at = logs
                    .iter()
                    .filter(|l| l.trigger_id == t.id)
                    .map(|l| l.timestamp)
                    .max();
                t
            })
            .collect();
        active.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(active)
    }

    async fn record_log(
        &self,
        trigger_id: i64,
        current_price: Decimal,
        check_result: bool,
    ) -> Result<(), MonitorError> {
        let log = TriggerLog {
            id: self.next_id(),
            trigger_id,
            current_price,
            check_result,
            timestamp: Utc::now(),
        };
        lock(&self.logs)?.push(log);
        Ok(())
    }

    async fn record_match(
        &self,
        trigger_id: i64,
        current_price: Decimal,
    ) -> Result<bool, MonitorError> {
        let mut triggers = lock(&self.triggers)?;
        let Some(trigger) = triggers.get_mut(&trigger_id).filter(|t| t.is_active) else {
            return Ok(false);
        };
        trigger.is_active = false;
        self.mutations.fetch_add(1, Ordering::SeqCst);

        let matched = TriggerMatch {
            id: self.next_id(),
            trigger_id,
            current_price,
            timestamp: Utc::now(),
        };
        lock(&self.matches)?.push(matched);
        Ok(true)
    }

    async fn trigger_logs(&self, trigger_id: i64) -> Result<Vec<TriggerLog>, MonitorError> {
        Ok(lock(&self.logs)?
            .iter()
            .filter(|l| l.trigger_id == trigger_id)
            .cloned()
            .collect())
    }

    async fn trigger_matches(&self, trigger_id: i64) -> Result<Vec<TriggerMatch>, MonitorError> {
        Ok(lock(&self.matches)?
            .iter()
            .filter(|m| m.trigger_id == trigger_id)
            .cloned()
            .collect())
    }
}
