use async_trait::async_trait;
use chrono::{Duration, Utc};
use log::{debug, error, info};
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::entity::{MonitorError, Order, PriceTrigger};
use crate::interactor::{OrderStore, TriggerStore};
use crate::market::PriceOracle;
use crate::services::queue::{Job, JobHandler, JobQueue};
use crate::services::rate_limiter::RateLimiter;
use crate::services::swap_execution_service::SwapJob;
use crate::utils::shorten_address;

/// Id of the recurring tick job; keeps at most one tick queued or running
pub const PRICE_CHECK_JOB_ID: &str = "check-prices";

/// Payload of the recurring tick job
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PriceCheckJob;

/// Hands triggered orders over to execution
#[async_trait]
pub trait OrderDispatcher: Send + Sync {
    /// Returns `false` if the order already has a job queued or running
    async fn dispatch(&self, order: &Order) -> Result<bool, MonitorError>;
}

#[async_trait]
impl OrderDispatcher for JobQueue<SwapJob> {
    async fn dispatch(&self, order: &Order) -> Result<bool, MonitorError> {
        self.add(order.id.clone(), SwapJob::new(order.clone()))
    }
}

/// Counters of a single tick
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickSummary {
    pub groups: usize,
    pub oracle_calls: usize,
    pub failed_groups: usize,
    pub orders_triggered: usize,
    pub orders_enqueued: usize,
    pub triggers_evaluated: usize,
    pub triggers_matched: usize,
}

impl fmt::Display for TickSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} group(s), {} oracle call(s), {} failed, {} order(s) triggered ({} enqueued), {} trigger(s) evaluated ({} matched)",
            self.groups,
            self.oracle_calls,
            self.failed_groups,
            self.orders_triggered,
            self.orders_enqueued,
            self.triggers_evaluated,
            self.triggers_matched
        )
    }
}

/// Everything watching one token on one chain
#[derive(Debug, Default)]
struct PriceGroup {
    token_address: String,
    orders: Vec<Order>,
    triggers: Vec<PriceTrigger>,
}

type GroupKey = (String, i64);

fn group_by_token(orders: Vec<Order>, triggers: Vec<PriceTrigger>) -> BTreeMap<GroupKey, PriceGroup> {
    let mut groups: BTreeMap<GroupKey, PriceGroup> = BTreeMap::new();

    for order in orders {
        let group = groups
            .entry((order.buy_token.to_lowercase(), order.chain_id))
            .or_default();
        if group.token_address.is_empty() {
            group.token_address = order.buy_token.clone();
        }
        group.orders.push(order);
    }

    for trigger in triggers {
        let group = groups
            .entry((trigger.token_address.to_lowercase(), trigger.chain_id))
            .or_default();
        if group.token_address.is_empty() {
            group.token_address = trigger.token_address.clone();
        }
        group.triggers.push(trigger);
    }

    groups
}

/// Fetches one price per watched token and evaluates every order and
/// trigger against it. Triggered orders are dispatched, never mutated here.
pub struct PriceCheckService {
    order_store: Arc<dyn OrderStore>,
    trigger_store: Arc<dyn TriggerStore>,
    price_oracle: Arc<dyn PriceOracle>,
    dispatcher: Arc<dyn OrderDispatcher>,
    rate_limiter: Option<Arc<RateLimiter>>,
    trigger_slack: Duration,
}

impl PriceCheckService {
    pub fn new(
        order_store: Arc<dyn OrderStore>,
        trigger_store: Arc<dyn TriggerStore>,
        price_oracle: Arc<dyn PriceOracle>,
        dispatcher: Arc<dyn OrderDispatcher>,
        rate_limiter: Option<Arc<RateLimiter>>,
        trigger_slack: Duration,
    ) -> Self {
        Self {
            order_store,
            trigger_store,
            price_oracle,
            dispatcher,
            rate_limiter,
            trigger_slack,
        }
    }

    /// Run one price check over all active orders and due triggers.
    ///
    /// Only failing to load the work set is an error. A failing price lookup
    /// skips its group, a failing trigger write skips that trigger.
    pub async fn run_tick(&self) -> Result<TickSummary, MonitorError> {
        let orders = self.order_store.list_active_orders().await?;
        let triggers = self.trigger_store.list_active_triggers().await?;

        let now = Utc::now();
        let active_triggers = triggers.len();
        let due_triggers: Vec<PriceTrigger> = triggers
            .into_iter()
            .filter(|t| t.is_due(now, self.trigger_slack))
            .collect();
        if due_triggers.len() < active_triggers {
            debug!(
                "{} of {} active trigger(s) are not due yet",
                active_triggers - due_triggers.len(),
                active_triggers
            );
        }

        let groups = group_by_token(orders, due_triggers);
        let mut summary = TickSummary {
            groups: groups.len(),
            ..TickSummary::default()
        };

        if groups.is_empty() {
            debug!("No active orders or due triggers");
            return Ok(summary);
        }

        info!("Checking prices for {} token(s)", groups.len());

        for ((token, chain_id), group) in groups {
            if let Some(limiter) = &self.rate_limiter {
                limiter.acquire().await;
            }

            summary.oracle_calls += 1;
            let price = match self
                .price_oracle
                .current_price(&group.token_address, chain_id)
                .await
            {
                Ok(price) => price,
                Err(e) => {
                    summary.failed_groups += 1;
                    error!(
                        "Failed to get price for {} on chain {}, skipping {} order(s) and {} trigger(s): {}",
                        token,
                        chain_id,
                        group.orders.len(),
                        group.triggers.len(),
                        e
                    );
                    continue;
                }
            };
            debug!("Price of {} on chain {}: ${}", token, chain_id, price);

            self.evaluate_orders(&group.orders, price, &mut summary).await;
            self.evaluate_triggers(&group.triggers, price, &mut summary)
                .await;
        }

        Ok(summary)
    }

    async fn evaluate_orders(&self, orders: &[Order], price: Decimal, summary: &mut TickSummary) {
        for order in orders.iter().filter(|o| o.is_triggered_by(price)) {
            summary.orders_triggered += 1;
            info!(
                "Order {} triggered: price ${} <= target ${} (wallet {})",
                order.id,
                price,
                order.target_price,
                shorten_address(&order.smart_wallet_address)
            );

            match self.dispatcher.dispatch(order).await {
                Ok(true) => summary.orders_enqueued += 1,
                Ok(false) => debug!("Order {} is already queued for execution", order.id),
                Err(e) => error!("Failed to enqueue order {}: {}", order.id, e),
            }
        }
    }

    async fn evaluate_triggers(
        &self,
        triggers: &[PriceTrigger],
        price: Decimal,
        summary: &mut TickSummary,
    ) {
        for trigger in triggers {
            summary.triggers_evaluated += 1;
            let matched = trigger.is_triggered_by(price);

            if let Err(e) = self.trigger_store.record_log(trigger.id, price, matched).await {
                error!("Failed to log check of trigger {}: {}", trigger.id, e);
                continue;
            }

            if !matched {
                continue;
            }

            match self.trigger_store.record_match(trigger.id, price).await {
                Ok(true) => {
                    summary.triggers_matched += 1;
                    info!(
                        "Trigger {} (fid {}) met: price ${} <= ${}",
                        trigger.id, trigger.fid, price, trigger.usd_price
                    );
                }
                Ok(false) => debug!("Trigger {} was already deactivated", trigger.id),
                Err(e) => error!("Failed to record match of trigger {}: {}", trigger.id, e),
            }
        }
    }
}

#[async_trait]
impl JobHandler<PriceCheckJob> for PriceCheckService {
    async fn handle(&self, _job: &Job<PriceCheckJob>) -> Result<(), MonitorError> {
        let summary = self.run_tick().await?;
        info!("Price check finished: {}", summary);
        Ok(())
    }
}
