use async_trait::async_trait;
use log::{debug, error, info, warn};
use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;

use crate::entity::{MonitorError, Order, OrderStatus, OrderUpdate};
use crate::interactor::OrderStore;
use crate::market::quote_service::check_price_impact;
use crate::market::{DelegatedAction, ExecutionChannel, SwapQuoteService};
use crate::services::queue::{Job, JobHandler};
use crate::utils::{is_evm_address, to_atomic_units};

/// Execution request for one triggered order.
///
/// `snapshot` is the order as seen when it was enqueued, kept for logs only;
/// the stored row is re-read before acting.
#[derive(Debug, Clone)]
pub struct SwapJob {
    pub order_id: String,
    /// Written to the order as its submission key before submitting
    pub execution_id: Uuid,
    pub snapshot: Order,
}

impl SwapJob {
    pub fn new(order: Order) -> Self {
        Self {
            order_id: order.id.clone(),
            execution_id: Uuid::new_v4(),
            snapshot: order,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome {
    Executed {
        transaction_hash: String,
        executed_price: Decimal,
    },
    /// The order was no longer pending
    Skipped(OrderStatus),
}

pub struct SwapExecutionService {
    order_store: Arc<dyn OrderStore>,
    quote_service: Arc<dyn SwapQuoteService>,
    execution_channel: Arc<dyn ExecutionChannel>,
    max_price_impact: Decimal,
    sell_token_decimals: u32,
}

impl SwapExecutionService {
    pub fn new(
        order_store: Arc<dyn OrderStore>,
        quote_service: Arc<dyn SwapQuoteService>,
        execution_channel: Arc<dyn ExecutionChannel>,
        max_price_impact: Decimal,
        sell_token_decimals: u32,
    ) -> Self {
        Self {
            order_store,
            quote_service,
            execution_channel,
            max_price_impact,
            sell_token_decimals,
        }
    }

    /// Execute the order referenced by `job`.
    ///
    /// Permanent errors, and any error on the final attempt, mark the order
    /// FAILED. Transient errors on earlier attempts leave it PENDING. Errors
    /// are always returned so the queue can retry or park the job.
    pub async fn execute(&self, job: &Job<SwapJob>) -> Result<ExecutionOutcome, MonitorError> {
        let order_id = &job.payload.order_id;
        let order = self
            .order_store
            .find_order(order_id)
            .await?
            .ok_or_else(|| MonitorError::OrderNotFound(order_id.clone()))?;

        debug!(
            "Swap job for order {} enqueued at {} (target ${} when triggered)",
            order_id, job.enqueued_at, job.payload.snapshot.target_price
        );

        if order.status.is_terminal() {
            info!("Order {} is already {}, nothing to execute", order.id, order.status);
            return Ok(ExecutionOutcome::Skipped(order.status));
        }

        match self.submit(&order, job).await {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                self.record_failure(&order, job, &err).await;
                Err(err)
            }
        }
    }

    async fn submit(&self, order: &Order, job: &Job<SwapJob>) -> Result<ExecutionOutcome, MonitorError> {
        // A key without a result means an earlier attempt may have reached the chain
        if let Some(key) = &order.submission_key {
            return Err(MonitorError::SubmissionOutcomeUnknown(format!(
                "submission {} was attempted earlier",
                key
            )));
        }

        for (field, address) in [
            ("smart wallet", &order.smart_wallet_address),
            ("sell token", &order.sell_token),
            ("buy token", &order.buy_token),
        ] {
            if !is_evm_address(address) {
                return Err(MonitorError::InvalidOrder(format!(
                    "{} address {} is not an EVM address",
                    field, address
                )));
            }
        }

        let sell_amount = to_atomic_units(order.amount, self.sell_token_decimals)?;

        info!(
            "Executing order {} (attempt {}/{}): selling {} {} for {} on chain {}",
            order.id,
            job.attempt,
            job.max_attempts,
            order.amount,
            order.sell_token,
            order.buy_token,
            order.chain_id
        );

        let quote = self
            .quote_service
            .get_quote(
                &order.sell_token,
                &order.buy_token,
                &sell_amount,
                order.chain_id,
                &order.smart_wallet_address,
            )
            .await?;

        let impact = check_price_impact(&quote, self.max_price_impact)?;
        debug!(
            "Quote for order {}: price {}, guaranteed {}, impact {}%",
            order.id, quote.price, quote.guaranteed_price, impact
        );

        let submission_key = job.payload.execution_id.to_string();
        let claimed = self
            .order_store
            .apply_update(&order.id, &OrderUpdate::claim_submission(&submission_key))
            .await?;
        if !claimed {
            let status = self
                .order_store
                .find_order(&order.id)
                .await?
                .map(|o| o.status)
                .ok_or_else(|| MonitorError::OrderNotFound(order.id.clone()))?;
            info!(
                "Order {} was claimed by another execution or became {} before submission",
                order.id, status
            );
            return Ok(ExecutionOutcome::Skipped(status));
        }

        let actions = [DelegatedAction::from(&quote.transaction)];
        let transaction_hash = match self
            .execution_channel
            .delegate_action(&actions, order.chain_id, &order.smart_wallet_address)
            .await
        {
            Ok(hash) => hash,
            Err(err @ MonitorError::SubmissionOutcomeUnknown(_)) => {
                // The key stays set so no later attempt submits twice
                error!(
                    "Submission {} of order {} may have been broadcast: {}",
                    submission_key, order.id, err
                );
                return Err(err);
            }
            Err(err) => {
                // Nothing reached the chain, so a retry may submit again
                if let Err(e) = self
                    .order_store
                    .apply_update(&order.id, &OrderUpdate::release_submission())
                    .await
                {
                    error!(
                        "Failed to release submission key of order {}: {}",
                        order.id, e
                    );
                }
                return Err(err);
            }
        };

        let executed = OrderUpdate::executed(&transaction_hash, quote.guaranteed_price);
        if let Err(e) = self.order_store.apply_update(&order.id, &executed).await {
            error!(
                "Order {} was submitted as {} but could not be marked executed: {}",
                order.id, transaction_hash, e
            );
            return Err(MonitorError::SubmissionOutcomeUnknown(format!(
                "{} (transaction {})",
                submission_key, transaction_hash
            )));
        }

        info!(
            "Order {} executed: tx {} at ${}",
            order.id, transaction_hash, quote.guaranteed_price
        );

        Ok(ExecutionOutcome::Executed {
            transaction_hash,
            executed_price: quote.guaranteed_price,
        })
    }

    async fn record_failure(&self, order: &Order, job: &Job<SwapJob>, err: &MonitorError) {
        if err.is_retryable() && !job.is_final_attempt() {
            warn!(
                "Order {} attempt {}/{} failed, leaving it pending: {}",
                order.id, job.attempt, job.max_attempts, err
            );
            return;
        }

        error!("Order {} failed: {}", order.id, err);
        match self
            .order_store
            .apply_update(&order.id, &OrderUpdate::failed(err.to_string()))
            .await
        {
            Ok(true) => {}
            Ok(false) => debug!("Order {} was already terminal", order.id),
            Err(e) => error!("Failed to mark order {} as failed: {}", order.id, e),
        }
    }
}

#[async_trait]
impl JobHandler<SwapJob> for SwapExecutionService {
    async fn handle(&self, job: &Job<SwapJob>) -> Result<(), MonitorError> {
        if let ExecutionOutcome::Skipped(status) = self.execute(job).await? {
            debug!("Swap job {} skipped, order is {}", job.id, status);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{Quote, QuoteTransaction};
    use crate::interactor::InMemoryStore;
    use crate::market::execution_service::MockExecutionChannel;
    use crate::market::quote_service::MockSwapQuoteService;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    const WALLET: &str = "0x1111111111111111111111111111111111111111";
    const USDC: &str = "0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913";
    const DEGEN: &str = "0x4ed4E862860beD51a9570b96d89aF5E1B0Efefed";

    fn pending_order() -> Order {
        Order::new("o-1", dec!(10), dec!(100), WALLET, USDC, DEGEN, 8453)
    }

    fn job(order: &Order, attempt: u32) -> Job<SwapJob> {
        Job {
            id: order.id.clone(),
            payload: SwapJob::new(order.clone()),
            attempt,
            max_attempts: 3,
            enqueued_at: Utc::now(),
        }
    }

    fn quote(price: Decimal, guaranteed_price: Decimal) -> Quote {
        Quote {
            buy_amount: 105_000_000,
            min_buy_amount: 104_000_000,
            transaction: QuoteTransaction {
                to: "0x0000000000001fF3684f28c67538d4D072C22734".to_string(),
                data: "0xcafe".to_string(),
                value: "0".to_string(),
                gas: Some("250000".to_string()),
                gas_price: None,
            },
            price,
            guaranteed_price,
            allowance_target: None,
        }
    }

    fn service(
        store: &Arc<InMemoryStore>,
        quotes: MockSwapQuoteService,
        channel: MockExecutionChannel,
    ) -> SwapExecutionService {
        SwapExecutionService::new(
            store.clone(),
            Arc::new(quotes),
            Arc::new(channel),
            dec!(5),
            6,
        )
    }

    fn store_with(order: Order) -> Arc<InMemoryStore> {
        let store = Arc::new(InMemoryStore::new());
        store.insert_order(order).unwrap();
        store
    }

    #[tokio::test]
    async fn test_executes_when_impact_is_acceptable() {
        let order = pending_order();
        let store = store_with(order.clone());
        let job = job(&order, 1);

        let mut quotes = MockSwapQuoteService::new();
        quotes
            .expect_get_quote()
            .withf(|sell, buy, amount, chain_id, taker| {
                sell == USDC
                    && buy == DEGEN
                    && amount == "10000000"
                    && *chain_id == 8453
                    && taker == WALLET
            })
            .times(1)
            .returning(|_, _, _, _, _| Ok(quote(dec!(100), dec!(99))));

        let mut channel = MockExecutionChannel::new();
        channel
            .expect_delegate_action()
            .withf(|actions, chain_id, wallet| {
                actions.len() == 1 && actions[0].encoded_data == "0xcafe" && *chain_id == 8453 && wallet == WALLET
            })
            .times(1)
            .returning(|_, _, _| Ok("0xfeed".to_string()));

        let outcome = service(&store, quotes, channel).execute(&job).await.unwrap();

        assert_eq!(
            outcome,
            ExecutionOutcome::Executed {
                transaction_hash: "0xfeed".to_string(),
                executed_price: dec!(99),
            }
        );
        let stored = store.find_order("o-1").await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Executed);
        assert_eq!(stored.transaction_hash.as_deref(), Some("0xfeed"));
        assert_eq!(stored.executed_price, Some(dec!(99)));
        assert!(stored.executed_at.is_some());
        assert_eq!(
            stored.submission_key,
            Some(job.payload.execution_id.to_string())
        );
    }

    #[tokio::test]
    async fn test_excessive_impact_fails_without_submission() {
        let order = pending_order();
        let store = store_with(order.clone());

        let mut quotes = MockSwapQuoteService::new();
        quotes
            .expect_get_quote()
            .returning(|_, _, _, _, _| Ok(quote(dec!(100), dec!(92))));
        let mut channel = MockExecutionChannel::new();
        channel.expect_delegate_action().times(0);

        let err = service(&store, quotes, channel)
            .execute(&job(&order, 1))
            .await
            .unwrap_err();

        assert!(matches!(err, MonitorError::PriceImpactExceeded { .. }));
        let stored = store.find_order("o-1").await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Failed);
        assert!(stored.error.unwrap().contains("Price impact too high: 8%"));
        assert_eq!(stored.submission_key, None);
    }

    #[tokio::test]
    async fn test_transient_failure_keeps_order_pending_until_last_attempt() {
        let order = pending_order();
        let store = store_with(order.clone());

        let mut quotes = MockSwapQuoteService::new();
        quotes
            .expect_get_quote()
            .times(2)
            .returning(|_, _, _, _, _| Ok(quote(dec!(100), dec!(99))));
        let mut channel = MockExecutionChannel::new();
        channel
            .expect_delegate_action()
            .times(2)
            .returning(|_, _, _| Err(MonitorError::SubmissionRejected("nonce too low".to_string())));

        let service = service(&store, quotes, channel);

        let err = service.execute(&job(&order, 1)).await.unwrap_err();
        assert!(err.is_retryable());
        let stored = store.find_order("o-1").await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Pending);
        assert_eq!(stored.submission_key, None);

        service.execute(&job(&order, 3)).await.unwrap_err();
        let stored = store.find_order("o-1").await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Failed);
        assert!(stored.error.unwrap().contains("nonce too low"));
    }

    #[tokio::test]
    async fn test_ambiguous_submission_keeps_key_and_fails_order() {
        let order = pending_order();
        let store = store_with(order.clone());
        let job = job(&order, 1);

        let mut quotes = MockSwapQuoteService::new();
        quotes
            .expect_get_quote()
            .times(1)
            .returning(|_, _, _, _, _| Ok(quote(dec!(100), dec!(99))));
        let mut channel = MockExecutionChannel::new();
        channel
            .expect_delegate_action()
            .times(1)
            .returning(|_, _, _| {
                Err(MonitorError::SubmissionOutcomeUnknown(
                    "operation timed out".to_string(),
                ))
            });

        let err = service(&store, quotes, channel)
            .execute(&job)
            .await
            .unwrap_err();

        // Not retried even though this was the first attempt
        assert!(!err.is_retryable());
        let stored = store.find_order("o-1").await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Failed);
        assert_eq!(
            stored.submission_key,
            Some(job.payload.execution_id.to_string())
        );
        assert!(stored.error.unwrap().contains("operation timed out"));
    }

    #[tokio::test]
    async fn test_order_claimed_by_another_execution_is_not_submitted() {
        let order = pending_order();
        let store = store_with(order.clone());

        let racing = store.clone();
        let mut claimed = order.clone();
        claimed.submission_key = Some("other-execution".to_string());
        let mut quotes = MockSwapQuoteService::new();
        quotes
            .expect_get_quote()
            .times(1)
            .returning(move |_, _, _, _, _| {
                // Another execution claims the order while this one is quoting
                racing.insert_order(claimed.clone()).unwrap();
                Ok(quote(dec!(100), dec!(99)))
            });
        let mut channel = MockExecutionChannel::new();
        channel.expect_delegate_action().times(0);

        let outcome = service(&store, quotes, channel)
            .execute(&job(&order, 1))
            .await
            .unwrap();

        assert_eq!(outcome, ExecutionOutcome::Skipped(OrderStatus::Pending));
        let stored = store.find_order("o-1").await.unwrap().unwrap();
        assert_eq!(stored.submission_key.as_deref(), Some("other-execution"));
        assert_eq!(stored.status, OrderStatus::Pending);
    }

    #[tokio::test]
    async fn test_quote_outage_is_retried_without_touching_the_order() {
        let order = pending_order();
        let store = store_with(order.clone());

        let mut quotes = MockSwapQuoteService::new();
        quotes
            .expect_get_quote()
            .returning(|_, _, _, _, _| Err(MonitorError::QuoteUnavailable("HTTP 502".to_string())));
        let mut channel = MockExecutionChannel::new();
        channel.expect_delegate_action().times(0);

        let err = service(&store, quotes, channel)
            .execute(&job(&order, 2))
            .await
            .unwrap_err();

        assert!(matches!(err, MonitorError::QuoteUnavailable(_)));
        assert_eq!(store.mutation_count(), 0);
    }

    #[tokio::test]
    async fn test_earlier_unconfirmed_submission_is_not_repeated() {
        let mut order = pending_order();
        order.submission_key = Some("3f2a9c1e-previous".to_string());
        let store = store_with(order.clone());

        let mut quotes = MockSwapQuoteService::new();
        quotes.expect_get_quote().times(0);
        let mut channel = MockExecutionChannel::new();
        channel.expect_delegate_action().times(0);

        let err = service(&store, quotes, channel)
            .execute(&job(&order, 2))
            .await
            .unwrap_err();

        assert!(matches!(err, MonitorError::SubmissionOutcomeUnknown(_)));
        assert!(!err.is_retryable());
        let stored = store.find_order("o-1").await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Failed);
    }

    #[tokio::test]
    async fn test_terminal_order_is_skipped() {
        let mut order = pending_order();
        order.status = OrderStatus::Executed;
        let store = store_with(order.clone());

        let mut quotes = MockSwapQuoteService::new();
        quotes.expect_get_quote().times(0);
        let channel = MockExecutionChannel::new();

        let outcome = service(&store, quotes, channel)
            .execute(&job(&order, 1))
            .await
            .unwrap();

        assert_eq!(outcome, ExecutionOutcome::Skipped(OrderStatus::Executed));
        assert_eq!(store.mutation_count(), 0);
    }

    #[tokio::test]
    async fn test_invalid_wallet_address_fails_permanently() {
        let mut order = pending_order();
        order.smart_wallet_address = "not-a-wallet".to_string();
        let store = store_with(order.clone());

        let mut quotes = MockSwapQuoteService::new();
        quotes.expect_get_quote().times(0);
        let channel = MockExecutionChannel::new();

        let err = service(&store, quotes, channel)
            .execute(&job(&order, 1))
            .await
            .unwrap_err();

        assert!(matches!(err, MonitorError::InvalidOrder(_)));
        assert_eq!(
            store.find_order("o-1").await.unwrap().unwrap().status,
            OrderStatus::Failed
        );
    }

    #[tokio::test]
    async fn test_missing_order_is_reported() {
        let store = Arc::new(InMemoryStore::new());
        let order = pending_order();

        let err = service(&store, MockSwapQuoteService::new(), MockExecutionChannel::new())
            .execute(&job(&order, 1))
            .await
            .unwrap_err();

        assert!(matches!(err, MonitorError::OrderNotFound(id) if id == "o-1"));
    }
}
