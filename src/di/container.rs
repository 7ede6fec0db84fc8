use std::sync::Arc;

use log::info;
use sqlx::PgPool;

use crate::config::{AppConfig, PriceFeedProvider};
use crate::entity::MonitorError;
use crate::interactor::{OrderStore, PgStore, TriggerStore};
use crate::market::{
    CoinGeckoOracle, EnclaveExecutionChannel, ExecutionChannel, GeckoTerminalOracle, PriceOracle,
    SwapQuoteService, ZeroXQuoteService,
};
use crate::services::{
    JobQueue, MonitorScheduler, PriceCheckJob, PriceCheckService, QueueConfig, RateLimiter,
    RetryPolicy, SwapExecutionService, SwapJob,
};

pub const PRICE_CHECK_QUEUE: &str = "price-check";
pub const SWAP_EXECUTION_QUEUE: &str = "swap-execution";

/// ServiceContainer provides access to core application dependencies
pub struct ServiceContainer {
    config: AppConfig,

    // Persistence
    order_store: Arc<dyn OrderStore>,
    trigger_store: Arc<dyn TriggerStore>,

    // Market services
    price_oracle: Arc<dyn PriceOracle>,
    quote_service: Arc<dyn SwapQuoteService>,
    execution_channel: Arc<dyn ExecutionChannel>,
}

impl ServiceContainer {
    /// Create a container backed by Postgres and the configured HTTP services
    pub fn new(db_pool: Arc<PgPool>, config: AppConfig) -> Result<Self, MonitorError> {
        let store = Arc::new(PgStore::new(db_pool));

        let price_oracle: Arc<dyn PriceOracle> = match config.price_feed.provider {
            PriceFeedProvider::CoinGecko => {
                Arc::new(CoinGeckoOracle::new(config.price_feed.clone())?)
            }
            PriceFeedProvider::GeckoTerminal => {
                Arc::new(GeckoTerminalOracle::new(config.price_feed.clone())?)
            }
        };
        info!(
            "Using {:?} price feed at {}",
            config.price_feed.provider,
            config.price_feed.base_url()
        );

        let quote_service = Arc::new(ZeroXQuoteService::new(config.quote.clone())?);
        let execution_channel = Arc::new(EnclaveExecutionChannel::new(config.execution.clone())?);

        Ok(Self::from_parts(
            config,
            store.clone(),
            store,
            price_oracle,
            quote_service,
            execution_channel,
        ))
    }

    /// Create a container from already built parts
    pub fn from_parts(
        config: AppConfig,
        order_store: Arc<dyn OrderStore>,
        trigger_store: Arc<dyn TriggerStore>,
        price_oracle: Arc<dyn PriceOracle>,
        quote_service: Arc<dyn SwapQuoteService>,
        execution_channel: Arc<dyn ExecutionChannel>,
    ) -> Self {
        Self {
            config,
            order_store,
            trigger_store,
            price_oracle,
            quote_service,
            execution_channel,
        }
    }

    // Accessor methods

    pub fn order_store(&self) -> Arc<dyn OrderStore> {
        self.order_store.clone()
    }

    pub fn trigger_store(&self) -> Arc<dyn TriggerStore> {
        self.trigger_store.clone()
    }

    pub fn price_oracle(&self) -> Arc<dyn PriceOracle> {
        self.price_oracle.clone()
    }

    pub fn quote_service(&self) -> Arc<dyn SwapQuoteService> {
        self.quote_service.clone()
    }

    pub fn execution_channel(&self) -> Arc<dyn ExecutionChannel> {
        self.execution_channel.clone()
    }

    /// Wire both queues and their stages into a scheduler (not started)
    pub fn build_scheduler(&self) -> MonitorScheduler {
        let scheduler = &self.config.scheduler;
        let retry = RetryPolicy::exponential(scheduler.max_attempts, scheduler.backoff_base());

        let swap_service = Arc::new(SwapExecutionService::new(
            self.order_store(),
            self.quote_service(),
            self.execution_channel(),
            self.config.quote.max_price_impact,
            self.config.quote.sell_token_decimals,
        ));
        let swap_queue = JobQueue::<SwapJob>::new(
            QueueConfig {
                name: SWAP_EXECUTION_QUEUE.to_string(),
                concurrency: 1,
                rate_limit: Some(scheduler.swap_rate_limit),
                retry,
                drain_timeout: scheduler.drain_timeout(),
            },
            swap_service,
        );

        // Shared by every oracle call of a tick
        let oracle_limiter = Arc::new(RateLimiter::per_second(scheduler.price_check_rate_limit));
        let price_check_service = Arc::new(PriceCheckService::new(
            self.order_store(),
            self.trigger_store(),
            self.price_oracle(),
            Arc::new(swap_queue.clone()),
            Some(oracle_limiter),
            scheduler.trigger_interval_slack(),
        ));
        let price_check_queue = JobQueue::<PriceCheckJob>::new(
            QueueConfig {
                name: PRICE_CHECK_QUEUE.to_string(),
                concurrency: 1,
                rate_limit: Some(scheduler.price_check_rate_limit),
                retry,
                drain_timeout: scheduler.drain_timeout(),
            },
            price_check_service,
        );

        MonitorScheduler::new(
            price_check_queue,
            swap_queue,
            scheduler.price_check_interval(),
        )
    }
}
