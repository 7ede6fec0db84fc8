use log::{debug, info, warn};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::services::price_check_service::{PriceCheckJob, PRICE_CHECK_JOB_ID};
use crate::services::queue::JobQueue;
use crate::services::swap_execution_service::SwapJob;

/// Owns both queues and arms the recurring price check
pub struct MonitorScheduler {
    price_check_queue: JobQueue<PriceCheckJob>,
    swap_queue: JobQueue<SwapJob>,
    interval: Duration,
    stop: CancellationToken,
    ticker: Option<JoinHandle<()>>,
}

impl MonitorScheduler {
    pub fn new(
        price_check_queue: JobQueue<PriceCheckJob>,
        swap_queue: JobQueue<SwapJob>,
        interval: Duration,
    ) -> Self {
        Self {
            price_check_queue,
            swap_queue,
            interval,
            stop: CancellationToken::new(),
            ticker: None,
        }
    }

    pub fn price_check_queue(&self) -> &JobQueue<PriceCheckJob> {
        &self.price_check_queue
    }

    pub fn swap_queue(&self) -> &JobQueue<SwapJob> {
        &self.swap_queue
    }

    /// Start both queues and enqueue a price check every interval. The first
    /// check runs immediately.
    pub fn start(&mut self) {
        if self.ticker.is_some() {
            warn!("Monitor scheduler is already running");
            return;
        }

        self.swap_queue.start();
        self.price_check_queue.start();

        let queue = self.price_check_queue.clone();
        let stop = self.stop.clone();
        let period = self.interval;

        self.ticker = Some(tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = stop.cancelled() => {
                        info!("Stopping price check ticker");
                        break;
                    }
                    _ = ticker.tick() => {
                        match queue.add(PRICE_CHECK_JOB_ID, PriceCheckJob) {
                            Ok(true) => debug!("Price check enqueued"),
                            Ok(false) => warn!("Previous price check still pending, skipping this tick"),
                            Err(e) => {
                                warn!("Cannot enqueue price check: {}", e);
                                break;
                            }
                        }
                    }
                }
            }
        }));

        info!("Monitor scheduler started, checking prices every {:?}", period);
    }

    /// Stop ticking, then drain the price-check queue before the swap queue
    /// so that no new executions arrive while the latter drains.
    pub async fn shutdown(&mut self) {
        self.stop.cancel();
        if let Some(ticker) = self.ticker.take() {
            if let Err(e) = ticker.await {
                warn!("Price check ticker ended abnormally: {}", e);
            }
        }

        self.price_check_queue.shutdown().await;
        self.swap_queue.shutdown().await;
        info!("Monitor scheduler stopped");
    }
}
