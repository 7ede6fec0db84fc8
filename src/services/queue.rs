//! In-process job queue with bounded concurrency, rate limiting,
//! exponential-backoff retries and a retained list of failed jobs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use log::{debug, error, info, warn};
use std::any::Any;
use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{mpsc, Notify, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout_at, Instant};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::entity::MonitorError;
use crate::services::rate_limiter::RateLimiter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn exponential(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Delay before retrying after attempt number `attempt` (1-based) failed:
    /// `base`, `2 * base`, `4 * base`, ...
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        self.base_delay
            .saturating_mul(2u32.saturating_pow(exponent))
    }
}

#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub name: String,
    pub concurrency: usize,
    /// Maximum job starts per second
    pub rate_limit: Option<u32>,
    pub retry: RetryPolicy,
    pub drain_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct Job<P> {
    pub id: String,
    pub payload: P,
    /// 1-based
    pub attempt: u32,
    pub max_attempts: u32,
    pub enqueued_at: DateTime<Utc>,
}

impl<P> Job<P> {
    pub fn is_final_attempt(&self) -> bool {
        self.attempt >= self.max_attempts
    }
}

/// A job that exhausted its attempts or failed permanently
#[derive(Debug, Clone)]
pub struct FailedJob<P> {
    pub id: String,
    pub payload: P,
    pub attempts: u32,
    pub error: String,
    pub failed_at: DateTime<Utc>,
}

#[async_trait]
pub trait JobHandler<P>: Send + Sync {
    async fn handle(&self, job: &Job<P>) -> Result<(), MonitorError>;
}

struct QueueInner<P> {
    config: QueueConfig,
    handler: Arc<dyn JobHandler<P>>,
    sender: mpsc::UnboundedSender<Job<P>>,
    receiver: Mutex<Option<mpsc::UnboundedReceiver<Job<P>>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    // Ids queued, running or waiting for a retry
    active: Mutex<HashSet<String>>,
    failed: Mutex<Vec<FailedJob<P>>>,
    completed: AtomicU64,
    // Set once shutdown begins; `add` is rejected from then on
    closing: AtomicBool,
    // Retries due after this instant are dropped instead of scheduled
    drain_deadline: Mutex<Option<Instant>>,
    // Signalled whenever `active` becomes empty
    idle: Notify,
    // Hard stop once draining is over
    shutdown: CancellationToken,
    tracker: TaskTracker,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Handle to a named queue. Clones share the same queue.
pub struct JobQueue<P> {
    inner: Arc<QueueInner<P>>,
}

impl<P> Clone for JobQueue<P> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<P: Send + Sync + 'static> JobQueue<P> {
    pub fn new(config: QueueConfig, handler: Arc<dyn JobHandler<P>>) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            inner: Arc::new(QueueInner {
                config,
                handler,
                sender,
                receiver: Mutex::new(Some(receiver)),
                worker: Mutex::new(None),
                active: Mutex::new(HashSet::new()),
                failed: Mutex::new(Vec::new()),
                completed: AtomicU64::new(0),
                closing: AtomicBool::new(false),
                drain_deadline: Mutex::new(None),
                idle: Notify::new(),
                shutdown: CancellationToken::new(),
                tracker: TaskTracker::new(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.config.name
    }

    /// Start the worker. Jobs added before this are kept and run once started.
    pub fn start(&self) {
        let Some(receiver) = lock(&self.inner.receiver).take() else {
            warn!("[{}] Queue worker is already running", self.name());
            return;
        };

        let inner = self.inner.clone();
        let handle = tokio::spawn(run_worker(inner, receiver));
        *lock(&self.inner.worker) = Some(handle);
        info!(
            "[{}] Queue started (concurrency {}, rate limit {:?}/s)",
            self.name(),
            self.inner.config.concurrency,
            self.inner.config.rate_limit
        );
    }

    /// Enqueue a job. Returns `Ok(false)` if a job with the same id is
    /// already queued, running or waiting for a retry.
    pub fn add(&self, id: impl Into<String>, payload: P) -> Result<bool, MonitorError> {
        let id = id.into();
        if self.inner.closing.load(Ordering::SeqCst) {
            return Err(MonitorError::QueueClosed(self.name().to_string()));
        }

        if !lock(&self.inner.active).insert(id.clone()) {
            debug!("[{}] Job {} is already queued", self.name(), id);
            return Ok(false);
        }

        let job = Job {
            id: id.clone(),
            payload,
            attempt: 1,
            max_attempts: self.inner.config.retry.max_attempts,
            enqueued_at: Utc::now(),
        };

        if self.inner.sender.send(job).is_err() {
            lock(&self.inner.active).remove(&id);
            return Err(MonitorError::QueueClosed(self.name().to_string()));
        }

        debug!("[{}] Job {} enqueued", self.name(), id);
        Ok(true)
    }

    /// Jobs queued, running or waiting for a retry
    pub fn pending_count(&self) -> usize {
        lock(&self.inner.active).len()
    }

    pub fn completed_count(&self) -> u64 {
        self.inner.completed.load(Ordering::SeqCst)
    }

    pub fn failed_jobs(&self) -> Vec<FailedJob<P>>
    where
        P: Clone,
    {
        lock(&self.inner.failed).clone()
    }

    /// Stop accepting jobs and drain: queued jobs still run and scheduled
    /// retries still fire while they fall within the drain timeout. Whatever
    /// is left when it expires is dropped.
    pub async fn shutdown(&self) {
        let drain_timeout = self.inner.config.drain_timeout;
        let deadline = Instant::now() + drain_timeout;
        info!(
            "[{}] Shutting down queue, draining {} job(s) for up to {:?}",
            self.name(),
            self.pending_count(),
            drain_timeout
        );
        *lock(&self.inner.drain_deadline) = Some(deadline);
        self.inner.closing.store(true, Ordering::SeqCst);

        let worker = lock(&self.inner.worker).take();
        if worker.is_some() && timeout_at(deadline, self.inner.wait_idle()).await.is_err() {
            warn!(
                "[{}] {} job(s) not drained after {:?}",
                self.name(),
                self.pending_count(),
                drain_timeout
            );
        }

        self.inner.shutdown.cancel();
        self.inner.tracker.close();
        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                error!("[{}] Queue worker terminated abnormally: {}", self.name(), e);
            }
        } else {
            // Never started: nothing will ever run what was queued
            if let Some(mut receiver) = lock(&self.inner.receiver).take() {
                while let Ok(job) = receiver.try_recv() {
                    self.inner.abandon(&job);
                }
            }
        }

        if timeout_at(deadline, self.inner.tracker.wait()).await.is_err() {
            warn!(
                "[{}] {} job(s) still running after {:?}, giving up on them",
                self.name(),
                self.inner.tracker.len(),
                drain_timeout
            );
        }

        info!(
            "[{}] Queue closed: {} completed, {} failed",
            self.name(),
            self.completed_count(),
            lock(&self.inner.failed).len()
        );
    }
}

async fn run_worker<P: Send + Sync + 'static>(
    inner: Arc<QueueInner<P>>,
    mut receiver: mpsc::UnboundedReceiver<Job<P>>,
) {
    let semaphore = Arc::new(Semaphore::new(inner.config.concurrency.max(1)));
    let limiter = inner.config.rate_limit.map(RateLimiter::per_second);

    loop {
        let job = tokio::select! {
            biased;
            _ = inner.shutdown.cancelled() => break,
            job = receiver.recv() => match job {
                Some(job) => job,
                None => break,
            },
        };

        let permit = tokio::select! {
            biased;
            _ = inner.shutdown.cancelled() => {
                inner.abandon(&job);
                break;
            }
            permit = semaphore.clone().acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };

        if let Some(limiter) = &limiter {
            tokio::select! {
                biased;
                _ = inner.shutdown.cancelled() => {
                    inner.abandon(&job);
                    break;
                }
                _ = limiter.acquire() => {}
            }
        }

        let job_inner = inner.clone();
        inner.tracker.spawn(async move {
            job_inner.process(job).await;
            drop(permit);
        });
    }

    receiver.close();
    while let Ok(job) = receiver.try_recv() {
        inner.abandon(&job);
    }
}

impl<P: Send + Sync + 'static> QueueInner<P> {
    async fn process(self: &Arc<Self>, mut job: Job<P>) {
        let name = &self.config.name;
        debug!(
            "[{}] Running job {} (attempt {}/{})",
            name, job.id, job.attempt, job.max_attempts
        );

        let result = match AssertUnwindSafe(self.handler.handle(&job))
            .catch_unwind()
            .await
        {
            Ok(result) => result,
            Err(payload) => Err(MonitorError::JobPanicked(panic_message(payload.as_ref()))),
        };
        match result {
            Ok(()) => {
                self.completed.fetch_add(1, Ordering::SeqCst);
                self.release(&job.id);
                info!("[{}] Job {} completed", name, job.id);
            }
            Err(err) if err.is_retryable() && !job.is_final_attempt() => {
                let delay = self.config.retry.backoff(job.attempt);
                warn!(
                    "[{}] Job {} failed on attempt {}/{}: {}. Retrying in {:?}",
                    name, job.id, job.attempt, job.max_attempts, err, delay
                );
                job.attempt += 1;

                let drain_deadline = *lock(&self.drain_deadline);
                if drain_deadline.is_some_and(|deadline| Instant::now() + delay > deadline) {
                    self.abandon(&job);
                    return;
                }

                let inner = self.clone();
                self.tracker.spawn(async move {
                    tokio::select! {
                        biased;
                        _ = inner.shutdown.cancelled() => inner.abandon(&job),
                        _ = sleep(delay) => {
                            if let Err(mpsc::error::SendError(job)) = inner.sender.send(job) {
                                inner.abandon(&job);
                            }
                        }
                    }
                });
            }
            Err(err) => {
                error!(
                    "[{}] Job {} failed after {} attempt(s), parking it: {}",
                    name, job.id, job.attempt, err
                );
                let failed = FailedJob {
                    id: job.id.clone(),
                    attempts: job.attempt,
                    error: err.to_string(),
                    failed_at: Utc::now(),
                    payload: job.payload,
                };
                lock(&self.failed).push(failed);
                self.release(&job.id);
            }
        }
    }

    fn release(&self, id: &str) {
        let mut active = lock(&self.active);
        active.remove(id);
        if active.is_empty() {
            self.idle.notify_waiters();
        }
    }

    async fn wait_idle(&self) {
        loop {
            // Registered before the check so a release in between is not missed
            let notified = self.idle.notified();
            if lock(&self.active).is_empty() {
                return;
            }
            notified.await;
        }
    }

    fn abandon(&self, job: &Job<P>) {
        self.release(&job.id);
        info!(
            "[{}] Job {} dropped at shutdown before attempt {}",
            self.config.name, job.id, job.attempt
        );
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
