pub mod price_check_service;
pub mod queue;
pub mod rate_limiter;
pub mod scheduler;
pub mod swap_execution_service;

pub use price_check_service::{
    OrderDispatcher, PriceCheckJob, PriceCheckService, TickSummary, PRICE_CHECK_JOB_ID,
};
pub use queue::{FailedJob, Job, JobHandler, JobQueue, QueueConfig, RetryPolicy};
pub use rate_limiter::RateLimiter;
pub use scheduler::MonitorScheduler;
pub use swap_execution_service::{ExecutionOutcome, SwapExecutionService, SwapJob};
