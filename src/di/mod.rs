mod container;

pub use container::{ServiceContainer, PRICE_CHECK_QUEUE, SWAP_EXECUTION_QUEUE};
