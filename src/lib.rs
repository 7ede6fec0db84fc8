pub mod config;
pub mod di;
pub mod entity;
pub mod interactor;
pub mod market;
pub mod services;
pub mod utils;

// Re-export commonly used items
pub use config::AppConfig;
pub use di::*;
pub use entity::*;
pub use interactor::{InMemoryStore, OrderStore, PgStore, TriggerStore};
pub use services::MonitorScheduler;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
