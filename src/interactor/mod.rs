pub mod db;
pub mod memory_store;
pub mod store;

pub use memory_store::InMemoryStore;
pub use store::{OrderStore, PgStore, TriggerStore};
