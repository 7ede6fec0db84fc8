mod monitor_error;
mod order;
mod price_trigger;
mod quote;

pub use monitor_error::MonitorError;
pub use order::{Order, OrderStatus, OrderUpdate};
pub use price_trigger::{PriceTrigger, TriggerLog, TriggerMatch};
pub use quote::{Quote, QuoteTransaction};
