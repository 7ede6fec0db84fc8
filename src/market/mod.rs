pub mod chains;
pub mod execution_service;
pub mod models;
pub mod price_service;
pub mod quote_service;

pub use execution_service::{EnclaveExecutionChannel, ExecutionChannel};
pub use models::DelegatedAction;
pub use price_service::{CoinGeckoOracle, GeckoTerminalOracle, PriceOracle};
pub use quote_service::{SwapQuoteService, ZeroXQuoteService};
