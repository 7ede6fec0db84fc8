use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Transaction the aggregator wants the taker to send
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QuoteTransaction {
    pub to: String,
    pub data: String,
    pub value: String,
    pub gas: Option<String>,
    pub gas_price: Option<String>,
}

/// Validated, executable swap quote
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Quote {
    pub buy_amount: u128,
    pub min_buy_amount: u128,
    pub transaction: QuoteTransaction,
    pub price: Decimal,
    pub guaranteed_price: Decimal,
    pub allowance_target: Option<String>,
}

impl Quote {
    /// Deviation between the quoted and the guaranteed (post-slippage) price,
    /// in percent. `price` is checked to be positive when the quote is built.
    pub fn price_impact_percent(&self) -> Decimal {
        if self.price.is_zero() {
            return Decimal::ZERO;
        }
        (self.price - self.guaranteed_price) / self.price * Decimal::ONE_HUNDRED
    }
}
