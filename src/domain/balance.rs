use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Wallet balance at a point in time (`timestamp` in unix milliseconds)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BalanceSnapshot {
    pub timestamp: i64,
    pub amount: Decimal,
}
