//! Exchange broker
//!
//! Quotes and deposit addresses for cross-chain exchanges.

pub mod changenow;
pub mod traits;

pub use changenow::ChangeNowClient;
#[cfg(test)]
pub use traits::MockExchangeBroker;
pub use traits::{pair_code, CreatedExchange, ExchangeBroker};
