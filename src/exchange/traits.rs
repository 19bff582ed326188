use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::Coin;
use crate::error::Result;

/// Exchange created at the broker: where to send funds and how to refer to it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedExchange {
    pub id: String,
    pub deposit_address: String,
}

/// Broker pair code, e.g. `eth_waves`
pub fn pair_code(from: Coin, to: Coin) -> Result<String> {
    Ok(format!(
        "{}_{}",
        from.require_exchange_code()?,
        to.require_exchange_code()?
    ))
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ExchangeBroker: Send + Sync {
    /// Tradable pair codes in `from_to` form
    async fn available_pairs(&self) -> Result<Vec<String>>;

    /// Smallest amount of `from` the broker accepts. Zero means unknown.
    async fn min_amount(&self, from: Coin, to: Coin) -> Result<Decimal>;

    /// Open an exchange paying out to `destination`
    async fn create_exchange(
        &self,
        from: Coin,
        to: Coin,
        amount: Decimal,
        destination: &str,
    ) -> Result<CreatedExchange>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pair_code_uses_broker_tickers() {
        assert_eq!(pair_code(Coin::Eth, Coin::Waves).unwrap(), "eth_waves");
        assert_eq!(pair_code(Coin::Bnb, Coin::Eth).unwrap(), "bnbbsc_eth");
        assert!(pair_code(Coin::Usd, Coin::Eth).is_err());
    }
}
