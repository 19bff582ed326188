//! Market data
//!
//! Historical candles and spot prices behind the [`MarketDataSource`] trait.

pub mod cryptocompare;

use async_trait::async_trait;

use crate::domain::{Candle, Coin, Granularity};
use crate::error::Result;

pub use cryptocompare::CryptoCompareClient;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// The most recent `limit` candles of `base` priced in `quote`
    async fn candles(
        &self,
        base: Coin,
        quote: Coin,
        granularity: Granularity,
        limit: u32,
    ) -> Result<Vec<Candle>>;

    /// Spot price of one `base` in `quote`
    async fn current_price(&self, base: Coin, quote: Coin) -> Result<f64>;
}
