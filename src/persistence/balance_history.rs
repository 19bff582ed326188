//! Per-coin wallet balance history, keyed by snapshot time in milliseconds

use rust_decimal::Decimal;
use std::sync::Arc;

use super::{KeyedBlobStore, ObjectStore};
use crate::domain::{BalanceSnapshot, Coin};
use crate::error::Result;

pub struct BalanceHistory {
    blobs: KeyedBlobStore,
}

impl BalanceHistory {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self {
            blobs: KeyedBlobStore::new(store),
        }
    }

    pub fn blob_key(coin: Coin) -> String {
        format!("{}-wallet-balance-history.json", coin)
    }

    /// Snapshots ordered by time
    pub async fn snapshots(&self, coin: Coin) -> Result<Vec<BalanceSnapshot>> {
        let map = self.blobs.load::<i64, Decimal>(&Self::blob_key(coin)).await?;
        Ok(map
            .into_iter()
            .map(|(timestamp, amount)| BalanceSnapshot { timestamp, amount })
            .collect())
    }

    /// Append one snapshot; an existing timestamp is kept
    pub async fn append(&self, coin: Coin, snapshot: BalanceSnapshot) -> Result<bool> {
        self.blobs
            .update::<i64, Decimal, _, _>(&Self::blob_key(coin), |map| {
                if map.contains_key(&snapshot.timestamp) {
                    return (false, false);
                }
                map.insert(snapshot.timestamp, snapshot.amount);
                (true, true)
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::MemoryObjectStore;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn snapshots_are_ordered_and_stored_as_pairs() {
        let store = Arc::new(MemoryObjectStore::new());
        let history = BalanceHistory::new(store.clone());

        history
            .append(Coin::Waves, BalanceSnapshot { timestamp: 2_000, amount: dec!(15.5) })
            .await
            .unwrap();
        history
            .append(Coin::Waves, BalanceSnapshot { timestamp: 1_000, amount: dec!(14.5) })
            .await
            .unwrap();

        let snapshots = history.snapshots(Coin::Waves).await.unwrap();
        assert_eq!(snapshots[0].amount, dec!(14.5));
        assert_eq!(snapshots[1].timestamp, 2_000);

        let raw = store.get("WAVES-wallet-balance-history.json").await.unwrap().unwrap();
        assert_eq!(std::str::from_utf8(&raw).unwrap(), "[[1000,14.5],[2000,15.5]]");
    }
}
