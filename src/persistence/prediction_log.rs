//! Prediction history: every decision cycle's signals, keyed by the cycle
//! time in milliseconds

use std::collections::BTreeMap;
use std::sync::Arc;

use super::{KeyedBlobStore, ObjectStore};
use crate::domain::{PredictionSignal, TradingPair};
use crate::error::Result;

pub struct PredictionLog {
    blobs: KeyedBlobStore,
}

impl PredictionLog {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self {
            blobs: KeyedBlobStore::new(store),
        }
    }

    pub fn blob_key(pair: &TradingPair) -> String {
        format!("{}-prediction-history.json", pair)
    }

    pub async fn append(
        &self,
        pair: &TradingPair,
        at_millis: i64,
        signals: &[PredictionSignal],
    ) -> Result<()> {
        if signals.is_empty() {
            return Ok(());
        }
        self.blobs
            .update::<i64, Vec<PredictionSignal>, _, _>(&Self::blob_key(pair), |map| {
                let mut key = at_millis;
                while map.contains_key(&key) {
                    key += 1;
                }
                map.insert(key, signals.to_vec());
                ((), true)
            })
            .await
    }

    pub async fn history(&self, pair: &TradingPair) -> Result<BTreeMap<i64, Vec<PredictionSignal>>> {
        self.blobs.load(&Self::blob_key(pair)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Coin, TradeCommand};
    use crate::persistence::MemoryObjectStore;
    use chrono::Utc;

    #[tokio::test]
    async fn same_millisecond_cycles_are_both_kept() {
        let log = PredictionLog::new(Arc::new(MemoryObjectStore::new()));
        let pair = TradingPair::new(Coin::Waves, Coin::Eth);
        let signal = PredictionSignal {
            predictor: "minute-short".to_string(),
            produced_at: Utc::now(),
            target_time: 1_700_000_060,
            predicted_value: 0.0041,
            command: TradeCommand::Buy,
        };

        log.append(&pair, 5, &[signal.clone()]).await.unwrap();
        log.append(&pair, 5, &[signal]).await.unwrap();
        log.append(&pair, 9, &[]).await.unwrap();

        let history = log.history(&pair).await.unwrap();
        assert_eq!(history.keys().copied().collect::<Vec<_>>(), vec![5, 6]);
    }
}
