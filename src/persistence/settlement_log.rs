//! Settlement Log
//!
//! Append-only record of completed exchanges per ledger, keyed by the
//! settlement timestamp in milliseconds.

use std::sync::Arc;
use tracing::{info, warn};

use super::{KeyedBlobStore, ObjectStore};
use crate::domain::{SettlementRecord, TradingPair};
use crate::error::Result;

pub struct SettlementLog {
    blobs: KeyedBlobStore,
}

impl SettlementLog {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self {
            blobs: KeyedBlobStore::new(store),
        }
    }

    pub fn blob_key(pair: &TradingPair) -> String {
        format!("{}-transactions-history.json", pair.ledger_name())
    }

    /// Append `record` unless its exchange id is already recorded.
    /// Returns whether the record was written.
    pub async fn append(&self, pair: &TradingPair, record: &SettlementRecord) -> Result<bool> {
        let written = self
            .blobs
            .update::<i64, SettlementRecord, _, _>(&Self::blob_key(pair), |map| {
                if map
                    .values()
                    .any(|r| r.exchange_transaction_id == record.exchange_transaction_id)
                {
                    return (false, false);
                }
                // Two settlements in the same millisecond keep both.
                let mut key = record.timestamp;
                while map.contains_key(&key) {
                    key += 1;
                }
                map.insert(key, record.clone());
                (true, true)
            })
            .await?;

        if written {
            info!(
                ledger = %pair.ledger_name(),
                exchange_id = %record.exchange_transaction_id,
                tx = %record.transaction_hash,
                "Settlement recorded"
            );
        } else {
            warn!(
                ledger = %pair.ledger_name(),
                exchange_id = %record.exchange_transaction_id,
                "Settlement already recorded, skipping"
            );
        }
        Ok(written)
    }

    /// Records ordered by timestamp
    pub async fn records(&self, pair: &TradingPair) -> Result<Vec<SettlementRecord>> {
        let map = self
            .blobs
            .load::<i64, SettlementRecord>(&Self::blob_key(pair))
            .await?;
        Ok(map.into_values().collect())
    }
}
