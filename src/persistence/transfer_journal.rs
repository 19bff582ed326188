//! Transfer Journal
//!
//! Outgoing transfers are journaled, keyed by quote id, before they are
//! broadcast. An entry lives until its settlement record is durable, so a
//! restart can always find transfers whose outcome it has not seen.

use std::sync::Arc;
use tracing::{debug, info};

use super::{KeyedBlobStore, ObjectStore};
use crate::domain::{PendingTransfer, TradingPair};
use crate::error::Result;

pub struct TransferJournal {
    blobs: KeyedBlobStore,
}

impl TransferJournal {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self {
            blobs: KeyedBlobStore::new(store),
        }
    }

    pub fn blob_key(pair: &TradingPair) -> String {
        format!("{}-pending-transfers.json", pair.ledger_name())
    }

    /// Insert or replace the entry for `entry.quote.id`
    pub async fn record(&self, pair: &TradingPair, entry: &PendingTransfer) -> Result<()> {
        self.blobs
            .update::<String, PendingTransfer, _, _>(&Self::blob_key(pair), |map| {
                map.insert(entry.quote.id.clone(), entry.clone());
                ((), true)
            })
            .await?;
        debug!(
            ledger = %pair.ledger_name(),
            quote_id = %entry.quote.id,
            stage = %entry.stage,
            "Transfer journaled"
        );
        Ok(())
    }

    /// Drop a resolved entry. Returns false when it was not journaled.
    pub async fn remove(&self, pair: &TradingPair, quote_id: &str) -> Result<bool> {
        let removed = self
            .blobs
            .update::<String, PendingTransfer, _, _>(&Self::blob_key(pair), |map| {
                let removed = map.remove(quote_id).is_some();
                (removed, removed)
            })
            .await?;
        if removed {
            info!(ledger = %pair.ledger_name(), quote_id, "Transfer resolved");
        }
        Ok(removed)
    }

    pub async fn get(&self, pair: &TradingPair, quote_id: &str) -> Result<Option<PendingTransfer>> {
        let mut map = self
            .blobs
            .load::<String, PendingTransfer>(&Self::blob_key(pair))
            .await?;
        Ok(map.remove(quote_id))
    }

    /// Unresolved entries, oldest first
    pub async fn entries(&self, pair: &TradingPair) -> Result<Vec<PendingTransfer>> {
        let map = self
            .blobs
            .load::<String, PendingTransfer>(&Self::blob_key(pair))
            .await?;
        let mut entries: Vec<PendingTransfer> = map.into_values().collect();
        entries.sort_by_key(|e| e.quote.created_at);
        Ok(entries)
    }
}
