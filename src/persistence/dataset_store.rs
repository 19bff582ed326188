//! Dataset Store
//!
//! Append-only, time-keyed candle history per series. A merge loads the
//! persisted series, adds candles whose `time` is absent and rewrites the
//! blob in full.

use std::sync::Arc;
use tracing::{debug, info};

use super::{KeyedBlobStore, ObjectStore};
use crate::domain::{Candle, HistorySeries};
use crate::error::Result;

/// Result of one merge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeSummary {
    pub added: usize,
    pub total: usize,
}

pub struct DatasetStore {
    blobs: KeyedBlobStore,
}

impl DatasetStore {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self {
            blobs: KeyedBlobStore::new(store),
        }
    }

    pub fn blob_key(series: &str) -> String {
        format!("{}-trading-history.json", series)
    }

    /// Merge `candles` into `series`.
    ///
    /// Existing keys are never overwritten. When the write fails the merge
    /// is discarded and the error returned.
    pub async fn merge(&self, series: &str, candles: &[Candle]) -> Result<MergeSummary> {
        let summary = self
            .blobs
            .update::<i64, Candle, _, _>(&Self::blob_key(series), |map| {
                let mut history = HistorySeries::from_map(std::mem::take(map));
                let added = history.merge(candles);
                let total = history.len();
                *map = history.into_map();
                (MergeSummary { added, total }, added > 0)
            })
            .await?;

        if summary.added > 0 {
            info!(series, added = summary.added, total = summary.total, "Dataset merged");
        } else {
            debug!(series, total = summary.total, "Dataset already up to date");
        }
        Ok(summary)
    }

    /// Every persisted candle of `series`, ordered by time
    pub async fn get(&self, series: &str) -> Result<Vec<Candle>> {
        Ok(self.load(series).await?.to_vec())
    }

    pub async fn load(&self, series: &str) -> Result<HistorySeries> {
        Ok(HistorySeries::from_map(self.blobs.load(&Self::blob_key(series)).await?))
    }
}
