//! Persistence Layer
//!
//! Every durable record lives in a named blob of an [`ObjectStore`]:
//! - Dataset store for candle history
//! - Settlement log for completed exchanges
//! - Transfer journal for transfers whose outcome is not yet recorded
//! - Balance and prediction histories

pub mod balance_history;
pub mod dataset_store;
pub mod keyed;
pub mod object_store;
pub mod prediction_log;
pub mod settlement_log;
pub mod transfer_journal;

pub use balance_history::BalanceHistory;
pub use dataset_store::{DatasetStore, MergeSummary};
pub use keyed::KeyedBlobStore;
pub use object_store::{LocalObjectStore, MemoryObjectStore, ObjectStore};
#[cfg(test)]
pub use object_store::MockObjectStore;
pub use prediction_log::PredictionLog;
pub use settlement_log::SettlementLog;
pub use transfer_journal::TransferJournal;
