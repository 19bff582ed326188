//! Wallets
//!
//! One wallet per chain. Sending is split in two so a transfer can be
//! journaled, with its transaction reference, before it leaves the process:
//! - `prepare_transfer` builds and signs; a failure means nothing was sent
//! - `broadcast` submits the signed payload; `TransferRejected` means
//!   nothing was sent, `TransferStatusUnknown` means funds may be in flight

pub mod ethereum;
pub mod waves;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::Coin;
use crate::error::Result;

pub use ethereum::EthereumWallet;
pub use waves::WavesNodeWallet;

/// A signed transfer that has not been broadcast yet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreparedTransfer {
    /// Transaction hash or id, fixed by the signature
    pub tx_ref: String,
    /// Chain-specific signed payload, broadcast verbatim
    pub payload: String,
    pub to: String,
    /// Amount as it will be transferred after unit rounding
    pub amount: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferStatus {
    Confirmed,
    /// Known to the network but not yet final
    Pending,
    /// The network has never seen the transaction
    NotFound,
    /// Included but failed; the funds did not move
    Failed(String),
}

impl fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferStatus::Confirmed => write!(f, "confirmed"),
            TransferStatus::Pending => write!(f, "pending"),
            TransferStatus::NotFound => write!(f, "not found"),
            TransferStatus::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Wallet: Send + Sync {
    fn coin(&self) -> Coin;

    fn address(&self) -> String;

    async fn balance(&self) -> Result<Decimal>;

    async fn prepare_transfer(&self, to: &str, amount: Decimal) -> Result<PreparedTransfer>;

    async fn broadcast(&self, prepared: &PreparedTransfer) -> Result<()>;

    async fn transfer_status(&self, tx_ref: &str) -> Result<TransferStatus>;

    /// Fee paid by a confirmed transaction, in the wallet's coin
    async fn transaction_fee(&self, tx_ref: &str) -> Result<Decimal>;
}
