use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::Coin;

/// Exchange created at the broker for one saga attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExchangeQuote {
    pub id: String,
    pub from_currency: Coin,
    pub to_currency: Coin,
    pub amount: Decimal,
    /// Broker address that receives our funds
    pub deposit_address: String,
    /// Our address that receives the exchanged funds
    pub destination_address: String,
    pub created_at: DateTime<Utc>,
}

/// Durable proof of a completed exchange (`timestamp` in unix milliseconds)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettlementRecord {
    pub timestamp: i64,
    pub exchange_transaction_id: String,
    pub from_coin: Coin,
    pub to_coin: Coin,
    pub amount: Decimal,
    pub wallet_from: String,
    pub wallet_to: String,
    pub transaction_hash: String,
    pub network_fee: Decimal,
}

/// Progress of an outgoing transfer recorded in the transfer journal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferStage {
    /// Signed and journaled, broadcast not yet acknowledged
    Prepared,
    /// Accepted by the network, waiting for confirmation
    Broadcast,
    /// Confirmed on chain, settlement record not yet durable
    Confirmed,
    /// Outcome unknown; an operator has to decide
    NeedsReconciliation,
}

impl TransferStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferStage::Prepared => "prepared",
            TransferStage::Broadcast => "broadcast",
            TransferStage::Confirmed => "confirmed",
            TransferStage::NeedsReconciliation => "needs_reconciliation",
        }
    }

    /// Not yet seen confirmed on chain
    pub fn funds_in_flight(&self) -> bool {
        !matches!(self, TransferStage::Confirmed)
    }
}

impl fmt::Display for TransferStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Journal entry written before funds are broadcast, keyed by quote id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingTransfer {
    pub quote: ExchangeQuote,
    pub wallet_from: String,
    /// Transaction hash/id, known before broadcast
    pub tx_ref: String,
    /// Signed transaction, rebroadcast verbatim when resuming
    pub signed_payload: String,
    /// Amount the signed transaction carries, in chain precision
    pub sent_amount: Decimal,
    pub stage: TransferStage,
    #[serde(default)]
    pub attempts: u32,
    #[serde(default)]
    pub note: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl PendingTransfer {
    pub fn advance(&mut self, stage: TransferStage, note: Option<String>) {
        self.stage = stage;
        self.note = note;
        self.updated_at = Utc::now();
    }
}
