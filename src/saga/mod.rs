//! Exchange Saga
//!
//! Converts a trade command into a cross-chain exchange:
//! pair availability → minimum amount → quote → transfer → settlement.
//!
//! Steps before the transfer have no side effects and are retried by the
//! next decision cycle. The transfer is journaled before broadcast, so a
//! transfer whose outcome was never observed is found again by
//! [`ExchangeSaga::resume_pending`], which checks its status before doing
//! anything else. A failed settlement write never fails the exchange.

pub mod state;

use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::SagaConfig;
use crate::domain::{
    Coin, ExchangeQuote, PendingTransfer, SettlementRecord, TradingPair, TransferStage,
};
use crate::error::{Result, SwapdError};
use crate::exchange::{pair_code, ExchangeBroker};
use crate::persistence::{SettlementLog, TransferJournal};
use crate::wallet::{PreparedTransfer, TransferStatus, Wallet};

pub use state::{SagaStage, StageTracker};

/// What a failed saga leaves behind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FundsState {
    /// Nothing left the wallet; safe to retry with a fresh quote
    NotMoved,
    /// The transfer may be in flight; journaled for reconciliation
    Unknown,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SagaFailure {
    pub stage: SagaStage,
    pub reason: String,
    pub funds: FundsState,
}

impl SagaFailure {
    fn not_moved(stage: SagaStage, reason: impl fmt::Display) -> Self {
        Self {
            stage,
            reason: reason.to_string(),
            funds: FundsState::NotMoved,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SagaOutcome {
    Completed(SettlementRecord),
    /// Transfer confirmed, settlement record not yet written
    SettlementDeferred {
        quote_id: String,
        tx_ref: String,
        reason: String,
    },
    /// Broadcast, not confirmed within the wait window
    AwaitingConfirmation { quote_id: String, tx_ref: String },
    Failed(SagaFailure),
}

impl SagaOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, SagaOutcome::Failed(_))
    }
}

/// Result of resuming one journal entry
#[derive(Debug, Clone, PartialEq)]
pub enum ResumeOutcome {
    Settled {
        quote_id: String,
        record: SettlementRecord,
    },
    Deferred {
        quote_id: String,
        reason: String,
    },
    /// The transfer never happened; the entry was removed
    Dropped {
        quote_id: String,
        reason: String,
    },
    Rebroadcast {
        quote_id: String,
    },
    Waiting {
        quote_id: String,
        attempts: u32,
    },
    /// Moved to `NeedsReconciliation`
    Escalated {
        quote_id: String,
    },
    Skipped {
        quote_id: String,
        reason: String,
    },
}

/// Operator verdict on a transfer that needs reconciliation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Sent,
    NotSent,
}

impl FromStr for Resolution {
    type Err = SwapdError;

    fn from_str(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "sent" => Ok(Resolution::Sent),
            "not-sent" | "not_sent" | "notsent" => Ok(Resolution::NotSent),
            other => Err(SwapdError::Validation(format!(
                "unknown resolution {}; expected sent|not-sent",
                other
            ))),
        }
    }
}

enum Confirmation {
    Confirmed,
    Failed(String),
    TimedOut,
}

pub struct ExchangeSaga {
    broker: Arc<dyn ExchangeBroker>,
    wallets: HashMap<Coin, Arc<dyn Wallet>>,
    journal: Arc<TransferJournal>,
    settlements: Arc<SettlementLog>,
    config: SagaConfig,
}

impl ExchangeSaga {
    pub fn new(
        broker: Arc<dyn ExchangeBroker>,
        wallets: HashMap<Coin, Arc<dyn Wallet>>,
        journal: Arc<TransferJournal>,
        settlements: Arc<SettlementLog>,
        config: SagaConfig,
    ) -> Self {
        Self {
            broker,
            wallets,
            journal,
            settlements,
            config,
        }
    }

    pub fn wallet(&self, coin: Coin) -> Option<&Arc<dyn Wallet>> {
        self.wallets.get(&coin)
    }

    pub fn journal(&self) -> &TransferJournal {
        &self.journal
    }

    /// A pair with unresolved journal entries takes no new exchanges.
    pub async fn is_blocked(&self, pair: &TradingPair) -> Result<bool> {
        Ok(!self.journal.entries(pair).await?.is_empty())
    }

    /// Exchange the broker's minimum lot of `from` into `to`.
    pub async fn exchange(&self, pair: &TradingPair, from: Coin, to: Coin) -> SagaOutcome {
        let mut tracker = StageTracker::new(*pair);
        let outcome = match self.run(pair, from, to, &mut tracker).await {
            Ok(outcome) => outcome,
            Err(failure) => SagaOutcome::Failed(failure),
        };

        match &outcome {
            SagaOutcome::Completed(record) => info!(
                pair = %pair,
                exchange_id = %record.exchange_transaction_id,
                tx = %record.transaction_hash,
                "Exchange {} -> {} completed", from, to
            ),
            SagaOutcome::SettlementDeferred { quote_id, reason, .. } => warn!(
                pair = %pair,
                quote_id = %quote_id,
                "Transfer confirmed, settlement deferred: {}", reason
            ),
            SagaOutcome::AwaitingConfirmation { quote_id, tx_ref } => warn!(
                pair = %pair,
                quote_id = %quote_id,
                tx = %tx_ref,
                "Transfer not confirmed yet, will resume on a later cycle"
            ),
            SagaOutcome::Failed(f) if f.funds == FundsState::Unknown => error!(
                pair = %pair,
                stage = %f.stage,
                "Exchange failed with funds possibly in flight: {}", f.reason
            ),
            SagaOutcome::Failed(f) => warn!(
                pair = %pair,
                stage = %f.stage,
                "Exchange failed, no funds moved: {}", f.reason
            ),
        }
        outcome
    }

    async fn run(
        &self,
        pair: &TradingPair,
        from: Coin,
        to: Coin,
        tracker: &mut StageTracker,
    ) -> std::result::Result<SagaOutcome, SagaFailure> {
        let stage = SagaStage::CheckingPairAvailability;
        let source = self.require_wallet(from, stage)?;
        let destination = self.require_wallet(to, stage)?;
        let forward = pair_code(from, to).map_err(|e| SagaFailure::not_moved(stage, e))?;
        let backward = pair_code(to, from).map_err(|e| SagaFailure::not_moved(stage, e))?;

        let pairs = self
            .broker
            .available_pairs()
            .await
            .map_err(|e| SagaFailure::not_moved(stage, e))?;
        let listed = |code: &str| pairs.iter().any(|p| p.eq_ignore_ascii_case(code));
        if !listed(&forward) || !listed(&backward) {
            return Err(SagaFailure::not_moved(
                stage,
                SwapdError::PairUnavailable(format!("{} / {}", forward, backward)),
            ));
        }

        Self::advance(tracker, SagaStage::CheckingMinimumAmount)?;
        let amount = self
            .broker
            .min_amount(from, to)
            .await
            .map_err(|e| SagaFailure::not_moved(tracker.stage(), e))?;
        // Zero means the broker does not know; never trade it.
        if amount <= Decimal::ZERO {
            return Err(SagaFailure::not_moved(
                tracker.stage(),
                SwapdError::InvalidMinimumAmount {
                    pair: forward,
                    amount: amount.to_string(),
                },
            ));
        }

        Self::advance(tracker, SagaStage::CreatingQuote)?;
        let destination_address = destination.address();
        let created = self
            .broker
            .create_exchange(from, to, amount, &destination_address)
            .await
            .map_err(|e| SagaFailure::not_moved(tracker.stage(), e))?;
        let quote = ExchangeQuote {
            id: created.id,
            from_currency: from,
            to_currency: to,
            amount,
            deposit_address: created.deposit_address,
            destination_address,
            created_at: Utc::now(),
        };
        info!(pair = %pair, quote_id = %quote.id, "Quote created for {} {}", amount, from);

        Self::advance(tracker, SagaStage::TransferringFunds)?;
        let stage = tracker.stage();
        let prepared = source
            .prepare_transfer(&quote.deposit_address, quote.amount)
            .await
            .map_err(|e| SagaFailure::not_moved(stage, e))?;
        // Chain rounding must not take the lot under the quoted minimum.
        if prepared.amount < quote.amount {
            return Err(SagaFailure::not_moved(
                stage,
                SwapdError::InvalidMinimumAmount {
                    pair: forward,
                    amount: format!("{} signed for a quote of {}", prepared.amount, quote.amount),
                },
            ));
        }

        let mut entry = PendingTransfer {
            quote: quote.clone(),
            wallet_from: source.address(),
            tx_ref: prepared.tx_ref.clone(),
            signed_payload: prepared.payload.clone(),
            sent_amount: prepared.amount,
            stage: TransferStage::Prepared,
            attempts: 0,
            note: None,
            updated_at: Utc::now(),
        };
        self.journal.record(pair, &entry).await.map_err(|e| {
            SagaFailure::not_moved(stage, format!("journal unavailable, transfer not sent: {}", e))
        })?;

        match source.broadcast(&prepared).await {
            Ok(()) => {
                entry.advance(TransferStage::Broadcast, None);
                self.journal_best_effort(pair, &entry).await;
            }
            Err(SwapdError::TransferRejected(reason)) => {
                match source.transfer_status(&prepared.tx_ref).await {
                    Ok(TransferStatus::NotFound | TransferStatus::Failed(_)) => {
                        self.drop_entry(pair, &quote.id).await;
                        return Err(SagaFailure::not_moved(stage, reason));
                    }
                    Ok(status) => {
                        warn!(pair = %pair, quote_id = %quote.id, %status, "Broadcast rejected but the transfer is on chain: {}", reason);
                        entry.advance(TransferStage::Broadcast, Some(reason));
                        self.journal_best_effort(pair, &entry).await;
                    }
                    Err(e) => {
                        entry.note = Some(format!("{}; status check failed: {}", reason, e));
                        self.journal_best_effort(pair, &entry).await;
                        return Err(SagaFailure {
                            stage,
                            reason,
                            funds: FundsState::Unknown,
                        });
                    }
                }
            }
            Err(e) => {
                entry.note = Some(e.to_string());
                self.journal_best_effort(pair, &entry).await;
                return Err(SagaFailure {
                    stage,
                    reason: e.to_string(),
                    funds: FundsState::Unknown,
                });
            }
        }

        match self.await_confirmation(source.as_ref(), &prepared.tx_ref).await {
            Confirmation::Confirmed => {}
            Confirmation::Failed(reason) => {
                self.drop_entry(pair, &quote.id).await;
                return Err(SagaFailure::not_moved(stage, reason));
            }
            Confirmation::TimedOut => {
                return Ok(SagaOutcome::AwaitingConfirmation {
                    quote_id: quote.id,
                    tx_ref: prepared.tx_ref,
                });
            }
        }
        entry.advance(TransferStage::Confirmed, None);
        self.journal_best_effort(pair, &entry).await;

        Self::advance(tracker, SagaStage::RecordingSettlement)?;
        let outcome = match self.settle(pair, source.as_ref(), &entry).await {
            Ok(record) => SagaOutcome::Completed(record),
            Err(e) => SagaOutcome::SettlementDeferred {
                quote_id: quote.id,
                tx_ref: prepared.tx_ref,
                reason: e.to_string(),
            },
        };
        if matches!(outcome, SagaOutcome::Completed(_)) {
            Self::advance(tracker, SagaStage::Done)?;
        }
        Ok(outcome)
    }

    fn advance(tracker: &mut StageTracker, to: SagaStage) -> std::result::Result<(), SagaFailure> {
        tracker.advance(to).map_err(|e| SagaFailure {
            stage: tracker.stage(),
            reason: e.to_string(),
            funds: if tracker.stage().funds_at_risk() {
                FundsState::Unknown
            } else {
                FundsState::NotMoved
            },
        })
    }

    fn require_wallet(
        &self,
        coin: Coin,
        stage: SagaStage,
    ) -> std::result::Result<Arc<dyn Wallet>, SagaFailure> {
        self.wallets.get(&coin).cloned().ok_or_else(|| {
            SagaFailure::not_moved(
                stage,
                SwapdError::CapabilityUnavailable(format!("no {} wallet", coin)),
            )
        })
    }

    async fn await_confirmation(&self, wallet: &dyn Wallet, tx_ref: &str) -> Confirmation {
        let deadline = Instant::now() + Duration::from_secs(self.config.confirm_timeout_secs);
        let poll = Duration::from_secs(self.config.confirm_poll_secs.max(1));

        loop {
            match wallet.transfer_status(tx_ref).await {
                Ok(TransferStatus::Confirmed) => return Confirmation::Confirmed,
                Ok(TransferStatus::Failed(reason)) => return Confirmation::Failed(reason),
                Ok(status) => debug!(tx = %tx_ref, %status, "Waiting for confirmation"),
                Err(e) => warn!(tx = %tx_ref, "Status check failed: {}", e),
            }
            if Instant::now() + poll > deadline {
                return Confirmation::TimedOut;
            }
            tokio::time::sleep(poll).await;
        }
    }

    /// Write the settlement record and clear the journal entry
    async fn settle(
        &self,
        pair: &TradingPair,
        wallet: &dyn Wallet,
        entry: &PendingTransfer,
    ) -> Result<SettlementRecord> {
        let network_fee = wallet.transaction_fee(&entry.tx_ref).await?;
        let record = SettlementRecord {
            timestamp: Utc::now().timestamp_millis(),
            exchange_transaction_id: entry.quote.id.clone(),
            from_coin: entry.quote.from_currency,
            to_coin: entry.quote.to_currency,
            amount: entry.sent_amount,
            wallet_from: entry.wallet_from.clone(),
            wallet_to: entry.quote.deposit_address.clone(),
            transaction_hash: entry.tx_ref.clone(),
            network_fee,
        };
        self.settlements.append(pair, &record).await?;

        if let Err(e) = self.journal.remove(pair, &entry.quote.id).await {
            // The next resume finds the Confirmed entry and skips the duplicate append.
            warn!(quote_id = %entry.quote.id, "Settled but journal entry not cleared: {}", e);
        }
        Ok(record)
    }

    async fn journal_best_effort(&self, pair: &TradingPair, entry: &PendingTransfer) {
        if let Err(e) = self.journal.record(pair, entry).await {
            warn!(
                quote_id = %entry.quote.id,
                stage = %entry.stage,
                "Journal update failed: {}", e
            );
        }
    }

    async fn drop_entry(&self, pair: &TradingPair, quote_id: &str) {
        if let Err(e) = self.journal.remove(pair, quote_id).await {
            warn!(quote_id, "Journal entry of an unsent transfer not removed: {}", e);
        }
    }

    /// Resume every journaled transfer of `pair`, checking status first.
    pub async fn resume_pending(&self, pair: &TradingPair) -> Result<Vec<ResumeOutcome>> {
        let entries = self.journal.entries(pair).await?;
        let mut outcomes = Vec::with_capacity(entries.len());
        for entry in entries {
            let outcome = self.resume_entry(pair, entry).await;
            info!(pair = %pair, "Resume: {:?}", outcome);
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }

    async fn resume_entry(&self, pair: &TradingPair, mut entry: PendingTransfer) -> ResumeOutcome {
        let quote_id = entry.quote.id.clone();

        if entry.stage == TransferStage::NeedsReconciliation {
            return ResumeOutcome::Skipped {
                quote_id,
                reason: "waiting for operator reconciliation".to_string(),
            };
        }
        let Some(wallet) = self.wallets.get(&entry.quote.from_currency).cloned() else {
            return ResumeOutcome::Skipped {
                quote_id,
                reason: format!("no {} wallet", entry.quote.from_currency),
            };
        };

        if entry.stage != TransferStage::Confirmed {
            match wallet.transfer_status(&entry.tx_ref).await {
                Ok(TransferStatus::Confirmed) => {
                    entry.advance(TransferStage::Confirmed, None);
                    self.journal_best_effort(pair, &entry).await;
                }
                Ok(TransferStatus::Failed(reason)) => {
                    self.drop_entry(pair, &quote_id).await;
                    return ResumeOutcome::Dropped { quote_id, reason };
                }
                Ok(TransferStatus::NotFound) => {
                    // Identical payload, identical hash: cannot pay twice.
                    let prepared = PreparedTransfer {
                        tx_ref: entry.tx_ref.clone(),
                        payload: entry.signed_payload.clone(),
                        to: entry.quote.deposit_address.clone(),
                        amount: entry.sent_amount,
                    };
                    entry.attempts += 1;
                    match wallet.broadcast(&prepared).await {
                        Ok(()) => {
                            entry.advance(TransferStage::Broadcast, None);
                            self.journal_best_effort(pair, &entry).await;
                            return ResumeOutcome::Rebroadcast { quote_id };
                        }
                        // The earlier copy may have landed in between ("nonce too low").
                        Err(SwapdError::TransferRejected(reason)) => {
                            match wallet.transfer_status(&entry.tx_ref).await {
                                Ok(TransferStatus::NotFound | TransferStatus::Failed(_)) => {
                                    self.drop_entry(pair, &quote_id).await;
                                    return ResumeOutcome::Dropped { quote_id, reason };
                                }
                                Ok(TransferStatus::Confirmed) => {
                                    entry.advance(TransferStage::Confirmed, None);
                                    self.journal_best_effort(pair, &entry).await;
                                }
                                Ok(TransferStatus::Pending) => {
                                    entry.advance(TransferStage::Broadcast, Some(reason));
                                }
                                Err(e) => {
                                    entry.note = Some(format!("{}; status check failed: {}", reason, e));
                                }
                            }
                        }
                        Err(e) => entry.note = Some(e.to_string()),
                    }
                }
                Ok(TransferStatus::Pending) => entry.attempts += 1,
                Err(e) => {
                    entry.attempts += 1;
                    entry.note = Some(e.to_string());
                }
            }
        }

        if entry.stage == TransferStage::Confirmed {
            return match self.settle(pair, wallet.as_ref(), &entry).await {
                Ok(record) => ResumeOutcome::Settled { quote_id, record },
                Err(e) => ResumeOutcome::Deferred {
                    quote_id,
                    reason: e.to_string(),
                },
            };
        }

        if entry.attempts >= self.config.max_resume_attempts {
            let note = format!("unconfirmed after {} checks", entry.attempts);
            error!(pair = %pair, quote_id = %quote_id, tx = %entry.tx_ref, "{}, needs reconciliation", note);
            entry.advance(TransferStage::NeedsReconciliation, Some(note));
            self.journal_best_effort(pair, &entry).await;
            return ResumeOutcome::Escalated { quote_id };
        }

        entry.updated_at = Utc::now();
        self.journal_best_effort(pair, &entry).await;
        ResumeOutcome::Waiting {
            quote_id,
            attempts: entry.attempts,
        }
    }

    /// Apply an operator decision to a journaled transfer.
    pub async fn resolve(
        &self,
        pair: &TradingPair,
        quote_id: &str,
        resolution: Resolution,
    ) -> Result<ResumeOutcome> {
        let entry = self
            .journal
            .get(pair, quote_id)
            .await?
            .ok_or_else(|| SwapdError::Validation(format!("no pending transfer {}", quote_id)))?;

        match resolution {
            Resolution::NotSent => {
                if !entry.stage.funds_in_flight() {
                    return Err(SwapdError::Validation(format!(
                        "transfer {} is confirmed on chain; resolve it as sent",
                        quote_id
                    )));
                }
                self.journal.remove(pair, quote_id).await?;
                Ok(ResumeOutcome::Dropped {
                    quote_id: quote_id.to_string(),
                    reason: "operator: not sent".to_string(),
                })
            }
            Resolution::Sent => {
                let wallet = self.wallets.get(&entry.quote.from_currency).ok_or_else(|| {
                    SwapdError::CapabilityUnavailable(format!("no {} wallet", entry.quote.from_currency))
                })?;
                let record = self.settle(pair, wallet.as_ref(), &entry).await?;
                Ok(ResumeOutcome::Settled {
                    quote_id: quote_id.to_string(),
                    record,
                })
            }
        }
    }
}
