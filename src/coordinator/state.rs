//! Outcome of one decision cycle, as logged and returned by manual triggers

use rust_decimal::Decimal;
use serde::Serialize;

use crate::domain::{Coin, TradeCommand, TradingPair};
use crate::saga::{FundsState, SagaOutcome};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CycleOutcome {
    /// A retrain holds the training gate
    Suspended,
    /// The previous cycle for this pair is still running
    InFlight,
    /// No decision could be made this tick
    Unavailable { reason: String },
    Hold { current_price: f64 },
    /// Decided, not executed (non-production or prediction only)
    DryRun {
        command: TradeCommand,
        current_price: f64,
    },
    /// Unresolved transfers block new exchanges on this pair
    Blocked { command: TradeCommand },
    BalanceTooLow {
        command: TradeCommand,
        coin: Coin,
        balance: Decimal,
        minimum: Decimal,
    },
    Executed {
        command: TradeCommand,
        result: String,
        funds_at_risk: bool,
    },
}

impl CycleOutcome {
    pub(crate) fn executed(command: TradeCommand, outcome: &SagaOutcome) -> Self {
        let (result, funds_at_risk) = match outcome {
            SagaOutcome::Completed(record) => (
                format!("completed exchange {}", record.exchange_transaction_id),
                false,
            ),
            SagaOutcome::SettlementDeferred { quote_id, reason, .. } => (
                format!("exchange {} confirmed, settlement deferred: {}", quote_id, reason),
                false,
            ),
            SagaOutcome::AwaitingConfirmation { quote_id, tx_ref } => (
                format!("exchange {} awaiting confirmation of {}", quote_id, tx_ref),
                true,
            ),
            SagaOutcome::Failed(failure) => (
                format!("failed at {}: {}", failure.stage, failure.reason),
                failure.funds == FundsState::Unknown,
            ),
        };
        CycleOutcome::Executed {
            command,
            result,
            funds_at_risk,
        }
    }

    pub(crate) fn unavailable(reason: impl ToString) -> Self {
        CycleOutcome::Unavailable {
            reason: reason.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleReport {
    pub pair: String,
    #[serde(flatten)]
    pub outcome: CycleOutcome,
}

impl CycleReport {
    pub fn new(pair: &TradingPair, outcome: CycleOutcome) -> Self {
        Self {
            pair: pair.to_string(),
            outcome,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::saga::{SagaFailure, SagaStage};

    #[test]
    fn report_serializes_flat() {
        let pair = TradingPair::new(Coin::Waves, Coin::Eth);
        let report = CycleReport::new(
            &pair,
            CycleOutcome::DryRun {
                command: TradeCommand::Buy,
                current_price: 0.0005,
            },
        );
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["pair"], "WAVES-ETH");
        assert_eq!(json["status"], "dry_run");
        assert_eq!(json["command"], "Buy");
    }

    #[test]
    fn unknown_funds_are_flagged() {
        let outcome = SagaOutcome::Failed(SagaFailure {
            stage: SagaStage::TransferringFunds,
            reason: "connection reset".into(),
            funds: FundsState::Unknown,
        });
        match CycleOutcome::executed(TradeCommand::Sell, &outcome) {
            CycleOutcome::Executed { funds_at_risk, .. } => assert!(funds_at_risk),
            other => panic!("unexpected {:?}", other),
        }
    }
}
