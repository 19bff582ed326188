use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::info;

use crate::domain::TradingPair;
use crate::error::{Result, SwapdError};

/// Exchange saga stages, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SagaStage {
    CheckingPairAvailability,
    CheckingMinimumAmount,
    CreatingQuote,
    /// Funds leave the wallet here; not cancellable once entered
    TransferringFunds,
    RecordingSettlement,
    Done,
}

impl SagaStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            SagaStage::CheckingPairAvailability => "CHECKING_PAIR_AVAILABILITY",
            SagaStage::CheckingMinimumAmount => "CHECKING_MINIMUM_AMOUNT",
            SagaStage::CreatingQuote => "CREATING_QUOTE",
            SagaStage::TransferringFunds => "TRANSFERRING_FUNDS",
            SagaStage::RecordingSettlement => "RECORDING_SETTLEMENT",
            SagaStage::Done => "DONE",
        }
    }

    /// Check if this stage can transition to another stage
    pub fn can_transition_to(&self, target: SagaStage) -> bool {
        use SagaStage::*;

        matches!(
            (self, target),
            (CheckingPairAvailability, CheckingMinimumAmount)
                | (CheckingMinimumAmount, CreatingQuote)
                | (CreatingQuote, TransferringFunds)
                | (TransferringFunds, RecordingSettlement)
                | (RecordingSettlement, Done)
        )
    }

    /// Has the saga reached the point where funds may have left the wallet?
    pub fn funds_at_risk(&self) -> bool {
        matches!(self, SagaStage::TransferringFunds | SagaStage::RecordingSettlement)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SagaStage::Done)
    }
}

impl fmt::Display for SagaStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for SagaStage {
    type Error = String;

    fn try_from(s: &str) -> std::result::Result<Self, Self::Error> {
        match s.to_uppercase().as_str() {
            "CHECKING_PAIR_AVAILABILITY" => Ok(SagaStage::CheckingPairAvailability),
            "CHECKING_MINIMUM_AMOUNT" => Ok(SagaStage::CheckingMinimumAmount),
            "CREATING_QUOTE" => Ok(SagaStage::CreatingQuote),
            "TRANSFERRING_FUNDS" => Ok(SagaStage::TransferringFunds),
            "RECORDING_SETTLEMENT" => Ok(SagaStage::RecordingSettlement),
            "DONE" => Ok(SagaStage::Done),
            _ => Err(format!("Unknown saga stage: {}", s)),
        }
    }
}

/// Current stage of one saga run, logging every transition
#[derive(Debug)]
pub struct StageTracker {
    pair: TradingPair,
    stage: SagaStage,
}

impl StageTracker {
    pub fn new(pair: TradingPair) -> Self {
        info!(pair = %pair, stage = %SagaStage::CheckingPairAvailability, "Saga started");
        Self {
            pair,
            stage: SagaStage::CheckingPairAvailability,
        }
    }

    pub fn stage(&self) -> SagaStage {
        self.stage
    }

    pub fn advance(&mut self, to: SagaStage) -> Result<()> {
        if !self.stage.can_transition_to(to) {
            return Err(SwapdError::InvalidStateTransition {
                from: self.stage.to_string(),
                to: to.to_string(),
            });
        }
        info!(pair = %self.pair, from = %self.stage, to = %to, "Saga stage");
        self.stage = to;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Coin;

    #[test]
    fn stages_only_move_forward_one_step() {
        use SagaStage::*;
        assert!(CheckingPairAvailability.can_transition_to(CheckingMinimumAmount));
        assert!(!CheckingPairAvailability.can_transition_to(TransferringFunds));
        assert!(!TransferringFunds.can_transition_to(CreatingQuote));
        assert!(!Done.can_transition_to(CheckingPairAvailability));
        assert!(TransferringFunds.funds_at_risk());
        assert!(!CreatingQuote.funds_at_risk());
    }

    #[test]
    fn tracker_rejects_skipped_stages() {
        let mut tracker = StageTracker::new(TradingPair::new(Coin::Waves, Coin::Eth));
        tracker.advance(SagaStage::CheckingMinimumAmount).unwrap();
        let err = tracker.advance(SagaStage::TransferringFunds).unwrap_err();
        assert!(matches!(err, SwapdError::InvalidStateTransition { .. }));
        assert_eq!(tracker.stage(), SagaStage::CheckingMinimumAmount);
    }

    #[test]
    fn stage_names_round_trip() {
        for stage in [SagaStage::CreatingQuote, SagaStage::Done] {
            assert_eq!(SagaStage::try_from(stage.as_str()).unwrap(), stage);
        }
        assert!(SagaStage::try_from("nope").is_err());
    }
}
