use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Trade command produced by a predictor or by the decision engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TradeCommand {
    Buy,
    Sell,
    Hold,
}

impl TradeCommand {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeCommand::Buy => "Buy",
            TradeCommand::Sell => "Sell",
            TradeCommand::Hold => "Hold",
        }
    }

    pub fn is_hold(&self) -> bool {
        matches!(self, TradeCommand::Hold)
    }
}

impl fmt::Display for TradeCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One predictor's output for one decision cycle.
///
/// `command` is the predictor's own classifier ranking (the command it rates
/// highest); whether it becomes a vote is decided by the decision engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictionSignal {
    pub predictor: String,
    pub produced_at: DateTime<Utc>,
    /// Unix seconds of the predicted candle
    pub target_time: i64,
    pub predicted_value: f64,
    pub command: TradeCommand,
}

/// How a single signal voted after the profitability check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictorVote {
    pub predictor: String,
    pub classifier: TradeCommand,
    pub vote: TradeCommand,
    pub profit_if_buy: f64,
    pub profit_if_sell: f64,
}

/// Outcome of one decision cycle. Never persisted on its own.
#[derive(Debug, Clone, PartialEq)]
pub struct TradeDecision {
    pub command: TradeCommand,
    pub votes: Vec<PredictorVote>,
    pub confidence_sources: Vec<PredictionSignal>,
    pub current_price: f64,
    pub threshold: f64,
}

impl TradeDecision {
    pub fn hold(current_price: f64, threshold: f64) -> Self {
        Self {
            command: TradeCommand::Hold,
            votes: Vec::new(),
            confidence_sources: Vec::new(),
            current_price,
            threshold,
        }
    }
}
