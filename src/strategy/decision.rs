//! Prediction Decision Engine
//!
//! Turns predictor signals into one trade command. Each signal votes on its
//! own (classifier direction plus a profitability check against a
//! fee-adjusted threshold); a [`PrecedencePolicy`] resolves the votes.
//!
//! Nothing here returns an error: invalid inputs resolve to Hold.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{info, warn};

use crate::domain::{PredictionSignal, PredictorVote, TradeCommand, TradeDecision};

/// Threshold a predicted move must beat after paying `network_fee_pct`
pub fn fee_adjusted_threshold(base_threshold: f64, network_fee_pct: f64) -> f64 {
    base_threshold + network_fee_pct
}

/// How per-predictor votes combine into one command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum PrecedencePolicy {
    /// One designated predictor decides; the others are logged only
    Primary { predictor: String },
    /// Every signal has to vote for the same command
    Unanimous,
    /// More than half of all signals have to vote for the same command
    Majority,
}

impl fmt::Display for PrecedencePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrecedencePolicy::Primary { predictor } => write!(f, "primary({})", predictor),
            PrecedencePolicy::Unanimous => write!(f, "unanimous"),
            PrecedencePolicy::Majority => write!(f, "majority"),
        }
    }
}

/// Vote of a single signal at `current_price`
pub fn vote(signal: &PredictionSignal, current_price: f64, threshold: f64) -> PredictorVote {
    let predicted = signal.predicted_value;
    let (profit_if_buy, profit_if_sell) = if predicted.is_finite() {
        (
            (predicted - current_price) / current_price,
            (current_price - predicted) / current_price,
        )
    } else {
        (f64::NAN, f64::NAN)
    };

    // NaN comparisons are false, so a bad input never votes.
    let vote = match signal.command {
        TradeCommand::Buy if profit_if_buy > threshold && profit_if_buy > 0.0 => TradeCommand::Buy,
        TradeCommand::Sell if profit_if_sell > threshold && profit_if_sell > 0.0 => {
            TradeCommand::Sell
        }
        _ => TradeCommand::Hold,
    };

    PredictorVote {
        predictor: signal.predictor.clone(),
        classifier: signal.command,
        vote,
        profit_if_buy,
        profit_if_sell,
    }
}

#[derive(Debug, Clone)]
pub struct DecisionEngine {
    policy: PrecedencePolicy,
}

impl DecisionEngine {
    pub fn new(policy: PrecedencePolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &PrecedencePolicy {
        &self.policy
    }

    pub fn decide(
        &self,
        signals: &[PredictionSignal],
        current_price: f64,
        threshold: f64,
    ) -> TradeDecision {
        if !current_price.is_finite() || current_price <= 0.0 || !threshold.is_finite() {
            warn!(current_price, threshold, "Invalid decision inputs, holding");
            return TradeDecision::hold(current_price, threshold);
        }
        if signals.is_empty() {
            info!("No prediction signals, holding");
            return TradeDecision::hold(current_price, threshold);
        }

        let votes: Vec<PredictorVote> = signals
            .iter()
            .map(|s| vote(s, current_price, threshold))
            .collect();

        for v in &votes {
            info!(
                predictor = %v.predictor,
                classifier = %v.classifier,
                vote = %v.vote,
                profit_if_buy = v.profit_if_buy,
                profit_if_sell = v.profit_if_sell,
                "Predictor vote"
            );
        }

        let command = self.resolve(&votes);
        let confidence_sources = signals
            .iter()
            .zip(&votes)
            .filter(|(_, v)| v.vote == command)
            .map(|(s, _)| s.clone())
            .collect();

        info!(policy = %self.policy, %command, current_price, threshold, "Decision");

        TradeDecision {
            command,
            votes,
            confidence_sources,
            current_price,
            threshold,
        }
    }

    fn resolve(&self, votes: &[PredictorVote]) -> TradeCommand {
        match &self.policy {
            PrecedencePolicy::Primary { predictor } => {
                match votes.iter().find(|v| &v.predictor == predictor) {
                    Some(v) => v.vote,
                    None => {
                        warn!(predictor = %predictor, "Primary predictor produced no signal");
                        TradeCommand::Hold
                    }
                }
            }
            PrecedencePolicy::Unanimous => match votes.first().map(|v| v.vote) {
                Some(first) if !first.is_hold() && votes.iter().all(|v| v.vote == first) => first,
                _ => TradeCommand::Hold,
            },
            PrecedencePolicy::Majority => {
                let count = |cmd: TradeCommand| votes.iter().filter(|v| v.vote == cmd).count();
                let half = votes.len() / 2;
                if count(TradeCommand::Buy) > half {
                    TradeCommand::Buy
                } else if count(TradeCommand::Sell) > half {
                    TradeCommand::Sell
                } else {
                    TradeCommand::Hold
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn signal(name: &str, predicted: f64, command: TradeCommand) -> PredictionSignal {
        PredictionSignal {
            predictor: name.to_string(),
            produced_at: Utc::now(),
            target_time: 0,
            predicted_value: predicted,
            command,
        }
    }

    fn primary(name: &str) -> DecisionEngine {
        DecisionEngine::new(PrecedencePolicy::Primary {
            predictor: name.to_string(),
        })
    }

    #[test]
    fn buy_needs_profit_beyond_threshold() {
        let engine = primary("short");
        let signals = [signal("short", 110.0, TradeCommand::Buy)];

        let decision = engine.decide(&signals, 100.0, 0.05);
        assert_eq!(decision.command, TradeCommand::Buy);
        assert!((decision.votes[0].profit_if_buy - 0.10).abs() < 1e-12);
        assert_eq!(decision.confidence_sources.len(), 1);

        assert_eq!(engine.decide(&signals, 100.0, 0.2).command, TradeCommand::Hold);
    }

    #[test]
    fn sell_is_symmetric() {
        let engine = primary("short");
        let signals = [signal("short", 90.0, TradeCommand::Sell)];
        assert_eq!(engine.decide(&signals, 100.0, 0.05).command, TradeCommand::Sell);
        // Classifier disagrees with the move
        let signals = [signal("short", 90.0, TradeCommand::Buy)];
        assert_eq!(engine.decide(&signals, 100.0, 0.05).command, TradeCommand::Hold);
    }

    #[test]
    fn degenerate_inputs_hold() {
        let engine = primary("short");
        assert_eq!(engine.decide(&[], 100.0, 0.0).command, TradeCommand::Hold);

        let equal = [signal("short", 100.0, TradeCommand::Buy)];
        assert_eq!(engine.decide(&equal, 100.0, 0.0).command, TradeCommand::Hold);
        assert_eq!(engine.decide(&equal, 100.0, -1.0).command, TradeCommand::Hold);

        let nan = [signal("short", f64::NAN, TradeCommand::Buy)];
        assert_eq!(engine.decide(&nan, 100.0, 0.0).command, TradeCommand::Hold);

        let fine = [signal("short", 200.0, TradeCommand::Buy)];
        assert_eq!(engine.decide(&fine, 0.0, 0.0).command, TradeCommand::Hold);
        assert_eq!(engine.decide(&fine, f64::INFINITY, 0.0).command, TradeCommand::Hold);
        assert_eq!(engine.decide(&fine, 100.0, f64::NAN).command, TradeCommand::Hold);
    }

    #[test]
    fn primary_ignores_other_predictors() {
        let signals = [
            signal("long", 90.0, TradeCommand::Sell),
            signal("short", 110.0, TradeCommand::Buy),
        ];
        assert_eq!(primary("short").decide(&signals, 100.0, 0.01).command, TradeCommand::Buy);
        assert_eq!(primary("long").decide(&signals, 100.0, 0.01).command, TradeCommand::Sell);
        assert_eq!(primary("missing").decide(&signals, 100.0, 0.01).command, TradeCommand::Hold);
    }

    #[test]
    fn unanimous_and_majority() {
        let mixed = [
            signal("a", 110.0, TradeCommand::Buy),
            signal("b", 112.0, TradeCommand::Buy),
            signal("c", 100.5, TradeCommand::Buy),
        ];
        let unanimous = DecisionEngine::new(PrecedencePolicy::Unanimous);
        let majority = DecisionEngine::new(PrecedencePolicy::Majority);

        assert_eq!(unanimous.decide(&mixed, 100.0, 0.01).command, TradeCommand::Hold);
        assert_eq!(majority.decide(&mixed, 100.0, 0.01).command, TradeCommand::Buy);
        assert_eq!(unanimous.decide(&mixed, 100.0, 0.001).command, TradeCommand::Buy);

        let split = [
            signal("a", 110.0, TradeCommand::Buy),
            signal("b", 90.0, TradeCommand::Sell),
        ];
        assert_eq!(majority.decide(&split, 100.0, 0.01).command, TradeCommand::Hold);
    }

    #[test]
    fn lowering_threshold_never_retreats_to_hold() {
        let signals = [
            signal("a", 103.0, TradeCommand::Buy),
            signal("b", 96.0, TradeCommand::Sell),
            signal("c", 101.0, TradeCommand::Buy),
        ];
        let engines = [
            primary("a"),
            primary("b"),
            DecisionEngine::new(PrecedencePolicy::Unanimous),
            DecisionEngine::new(PrecedencePolicy::Majority),
        ];

        for engine in &engines {
            let mut previous = TradeCommand::Hold;
            for step in (0..=60).rev() {
                let threshold = step as f64 * 0.001;
                let command = engine.decide(&signals, 100.0, threshold).command;
                if !previous.is_hold() {
                    assert_eq!(command, previous, "{} at {}", engine.policy(), threshold);
                }
                previous = command;
            }
        }
    }

    #[test]
    fn fees_raise_the_threshold() {
        assert!((fee_adjusted_threshold(0.0005, 0.002) - 0.0025).abs() < 1e-12);
    }
}
