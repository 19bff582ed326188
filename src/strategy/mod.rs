//! Trading decisions

pub mod decision;

pub use decision::{fee_adjusted_threshold, vote, DecisionEngine, PrecedencePolicy};
