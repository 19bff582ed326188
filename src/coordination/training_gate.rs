//! Training Gate
//!
//! Suspends trading decisions while a model retrain runs. The gate is
//! re-opened unconditionally when the retrain ends, whether it succeeded,
//! returned an error, panicked or was cancelled.

use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{info, warn};

pub struct TrainingGate {
    trading_enabled: AtomicBool,
}

impl Default for TrainingGate {
    fn default() -> Self {
        Self::new()
    }
}

impl TrainingGate {
    pub fn new() -> Self {
        Self {
            trading_enabled: AtomicBool::new(true),
        }
    }

    /// The only read used by the decision path
    pub fn is_trading_enabled(&self) -> bool {
        self.trading_enabled.load(Ordering::SeqCst)
    }

    pub fn begin_retrain(&self) {
        if !self.trading_enabled.swap(false, Ordering::SeqCst) {
            warn!("Retrain started while trading was already suspended");
        }
        info!("Trading suspended for model retrain");
    }

    pub fn end_retrain(&self) {
        self.trading_enabled.store(true, Ordering::SeqCst);
        info!("Trading resumed after model retrain");
    }

    /// Begin a retrain that ends when the returned guard is dropped
    pub fn retrain_scope(&self) -> RetrainScope<'_> {
        self.begin_retrain();
        RetrainScope { gate: self }
    }
}

/// Matches a `begin_retrain` with its `end_retrain` on every exit path
#[must_use = "dropping the scope immediately re-enables trading"]
pub struct RetrainScope<'a> {
    gate: &'a TrainingGate,
}

impl Drop for RetrainScope<'_> {
    fn drop(&mut self) {
        self.gate.end_retrain();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn scope_reenables_trading() {
        let gate = TrainingGate::new();
        assert!(gate.is_trading_enabled());
        {
            let _scope = gate.retrain_scope();
            assert!(!gate.is_trading_enabled());
        }
        assert!(gate.is_trading_enabled());
    }

    #[test]
    fn end_is_unconditional() {
        let gate = TrainingGate::new();
        gate.end_retrain();
        assert!(gate.is_trading_enabled());
        gate.begin_retrain();
        gate.end_retrain();
        assert!(gate.is_trading_enabled());
    }

    #[tokio::test]
    async fn panicking_retrain_still_reopens_gate() {
        let gate = Arc::new(TrainingGate::new());
        let inner = Arc::clone(&gate);

        let result = tokio::spawn(async move {
            let _scope = inner.retrain_scope();
            panic!("training blew up");
        })
        .await;

        assert!(result.is_err());
        assert!(gate.is_trading_enabled());
    }
}
