//! At-most-one-in-flight guard per job key.
//!
//! A caller that fails to acquire a key skips its work instead of queueing.
//! The key is released when the returned ticket is dropped.

use dashmap::DashSet;
use std::sync::Arc;
use tracing::debug;

#[derive(Clone, Default)]
pub struct InFlightRegistry {
    keys: Arc<DashSet<String>>,
}

impl InFlightRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `key`, or `None` when another holder is still running
    pub fn try_acquire(&self, key: &str) -> Option<InFlightTicket> {
        if self.keys.insert(key.to_string()) {
            Some(InFlightTicket {
                keys: Arc::clone(&self.keys),
                key: key.to_string(),
            })
        } else {
            debug!("{} already in flight", key);
            None
        }
    }

    /// Held keys starting with `prefix`
    pub fn count_prefix(&self, prefix: &str) -> usize {
        self.keys.iter().filter(|key| key.starts_with(prefix)).count()
    }
}

/// Holds a key of an [`InFlightRegistry`] until dropped
#[must_use = "the key is released as soon as the ticket is dropped"]
pub struct InFlightTicket {
    keys: Arc<DashSet<String>>,
    key: String,
}

impl InFlightTicket {
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for InFlightTicket {
    fn drop(&mut self) {
        self.keys.remove(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_skips_until_release() {
        let registry = InFlightRegistry::new();
        let ticket = registry.try_acquire("trade:WAVES-ETH").unwrap();
        assert_eq!(ticket.key(), "trade:WAVES-ETH");
        assert!(registry.try_acquire("trade:WAVES-ETH").is_none());
        assert!(registry.try_acquire("trade:ETH-USD").is_some());

        let retrain = registry.try_acquire("retrain").unwrap();
        assert_eq!(registry.count_prefix("trade:"), 1);

        drop(ticket);
        drop(retrain);
        assert_eq!(registry.count_prefix("trade:"), 0);
        assert!(registry.try_acquire("trade:WAVES-ETH").is_some());
    }
}
