// ledger/src/relayer.rs
//! Relayer/resolver registry - whitelisting and performance stats

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::Address;

/// Per-relayer record
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RelayerData {
    pub address: Address,
    pub whitelisted: bool,
    pub total_resolves: u64,
    /// Fraction of successful resolution attempts, 0.0 - 1.0
    pub success_rate: f64,
    attempts: u64,
    successes: u64,
}

impl RelayerData {
    fn new(address: Address) -> Self {
        RelayerData {
            address,
            whitelisted: false,
            total_resolves: 0,
            success_rate: 0.0,
            attempts: 0,
            successes: 0,
        }
    }
}

/// Owner-controlled registry of relayers/resolvers
#[derive(Clone, Debug, Default)]
pub struct RelayerRegistry {
    relayers: HashMap<Address, RelayerData>,
}

impl RelayerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a relayer. Registration does not whitelist.
    pub fn register(&mut self, address: Address) {
        self.relayers
            .entry(address.clone())
            .or_insert_with(|| RelayerData::new(address));
    }

    pub fn is_registered(&self, address: &str) -> bool {
        self.relayers.contains_key(address)
    }

    /// Whitelisting is revocable: toggling off immediately revokes access.
    /// Whitelisting an unknown address registers it first.
    pub fn set_whitelist(&mut self, address: &str, status: bool) {
        self.relayers
            .entry(address.to_string())
            .or_insert_with(|| RelayerData::new(address.to_string()))
            .whitelisted = status;
    }

    pub fn is_whitelisted(&self, address: &str) -> bool {
        self.relayers
            .get(address)
            .map(|r| r.whitelisted)
            .unwrap_or(false)
    }

    /// Record a resolution attempt and refresh the success rate
    pub fn record_resolve(&mut self, address: &str, success: bool) -> bool {
        match self.relayers.get_mut(address) {
            Some(relayer) => {
                relayer.attempts += 1;
                if success {
                    relayer.successes += 1;
                    relayer.total_resolves += 1;
                }
                relayer.success_rate = relayer.successes as f64 / relayer.attempts as f64;
                true
            }
            None => false,
        }
    }

    pub fn get(&self, address: &str) -> Option<&RelayerData> {
        self.relayers.get(address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_whitelist_toggle_revokes() {
        let mut registry = RelayerRegistry::new();

        registry.set_whitelist("resolver-a", true);
        assert!(registry.is_whitelisted("resolver-a"));

        registry.set_whitelist("resolver-a", false);
        assert!(!registry.is_whitelisted("resolver-a"));
    }

    #[test]
    fn test_unknown_relayer_not_whitelisted() {
        let registry = RelayerRegistry::new();
        assert!(!registry.is_whitelisted("nobody"));
    }

    #[test]
    fn test_success_rate() {
        let mut registry = RelayerRegistry::new();
        registry.register("resolver-b".to_string());

        registry.record_resolve("resolver-b", true);
        registry.record_resolve("resolver-b", true);
        registry.record_resolve("resolver-b", false);

        let data = registry.get("resolver-b").unwrap();
        assert_eq!(data.total_resolves, 2);
        assert!((data.success_rate - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_record_resolve_unknown() {
        let mut registry = RelayerRegistry::new();
        assert!(!registry.record_resolve("ghost", true));
    }
}
