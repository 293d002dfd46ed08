// ledger/src/escrow.rs
//! Escrow factory - per-chain registry of destination-side escrow contracts

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::Address;

/// Per destination-chain escrow record. Never deleted, only updated.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EscrowContract {
    pub chain_id: u64,
    pub contract_address: Address,
    pub deployed: bool,
    /// Incremented by the ledger for each order targeting this chain
    pub total_orders: u64,
}

/// Tracks escrow deployment per destination chain id
#[derive(Clone, Debug, Default)]
pub struct EscrowFactory {
    contracts: HashMap<u64, EscrowContract>,
}

impl EscrowFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or update the escrow for a chain. Idempotent per chain id:
    /// a re-deploy updates the target address and keeps the order counter.
    pub fn deploy(&mut self, chain_id: u64, contract_address: Address) -> &EscrowContract {
        let entry = self
            .contracts
            .entry(chain_id)
            .or_insert_with(|| EscrowContract {
                chain_id,
                contract_address: contract_address.clone(),
                deployed: false,
                total_orders: 0,
            });
        entry.contract_address = contract_address;
        entry.deployed = true;
        entry
    }

    pub fn is_deployed(&self, chain_id: u64) -> bool {
        self.contracts
            .get(&chain_id)
            .map(|c| c.deployed)
            .unwrap_or(false)
    }

    pub fn get(&self, chain_id: u64) -> Option<&EscrowContract> {
        self.contracts.get(&chain_id)
    }

    /// Count an order targeting this chain
    pub fn record_order(&mut self, chain_id: u64) {
        if let Some(contract) = self.contracts.get_mut(&chain_id) {
            contract.total_orders += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deploy_is_idempotent_per_chain() {
        let mut factory = EscrowFactory::new();

        factory.deploy(8453, "0xescrow_v1".to_string());
        factory.record_order(8453);

        // Re-deploy updates the address, keeps the counter
        let escrow = factory.deploy(8453, "0xescrow_v2".to_string());
        assert_eq!(escrow.contract_address, "0xescrow_v2");
        assert_eq!(escrow.total_orders, 1);
        assert!(escrow.deployed);
    }

    #[test]
    fn test_is_deployed() {
        let mut factory = EscrowFactory::new();
        assert!(!factory.is_deployed(1));

        factory.deploy(1, "0xabc".to_string());
        assert!(factory.is_deployed(1));
    }
}
