// ledger/src/order.rs
//! Order model - a single atomic-swap intent and its fill accounting

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::hashlock::HashLock;
use crate::{Address, AssetRef};

/// Swap direction across the supported chain families
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    TonToEvm,
    EvmToTon,
    TonToTon,
}

impl Direction {
    /// Cross-chain directions require a deployed destination escrow
    pub fn is_cross_chain(&self) -> bool {
        !matches!(self, Direction::TonToTon)
    }

    /// Directions where only whitelisted resolvers may create orders
    pub fn resolver_gated(&self) -> bool {
        matches!(self, Direction::EvmToTon)
    }
}

/// A single atomic-swap order held by the ledger
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Order {
    pub id: u64,
    pub direction: Direction,
    pub source_asset: AssetRef,
    pub sender: Address,
    pub receiver: Address,
    pub hashlock: HashLock,
    /// Absolute expiry timestamp
    pub timelock: u64,
    /// Total lockable quantity
    pub amount: u128,
    /// Terminal flag: true once fully redeemed or refunded
    pub finalized: bool,
    /// fill-secret-hash -> reserved amount; insertion order irrelevant
    pub partial_fills: HashMap<HashLock, u128>,
    /// Running sum of partial fills, never exceeds `amount`
    pub total_filled: u128,
    /// Amount already paid out (completed fills and full redemption)
    pub released: u128,
}

impl Order {
    /// Capacity still available for partial fills
    pub fn remaining_capacity(&self) -> u128 {
        self.amount - self.total_filled
    }

    /// Locked amount not yet paid out to anyone
    pub fn unreleased(&self) -> u128 {
        self.amount - self.released
    }

    pub fn is_expired(&self, now: u64) -> bool {
        now > self.timelock
    }
}
