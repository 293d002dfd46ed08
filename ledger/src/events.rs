// ledger/src/events.rs
//! Events emitted by the ledger after each fully-applied mutation.
//! The relay gateway translates these into outbound bridge messages.

use serde::{Deserialize, Serialize};

use crate::hashlock::HashLock;
use crate::order::Direction;
use crate::Address;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Event {
    OrderCreated {
        order_id: u64,
        direction: Direction,
        hashlock: HashLock,
        sender: Address,
        receiver: Address,
        amount: u128,
        timelock: u64,
        dest_chain_id: Option<u64>,
    },
    PartialFilled {
        order_id: u64,
        fill_hash: HashLock,
        amount: u128,
        resolver: Address,
        total_filled: u128,
    },
    FillCompleted {
        order_id: u64,
        fill_hash: HashLock,
        amount: u128,
        receiver: Address,
    },
    FundsReleased {
        order_id: u64,
        amount: u128,
        receiver: Address,
    },
    OrderRefunded {
        order_id: u64,
        amount: u128,
        sender: Address,
    },
    WhitelistUpdated {
        resolver: Address,
        whitelisted: bool,
    },
    RelayerRegistered {
        relayer: Address,
    },
    RelayerStatsUpdated {
        relayer: Address,
        success: bool,
    },
    EscrowDeployed {
        chain_id: u64,
        contract_address: Address,
    },
    Deposited {
        account: Address,
        amount: u128,
    },
}
