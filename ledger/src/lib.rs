// ledger/src/lib.rs
//! Crosslock Ledger - the order/HTLC lifecycle engine
//!
//! FOCUSED RESPONSIBILITIES:
//! 1. Hold all orders and their partial-fill records
//! 2. Validate and apply order creation / fill / redeem / refund messages
//! 3. Gate cross-chain orders on escrow deployment (escrow factory)
//! 4. Manage the relayer/resolver whitelist
//! 5. Emit events for the relay gateway to translate
//!
//! NOT RESPONSIBLE FOR:
//! - Talking to EVM bridges or oracles (gateway does this)
//! - Bitcoin script or transaction construction (bitcoin crate does this)
//! - Any network I/O - the ledger is a pure (state, message) -> (state', events)
//!   machine; the surrounding message substrate delivers one message at a time

pub mod error;
pub mod escrow;
pub mod events;
pub mod hashlock;
pub mod ledger;
pub mod messages;
pub mod order;
pub mod relayer;

pub use error::LedgerError;
pub use escrow::EscrowContract;
pub use events::Event;
pub use hashlock::{HashLock, Secret};
pub use ledger::{Ledger, LedgerStats};
pub use messages::{Message, OrderConfig};
pub use order::{Direction, Order};
pub use relayer::RelayerData;

/// Chain address, opaque to the ledger
pub type Address = String;

/// Reference to the locked asset/jetton
pub type AssetRef = String;
