// bitcoin/src/lib.rs
//! Crosslock Bitcoin HTLC support
//!
//! FOCUSED RESPONSIBILITIES:
//! 1. Build and parse HTLC scripts (hashlock + CLTV refund branch)
//! 2. Derive P2SH and P2WSH addresses for HTLC scripts
//! 3. Build signed redeem and refund transactions
//! 4. Monitor the chain for funding and redemption, extract secrets
//!
//! NOT RESPONSIBLE FOR:
//! - Order bookkeeping (the ledger does this)
//! - Bridge dispatch (the gateway does this)

pub mod error;
pub mod monitor;
pub mod network;
pub mod script;
pub mod txbuild;

pub use error::BitcoinHtlcError;
pub use monitor::{ChainMonitor, FundingInfo, Redemption};
pub use network::{BitcoinNetwork, MockNetwork, UtxoInfo};
pub use script::{AddressType, HtlcScript, Network, SpendPath};
pub use txbuild::{SpentOutpoints, Transaction, Utxo};

/// Size of an HTLC secret preimage in bytes
pub const SECRET_SIZE: usize = 32;

/// Size of the SHA-256 commitment in bytes
pub const HASH_SIZE: usize = 32;

/// Hash a secret preimage to its script commitment
pub fn hash_secret(secret: &[u8; SECRET_SIZE]) -> [u8; HASH_SIZE] {
    use sha2::{Digest, Sha256};
    Sha256::digest(secret).into()
}
