// ledger/src/error.rs
//! Ledger error taxonomy
//!
//! Every mutating operation either fully succeeds or rejects with one of
//! these codes. Nothing is silently ignored or partially applied.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    // Authorization
    #[error("caller is not the owner")]
    NotOwner,
    #[error("resolver {0} is not whitelisted")]
    NotWhitelisted(String),
    #[error("relayer {0} is not registered")]
    RelayerNotRegistered(String),

    // Validation
    #[error("amount must be greater than zero")]
    InvalidAmount,
    #[error("timelock {timelock} is not in the future (now {now})")]
    InvalidTimelock { timelock: u64, now: u64 },
    #[error("no order exists for hash {0}")]
    InvalidHash(String),
    #[error("secret does not match the order hashlock")]
    InvalidSecret,
    #[error("an order with hashlock {0} already exists")]
    DuplicateHashlock(String),
    #[error("insufficient balance: have {have}, need {need}")]
    InsufficientBalance { have: u128, need: u128 },

    // Lifecycle
    #[error("order is already finalized")]
    OrderAlreadyFinalized,
    #[error("order expired at {timelock} (now {now})")]
    OrderExpired { timelock: u64, now: u64 },
    #[error("order not yet expired: timelock {timelock} (now {now})")]
    OrderNotExpired { timelock: u64, now: u64 },
    #[error("fill of {fill} exceeds order capacity ({filled}/{amount} filled)")]
    FillExceedsOrder {
        fill: u128,
        filled: u128,
        amount: u128,
    },
    #[error("secret was already consumed for this order")]
    SecretAlreadyUsed,
    #[error("no fill registered under this secret hash")]
    UnknownFill,

    // Infrastructure
    #[error("no escrow contract deployed for chain {0}")]
    EscrowNotDeployed(u64),

    // Codec
    #[error("malformed message: {0}")]
    MalformedMessage(String),
    #[error("unknown opcode {0:#010x}")]
    UnknownOpcode(u32),
}
