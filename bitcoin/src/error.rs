// bitcoin/src/error.rs
//! Error types for HTLC script and transaction handling

use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum BitcoinHtlcError {
    #[error("secret does not hash to the script commitment")]
    SecretMismatch,

    #[error("output value {value} below dust floor {required}")]
    DustOutput { value: u64, required: u64 },

    #[error("outpoint {txid}:{vout} already spent")]
    DoubleSpend { txid: String, vout: u32 },

    #[error("refund before maturity: locktime {locktime}, current {now}")]
    PrematureRefund { locktime: u32, now: u32 },

    #[error("invalid HTLC script: {0}")]
    InvalidScript(String),

    #[error("invalid public key")]
    InvalidPubkey,

    #[error("address encoding failed: {0}")]
    AddressEncoding(String),

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("broadcast rejected: {0}")]
    Broadcast(String),

    #[error("no UTXO at {txid}:{vout}")]
    UtxoNotFound { txid: String, vout: u32 },
}
