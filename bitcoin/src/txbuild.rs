// bitcoin/src/txbuild.rs
//! Redeem and refund transaction construction for HTLC outputs
//!
//! Transactions here are the simplified legacy form: version, inputs
//! with scriptSig, outputs, locktime. Signing is ECDSA over the double
//! SHA-256 of the unsigned serialization, DER plus SIGHASH_ALL.

use std::collections::HashMap;

use secp256k1::{Message, PublicKey, Secp256k1, SecretKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::BitcoinHtlcError;
use crate::script::{opcodes, HtlcScript, Network, SpendPath};
use crate::{hash_secret, SECRET_SIZE};

/// Outputs below this value are unspendable in practice
pub const DUST_THRESHOLD: u64 = 546;

/// Sequence enabling replace-by-fee signalling
pub const SEQUENCE_RBF: u32 = 0xFFFF_FFFD;

/// Sequence that keeps the locktime enforceable without RBF
pub const SEQUENCE_FINAL_CLTV: u32 = 0xFFFF_FFFE;

const BASE_TX_SIZE: u64 = 10;
const INPUT_SIZE: u64 = 148;
const OUTPUT_SIZE: u64 = 34;

/// A spendable HTLC funding output
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utxo {
    pub txid: String,
    pub vout: u32,
    pub value: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxIn {
    pub prev_txid: String,
    pub prev_vout: u32,
    pub script_sig: Vec<u8>,
    pub sequence: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOut {
    pub value: u64,
    pub script_pubkey: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub version: u32,
    pub inputs: Vec<TxIn>,
    pub outputs: Vec<TxOut>,
    pub locktime: u32,
}

impl Transaction {
    pub fn serialize(&self) -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(&self.version.to_le_bytes());
        data.push(self.inputs.len() as u8);
        for input in &self.inputs {
            data.extend_from_slice(input.prev_txid.as_bytes());
            data.extend_from_slice(&input.prev_vout.to_le_bytes());
            data.extend_from_slice(&(input.script_sig.len() as u32).to_le_bytes());
            data.extend_from_slice(&input.script_sig);
            data.extend_from_slice(&input.sequence.to_le_bytes());
        }
        data.push(self.outputs.len() as u8);
        for output in &self.outputs {
            data.extend_from_slice(&output.value.to_le_bytes());
            data.extend_from_slice(&(output.script_pubkey.len() as u32).to_le_bytes());
            data.extend_from_slice(&output.script_pubkey);
        }
        data.extend_from_slice(&self.locktime.to_le_bytes());
        data
    }

    pub fn txid(&self) -> String {
        let hash = Sha256::digest(Sha256::digest(self.serialize()));
        hex::encode(hash)
    }
}

/// A built refund, carrying the RBF bookkeeping alongside the transaction
#[derive(Clone, Debug)]
pub struct RefundTransaction {
    pub tx: Transaction,
    pub rbf: bool,
    /// Txid of the refund this one replaces, if fee-bumping
    pub replaces: Option<String>,
}

/// Client-side record of outpoints already consumed by a built spend,
/// keyed to the txid that spent them. Building a second spend of the
/// same outpoint is rejected before it ever reaches the network; the
/// one exception is an RBF fee bump replacing the recorded spender.
#[derive(Clone, Debug, Default)]
pub struct SpentOutpoints {
    spent: HashMap<(String, u32), String>,
}

impl SpentOutpoints {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_spent(&self, txid: &str, vout: u32) -> bool {
        self.spent.contains_key(&(txid.to_string(), vout))
    }

    /// Txid of the recorded spender, if any
    pub fn spender(&self, txid: &str, vout: u32) -> Option<&str> {
        self.spent
            .get(&(txid.to_string(), vout))
            .map(String::as_str)
    }

    pub fn mark(&mut self, txid: &str, vout: u32, spender: &str) {
        self.spent
            .insert((txid.to_string(), vout), spender.to_string());
    }
}

/// Linear fee estimate in satoshis, monotonic in both counts
pub fn estimate_tx_fee(inputs: usize, outputs: usize, fee_rate: u64) -> u64 {
    (BASE_TX_SIZE + inputs as u64 * INPUT_SIZE + outputs as u64 * OUTPUT_SIZE) * fee_rate
}

/// Build and sign a redeem of an HTLC output, revealing the preimage.
pub fn build_htlc_redeem_tx(
    utxo: &Utxo,
    secret: &[u8; SECRET_SIZE],
    receiver_key: &SecretKey,
    redeem_address: &str,
    script: &HtlcScript,
    fee_rate: u64,
    spent: &mut SpentOutpoints,
) -> Result<Transaction, BitcoinHtlcError> {
    if hash_secret(secret) != script.secret_hash {
        return Err(BitcoinHtlcError::SecretMismatch);
    }

    let pubkey = compressed_pubkey(receiver_key);
    if !script.validate(SpendPath::Redeem, Some(secret), &pubkey, None) {
        return Err(BitcoinHtlcError::InvalidPubkey);
    }

    let fee = estimate_tx_fee(1, 1, fee_rate);
    check_dust(utxo.value, fee)?;
    check_unspent(utxo, spent)?;

    let mut tx = unsigned_spend(utxo, utxo.value - fee, redeem_address, 0, SEQUENCE_RBF)?;

    let signature = sign_tx(&tx, receiver_key);
    tx.inputs[0].script_sig = redeem_script_sig(&signature, secret, script);

    spent.mark(&utxo.txid, utxo.vout, &tx.txid());
    debug!("built redeem {} spending {}:{}", tx.txid(), utxo.txid, utxo.vout);

    Ok(tx)
}

/// Build and sign a refund of an HTLC output after locktime maturity.
/// The transaction locktime is set to the script's locktime so CLTV
/// passes; `rbf` selects the fee-bump-capable sequence.
#[allow(clippy::too_many_arguments)]
pub fn build_htlc_refund_tx(
    utxo: &Utxo,
    sender_key: &SecretKey,
    refund_address: &str,
    script: &HtlcScript,
    fee_rate: u64,
    current_time: u32,
    rbf: bool,
    replaces: Option<String>,
    spent: &mut SpentOutpoints,
) -> Result<RefundTransaction, BitcoinHtlcError> {
    let pubkey = compressed_pubkey(sender_key);
    if !script.validate(SpendPath::Refund, None, &pubkey, Some(current_time)) {
        if current_time <= script.locktime {
            return Err(BitcoinHtlcError::PrematureRefund {
                locktime: script.locktime,
                now: current_time,
            });
        }
        return Err(BitcoinHtlcError::InvalidPubkey);
    }

    let fee = estimate_tx_fee(1, 1, fee_rate);
    check_dust(utxo.value, fee)?;
    // A fee bump re-spends its own outpoint, but only its own: the
    // recorded spender must be the transaction being replaced.
    match (spent.spender(&utxo.txid, utxo.vout), &replaces) {
        (None, _) => {}
        (Some(recorded), Some(prior)) if recorded == prior => {}
        (Some(_), _) => {
            return Err(BitcoinHtlcError::DoubleSpend {
                txid: utxo.txid.clone(),
                vout: utxo.vout,
            })
        }
    }

    let sequence = if rbf { SEQUENCE_RBF } else { SEQUENCE_FINAL_CLTV };
    let mut tx = unsigned_spend(
        utxo,
        utxo.value - fee,
        refund_address,
        script.locktime,
        sequence,
    )?;

    let signature = sign_tx(&tx, sender_key);
    tx.inputs[0].script_sig = refund_script_sig(&signature, script);

    spent.mark(&utxo.txid, utxo.vout, &tx.txid());
    debug!(
        "built refund {} spending {}:{} (rbf={}, replaces={:?})",
        tx.txid(),
        utxo.txid,
        utxo.vout,
        rbf,
        replaces
    );

    Ok(RefundTransaction { tx, rbf, replaces })
}

fn check_dust(value: u64, fee: u64) -> Result<(), BitcoinHtlcError> {
    let required = DUST_THRESHOLD + fee;
    if value <= required {
        return Err(BitcoinHtlcError::DustOutput { value, required });
    }
    Ok(())
}

fn check_unspent(utxo: &Utxo, spent: &SpentOutpoints) -> Result<(), BitcoinHtlcError> {
    if spent.is_spent(&utxo.txid, utxo.vout) {
        return Err(BitcoinHtlcError::DoubleSpend {
            txid: utxo.txid.clone(),
            vout: utxo.vout,
        });
    }
    Ok(())
}

fn unsigned_spend(
    utxo: &Utxo,
    value: u64,
    dest_address: &str,
    locktime: u32,
    sequence: u32,
) -> Result<Transaction, BitcoinHtlcError> {
    Ok(Transaction {
        version: 2,
        inputs: vec![TxIn {
            prev_txid: utxo.txid.clone(),
            prev_vout: utxo.vout,
            script_sig: Vec::new(),
            sequence,
        }],
        outputs: vec![TxOut {
            value,
            script_pubkey: p2pkh_script(dest_address)?,
        }],
        locktime,
    })
}

/// `<sig> <preimage> OP_TRUE <script>`
fn redeem_script_sig(signature: &[u8], secret: &[u8; SECRET_SIZE], script: &HtlcScript) -> Vec<u8> {
    let script_bytes = script.to_bytes();
    let mut sig = Vec::new();
    sig.push(signature.len() as u8);
    sig.extend_from_slice(signature);
    sig.push(SECRET_SIZE as u8);
    sig.extend_from_slice(secret);
    sig.push(opcodes::OP_TRUE);
    sig.push(script_bytes.len() as u8);
    sig.extend_from_slice(&script_bytes);
    sig
}

/// `<sig> OP_FALSE <script>`
fn refund_script_sig(signature: &[u8], script: &HtlcScript) -> Vec<u8> {
    let script_bytes = script.to_bytes();
    let mut sig = Vec::new();
    sig.push(signature.len() as u8);
    sig.extend_from_slice(signature);
    sig.push(opcodes::OP_FALSE);
    sig.push(script_bytes.len() as u8);
    sig.extend_from_slice(&script_bytes);
    sig
}

fn sign_tx(tx: &Transaction, key: &SecretKey) -> Vec<u8> {
    let secp = Secp256k1::new();
    let hash = Sha256::digest(Sha256::digest(tx.serialize()));

    let message = Message::from_digest(hash.into());
    let sig = secp.sign_ecdsa(&message, key);
    let mut sig_bytes = sig.serialize_der().to_vec();
    sig_bytes.push(0x01); // SIGHASH_ALL
    sig_bytes
}

pub fn compressed_pubkey(key: &SecretKey) -> [u8; 33] {
    let secp = Secp256k1::new();
    PublicKey::from_secret_key(&secp, key).serialize()
}

/// Standard pay-to-pubkey-hash script from a base58check address
fn p2pkh_script(address: &str) -> Result<Vec<u8>, BitcoinHtlcError> {
    let decoded = bs58::decode(address)
        .into_vec()
        .map_err(|e| BitcoinHtlcError::InvalidAddress(e.to_string()))?;
    if decoded.len() != 25 {
        return Err(BitcoinHtlcError::InvalidAddress(format!(
            "expected 25 bytes, got {}",
            decoded.len()
        )));
    }
    let payload = &decoded[..21];
    let checksum = &Sha256::digest(Sha256::digest(payload))[..4];
    if checksum != &decoded[21..] {
        return Err(BitcoinHtlcError::InvalidAddress("bad checksum".into()));
    }

    let hash = &decoded[1..21];
    let mut script = vec![0x76, 0xa9, 0x14]; // OP_DUP OP_HASH160 <20>
    script.extend_from_slice(hash);
    script.extend_from_slice(&[0x88, 0xac]); // OP_EQUALVERIFY OP_CHECKSIG
    Ok(script)
}

/// Build a valid base58check P2PKH address from a pubkey, mostly for tests
/// and the funding flow.
pub fn p2pkh_address(pubkey: &[u8; 33], network: Network) -> String {
    use ripemd::Ripemd160;

    let version = match network {
        Network::Mainnet => 0x00,
        Network::Testnet | Network::Regtest => 0x6f,
    };
    let hash = Ripemd160::digest(Sha256::digest(pubkey));
    let mut payload = vec![version];
    payload.extend_from_slice(&hash);
    let checksum = &Sha256::digest(Sha256::digest(&payload))[..4];
    payload.extend_from_slice(checksum);
    bs58::encode(payload).into_string()
}
