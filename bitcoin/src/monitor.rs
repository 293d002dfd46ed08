// bitcoin/src/monitor.rs
//! HTLC chain monitoring: funding, redemption detection, secret recovery
//!
//! The counterparty's redeem reveals the preimage on-chain; extracting it
//! from the spending scriptSig is what lets the other leg of a swap
//! complete.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::error::BitcoinHtlcError;
use crate::network::{BitcoinNetwork, UtxoInfo};
use crate::txbuild::Utxo;
use crate::{HASH_SIZE, SECRET_SIZE};

/// A confirmed HTLC funding output
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundingInfo {
    pub txid: String,
    pub vout: u32,
    pub value: u64,
    pub confirmations: u32,
}

/// Result of scanning for a redemption
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Redemption {
    pub detected: bool,
    pub txid: Option<String>,
    pub secret: Option<[u8; SECRET_SIZE]>,
}

pub struct ChainMonitor<N: BitcoinNetwork> {
    network: N,
}

impl<N: BitcoinNetwork> ChainMonitor<N> {
    pub fn new(network: N) -> Self {
        ChainMonitor { network }
    }

    pub fn network(&self) -> &N {
        &self.network
    }

    /// Fund an HTLC address and report the resulting output
    pub async fn fund_htlc_address(
        &self,
        address: &str,
        amount: u64,
    ) -> Result<FundingInfo, BitcoinHtlcError> {
        let utxo = self.network.fund_address(address, amount).await?;
        let confirmations = self.network.confirmations(&utxo.txid).await?;

        info!(
            "funded {} with {} sat ({}:{})",
            address, amount, utxo.txid, utxo.vout
        );

        Ok(FundingInfo {
            txid: utxo.txid,
            vout: utxo.vout,
            value: utxo.value,
            confirmations,
        })
    }

    /// Scan confirmed spends of the HTLC address for a redeem revealing
    /// the preimage of `secret_hash`.
    pub async fn monitor_htlc_redemption(
        &self,
        address: &str,
        secret_hash: &[u8; HASH_SIZE],
    ) -> Result<Redemption, BitcoinHtlcError> {
        let spends = self.network.spends_of(address).await?;

        for tx in spends {
            for input in &tx.inputs {
                if let Some(secret) = extract_secret_from_script_sig(&input.script_sig, secret_hash)
                {
                    let txid = tx.txid();
                    debug!("redeem {} revealed the preimage", txid);
                    return Ok(Redemption {
                        detected: true,
                        txid: Some(txid),
                        secret: Some(secret),
                    });
                }
            }
        }

        Ok(Redemption::default())
    }

    pub async fn get_utxo_info(
        &self,
        txid: &str,
        vout: u32,
    ) -> Result<UtxoInfo, BitcoinHtlcError> {
        self.network
            .get_utxo(txid, vout)
            .await?
            .ok_or_else(|| BitcoinHtlcError::UtxoNotFound {
                txid: txid.to_string(),
                vout,
            })
    }

    /// Broadcast helper that forwards to the network
    pub async fn broadcast(
        &self,
        tx: &crate::txbuild::Transaction,
    ) -> Result<String, BitcoinHtlcError> {
        self.network.broadcast(tx).await
    }

    /// Convenience: the funding output as a spendable `Utxo`
    pub async fn funding_utxo(&self, funding: &FundingInfo) -> Result<Utxo, BitcoinHtlcError> {
        let info = self.get_utxo_info(&funding.txid, funding.vout).await?;
        Ok(Utxo {
            txid: funding.txid.clone(),
            vout: funding.vout,
            value: info.value,
        })
    }
}

/// Walk the pushed data of a scriptSig looking for a 32-byte push that
/// hashes to the commitment. Refund spends carry no such push.
pub fn extract_secret_from_script_sig(
    script_sig: &[u8],
    secret_hash: &[u8; HASH_SIZE],
) -> Option<[u8; SECRET_SIZE]> {
    let mut i = 0;
    while i < script_sig.len() {
        let opcode = script_sig[i];
        i += 1;

        // Direct pushes only; anything else is a plain opcode
        if (1..=75).contains(&opcode) {
            let len = opcode as usize;
            if i + len > script_sig.len() {
                return None;
            }
            let data = &script_sig[i..i + len];
            i += len;

            if len == SECRET_SIZE {
                let hash: [u8; HASH_SIZE] = Sha256::digest(data).into();
                if &hash == secret_hash {
                    let mut secret = [0u8; SECRET_SIZE];
                    secret.copy_from_slice(data);
                    return Some(secret);
                }
            }
        }
    }
    None
}
