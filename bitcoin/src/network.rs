// bitcoin/src/network.rs
//! Network boundary for chain access, with an in-memory implementation
//! used by tests and local development.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::BitcoinHtlcError;
use crate::txbuild::{Transaction, Utxo};

/// What the chain knows about one output
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UtxoInfo {
    pub value: u64,
    pub address: String,
    pub spent: bool,
}

/// Minimal chain access needed by the HTLC monitor
#[async_trait]
pub trait BitcoinNetwork: Send + Sync {
    /// Send `amount` to `address`, returning the created funding output
    async fn fund_address(&self, address: &str, amount: u64) -> Result<Utxo, BitcoinHtlcError>;

    /// Submit a transaction, returning its txid
    async fn broadcast(&self, tx: &Transaction) -> Result<String, BitcoinHtlcError>;

    /// Look up an output
    async fn get_utxo(&self, txid: &str, vout: u32) -> Result<Option<UtxoInfo>, BitcoinHtlcError>;

    /// All transactions spending outputs held by `address`
    async fn spends_of(&self, address: &str) -> Result<Vec<Transaction>, BitcoinHtlcError>;

    /// Confirmation count for a txid, 0 while unconfirmed
    async fn confirmations(&self, txid: &str) -> Result<u32, BitcoinHtlcError>;
}

#[derive(Default)]
struct MockState {
    /// (txid, vout) -> (info, address the output pays)
    utxos: HashMap<(String, u32), UtxoInfo>,
    /// Broadcast order preserved; conflicts resolve in this order
    mempool: Vec<Transaction>,
    confirmed: HashMap<String, u32>,
    confirmed_txs: HashMap<String, Transaction>,
    /// Outpoint -> txid of the confirmed spender
    spent_by: HashMap<(String, u32), String>,
    funding_counter: u64,
}

/// In-memory chain: a mempool, explicit confirmation ticks, and
/// first-broadcast-wins conflict resolution. Of two transactions spending
/// the same outpoint, exactly one ever confirms.
#[derive(Default)]
pub struct MockNetwork {
    state: Mutex<MockState>,
}

impl MockNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Confirm every mempool transaction whose inputs are still unspent,
    /// in broadcast order, with `confirmations` each. Conflicting
    /// transactions lose and are dropped.
    pub fn confirm_pending(&self, confirmations: u32) {
        let mut state = self.state.lock().unwrap();
        let mempool = std::mem::take(&mut state.mempool);

        for tx in mempool {
            let txid = tx.txid();
            let conflict = tx
                .inputs
                .iter()
                .any(|i| state.spent_by.contains_key(&(i.prev_txid.clone(), i.prev_vout)));

            if conflict {
                warn!("dropping conflicting tx {}", txid);
                continue;
            }

            for input in &tx.inputs {
                let outpoint = (input.prev_txid.clone(), input.prev_vout);
                state.spent_by.insert(outpoint.clone(), txid.clone());
                if let Some(info) = state.utxos.get_mut(&outpoint) {
                    info.spent = true;
                }
            }
            for (vout, output) in tx.outputs.iter().enumerate() {
                state.utxos.insert(
                    (txid.clone(), vout as u32),
                    UtxoInfo {
                        value: output.value,
                        address: hex::encode(&output.script_pubkey),
                        spent: false,
                    },
                );
            }
            state.confirmed.insert(txid.clone(), confirmations);
            state.confirmed_txs.insert(txid.clone(), tx);
            debug!("confirmed {}", txid);
        }
    }

    /// Raise the confirmation count of an already-confirmed transaction
    pub fn add_confirmations(&self, txid: &str, extra: u32) {
        let mut state = self.state.lock().unwrap();
        if let Some(count) = state.confirmed.get_mut(txid) {
            *count += extra;
        }
    }
}

#[async_trait]
impl BitcoinNetwork for MockNetwork {
    async fn fund_address(&self, address: &str, amount: u64) -> Result<Utxo, BitcoinHtlcError> {
        let mut state = self.state.lock().unwrap();
        state.funding_counter += 1;
        let txid = format!("{:064x}", state.funding_counter);

        state.utxos.insert(
            (txid.clone(), 0),
            UtxoInfo {
                value: amount,
                address: address.to_string(),
                spent: false,
            },
        );
        state.confirmed.insert(txid.clone(), 1);

        Ok(Utxo {
            txid,
            vout: 0,
            value: amount,
        })
    }

    async fn broadcast(&self, tx: &Transaction) -> Result<String, BitcoinHtlcError> {
        let mut state = self.state.lock().unwrap();
        let txid = tx.txid();

        for input in &tx.inputs {
            let outpoint = (input.prev_txid.clone(), input.prev_vout);
            if !state.utxos.contains_key(&outpoint) {
                return Err(BitcoinHtlcError::UtxoNotFound {
                    txid: input.prev_txid.clone(),
                    vout: input.prev_vout,
                });
            }
            if state.spent_by.contains_key(&outpoint) {
                return Err(BitcoinHtlcError::Broadcast(format!(
                    "outpoint {}:{} already spent",
                    input.prev_txid, input.prev_vout
                )));
            }
        }

        state.mempool.push(tx.clone());
        debug!("accepted {} into mempool", txid);
        Ok(txid)
    }

    async fn get_utxo(&self, txid: &str, vout: u32) -> Result<Option<UtxoInfo>, BitcoinHtlcError> {
        let state = self.state.lock().unwrap();
        Ok(state.utxos.get(&(txid.to_string(), vout)).cloned())
    }

    async fn spends_of(&self, address: &str) -> Result<Vec<Transaction>, BitcoinHtlcError> {
        let state = self.state.lock().unwrap();

        let held: Vec<(String, u32)> = state
            .utxos
            .iter()
            .filter(|(_, info)| info.address == address)
            .map(|(outpoint, _)| outpoint.clone())
            .collect();

        // Confirmed spends only: mempool conflicts are not yet settled
        let spenders: Vec<String> = held
            .iter()
            .filter_map(|outpoint| state.spent_by.get(outpoint).cloned())
            .collect();

        let mut result = Vec::new();
        for txid in spenders {
            // The mempool was drained on confirm; keep a searchable copy
            if let Some(tx) = state.confirmed_txs.get(&txid) {
                result.push(tx.clone());
            }
        }
        Ok(result)
    }

    async fn confirmations(&self, txid: &str) -> Result<u32, BitcoinHtlcError> {
        let state = self.state.lock().unwrap();
        Ok(state.confirmed.get(txid).copied().unwrap_or(0))
    }
}
