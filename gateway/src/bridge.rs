// gateway/src/bridge.rs
//! Outbound EVM dispatch - bridge registry, transaction lifecycle, retries
//!
//! FOCUSED RESPONSIBILITIES:
//! 1. Validate and dispatch outbound bridge transactions
//! 2. Track confirmations until the finality threshold
//! 3. Retry failed dispatches with bounded exponential backoff
//! 4. Ingest oracle price updates and flag stale feeds
//!
//! NOT RESPONSIBLE FOR:
//! - Order/HTLC state transitions (the ledger does this)
//! - Signing or submitting raw chain transactions

use std::collections::HashMap;

use crosslock_ledger::Event;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::{BridgeConfig, OracleConfig, RetryConfig};

/// Function selector for the escrow fill call on the destination bridge
pub const SELECTOR_FILL_ORDER: u32 = 0x8f1a_2c40;

const DEFAULT_GAS_LIMIT: u64 = 250_000;

#[derive(Debug, Error, PartialEq)]
pub enum GatewayError {
    #[error("no bridge registered for chain {0}")]
    UnknownBridge(u64),
    #[error("bridge for chain {0} is inactive")]
    BridgeInactive(u64),
    #[error("amount {amount} outside bridge bounds [{min}, {max}]")]
    AmountOutOfBounds { amount: u128, min: u128, max: u128 },
    #[error("no transaction with nonce {0}")]
    UnknownTransaction(u64),
    #[error("bridge {reported} reported on nonce {nonce}, which targets chain {expected}")]
    BridgeMismatch {
        nonce: u64,
        expected: u64,
        reported: u64,
    },
    #[error("transaction {0} is not in a failed state")]
    NotFailed(u64),
    #[error("transaction {nonce} exhausted {max} retries")]
    RetriesExhausted { nonce: u64, max: u32 },
    #[error("no oracle registered with id {0}")]
    UnknownOracle(u64),
    #[error("oracle {0} is inactive")]
    OracleInactive(u64),
    #[error("bridge delivery timed out for nonce {0}")]
    Timeout(u64),
    #[error("transient delivery failure: {0}")]
    Delivery(String),
}

impl GatewayError {
    /// Transient failures are worth retrying; validation failures are not.
    pub fn is_retryable(&self) -> bool {
        matches!(self, GatewayError::Timeout(_) | GatewayError::Delivery(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxStatus {
    Pending,
    Confirmed,
    Failed,
}

impl TxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TxStatus::Pending => "pending",
            TxStatus::Confirmed => "confirmed",
            TxStatus::Failed => "failed",
        }
    }
}

/// One outbound bridge transaction. Records are append-only: a retry
/// allocates a fresh record and leaves the failed one terminal.
#[derive(Debug, Clone)]
pub struct EvmTransaction {
    pub nonce: u64,
    pub target_chain_id: u64,
    pub selector: u32,
    pub params: Vec<u8>,
    pub gas_limit: u64,
    pub gas_price: u64,
    pub value: u128,
    pub status: TxStatus,
    pub confirmations: u32,
    pub tx_hash: Option<String>,
    /// Nonce of the failed transaction this one replaces
    pub replaces_nonce: Option<u64>,
    /// Nonce of the replacement, once this transaction has been retried
    pub replaced_by: Option<u64>,
    /// 0 for the original dispatch, incremented per retry
    pub attempt: u32,
    pub created_at: i64,
}

/// Oracle runtime state, seeded from config
#[derive(Debug, Clone)]
pub struct EvmOracle {
    pub oracle_id: u64,
    pub token: String,
    pub decimals: u8,
    pub heartbeat_interval: u64,
    pub active: bool,
    pub last_price: Option<u128>,
    pub last_update: Option<u64>,
}

/// Outcome of an oracle update. Stale feeds are flagged, not dropped:
/// the consumer decides whether a stale price is still usable.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceUpdate {
    pub oracle_id: u64,
    pub token: String,
    pub price: u128,
    pub timestamp: u64,
    pub stale: bool,
}

pub struct Dispatcher {
    bridges: HashMap<u64, BridgeConfig>,
    oracles: HashMap<u64, EvmOracle>,
    transactions: HashMap<u64, EvmTransaction>,
    next_nonce: u64,
    retry: RetryConfig,
    confirmation_threshold: u32,
}

impl Dispatcher {
    pub fn new(
        bridges: Vec<BridgeConfig>,
        oracles: Vec<OracleConfig>,
        retry: RetryConfig,
        confirmation_threshold: u32,
    ) -> Self {
        let bridges = bridges.into_iter().map(|b| (b.bridge_id, b)).collect();
        let oracles = oracles
            .into_iter()
            .map(|o| {
                (
                    o.oracle_id,
                    EvmOracle {
                        oracle_id: o.oracle_id,
                        token: o.token,
                        decimals: o.decimals,
                        heartbeat_interval: o.heartbeat_interval,
                        active: o.active,
                        last_price: None,
                        last_update: None,
                    },
                )
            })
            .collect();

        Dispatcher {
            bridges,
            oracles,
            transactions: HashMap::new(),
            next_nonce: 0,
            retry,
            confirmation_threshold,
        }
    }

    /// Translate a ledger event into a bridge dispatch. Only order
    /// creation with a cross-chain destination produces outbound traffic;
    /// everything else is a no-op here.
    pub fn dispatch_event(
        &mut self,
        event: &Event,
        gas_price: u64,
        now: i64,
    ) -> Result<Option<u64>, GatewayError> {
        match event {
            Event::OrderCreated {
                order_id,
                amount,
                dest_chain_id: Some(chain_id),
                ..
            } => self
                .dispatch(*order_id, *amount, *chain_id, gas_price, now)
                .map(Some),
            _ => Ok(None),
        }
    }

    /// Dispatch an order fill to the bridge serving `target_chain_id`.
    /// Returns the allocated nonce. Nonces are monotonically increasing
    /// and never reused, so dispatch is idempotent per nonce.
    pub fn dispatch(
        &mut self,
        order_id: u64,
        amount: u128,
        target_chain_id: u64,
        gas_price: u64,
        now: i64,
    ) -> Result<u64, GatewayError> {
        let bridge = self
            .bridges
            .get(&target_chain_id)
            .ok_or(GatewayError::UnknownBridge(target_chain_id))?;
        if !bridge.active {
            return Err(GatewayError::BridgeInactive(target_chain_id));
        }
        let min = bridge.min_transfer as u128;
        let max = bridge.max_transfer as u128;
        if amount < min || amount > max {
            return Err(GatewayError::AmountOutOfBounds { amount, min, max });
        }
        let fee = bridge.fee as u128;

        let mut params = Vec::with_capacity(24);
        params.extend_from_slice(&order_id.to_be_bytes());
        params.extend_from_slice(&amount.to_be_bytes());

        let nonce = self.allocate_nonce();
        let tx = EvmTransaction {
            nonce,
            target_chain_id,
            selector: SELECTOR_FILL_ORDER,
            params,
            gas_limit: DEFAULT_GAS_LIMIT,
            gas_price,
            value: fee,
            status: TxStatus::Pending,
            confirmations: 0,
            tx_hash: None,
            replaces_nonce: None,
            replaced_by: None,
            attempt: 0,
            created_at: now,
        };
        self.transactions.insert(nonce, tx);

        info!(
            "dispatched order {} to chain {} (nonce {}, amount {})",
            order_id, target_chain_id, nonce, amount
        );

        Ok(nonce)
    }

    fn allocate_nonce(&mut self) -> u64 {
        let nonce = self.next_nonce;
        self.next_nonce += 1;
        nonce
    }

    /// Record a confirmation report from the bridge. The transaction
    /// becomes `Confirmed` once the threshold is reached; below it the
    /// count is updated and the status stays `Pending`. The reporting
    /// bridge must be the one the transaction targets.
    pub fn on_bridge_confirmation(
        &mut self,
        bridge_id: u64,
        nonce: u64,
        tx_hash: String,
        block_number: u64,
        confirmations: u32,
    ) -> Result<TxStatus, GatewayError> {
        let threshold = self.confirmation_threshold;
        let tx = self
            .transactions
            .get_mut(&nonce)
            .ok_or(GatewayError::UnknownTransaction(nonce))?;
        if tx.target_chain_id != bridge_id {
            return Err(GatewayError::BridgeMismatch {
                nonce,
                expected: tx.target_chain_id,
                reported: bridge_id,
            });
        }

        tx.confirmations = confirmations;
        tx.tx_hash = Some(tx_hash);
        if confirmations >= threshold {
            tx.status = TxStatus::Confirmed;
            info!(
                "nonce {} confirmed at block {} ({} confirmations)",
                nonce, block_number, confirmations
            );
        } else {
            debug!(
                "nonce {} at {}/{} confirmations (block {})",
                nonce, confirmations, threshold, block_number
            );
        }

        Ok(tx.status)
    }

    /// Mark a dispatched transaction failed after a bridge timeout.
    pub fn on_bridge_timeout(&mut self, bridge_id: u64, nonce: u64) -> Result<(), GatewayError> {
        let tx = self
            .transactions
            .get_mut(&nonce)
            .ok_or(GatewayError::UnknownTransaction(nonce))?;
        if tx.target_chain_id != bridge_id {
            return Err(GatewayError::BridgeMismatch {
                nonce,
                expected: tx.target_chain_id,
                reported: bridge_id,
            });
        }

        tx.status = TxStatus::Failed;
        warn!("nonce {} failed: bridge timeout", nonce);
        Ok(())
    }

    /// Retry a failed transaction with a new gas price. Allocates a fresh
    /// nonce; the failed record stays terminal. Bounded by `max_retries`.
    /// Returns the new nonce and the backoff delay in seconds before the
    /// replacement should be submitted.
    pub fn retry_transaction(
        &mut self,
        nonce: u64,
        new_gas_price: u64,
        now: i64,
    ) -> Result<(u64, u64), GatewayError> {
        let old = self
            .transactions
            .get(&nonce)
            .ok_or(GatewayError::UnknownTransaction(nonce))?;

        if old.status != TxStatus::Failed {
            return Err(GatewayError::NotFailed(nonce));
        }
        let attempt = old.attempt + 1;
        if attempt > self.retry.max_retries {
            return Err(GatewayError::RetriesExhausted {
                nonce,
                max: self.retry.max_retries,
            });
        }

        let mut replacement = old.clone();
        let delay = self.backoff_delay(attempt);
        let new_nonce = self.allocate_nonce();
        replacement.nonce = new_nonce;
        replacement.gas_price = new_gas_price;
        replacement.status = TxStatus::Pending;
        replacement.confirmations = 0;
        replacement.tx_hash = None;
        replacement.replaces_nonce = Some(nonce);
        replacement.replaced_by = None;
        replacement.attempt = attempt;
        replacement.created_at = now;
        self.transactions.insert(new_nonce, replacement);
        if let Some(old) = self.transactions.get_mut(&nonce) {
            old.replaced_by = Some(new_nonce);
        }

        info!(
            "retrying nonce {} as {} (attempt {}, backoff {}s)",
            nonce, new_nonce, attempt, delay
        );

        Ok((new_nonce, delay))
    }

    /// Exponential backoff for the given attempt, capped at the ceiling.
    pub fn backoff_delay(&self, attempt: u32) -> u64 {
        let shift = attempt.saturating_sub(1).min(32);
        self.retry
            .initial_backoff
            .saturating_mul(1u64 << shift)
            .min(self.retry.max_backoff)
    }

    /// Ingest an oracle price update. Inactive oracles are rejected.
    /// A stale update (older than the heartbeat) is stored and flagged.
    pub fn on_oracle_price_update(
        &mut self,
        oracle_id: u64,
        price: u128,
        timestamp: u64,
        now: u64,
    ) -> Result<PriceUpdate, GatewayError> {
        let oracle = self
            .oracles
            .get_mut(&oracle_id)
            .ok_or(GatewayError::UnknownOracle(oracle_id))?;
        if !oracle.active {
            return Err(GatewayError::OracleInactive(oracle_id));
        }

        let stale = now.saturating_sub(timestamp) > oracle.heartbeat_interval;
        oracle.last_price = Some(price);
        oracle.last_update = Some(timestamp);

        if stale {
            warn!(
                "oracle {} ({}) update is stale: ts={} now={}",
                oracle_id, oracle.token, timestamp, now
            );
        }

        Ok(PriceUpdate {
            oracle_id,
            token: oracle.token.clone(),
            price,
            timestamp,
            stale,
        })
    }

    pub fn transaction(&self, nonce: u64) -> Option<&EvmTransaction> {
        self.transactions.get(&nonce)
    }

    pub fn oracle(&self, oracle_id: u64) -> Option<&EvmOracle> {
        self.oracles.get(&oracle_id)
    }

    /// Failed transactions eligible for the retry sweep. A failed record
    /// already superseded by a retry is terminal and excluded.
    pub fn failed_transactions(&self) -> Vec<&EvmTransaction> {
        let mut failed: Vec<&EvmTransaction> = self
            .transactions
            .values()
            .filter(|tx| tx.status == TxStatus::Failed && tx.replaced_by.is_none())
            .collect();
        failed.sort_by_key(|tx| tx.nonce);
        failed
    }

    pub fn counts(&self) -> (u64, u64, u64) {
        let mut pending = 0;
        let mut confirmed = 0;
        let mut failed = 0;
        for tx in self.transactions.values() {
            match tx.status {
                TxStatus::Pending => pending += 1,
                TxStatus::Confirmed => confirmed += 1,
                TxStatus::Failed => failed += 1,
            }
        }
        (pending, confirmed, failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BridgeConfig;

    fn dispatcher() -> Dispatcher {
        let bridge = BridgeConfig {
            bridge_id: 8453,
            endpoint: "https://bridge.base.example".to_string(),
            fee: 1,
            min_transfer: 10,
            max_transfer: 1_000,
            active: true,
        };
        let oracle = OracleConfig {
            oracle_id: 1,
            token: "USDT".to_string(),
            decimals: 8,
            heartbeat_interval: 60,
            active: true,
        };
        Dispatcher::new(
            vec![bridge],
            vec![oracle],
            RetryConfig {
                max_retries: 3,
                initial_backoff: 2,
                max_backoff: 10,
            },
            3,
        )
    }

    #[test]
    fn test_dispatch_event_routes_cross_chain_orders() {
        use crosslock_ledger::{Direction, HashLock, Secret};

        let mut d = dispatcher();
        let event = Event::OrderCreated {
            order_id: 7,
            direction: Direction::TonToEvm,
            hashlock: HashLock::of(&Secret::generate()),
            sender: "EQalice".to_string(),
            receiver: "0xbob".to_string(),
            amount: 500,
            timelock: 1_700_000_000,
            dest_chain_id: Some(8453),
        };

        let nonce = d.dispatch_event(&event, 50, 0).unwrap();
        assert_eq!(nonce, Some(0));

        // Same-chain orders produce no bridge traffic
        let local = Event::OrderCreated {
            order_id: 8,
            direction: Direction::TonToTon,
            hashlock: HashLock::of(&Secret::generate()),
            sender: "EQalice".to_string(),
            receiver: "EQbob".to_string(),
            amount: 500,
            timelock: 1_700_000_000,
            dest_chain_id: None,
        };
        assert_eq!(d.dispatch_event(&local, 50, 0).unwrap(), None);

        // Non-order events are ignored
        let deposit = Event::Deposited {
            account: "EQalice".to_string(),
            amount: 1,
        };
        assert_eq!(d.dispatch_event(&deposit, 50, 0).unwrap(), None);
    }

    #[test]
    fn test_dispatch_allocates_monotonic_nonces() {
        let mut d = dispatcher();
        let n0 = d.dispatch(1, 100, 8453, 50, 0).unwrap();
        let n1 = d.dispatch(2, 100, 8453, 50, 0).unwrap();
        assert_eq!((n0, n1), (0, 1));
        assert_eq!(d.transaction(n0).unwrap().status, TxStatus::Pending);
    }

    #[test]
    fn test_dispatch_validation() {
        let mut d = dispatcher();
        assert_eq!(
            d.dispatch(1, 100, 999, 50, 0),
            Err(GatewayError::UnknownBridge(999))
        );
        assert_eq!(
            d.dispatch(1, 5, 8453, 50, 0),
            Err(GatewayError::AmountOutOfBounds {
                amount: 5,
                min: 10,
                max: 1_000
            })
        );
        assert_eq!(
            d.dispatch(1, 2_000, 8453, 50, 0),
            Err(GatewayError::AmountOutOfBounds {
                amount: 2_000,
                min: 10,
                max: 1_000
            })
        );
    }

    #[test]
    fn test_confirmation_threshold() {
        let mut d = dispatcher();
        let nonce = d.dispatch(1, 100, 8453, 50, 0).unwrap();

        let status = d
            .on_bridge_confirmation(8453, nonce, "0xaa".to_string(), 100, 2)
            .unwrap();
        assert_eq!(status, TxStatus::Pending);
        assert_eq!(d.transaction(nonce).unwrap().confirmations, 2);

        let status = d
            .on_bridge_confirmation(8453, nonce, "0xaa".to_string(), 101, 3)
            .unwrap();
        assert_eq!(status, TxStatus::Confirmed);
    }

    #[test]
    fn test_reports_from_wrong_bridge_rejected() {
        let mut d = dispatcher();
        let nonce = d.dispatch(1, 100, 8453, 50, 0).unwrap();

        assert_eq!(
            d.on_bridge_confirmation(1, nonce, "0xaa".to_string(), 100, 3),
            Err(GatewayError::BridgeMismatch {
                nonce,
                expected: 8453,
                reported: 1
            })
        );
        assert_eq!(
            d.on_bridge_timeout(1, nonce),
            Err(GatewayError::BridgeMismatch {
                nonce,
                expected: 8453,
                reported: 1
            })
        );
        // Untouched by the rejected reports
        let tx = d.transaction(nonce).unwrap();
        assert_eq!(tx.status, TxStatus::Pending);
        assert_eq!(tx.confirmations, 0);
    }

    #[test]
    fn test_retry_only_from_failed() {
        let mut d = dispatcher();
        let nonce = d.dispatch(1, 100, 8453, 50, 0).unwrap();

        assert_eq!(
            d.retry_transaction(nonce, 60, 0),
            Err(GatewayError::NotFailed(nonce))
        );

        d.on_bridge_timeout(8453, nonce).unwrap();
        let (new_nonce, delay) = d.retry_transaction(nonce, 60, 0).unwrap();
        assert_ne!(new_nonce, nonce);
        assert_eq!(delay, 2);

        // Original stays terminal
        assert_eq!(d.transaction(nonce).unwrap().status, TxStatus::Failed);
        let replacement = d.transaction(new_nonce).unwrap();
        assert_eq!(replacement.replaces_nonce, Some(nonce));
        assert_eq!(replacement.gas_price, 60);
        assert_eq!(replacement.attempt, 1);
    }

    #[test]
    fn test_retries_bounded_with_exponential_backoff() {
        let mut d = dispatcher();
        let mut nonce = d.dispatch(1, 100, 8453, 50, 0).unwrap();

        let mut delays = Vec::new();
        for _ in 0..3 {
            d.on_bridge_timeout(8453, nonce).unwrap();
            let (next, delay) = d.retry_transaction(nonce, 60, 0).unwrap();
            delays.push(delay);
            nonce = next;
        }
        // 2, 4, 8 - doubling, capped at 10 thereafter
        assert_eq!(delays, vec![2, 4, 8]);

        d.on_bridge_timeout(8453, nonce).unwrap();
        assert_eq!(
            d.retry_transaction(nonce, 60, 0),
            Err(GatewayError::RetriesExhausted { nonce, max: 3 })
        );
    }

    #[test]
    fn test_backoff_caps_at_ceiling() {
        let d = dispatcher();
        assert_eq!(d.backoff_delay(1), 2);
        assert_eq!(d.backoff_delay(4), 10);
        assert_eq!(d.backoff_delay(30), 10);
    }

    #[test]
    fn test_oracle_staleness_flagged_not_dropped() {
        let mut d = dispatcher();

        let update = d.on_oracle_price_update(1, 100_000_000, 1_000, 1_030).unwrap();
        assert!(!update.stale);

        let update = d.on_oracle_price_update(1, 99_000_000, 1_000, 1_100).unwrap();
        assert!(update.stale);
        // Stored despite staleness
        assert_eq!(d.oracle(1).unwrap().last_price, Some(99_000_000));
    }

    #[test]
    fn test_oracle_rejections() {
        let mut d = dispatcher();
        assert_eq!(
            d.on_oracle_price_update(9, 1, 0, 0),
            Err(GatewayError::UnknownOracle(9))
        );
    }

    #[test]
    fn test_error_classification() {
        assert!(GatewayError::Timeout(1).is_retryable());
        assert!(GatewayError::Delivery("reset".into()).is_retryable());
        assert!(!GatewayError::UnknownBridge(1).is_retryable());
        assert!(!GatewayError::BridgeInactive(1).is_retryable());
        assert!(!GatewayError::AmountOutOfBounds {
            amount: 1,
            min: 2,
            max: 3
        }
        .is_retryable());
    }
}
