// ledger/src/ledger.rs
//! The order/HTLC ledger state machine.
//!
//! Single-writer model: the surrounding message substrate delivers one
//! message at a time, so every operation here validates fully against the
//! current state and only then applies its writes. A returned error means
//! the state is untouched.

use std::collections::{HashMap, HashSet};

use tracing::{debug, info, warn};

use crate::error::LedgerError;
use crate::escrow::{EscrowContract, EscrowFactory};
use crate::events::Event;
use crate::hashlock::{HashLock, Secret};
use crate::messages::{Message, OrderConfig};
use crate::order::{Direction, Order};
use crate::relayer::{RelayerData, RelayerRegistry};
use crate::Address;

/// Aggregate ledger statistics
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LedgerStats {
    pub total_orders: u64,
    pub total_volume: u128,
    pub total_redeemed: u128,
    pub total_refunded: u128,
}

/// All escrow-core state: orders, balances, registries, stats
#[derive(Clone, Debug)]
pub struct Ledger {
    owner: Address,
    balances: HashMap<Address, u128>,
    /// Orders keyed by hashlock - the commitment doubles as the order key,
    /// which is what makes duplicate-hashlock creation rejectable
    orders: HashMap<HashLock, Order>,
    next_order_id: u64,
    /// (order hashlock, fill secret hash) pairs already paid out
    consumed: HashSet<(HashLock, HashLock)>,
    escrows: EscrowFactory,
    relayers: RelayerRegistry,
    stats: LedgerStats,
}

impl Ledger {
    pub fn new(owner: Address) -> Self {
        Ledger {
            owner,
            balances: HashMap::new(),
            orders: HashMap::new(),
            next_order_id: 1,
            consumed: HashSet::new(),
            escrows: EscrowFactory::new(),
            relayers: RelayerRegistry::new(),
            stats: LedgerStats::default(),
        }
    }

    /// Apply one message atomically. Returns the events to publish, or the
    /// rejection code; rejected messages leave the state unchanged.
    pub fn apply(
        &mut self,
        caller: &Address,
        msg: Message,
        now: u64,
    ) -> Result<Vec<Event>, LedgerError> {
        debug!("applying opcode {:#06x} from {}", msg.opcode(), caller);

        match msg {
            Message::Deposit { account, amount } => self.deposit(account, amount),
            Message::CreateOrder { config } => self.create_order(config, now),
            Message::CreateTonToEvmOrder { mut config } => {
                config.direction = Direction::TonToEvm;
                self.create_order(config, now)
            }
            Message::CreateEvmToTonOrder { mut config } => {
                config.direction = Direction::EvmToTon;
                self.create_order(config, now)
            }
            Message::LockJetton { mut config } => {
                config.direction = Direction::TonToTon;
                self.create_order(config, now)
            }
            Message::PartialFill {
                order_hash,
                fill_hash,
                amount,
                resolver,
            } => self.partial_fill(order_hash, fill_hash, amount, resolver),
            Message::CompletePartialFill { order_hash, secret } => {
                self.complete_partial_fill(order_hash, &secret)
            }
            Message::GetFund { secret, hash } => self.get_fund(&secret, hash, now),
            Message::Refund { hash } | Message::RefundOrder { hash } => self.refund(hash, now),
            Message::SetWhitelist { resolver, status } => {
                self.set_whitelist(caller, resolver, status)
            }
            Message::RegisterRelayer { relayer } => self.register_relayer(caller, relayer),
            Message::UpdateRelayerStats { relayer, success } => {
                self.update_relayer_stats(caller, relayer, success)
            }
            Message::DeployEscrow {
                chain_id,
                contract_address,
            } => self.deploy_escrow(caller, chain_id, contract_address),
        }
    }

    // ============ Funding ============

    fn deposit(&mut self, account: Address, amount: u128) -> Result<Vec<Event>, LedgerError> {
        if amount == 0 {
            return Err(LedgerError::InvalidAmount);
        }
        let balance = self.balances.entry(account.clone()).or_insert(0);
        *balance = balance
            .checked_add(amount)
            .ok_or(LedgerError::InvalidAmount)?;
        Ok(vec![Event::Deposited { account, amount }])
    }

    // ============ Order lifecycle ============

    /// Create an order: validate path authorization, timelock, amount,
    /// escrow deployment and hashlock uniqueness, then debit the sender
    /// and hold the funds.
    pub fn create_order(
        &mut self,
        config: OrderConfig,
        now: u64,
    ) -> Result<Vec<Event>, LedgerError> {
        if config.amount == 0 {
            return Err(LedgerError::InvalidAmount);
        }
        if config.timelock <= now {
            return Err(LedgerError::InvalidTimelock {
                timelock: config.timelock,
                now,
            });
        }
        if config.direction.resolver_gated() && !self.relayers.is_whitelisted(&config.sender) {
            return Err(LedgerError::NotWhitelisted(config.sender));
        }

        let dest_chain_id = if config.direction.is_cross_chain() {
            let chain_id = config.dest_chain_id.ok_or_else(|| {
                LedgerError::MalformedMessage("cross-chain order requires dest_chain_id".into())
            })?;
            if !self.escrows.is_deployed(chain_id) {
                return Err(LedgerError::EscrowNotDeployed(chain_id));
            }
            Some(chain_id)
        } else {
            None
        };

        if self.orders.contains_key(&config.hashlock) {
            return Err(LedgerError::DuplicateHashlock(config.hashlock.to_hex()));
        }

        let balance = self.balances.get(&config.sender).copied().unwrap_or(0);
        if balance < config.amount {
            return Err(LedgerError::InsufficientBalance {
                have: balance,
                need: config.amount,
            });
        }

        // All checks passed - apply
        *self.balances.entry(config.sender.clone()).or_insert(0) -= config.amount;

        let order_id = self.next_order_id;
        self.next_order_id += 1;

        let order = Order {
            id: order_id,
            direction: config.direction,
            source_asset: config.source_asset,
            sender: config.sender.clone(),
            receiver: config.receiver.clone(),
            hashlock: config.hashlock,
            timelock: config.timelock,
            amount: config.amount,
            finalized: false,
            partial_fills: HashMap::new(),
            total_filled: 0,
            released: 0,
        };
        self.orders.insert(config.hashlock, order);

        if let Some(chain_id) = dest_chain_id {
            self.escrows.record_order(chain_id);
        }
        self.stats.total_orders += 1;
        self.stats.total_volume = self.stats.total_volume.saturating_add(config.amount);

        info!(
            "order {} created: {:?} {} -> {} amount {} hashlock {}",
            order_id,
            config.direction,
            config.sender,
            config.receiver,
            config.amount,
            config.hashlock
        );

        Ok(vec![Event::OrderCreated {
            order_id,
            direction: config.direction,
            hashlock: config.hashlock,
            sender: config.sender,
            receiver: config.receiver,
            amount: config.amount,
            timelock: config.timelock,
            dest_chain_id,
        }])
    }

    /// Reserve part of an order's capacity for a resolver. Registration
    /// does not require the fill secret; releasing the funds later does.
    pub fn partial_fill(
        &mut self,
        order_hash: HashLock,
        fill_hash: HashLock,
        amount: u128,
        resolver: Address,
    ) -> Result<Vec<Event>, LedgerError> {
        if amount == 0 {
            return Err(LedgerError::InvalidAmount);
        }
        if !self.relayers.is_whitelisted(&resolver) {
            return Err(LedgerError::NotWhitelisted(resolver));
        }

        let order = self
            .orders
            .get_mut(&order_hash)
            .ok_or_else(|| LedgerError::InvalidHash(order_hash.to_hex()))?;

        if order.finalized {
            return Err(LedgerError::OrderAlreadyFinalized);
        }
        // checked_add: a fill huge enough to wrap must not sneak past
        // the capacity bound
        let filled = order
            .total_filled
            .checked_add(amount)
            .filter(|total| *total <= order.amount)
            .ok_or(LedgerError::FillExceedsOrder {
                fill: amount,
                filled: order.total_filled,
                amount: order.amount,
            })?;
        if order.partial_fills.contains_key(&fill_hash) {
            return Err(LedgerError::SecretAlreadyUsed);
        }

        order.partial_fills.insert(fill_hash, amount);
        order.total_filled = filled;
        let order_id = order.id;
        let total_filled = order.total_filled;

        info!(
            "order {} partial fill {} by {} ({}/{})",
            order_id, amount, resolver, total_filled, self.orders[&order_hash].amount
        );

        Ok(vec![Event::PartialFilled {
            order_id,
            fill_hash,
            amount,
            resolver,
            total_filled,
        }])
    }

    /// Release a reserved fill to the receiver by revealing the fill secret.
    /// Each (order, fill) pair pays out exactly once.
    pub fn complete_partial_fill(
        &mut self,
        order_hash: HashLock,
        secret: &Secret,
    ) -> Result<Vec<Event>, LedgerError> {
        let fill_hash = HashLock::of(secret);

        let order = self
            .orders
            .get_mut(&order_hash)
            .ok_or_else(|| LedgerError::InvalidHash(order_hash.to_hex()))?;

        if order.finalized {
            return Err(LedgerError::OrderAlreadyFinalized);
        }
        if self.consumed.contains(&(order_hash, fill_hash)) {
            return Err(LedgerError::SecretAlreadyUsed);
        }
        let amount = *order
            .partial_fills
            .get(&fill_hash)
            .ok_or(LedgerError::UnknownFill)?;

        self.consumed.insert((order_hash, fill_hash));
        order.released += amount;
        let receiver = order.receiver.clone();
        let order_id = order.id;
        if order.released == order.amount {
            order.finalized = true;
        }

        *self.balances.entry(receiver.clone()).or_insert(0) += amount;
        self.stats.total_redeemed = self.stats.total_redeemed.saturating_add(amount);

        info!("order {} fill {} released to {}", order_id, amount, receiver);

        Ok(vec![Event::FillCompleted {
            order_id,
            fill_hash,
            amount,
            receiver,
        }])
    }

    /// Full redemption: release the unreleased remainder to the receiver.
    /// Expiry is checked before secret validity so an expired order reports
    /// the expiry error even when the secret is correct.
    pub fn get_fund(
        &mut self,
        secret: &Secret,
        hash: HashLock,
        now: u64,
    ) -> Result<Vec<Event>, LedgerError> {
        let order = self
            .orders
            .get_mut(&hash)
            .ok_or_else(|| LedgerError::InvalidHash(hash.to_hex()))?;

        if order.finalized {
            return Err(LedgerError::OrderAlreadyFinalized);
        }
        if order.is_expired(now) {
            return Err(LedgerError::OrderExpired {
                timelock: order.timelock,
                now,
            });
        }
        if !hash.matches(secret) {
            return Err(LedgerError::InvalidSecret);
        }

        let amount = order.unreleased();
        order.released = order.amount;
        order.finalized = true;
        let receiver = order.receiver.clone();
        let order_id = order.id;

        *self.balances.entry(receiver.clone()).or_insert(0) += amount;
        self.stats.total_redeemed = self.stats.total_redeemed.saturating_add(amount);

        info!(
            "order {} redeemed: {} released to {}",
            order_id, amount, receiver
        );

        Ok(vec![Event::FundsReleased {
            order_id,
            amount,
            receiver,
        }])
    }

    /// Timelock-based refund of the unreleased remainder to the sender.
    /// Legal strictly after expiry: fails at `now == timelock`.
    pub fn refund(&mut self, hash: HashLock, now: u64) -> Result<Vec<Event>, LedgerError> {
        let order = self
            .orders
            .get_mut(&hash)
            .ok_or_else(|| LedgerError::InvalidHash(hash.to_hex()))?;

        if order.finalized {
            return Err(LedgerError::OrderAlreadyFinalized);
        }
        if now <= order.timelock {
            return Err(LedgerError::OrderNotExpired {
                timelock: order.timelock,
                now,
            });
        }

        let amount = order.unreleased();
        order.released = order.amount;
        order.finalized = true;
        let sender = order.sender.clone();
        let order_id = order.id;

        *self.balances.entry(sender.clone()).or_insert(0) += amount;
        self.stats.total_refunded = self.stats.total_refunded.saturating_add(amount);

        warn!(
            "order {} refunded: {} returned to {}",
            order_id, amount, sender
        );

        Ok(vec![Event::OrderRefunded {
            order_id,
            amount,
            sender,
        }])
    }

    // ============ Administration (owner-only) ============

    fn require_owner(&self, caller: &Address) -> Result<(), LedgerError> {
        if caller != &self.owner {
            return Err(LedgerError::NotOwner);
        }
        Ok(())
    }

    pub fn set_whitelist(
        &mut self,
        caller: &Address,
        resolver: Address,
        status: bool,
    ) -> Result<Vec<Event>, LedgerError> {
        self.require_owner(caller)?;
        self.relayers.set_whitelist(&resolver, status);
        info!("resolver {} whitelisted={}", resolver, status);
        Ok(vec![Event::WhitelistUpdated {
            resolver,
            whitelisted: status,
        }])
    }

    pub fn register_relayer(
        &mut self,
        caller: &Address,
        relayer: Address,
    ) -> Result<Vec<Event>, LedgerError> {
        self.require_owner(caller)?;
        self.relayers.register(relayer.clone());
        Ok(vec![Event::RelayerRegistered { relayer }])
    }

    pub fn update_relayer_stats(
        &mut self,
        caller: &Address,
        relayer: Address,
        success: bool,
    ) -> Result<Vec<Event>, LedgerError> {
        self.require_owner(caller)?;
        if !self.relayers.record_resolve(&relayer, success) {
            return Err(LedgerError::RelayerNotRegistered(relayer));
        }
        Ok(vec![Event::RelayerStatsUpdated { relayer, success }])
    }

    pub fn deploy_escrow(
        &mut self,
        caller: &Address,
        chain_id: u64,
        contract_address: Address,
    ) -> Result<Vec<Event>, LedgerError> {
        self.require_owner(caller)?;
        self.escrows.deploy(chain_id, contract_address.clone());
        info!("escrow deployed for chain {}: {}", chain_id, contract_address);
        Ok(vec![Event::EscrowDeployed {
            chain_id,
            contract_address,
        }])
    }

    // ============ Queries ============

    pub fn order(&self, hash: &HashLock) -> Option<&Order> {
        self.orders.get(hash)
    }

    pub fn balance_of(&self, account: &str) -> u128 {
        self.balances.get(account).copied().unwrap_or(0)
    }

    pub fn escrow(&self, chain_id: u64) -> Option<&EscrowContract> {
        self.escrows.get(chain_id)
    }

    pub fn relayer(&self, address: &str) -> Option<&RelayerData> {
        self.relayers.get(address)
    }

    pub fn stats(&self) -> LedgerStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OWNER: &str = "EQowner";
    const ALICE: &str = "EQalice";
    const BOB: &str = "0xbob";

    fn funded_ledger() -> Ledger {
        let mut ledger = Ledger::new(OWNER.to_string());
        ledger.deposit(ALICE.to_string(), 1_000).unwrap();
        ledger
    }

    fn order_config(hashlock: HashLock, timelock: u64, amount: u128) -> OrderConfig {
        OrderConfig {
            direction: Direction::TonToTon,
            source_asset: "jetton:usdt".to_string(),
            sender: ALICE.to_string(),
            receiver: BOB.to_string(),
            hashlock,
            timelock,
            amount,
            dest_chain_id: None,
        }
    }

    #[test]
    fn test_create_order_locks_balance() {
        let mut ledger = funded_ledger();
        let hashlock = HashLock::of(&Secret::generate());

        ledger.create_order(order_config(hashlock, 100, 400), 10).unwrap();

        assert_eq!(ledger.balance_of(ALICE), 600);
        let order = ledger.order(&hashlock).unwrap();
        assert_eq!(order.amount, 400);
        assert!(!order.finalized);
    }

    #[test]
    fn test_create_order_rejections() {
        let mut ledger = funded_ledger();
        let hashlock = HashLock::of(&Secret::generate());

        assert_eq!(
            ledger.create_order(order_config(hashlock, 100, 0), 10),
            Err(LedgerError::InvalidAmount)
        );
        assert_eq!(
            ledger.create_order(order_config(hashlock, 10, 100), 10),
            Err(LedgerError::InvalidTimelock {
                timelock: 10,
                now: 10
            })
        );
        assert_eq!(
            ledger.create_order(order_config(hashlock, 100, 5_000), 10),
            Err(LedgerError::InsufficientBalance {
                have: 1_000,
                need: 5_000
            })
        );

        // Duplicate hashlock
        ledger.create_order(order_config(hashlock, 100, 100), 10).unwrap();
        assert!(matches!(
            ledger.create_order(order_config(hashlock, 100, 100), 10),
            Err(LedgerError::DuplicateHashlock(_))
        ));
    }

    #[test]
    fn test_deposit_overflow_rejected() {
        let mut ledger = Ledger::new(OWNER.to_string());
        ledger.deposit(ALICE.to_string(), u128::MAX).unwrap();

        assert_eq!(
            ledger.deposit(ALICE.to_string(), 1),
            Err(LedgerError::InvalidAmount)
        );
        // Balance untouched by the rejected deposit
        assert_eq!(ledger.balance_of(ALICE), u128::MAX);
    }

    #[test]
    fn test_partial_fill_overflow_cannot_bypass_capacity() {
        let mut ledger = funded_ledger();
        let owner = OWNER.to_string();
        let hashlock = HashLock::of(&Secret::generate());
        ledger.create_order(order_config(hashlock, 100, 100), 10).unwrap();
        ledger
            .set_whitelist(&owner, "resolver-a".to_string(), true)
            .unwrap();

        ledger
            .partial_fill(hashlock, HashLock::of(&Secret::generate()), 40, "resolver-a".to_string())
            .unwrap();

        // A fill sized to wrap total_filled past the capacity check
        assert_eq!(
            ledger.partial_fill(
                hashlock,
                HashLock::of(&Secret::generate()),
                u128::MAX,
                "resolver-a".to_string(),
            ),
            Err(LedgerError::FillExceedsOrder {
                fill: u128::MAX,
                filled: 40,
                amount: 100
            })
        );
        assert_eq!(ledger.order(&hashlock).unwrap().total_filled, 40);
    }

    #[test]
    fn test_cross_chain_requires_deployed_escrow() {
        let mut ledger = funded_ledger();
        let mut config = order_config(HashLock::of(&Secret::generate()), 100, 100);
        config.direction = Direction::TonToEvm;
        config.dest_chain_id = Some(8453);

        assert_eq!(
            ledger.create_order(config.clone(), 10),
            Err(LedgerError::EscrowNotDeployed(8453))
        );

        ledger
            .deploy_escrow(&OWNER.to_string(), 8453, "0xescrow".to_string())
            .unwrap();
        ledger.create_order(config, 10).unwrap();

        assert_eq!(ledger.escrow(8453).unwrap().total_orders, 1);
    }

    #[test]
    fn test_resolver_gated_direction_requires_whitelist() {
        let mut ledger = funded_ledger();
        ledger
            .deploy_escrow(&OWNER.to_string(), 1, "0xescrow".to_string())
            .unwrap();

        let mut config = order_config(HashLock::of(&Secret::generate()), 100, 100);
        config.direction = Direction::EvmToTon;
        config.dest_chain_id = Some(1);

        assert!(matches!(
            ledger.create_order(config.clone(), 10),
            Err(LedgerError::NotWhitelisted(_))
        ));

        ledger
            .set_whitelist(&OWNER.to_string(), ALICE.to_string(), true)
            .unwrap();
        ledger.create_order(config, 10).unwrap();
    }

    #[test]
    fn test_whitelist_revocation_is_immediate() {
        let mut ledger = funded_ledger();
        let hashlock = HashLock::of(&Secret::generate());
        ledger.create_order(order_config(hashlock, 100, 100), 10).unwrap();

        let owner = OWNER.to_string();
        ledger
            .set_whitelist(&owner, "resolver-a".to_string(), true)
            .unwrap();
        ledger
            .partial_fill(
                hashlock,
                HashLock::of(&Secret::generate()),
                10,
                "resolver-a".to_string(),
            )
            .unwrap();

        ledger
            .set_whitelist(&owner, "resolver-a".to_string(), false)
            .unwrap();
        assert!(matches!(
            ledger.partial_fill(
                hashlock,
                HashLock::of(&Secret::generate()),
                10,
                "resolver-a".to_string(),
            ),
            Err(LedgerError::NotWhitelisted(_))
        ));
    }

    #[test]
    fn test_admin_requires_owner() {
        let mut ledger = funded_ledger();
        let not_owner = ALICE.to_string();

        assert_eq!(
            ledger.set_whitelist(&not_owner, "r".to_string(), true),
            Err(LedgerError::NotOwner)
        );
        assert_eq!(
            ledger.register_relayer(&not_owner, "r".to_string()),
            Err(LedgerError::NotOwner)
        );
        assert_eq!(
            ledger.deploy_escrow(&not_owner, 1, "0x".to_string()),
            Err(LedgerError::NotOwner)
        );
    }

    // Concrete scenario from the protocol design: amount=100, hashlock=H(s),
    // timelock=T. refund at T-1 fails; getFund(s) succeeds and finalizes;
    // a second getFund fails as replay.
    #[test]
    fn test_redeem_then_replay() {
        let mut ledger = funded_ledger();
        let secret = Secret::generate();
        let hashlock = HashLock::of(&secret);
        let timelock = 1_000;

        ledger
            .create_order(order_config(hashlock, timelock, 100), 10)
            .unwrap();

        assert!(matches!(
            ledger.refund(hashlock, timelock - 1),
            Err(LedgerError::OrderNotExpired { .. })
        ));

        ledger.get_fund(&secret, hashlock, timelock - 1).unwrap();
        assert!(ledger.order(&hashlock).unwrap().finalized);
        assert_eq!(ledger.balance_of(BOB), 100);

        assert_eq!(
            ledger.get_fund(&secret, hashlock, timelock - 1),
            Err(LedgerError::OrderAlreadyFinalized)
        );
    }

    #[test]
    fn test_refund_boundary() {
        let mut ledger = funded_ledger();
        let hashlock = HashLock::of(&Secret::generate());
        let timelock = 500;
        ledger
            .create_order(order_config(hashlock, timelock, 100), 10)
            .unwrap();

        // Fails at exactly the timelock, succeeds one past it
        assert!(matches!(
            ledger.refund(hashlock, timelock),
            Err(LedgerError::OrderNotExpired { .. })
        ));
        ledger.refund(hashlock, timelock + 1).unwrap();

        assert_eq!(ledger.balance_of(ALICE), 1_000);
        assert!(ledger.order(&hashlock).unwrap().finalized);

        assert_eq!(
            ledger.refund(hashlock, timelock + 2),
            Err(LedgerError::OrderAlreadyFinalized)
        );
    }

    #[test]
    fn test_expired_redeem_reports_expiry_not_secret() {
        let mut ledger = funded_ledger();
        let secret = Secret::generate();
        let hashlock = HashLock::of(&secret);
        ledger.create_order(order_config(hashlock, 100, 50), 10).unwrap();

        // Correct secret, expired order: expiry error wins
        assert!(matches!(
            ledger.get_fund(&secret, hashlock, 101),
            Err(LedgerError::OrderExpired { .. })
        ));

        // Wrong secret, live order: secret error
        assert_eq!(
            ledger.get_fund(&Secret::generate(), hashlock, 50),
            Err(LedgerError::InvalidSecret)
        );

        // Unknown order: hash error
        let unknown = HashLock::of(&Secret::generate());
        assert!(matches!(
            ledger.get_fund(&secret, unknown, 50),
            Err(LedgerError::InvalidHash(_))
        ));
    }

    // Concrete scenario: fills of 40 then 70 on an order of 100 - the
    // second must be rejected as overfill.
    #[test]
    fn test_partial_fill_capacity() {
        let mut ledger = funded_ledger();
        let owner = OWNER.to_string();
        let hashlock = HashLock::of(&Secret::generate());
        ledger.create_order(order_config(hashlock, 100, 100), 10).unwrap();

        ledger
            .set_whitelist(&owner, "resolver-a".to_string(), true)
            .unwrap();
        ledger
            .set_whitelist(&owner, "resolver-b".to_string(), true)
            .unwrap();

        let s1 = Secret::generate();
        let s2 = Secret::generate();

        ledger
            .partial_fill(hashlock, HashLock::of(&s1), 40, "resolver-a".to_string())
            .unwrap();
        assert_eq!(
            ledger.partial_fill(hashlock, HashLock::of(&s2), 70, "resolver-b".to_string()),
            Err(LedgerError::FillExceedsOrder {
                fill: 70,
                filled: 40,
                amount: 100
            })
        );

        assert_eq!(ledger.order(&hashlock).unwrap().total_filled, 40);
    }

    #[test]
    fn test_complete_partial_fill_and_replay() {
        let mut ledger = funded_ledger();
        let owner = OWNER.to_string();
        let hashlock = HashLock::of(&Secret::generate());
        ledger.create_order(order_config(hashlock, 100, 100), 10).unwrap();
        ledger
            .set_whitelist(&owner, "resolver-a".to_string(), true)
            .unwrap();

        let fill_secret = Secret::generate();
        ledger
            .partial_fill(
                hashlock,
                HashLock::of(&fill_secret),
                40,
                "resolver-a".to_string(),
            )
            .unwrap();

        ledger.complete_partial_fill(hashlock, &fill_secret).unwrap();
        assert_eq!(ledger.balance_of(BOB), 40);

        // Same pair again: replay
        assert_eq!(
            ledger.complete_partial_fill(hashlock, &fill_secret),
            Err(LedgerError::SecretAlreadyUsed)
        );

        // Unregistered fill secret
        assert_eq!(
            ledger.complete_partial_fill(hashlock, &Secret::generate()),
            Err(LedgerError::UnknownFill)
        );
    }

    #[test]
    fn test_fully_filled_order_finalizes() {
        let mut ledger = funded_ledger();
        let owner = OWNER.to_string();
        let hashlock = HashLock::of(&Secret::generate());
        ledger.create_order(order_config(hashlock, 100, 100), 10).unwrap();
        ledger
            .set_whitelist(&owner, "resolver-a".to_string(), true)
            .unwrap();

        let s1 = Secret::generate();
        let s2 = Secret::generate();
        ledger
            .partial_fill(hashlock, HashLock::of(&s1), 60, "resolver-a".to_string())
            .unwrap();
        ledger
            .partial_fill(hashlock, HashLock::of(&s2), 40, "resolver-a".to_string())
            .unwrap();

        ledger.complete_partial_fill(hashlock, &s1).unwrap();
        assert!(!ledger.order(&hashlock).unwrap().finalized);

        ledger.complete_partial_fill(hashlock, &s2).unwrap();
        assert!(ledger.order(&hashlock).unwrap().finalized);
        assert_eq!(ledger.balance_of(BOB), 100);

        // Finalized: refund must fail even after expiry
        assert_eq!(
            ledger.refund(hashlock, 1_000),
            Err(LedgerError::OrderAlreadyFinalized)
        );
    }

    #[test]
    fn test_refund_returns_unreleased_remainder() {
        let mut ledger = funded_ledger();
        let owner = OWNER.to_string();
        let hashlock = HashLock::of(&Secret::generate());
        ledger.create_order(order_config(hashlock, 100, 100), 10).unwrap();
        ledger
            .set_whitelist(&owner, "resolver-a".to_string(), true)
            .unwrap();

        let fill_secret = Secret::generate();
        ledger
            .partial_fill(
                hashlock,
                HashLock::of(&fill_secret),
                30,
                "resolver-a".to_string(),
            )
            .unwrap();
        ledger.complete_partial_fill(hashlock, &fill_secret).unwrap();

        // After expiry the sender recovers only what was never released
        ledger.refund(hashlock, 101).unwrap();
        assert_eq!(ledger.balance_of(ALICE), 900 + 70);
        assert_eq!(ledger.balance_of(BOB), 30);
    }

    #[test]
    fn test_apply_dispatch_and_stats() {
        let mut ledger = Ledger::new(OWNER.to_string());
        let owner = OWNER.to_string();
        let secret = Secret::generate();
        let hashlock = HashLock::of(&secret);

        ledger
            .apply(
                &owner,
                Message::Deposit {
                    account: ALICE.to_string(),
                    amount: 500,
                },
                0,
            )
            .unwrap();

        let events = ledger
            .apply(
                &ALICE.to_string(),
                Message::LockJetton {
                    config: order_config(hashlock, 100, 200),
                },
                10,
            )
            .unwrap();
        assert!(matches!(events[0], Event::OrderCreated { order_id: 1, .. }));

        ledger
            .apply(&BOB.to_string(), Message::GetFund { secret, hash: hashlock }, 50)
            .unwrap();

        let stats = ledger.stats();
        assert_eq!(stats.total_orders, 1);
        assert_eq!(stats.total_volume, 200);
        assert_eq!(stats.total_redeemed, 200);
        assert_eq!(stats.total_refunded, 0);
    }
}
