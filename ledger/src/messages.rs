// ledger/src/messages.rs
//! Tagged wire messages consumed by the ledger, and their binary codec.
//!
//! Each message carries a distinguishing u32 opcode. The binary layout
//! (field widths, presence bytes for optional fields) round-trips exactly
//! for interoperability with existing deployments: integers are big-endian
//! fixed width, hashes are raw 32 bytes, strings are u16-length-prefixed
//! UTF-8, optional fields are preceded by a one-byte presence flag.

use serde::{Deserialize, Serialize};

use crate::error::LedgerError;
use crate::hashlock::{HashLock, Secret, HASH_SIZE, SECRET_SIZE};
use crate::order::Direction;
use crate::{Address, AssetRef};

// Opcodes. Stable across deployments, never reuse a retired value.
pub const OP_DEPOSIT: u32 = 0x0000_0001;
pub const OP_CREATE_ORDER: u32 = 0x0000_0010;
pub const OP_CREATE_TON_TO_EVM: u32 = 0x0000_0011;
pub const OP_CREATE_EVM_TO_TON: u32 = 0x0000_0012;
pub const OP_LOCK_JETTON: u32 = 0x0000_0013;
pub const OP_PARTIAL_FILL: u32 = 0x0000_0020;
pub const OP_COMPLETE_PARTIAL_FILL: u32 = 0x0000_0021;
pub const OP_GET_FUND: u32 = 0x0000_0022;
pub const OP_REFUND: u32 = 0x0000_0023;
pub const OP_REFUND_ORDER: u32 = 0x0000_0024;
pub const OP_SET_WHITELIST: u32 = 0x0000_0030;
pub const OP_REGISTER_RELAYER: u32 = 0x0000_0031;
pub const OP_UPDATE_RELAYER_STATS: u32 = 0x0000_0032;
pub const OP_DEPLOY_ESCROW: u32 = 0x0000_0033;

/// Parameters of an order-creation request
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrderConfig {
    pub direction: Direction,
    pub source_asset: AssetRef,
    pub sender: Address,
    pub receiver: Address,
    pub hashlock: HashLock,
    pub timelock: u64,
    pub amount: u128,
    /// Required for cross-chain directions, absent for same-chain
    pub dest_chain_id: Option<u64>,
}

/// Closed sum over all message kinds the ledger handles.
///
/// Note: `ResolveOrder`, `CreatePartialFill`, `SetRelayer` and `Mint`
/// shapes seen in older test suites are not part of the deployed schema
/// and are intentionally absent here.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Message {
    /// Credit an account balance (funding boundary)
    Deposit { account: Address, amount: u128 },
    /// Generic order creation; direction taken from the config
    CreateOrder { config: OrderConfig },
    /// Direction-specific creation variants kept for wire compatibility
    CreateTonToEvmOrder { config: OrderConfig },
    CreateEvmToTonOrder { config: OrderConfig },
    /// Same-chain jetton lock
    LockJetton { config: OrderConfig },
    /// Reserve capacity on an order; funds release later against the secret
    PartialFill {
        order_hash: HashLock,
        fill_hash: HashLock,
        amount: u128,
        resolver: Address,
    },
    /// Release a reserved fill by revealing its secret
    CompletePartialFill { order_hash: HashLock, secret: Secret },
    /// Full redemption of the unreleased remainder
    GetFund { secret: Secret, hash: HashLock },
    /// Timelock-based refund to the original sender
    Refund { hash: HashLock },
    /// Wire-compatible alias of `Refund`
    RefundOrder { hash: HashLock },
    SetWhitelist { resolver: Address, status: bool },
    RegisterRelayer { relayer: Address },
    UpdateRelayerStats { relayer: Address, success: bool },
    DeployEscrow { chain_id: u64, contract_address: Address },
}

impl Message {
    pub fn opcode(&self) -> u32 {
        match self {
            Message::Deposit { .. } => OP_DEPOSIT,
            Message::CreateOrder { .. } => OP_CREATE_ORDER,
            Message::CreateTonToEvmOrder { .. } => OP_CREATE_TON_TO_EVM,
            Message::CreateEvmToTonOrder { .. } => OP_CREATE_EVM_TO_TON,
            Message::LockJetton { .. } => OP_LOCK_JETTON,
            Message::PartialFill { .. } => OP_PARTIAL_FILL,
            Message::CompletePartialFill { .. } => OP_COMPLETE_PARTIAL_FILL,
            Message::GetFund { .. } => OP_GET_FUND,
            Message::Refund { .. } => OP_REFUND,
            Message::RefundOrder { .. } => OP_REFUND_ORDER,
            Message::SetWhitelist { .. } => OP_SET_WHITELIST,
            Message::RegisterRelayer { .. } => OP_REGISTER_RELAYER,
            Message::UpdateRelayerStats { .. } => OP_UPDATE_RELAYER_STATS,
            Message::DeployEscrow { .. } => OP_DEPLOY_ESCROW,
        }
    }

    /// Encode to the stable binary layout
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(128);
        put_u32(&mut buf, self.opcode());

        match self {
            Message::Deposit { account, amount } => {
                put_str(&mut buf, account);
                put_u128(&mut buf, *amount);
            }
            Message::CreateOrder { config }
            | Message::CreateTonToEvmOrder { config }
            | Message::CreateEvmToTonOrder { config }
            | Message::LockJetton { config } => {
                put_config(&mut buf, config);
            }
            Message::PartialFill {
                order_hash,
                fill_hash,
                amount,
                resolver,
            } => {
                buf.extend_from_slice(order_hash.as_bytes());
                buf.extend_from_slice(fill_hash.as_bytes());
                put_u128(&mut buf, *amount);
                put_str(&mut buf, resolver);
            }
            Message::CompletePartialFill { order_hash, secret } => {
                buf.extend_from_slice(order_hash.as_bytes());
                buf.extend_from_slice(secret.as_bytes());
            }
            Message::GetFund { secret, hash } => {
                buf.extend_from_slice(secret.as_bytes());
                buf.extend_from_slice(hash.as_bytes());
            }
            Message::Refund { hash } | Message::RefundOrder { hash } => {
                buf.extend_from_slice(hash.as_bytes());
            }
            Message::SetWhitelist { resolver, status } => {
                put_str(&mut buf, resolver);
                buf.push(*status as u8);
            }
            Message::RegisterRelayer { relayer } => {
                put_str(&mut buf, relayer);
            }
            Message::UpdateRelayerStats { relayer, success } => {
                put_str(&mut buf, relayer);
                buf.push(*success as u8);
            }
            Message::DeployEscrow {
                chain_id,
                contract_address,
            } => {
                put_u64(&mut buf, *chain_id);
                put_str(&mut buf, contract_address);
            }
        }

        buf
    }

    /// Decode from the stable binary layout
    pub fn decode(bytes: &[u8]) -> Result<Self, LedgerError> {
        let mut r = Reader::new(bytes);
        let opcode = r.u32()?;

        let msg = match opcode {
            OP_DEPOSIT => Message::Deposit {
                account: r.str()?,
                amount: r.u128()?,
            },
            OP_CREATE_ORDER => Message::CreateOrder {
                config: r.config()?,
            },
            OP_CREATE_TON_TO_EVM => Message::CreateTonToEvmOrder {
                config: r.config()?,
            },
            OP_CREATE_EVM_TO_TON => Message::CreateEvmToTonOrder {
                config: r.config()?,
            },
            OP_LOCK_JETTON => Message::LockJetton {
                config: r.config()?,
            },
            OP_PARTIAL_FILL => Message::PartialFill {
                order_hash: r.hash()?,
                fill_hash: r.hash()?,
                amount: r.u128()?,
                resolver: r.str()?,
            },
            OP_COMPLETE_PARTIAL_FILL => Message::CompletePartialFill {
                order_hash: r.hash()?,
                secret: r.secret()?,
            },
            OP_GET_FUND => Message::GetFund {
                secret: r.secret()?,
                hash: r.hash()?,
            },
            OP_REFUND => Message::Refund { hash: r.hash()? },
            OP_REFUND_ORDER => Message::RefundOrder { hash: r.hash()? },
            OP_SET_WHITELIST => Message::SetWhitelist {
                resolver: r.str()?,
                status: r.u8()? != 0,
            },
            OP_REGISTER_RELAYER => Message::RegisterRelayer { relayer: r.str()? },
            OP_UPDATE_RELAYER_STATS => Message::UpdateRelayerStats {
                relayer: r.str()?,
                success: r.u8()? != 0,
            },
            OP_DEPLOY_ESCROW => Message::DeployEscrow {
                chain_id: r.u64()?,
                contract_address: r.str()?,
            },
            other => return Err(LedgerError::UnknownOpcode(other)),
        };

        r.finish()?;
        Ok(msg)
    }
}

// ============ encoding helpers ============

fn put_u32(buf: &mut Vec<u8>, v: u32) {
    buf.extend_from_slice(&v.to_be_bytes());
}

fn put_u64(buf: &mut Vec<u8>, v: u64) {
    buf.extend_from_slice(&v.to_be_bytes());
}

fn put_u128(buf: &mut Vec<u8>, v: u128) {
    buf.extend_from_slice(&v.to_be_bytes());
}

fn put_str(buf: &mut Vec<u8>, s: &str) {
    let bytes = s.as_bytes();
    buf.extend_from_slice(&(bytes.len() as u16).to_be_bytes());
    buf.extend_from_slice(bytes);
}

fn put_config(buf: &mut Vec<u8>, config: &OrderConfig) {
    buf.push(match config.direction {
        Direction::TonToEvm => 0,
        Direction::EvmToTon => 1,
        Direction::TonToTon => 2,
    });
    put_str(buf, &config.source_asset);
    put_str(buf, &config.sender);
    put_str(buf, &config.receiver);
    buf.extend_from_slice(config.hashlock.as_bytes());
    put_u64(buf, config.timelock);
    put_u128(buf, config.amount);
    match config.dest_chain_id {
        Some(id) => {
            buf.push(1);
            put_u64(buf, id);
        }
        None => buf.push(0),
    }
}

// ============ decoding helpers ============

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Reader { bytes, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], LedgerError> {
        if self.pos + n > self.bytes.len() {
            return Err(LedgerError::MalformedMessage(format!(
                "truncated at offset {}, wanted {} bytes",
                self.pos, n
            )));
        }
        let slice = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8, LedgerError> {
        Ok(self.take(1)?[0])
    }

    fn u32(&mut self) -> Result<u32, LedgerError> {
        Ok(u32::from_be_bytes(self.take(4)?.try_into().unwrap()))
    }

    fn u64(&mut self) -> Result<u64, LedgerError> {
        Ok(u64::from_be_bytes(self.take(8)?.try_into().unwrap()))
    }

    fn u128(&mut self) -> Result<u128, LedgerError> {
        Ok(u128::from_be_bytes(self.take(16)?.try_into().unwrap()))
    }

    fn str(&mut self) -> Result<String, LedgerError> {
        let len = u16::from_be_bytes(self.take(2)?.try_into().unwrap()) as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| LedgerError::MalformedMessage("invalid utf-8 string".to_string()))
    }

    fn hash(&mut self) -> Result<HashLock, LedgerError> {
        let bytes: [u8; HASH_SIZE] = self.take(HASH_SIZE)?.try_into().unwrap();
        Ok(HashLock::from_bytes(bytes))
    }

    fn secret(&mut self) -> Result<Secret, LedgerError> {
        let bytes: [u8; SECRET_SIZE] = self.take(SECRET_SIZE)?.try_into().unwrap();
        Ok(Secret::from_bytes(bytes))
    }

    fn config(&mut self) -> Result<OrderConfig, LedgerError> {
        let direction = match self.u8()? {
            0 => Direction::TonToEvm,
            1 => Direction::EvmToTon,
            2 => Direction::TonToTon,
            other => {
                return Err(LedgerError::MalformedMessage(format!(
                    "unknown direction tag {}",
                    other
                )))
            }
        };
        let source_asset = self.str()?;
        let sender = self.str()?;
        let receiver = self.str()?;
        let hashlock = self.hash()?;
        let timelock = self.u64()?;
        let amount = self.u128()?;
        let dest_chain_id = match self.u8()? {
            0 => None,
            1 => Some(self.u64()?),
            other => {
                return Err(LedgerError::MalformedMessage(format!(
                    "invalid presence byte {}",
                    other
                )))
            }
        };

        Ok(OrderConfig {
            direction,
            source_asset,
            sender,
            receiver,
            hashlock,
            timelock,
            amount,
            dest_chain_id,
        })
    }

    fn finish(&self) -> Result<(), LedgerError> {
        if self.pos != self.bytes.len() {
            return Err(LedgerError::MalformedMessage(format!(
                "{} trailing bytes",
                self.bytes.len() - self.pos
            )));
        }
        Ok(())
    }
}
