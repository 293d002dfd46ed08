// bitcoin/src/script.rs
//! HTLC script construction, parsing and spend-path validation
//!
//! Script template:
//! ```text
//! OP_IF
//!     OP_SHA256 <hash> OP_EQUALVERIFY
//!     <receiver_pubkey> OP_CHECKSIG
//! OP_ELSE
//!     <locktime> OP_CHECKLOCKTIMEVERIFY OP_DROP
//!     <sender_pubkey> OP_CHECKSIG
//! OP_ENDIF
//! ```
//!
//! Redeem scriptSig: `<signature> <preimage> OP_TRUE <script>`
//! Refund scriptSig: `<signature> OP_FALSE <script>`

use ripemd::Ripemd160;
use sha2::{Digest, Sha256};

use crate::error::BitcoinHtlcError;
use crate::{HASH_SIZE, SECRET_SIZE};

pub mod opcodes {
    pub const OP_FALSE: u8 = 0x00;
    pub const OP_TRUE: u8 = 0x51;
    pub const OP_IF: u8 = 0x63;
    pub const OP_ELSE: u8 = 0x67;
    pub const OP_ENDIF: u8 = 0x68;
    pub const OP_DROP: u8 = 0x75;
    pub const OP_EQUALVERIFY: u8 = 0x88;
    pub const OP_SHA256: u8 = 0xa8;
    pub const OP_CHECKSIG: u8 = 0xac;
    pub const OP_CHECKLOCKTIMEVERIFY: u8 = 0xb1;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Network {
    Mainnet,
    Testnet,
    Regtest,
}

impl Network {
    /// P2SH address version byte
    pub fn p2sh_version(&self) -> u8 {
        match self {
            Network::Mainnet => 0x05,
            Network::Testnet | Network::Regtest => 0xc4,
        }
    }

    /// Bech32 human-readable part for segwit addresses
    pub fn hrp(&self) -> &'static str {
        match self {
            Network::Mainnet => "bc",
            Network::Testnet => "tb",
            Network::Regtest => "bcrt",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AddressType {
    P2sh,
    P2wsh,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SpendPath {
    Redeem,
    Refund,
}

/// An HTLC locking script: hashlocked redeem branch for the receiver,
/// CLTV-guarded refund branch for the sender.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HtlcScript {
    pub secret_hash: [u8; HASH_SIZE],
    pub locktime: u32,
    pub sender_pubkey: [u8; 33],
    pub receiver_pubkey: [u8; 33],
}

impl HtlcScript {
    pub fn new(
        secret_hash: [u8; HASH_SIZE],
        locktime: u32,
        sender_pubkey: [u8; 33],
        receiver_pubkey: [u8; 33],
    ) -> Self {
        HtlcScript {
            secret_hash,
            locktime,
            sender_pubkey,
            receiver_pubkey,
        }
    }

    /// Serialize to script bytes
    pub fn to_bytes(&self) -> Vec<u8> {
        use opcodes::*;

        let mut script = Vec::with_capacity(110);

        script.push(OP_IF);

        script.push(OP_SHA256);
        script.push(HASH_SIZE as u8);
        script.extend_from_slice(&self.secret_hash);
        script.push(OP_EQUALVERIFY);

        script.push(33);
        script.extend_from_slice(&self.receiver_pubkey);
        script.push(OP_CHECKSIG);

        script.push(OP_ELSE);

        let locktime_bytes = encode_locktime(self.locktime);
        script.push(locktime_bytes.len() as u8);
        script.extend_from_slice(&locktime_bytes);
        script.push(OP_CHECKLOCKTIMEVERIFY);
        script.push(OP_DROP);

        script.push(33);
        script.extend_from_slice(&self.sender_pubkey);
        script.push(OP_CHECKSIG);

        script.push(OP_ENDIF);

        script
    }

    /// Recover the script parameters from serialized bytes. Rejects
    /// anything that does not match the template exactly.
    pub fn parse(bytes: &[u8]) -> Result<Self, BitcoinHtlcError> {
        use opcodes::*;

        let mut r = ScriptReader::new(bytes);

        r.expect(OP_IF)?;
        r.expect(OP_SHA256)?;
        let secret_hash: [u8; HASH_SIZE] = r
            .push(HASH_SIZE)?
            .try_into()
            .map_err(|_| BitcoinHtlcError::InvalidScript("bad hash push".into()))?;
        r.expect(OP_EQUALVERIFY)?;
        let receiver_pubkey: [u8; 33] = r
            .push(33)?
            .try_into()
            .map_err(|_| BitcoinHtlcError::InvalidScript("bad pubkey push".into()))?;
        r.expect(OP_CHECKSIG)?;
        r.expect(OP_ELSE)?;
        let locktime_bytes = r.var_push(5)?;
        let locktime = decode_locktime(&locktime_bytes);
        r.expect(OP_CHECKLOCKTIMEVERIFY)?;
        r.expect(OP_DROP)?;
        let sender_pubkey: [u8; 33] = r
            .push(33)?
            .try_into()
            .map_err(|_| BitcoinHtlcError::InvalidScript("bad pubkey push".into()))?;
        r.expect(OP_CHECKSIG)?;
        r.expect(OP_ENDIF)?;
        r.finish()?;

        Ok(HtlcScript {
            secret_hash,
            locktime,
            sender_pubkey,
            receiver_pubkey,
        })
    }

    /// HASH160 of the serialized script, used by P2SH
    pub fn script_hash(&self) -> [u8; 20] {
        let sha = Sha256::digest(self.to_bytes());
        Ripemd160::digest(sha).into()
    }

    /// Derive the funding address for this script
    pub fn address(
        &self,
        network: Network,
        address_type: AddressType,
    ) -> Result<String, BitcoinHtlcError> {
        match address_type {
            AddressType::P2sh => {
                let mut payload = vec![network.p2sh_version()];
                payload.extend_from_slice(&self.script_hash());
                let checksum = &Sha256::digest(Sha256::digest(&payload))[..4];
                payload.extend_from_slice(checksum);
                Ok(bs58::encode(payload).into_string())
            }
            AddressType::P2wsh => {
                let program: [u8; 32] = Sha256::digest(self.to_bytes()).into();
                bech32_encode(network.hrp(), &program, 0)
            }
        }
    }

    /// Check whether the given spend would satisfy the script.
    ///
    /// Redeem: the secret must hash to the commitment and the key must be
    /// the receiver's. Refund: the current time must be strictly past the
    /// locktime and the key must be the sender's.
    pub fn validate(
        &self,
        path: SpendPath,
        secret: Option<&[u8; SECRET_SIZE]>,
        pubkey: &[u8; 33],
        current_time: Option<u32>,
    ) -> bool {
        match path {
            SpendPath::Redeem => match secret {
                Some(secret) => {
                    let hash: [u8; HASH_SIZE] = Sha256::digest(secret).into();
                    hash == self.secret_hash && pubkey == &self.receiver_pubkey
                }
                None => false,
            },
            SpendPath::Refund => match current_time {
                Some(now) => now > self.locktime && pubkey == &self.sender_pubkey,
                None => false,
            },
        }
    }
}

struct ScriptReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> ScriptReader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        ScriptReader { bytes, pos: 0 }
    }

    fn next(&mut self) -> Result<u8, BitcoinHtlcError> {
        let byte = *self
            .bytes
            .get(self.pos)
            .ok_or_else(|| BitcoinHtlcError::InvalidScript("truncated script".into()))?;
        self.pos += 1;
        Ok(byte)
    }

    fn expect(&mut self, opcode: u8) -> Result<(), BitcoinHtlcError> {
        let byte = self.next()?;
        if byte != opcode {
            return Err(BitcoinHtlcError::InvalidScript(format!(
                "expected opcode {:#04x}, found {:#04x}",
                opcode, byte
            )));
        }
        Ok(())
    }

    fn push(&mut self, len: usize) -> Result<&'a [u8], BitcoinHtlcError> {
        let declared = self.next()? as usize;
        if declared != len {
            return Err(BitcoinHtlcError::InvalidScript(format!(
                "expected {}-byte push, found {}",
                len, declared
            )));
        }
        self.take(len)
    }

    /// A push of up to `max` bytes (minimal-encoded numbers vary in width)
    fn var_push(&mut self, max: usize) -> Result<Vec<u8>, BitcoinHtlcError> {
        let len = self.next()? as usize;
        if len == 0 || len > max {
            return Err(BitcoinHtlcError::InvalidScript(format!(
                "push of {} bytes out of range",
                len
            )));
        }
        Ok(self.take(len)?.to_vec())
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], BitcoinHtlcError> {
        if self.pos + len > self.bytes.len() {
            return Err(BitcoinHtlcError::InvalidScript("truncated push".into()));
        }
        let slice = &self.bytes[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn finish(&self) -> Result<(), BitcoinHtlcError> {
        if self.pos != self.bytes.len() {
            return Err(BitcoinHtlcError::InvalidScript(
                "trailing bytes after OP_ENDIF".into(),
            ));
        }
        Ok(())
    }
}

/// Minimal script-number encoding of a locktime: little-endian, trailing
/// zeros stripped, sign-bit padding when the top bit is set.
pub fn encode_locktime(locktime: u32) -> Vec<u8> {
    if locktime == 0 {
        return vec![0x00];
    }

    let mut bytes = locktime.to_le_bytes().to_vec();

    while bytes.len() > 1 && bytes.last() == Some(&0) {
        bytes.pop();
    }

    if bytes.last().map(|b| b & 0x80 != 0).unwrap_or(false) {
        bytes.push(0x00);
    }

    bytes
}

pub fn decode_locktime(bytes: &[u8]) -> u32 {
    let mut value: u32 = 0;
    for (i, &byte) in bytes.iter().enumerate() {
        if i < 4 {
            value |= (byte as u32) << (i * 8);
        }
    }
    value
}

// ============ bech32 ============

const BECH32_CHARSET: &[u8] = b"qpzry9x8gf2tvdw0s3jn54khce6mua7l";

fn bech32_polymod(values: &[u8]) -> u32 {
    let generator: [u32; 5] = [0x3b6a57b2, 0x26508e6d, 0x1ea119fa, 0x3d4233dd, 0x2a1462b3];
    let mut chk: u32 = 1;

    for v in values {
        let top = chk >> 25;
        chk = ((chk & 0x1ffffff) << 5) ^ (*v as u32);
        for (i, g) in generator.iter().enumerate() {
            if (top >> i) & 1 == 1 {
                chk ^= g;
            }
        }
    }

    chk
}

fn bech32_hrp_expand(hrp: &str) -> Vec<u8> {
    let mut values: Vec<u8> = hrp.bytes().map(|b| b >> 5).collect();
    values.push(0);
    values.extend(hrp.bytes().map(|b| b & 0x1f));
    values
}

fn bech32_create_checksum(hrp: &str, data: &[u8]) -> Vec<u8> {
    let mut values = bech32_hrp_expand(hrp);
    values.extend(data);
    values.extend(vec![0u8; 6]);

    let polymod = bech32_polymod(&values) ^ 1;

    (0..6)
        .map(|i| ((polymod >> (5 * (5 - i))) & 31) as u8)
        .collect()
}

fn convert_bits(data: &[u8], from_bits: u32, to_bits: u32, pad: bool) -> Result<Vec<u8>, String> {
    let mut acc: u32 = 0;
    let mut bits: u32 = 0;
    let mut ret = Vec::new();
    let maxv: u32 = (1 << to_bits) - 1;

    for value in data {
        acc = (acc << from_bits) | (*value as u32);
        bits += from_bits;
        while bits >= to_bits {
            bits -= to_bits;
            ret.push(((acc >> bits) & maxv) as u8);
        }
    }

    if pad {
        if bits > 0 {
            ret.push(((acc << (to_bits - bits)) & maxv) as u8);
        }
    } else if bits >= from_bits || ((acc << (to_bits - bits)) & maxv) != 0 {
        return Err("invalid padding".to_string());
    }

    Ok(ret)
}

fn bech32_encode(
    hrp: &str,
    program: &[u8],
    witness_version: u8,
) -> Result<String, BitcoinHtlcError> {
    let mut values = vec![witness_version];
    values.extend(convert_bits(program, 8, 5, true).map_err(BitcoinHtlcError::AddressEncoding)?);

    let checksum = bech32_create_checksum(hrp, &values);
    values.extend(checksum);

    let mut result = String::from(hrp);
    result.push('1');
    for v in values {
        result.push(BECH32_CHARSET[v as usize] as char);
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_script() -> HtlcScript {
        HtlcScript::new([0xab; 32], 800_000, [0x02; 33], [0x03; 33])
    }

    #[test]
    fn test_script_layout() {
        let script = sample_script().to_bytes();

        assert_eq!(script[0], opcodes::OP_IF);
        assert_eq!(script[1], opcodes::OP_SHA256);
        assert_eq!(script[2], 32);
        assert_eq!(&script[3..35], &[0xab; 32]);
        assert_eq!(*script.last().unwrap(), opcodes::OP_ENDIF);
    }

    #[test]
    fn test_parse_roundtrip() {
        let script = sample_script();
        let parsed = HtlcScript::parse(&script.to_bytes()).unwrap();
        assert_eq!(parsed, script);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(HtlcScript::parse(&[]).is_err());
        assert!(HtlcScript::parse(&[opcodes::OP_IF, 0x99]).is_err());

        let mut truncated = sample_script().to_bytes();
        truncated.pop();
        assert!(HtlcScript::parse(&truncated).is_err());

        let mut trailing = sample_script().to_bytes();
        trailing.push(0x00);
        assert!(HtlcScript::parse(&trailing).is_err());
    }

    #[test]
    fn test_locktime_minimal_encoding() {
        assert_eq!(encode_locktime(0), vec![0x00]);
        assert_eq!(encode_locktime(1), vec![0x01]);
        assert_eq!(encode_locktime(0x80), vec![0x80, 0x00]);
        assert_eq!(encode_locktime(500_000), vec![0x20, 0xa1, 0x07]);

        for locktime in [1u32, 0x7f, 0x80, 0xffff, 500_000, 0x7fff_ffff] {
            assert_eq!(decode_locktime(&encode_locktime(locktime)), locktime);
        }
    }

    #[test]
    fn test_distinct_inputs_distinct_addresses() {
        let a = sample_script();
        let b = HtlcScript::new([0xcd; 32], 800_000, [0x02; 33], [0x03; 33]);
        let c = HtlcScript::new([0xab; 32], 900_000, [0x02; 33], [0x03; 33]);

        assert_ne!(a.to_bytes(), b.to_bytes());
        assert_ne!(a.to_bytes(), c.to_bytes());

        for net in [Network::Mainnet, Network::Testnet] {
            for ty in [AddressType::P2sh, AddressType::P2wsh] {
                let addr_a = a.address(net, ty).unwrap();
                let addr_b = b.address(net, ty).unwrap();
                assert_ne!(addr_a, addr_b);
            }
        }
    }

    #[test]
    fn test_p2wsh_address_shape() {
        let addr = sample_script()
            .address(Network::Mainnet, AddressType::P2wsh)
            .unwrap();
        assert!(addr.starts_with("bc1q"));
        // hrp + separator + version + 52 program chars + 6 checksum chars
        assert_eq!(addr.len(), 2 + 1 + 1 + 52 + 6);
    }

    #[test]
    fn test_validate_redeem_path() {
        let secret = [0x11u8; 32];
        let hash = crate::hash_secret(&secret);
        let script = HtlcScript::new(hash, 800_000, [0x02; 33], [0x03; 33]);

        assert!(script.validate(SpendPath::Redeem, Some(&secret), &[0x03; 33], None));
        // Wrong secret
        assert!(!script.validate(SpendPath::Redeem, Some(&[0x22; 32]), &[0x03; 33], None));
        // Sender key on the redeem branch
        assert!(!script.validate(SpendPath::Redeem, Some(&secret), &[0x02; 33], None));
        // Missing secret
        assert!(!script.validate(SpendPath::Redeem, None, &[0x03; 33], None));
    }

    #[test]
    fn test_validate_refund_path() {
        let script = sample_script();

        // Not yet mature, including the boundary
        assert!(!script.validate(SpendPath::Refund, None, &[0x02; 33], Some(799_999)));
        assert!(!script.validate(SpendPath::Refund, None, &[0x02; 33], Some(800_000)));
        // Mature, sender key
        assert!(script.validate(SpendPath::Refund, None, &[0x02; 33], Some(800_001)));
        // Mature, wrong key
        assert!(!script.validate(SpendPath::Refund, None, &[0x03; 33], Some(800_001)));
    }
}
