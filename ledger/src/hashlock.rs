// ledger/src/hashlock.rs
//! Hashlock primitives - the one-way binding between a secret and its commitment

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Secret/preimage size in bytes
pub const SECRET_SIZE: usize = 32;

/// Commitment hash size in bytes
pub const HASH_SIZE: usize = 32;

/// A swap secret (preimage). Knowledge of it unlocks the redeem path.
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Secret(pub [u8; SECRET_SIZE]);

impl Secret {
    /// Generate a fresh random secret
    pub fn generate() -> Self {
        Secret(rand::random())
    }

    pub fn from_bytes(bytes: [u8; SECRET_SIZE]) -> Self {
        Secret(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; SECRET_SIZE] {
        &self.0
    }
}

// Never log the preimage itself
impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Secret(..)")
    }
}

/// 256-bit hashlock commitment: `H(secret)` under SHA-256
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HashLock(pub [u8; HASH_SIZE]);

impl HashLock {
    /// Commit to a secret
    pub fn of(secret: &Secret) -> Self {
        let digest = Sha256::digest(secret.as_bytes());
        let mut hash = [0u8; HASH_SIZE];
        hash.copy_from_slice(&digest);
        HashLock(hash)
    }

    /// Check whether a revealed secret matches this commitment
    pub fn matches(&self, secret: &Secret) -> bool {
        HashLock::of(secret) == *self
    }

    pub fn from_bytes(bytes: [u8; HASH_SIZE]) -> Self {
        HashLock(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; HASH_SIZE] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Short display for logs
    pub fn short(&self) -> String {
        hex::encode(&self.0[..8])
    }
}

impl std::fmt::Display for HashLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.short())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commitment_deterministic() {
        let secret = Secret::generate();
        assert_eq!(HashLock::of(&secret), HashLock::of(&secret));
    }

    #[test]
    fn test_distinct_secrets_distinct_hashes() {
        let a = Secret::generate();
        let b = Secret::generate();
        assert_ne!(a, b);
        assert_ne!(HashLock::of(&a), HashLock::of(&b));
    }

    #[test]
    fn test_matches() {
        let secret = Secret::generate();
        let lock = HashLock::of(&secret);

        assert!(lock.matches(&secret));
        assert!(!lock.matches(&Secret::generate()));
    }
}
