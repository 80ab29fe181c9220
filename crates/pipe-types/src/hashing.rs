//! Keccak-256 hashing shared by address checksums and message signing.

use sha3::{Digest, Keccak256};

/// 32-byte digest.
pub type Hash = [u8; 32];

/// Keccak256 hash function.
pub fn keccak256(data: &[u8]) -> Hash {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    let result = hasher.finalize();
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&result);
    hash
}
