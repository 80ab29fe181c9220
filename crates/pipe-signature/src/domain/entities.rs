//! # Domain Entities
//!
//! The detached, recoverable signature carried in the `X-Signature` header.

use super::errors::SignatureError;
use pipe_types::Hash;
use std::fmt;
use std::str::FromStr;

/// Recoverable ECDSA signature on the secp256k1 curve.
///
/// Hex form is `0x` followed by `r ‖ s ‖ v` (65 bytes), with `v` in {27, 28}.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecoverableSignature {
    /// R component (32 bytes)
    pub r: [u8; 32],
    /// S component (32 bytes)
    pub s: [u8; 32],
    /// Recovery ID (0, 1, 27, or 28)
    pub v: u8,
}

impl RecoverableSignature {
    /// Serialized length in bytes.
    pub const LEN: usize = 65;

    pub fn to_bytes(&self) -> [u8; 65] {
        let mut out = [0u8; 65];
        out[..32].copy_from_slice(&self.r);
        out[32..64].copy_from_slice(&self.s);
        out[64] = self.v;
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SignatureError> {
        if bytes.len() != Self::LEN {
            return Err(SignatureError::InvalidFormat);
        }
        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        r.copy_from_slice(&bytes[..32]);
        s.copy_from_slice(&bytes[32..64]);
        Ok(Self { r, s, v: bytes[64] })
    }

    /// `0x`-prefixed hex encoding.
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.to_bytes()))
    }
}

impl FromStr for RecoverableSignature {
    type Err = SignatureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = decode_hex(s).ok_or(SignatureError::InvalidFormat)?;
        Self::from_bytes(&bytes)
    }
}

impl fmt::Display for RecoverableSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Parse a `0x`-prefixed (or bare) 32-byte hex digest.
pub fn parse_hash(s: &str) -> Result<Hash, SignatureError> {
    let bytes = decode_hex(s).ok_or(SignatureError::InvalidHash)?;
    bytes.try_into().map_err(|_| SignatureError::InvalidHash)
}

/// `0x`-prefixed hex encoding of a digest.
pub fn hash_to_hex(hash: &Hash) -> String {
    format!("0x{}", hex::encode(hash))
}

fn decode_hex(s: &str) -> Option<Vec<u8>> {
    let s = s.trim();
    let digits = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")).unwrap_or(s);
    hex::decode(digits).ok()
}
