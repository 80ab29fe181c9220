//! # ECDSA Signing and Recovery (secp256k1)
//!
//! Pure domain logic: EIP-191 message hashing, low-S signing and signer
//! address recovery.
//!
//! ## Security Notes
//!
//! - **Malleability Prevention (EIP-2)**: S must be strictly less than half the curve order
//! - **Scalar Range Validation**: R and S must be in [1, n-1] (enforced by k256)
//! - **No hash recomputation**: recovery works on the hash the sender supplied;
//!   binding that hash to a request is the caller's concern.

use super::entities::RecoverableSignature;
use super::errors::SignatureError;
use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};
use pipe_types::{keccak256, Address, Hash};
use zeroize::Zeroize;

/// secp256k1 curve order n
const SECP256K1_ORDER: [u8; 32] = [
    0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFE,
    0xBA, 0xAE, 0xDC, 0xE6, 0xAF, 0x48, 0xA0, 0x3B, 0xBF, 0xD2, 0x5E, 0x8C, 0xD0, 0x36, 0x41, 0x41,
];

/// n/2
const SECP256K1_HALF_ORDER: [u8; 32] = [
    0x7F, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF,
    0x5D, 0x57, 0x6E, 0x73, 0x57, 0xA4, 0x50, 0x1D, 0xDF, 0xE9, 0x2F, 0x46, 0x68, 0x1B, 0x20, 0xA0,
];

const EIP191_PREFIX: &[u8] = b"\x19Ethereum Signed Message:\n";

// =============================================================================
// HASHING
// =============================================================================

/// EIP-191 personal message hash:
/// `keccak256("\x19Ethereum Signed Message:\n" ‖ len(message) ‖ message)`.
pub fn eip191_hash(message: &[u8]) -> Hash {
    let len = message.len().to_string();
    let mut buf = Vec::with_capacity(EIP191_PREFIX.len() + len.len() + message.len());
    buf.extend_from_slice(EIP191_PREFIX);
    buf.extend_from_slice(len.as_bytes());
    buf.extend_from_slice(message);
    keccak256(&buf)
}

// =============================================================================
// SIGNING
// =============================================================================

/// Sign a 32-byte prehash, normalizing S to the lower half of the curve order.
pub fn sign_prehash(
    message_hash: &Hash,
    key: &SigningKey,
) -> Result<RecoverableSignature, SignatureError> {
    let (sig, recid) = key
        .sign_prehash_recoverable(message_hash)
        .map_err(|e| SignatureError::SigningFailed(e.to_string()))?;

    let sig_bytes = sig.to_bytes();
    let mut r = [0u8; 32];
    let mut s = [0u8; 32];
    r.copy_from_slice(&sig_bytes[..32]);
    s.copy_from_slice(&sig_bytes[32..]);

    // Inverting S flips the parity of the recovered point.
    let (s, recid) = if is_low_s(&s) {
        (s, recid.to_byte())
    } else {
        (invert_s(&s), recid.to_byte() ^ 1)
    };

    Ok(RecoverableSignature { r, s, v: recid + 27 })
}

// =============================================================================
// RECOVERY
// =============================================================================

/// Recover the signer's address from a signature over `message_hash`.
pub fn recover_address(
    message_hash: &Hash,
    signature: &RecoverableSignature,
) -> Result<Address, SignatureError> {
    let recovery_id = parse_recovery_id(signature.v)?;

    if !is_low_s(&signature.s) {
        return Err(SignatureError::MalleableSignature);
    }

    let mut sig_bytes = [0u8; 64];
    sig_bytes[..32].copy_from_slice(&signature.r);
    sig_bytes[32..].copy_from_slice(&signature.s);
    let parsed = Signature::from_slice(&sig_bytes);
    sig_bytes.zeroize();
    let sig = parsed.map_err(|_| SignatureError::InvalidFormat)?;

    let recovered_key = VerifyingKey::recover_from_prehash(message_hash, &sig, recovery_id)
        .map_err(|_| SignatureError::RecoveryFailed)?;

    Ok(address_from_pubkey(&recovered_key))
}

/// Derive an address from a public key.
pub fn address_from_pubkey(public_key: &VerifyingKey) -> Address {
    let pubkey_bytes = public_key.to_encoded_point(false);
    let pubkey_slice = pubkey_bytes.as_bytes();

    // Skip the 0x04 uncompressed-point tag.
    let hash = keccak256(&pubkey_slice[1..]);

    let mut address = [0u8; 20];
    address.copy_from_slice(&hash[12..]);
    Address::new(address)
}

// =============================================================================
// HELPER FUNCTIONS
// =============================================================================

/// S strictly below n/2 (EIP-2).
///
/// Big-endian byte arrays of equal length compare like the integers they encode.
pub fn is_low_s(s: &[u8; 32]) -> bool {
    *s < SECP256K1_HALF_ORDER
}

/// s' = n - s
pub fn invert_s(s: &[u8; 32]) -> [u8; 32] {
    let mut result = [0u8; 32];
    let mut borrow: i32 = 0;

    for i in (0..32).rev() {
        let diff = (SECP256K1_ORDER[i] as i32) - (s[i] as i32) - borrow;
        if diff < 0 {
            result[i] = (diff + 256) as u8;
            borrow = 1;
        } else {
            result[i] = diff as u8;
            borrow = 0;
        }
    }

    result
}

/// Valid v values: 0, 1, 27, 28
fn parse_recovery_id(v: u8) -> Result<RecoveryId, SignatureError> {
    let id = match v {
        0 | 27 => 0,
        1 | 28 => 1,
        _ => return Err(SignatureError::InvalidRecoveryId(v)),
    };

    RecoveryId::try_from(id).map_err(|_| SignatureError::InvalidRecoveryId(v))
}
