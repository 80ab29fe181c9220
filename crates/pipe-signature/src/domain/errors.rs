//! # Signature Errors
//!
//! Error types for signing and verification operations.

use pipe_types::Address;
use thiserror::Error;

/// Errors that can occur while signing a request or authenticating one.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SignatureError {
    /// One or both authentication headers are absent
    #[error("Request doesn't include a signature")]
    MissingSignature,

    /// The signature format is invalid (wrong length, invalid encoding)
    #[error("Invalid signature format")]
    InvalidFormat,

    /// The signed hash is not 32 bytes of hex
    #[error("Invalid signature hash")]
    InvalidHash,

    /// Signature has high S value (EIP-2 malleability protection)
    #[error("Malleable signature (high S value)")]
    MalleableSignature,

    /// Invalid recovery ID (v must be 0, 1, 27, or 28)
    #[error("Invalid recovery ID: {0}")]
    InvalidRecoveryId(u8),

    /// Failed to recover public key from signature
    #[error("Failed to recover public key")]
    RecoveryFailed,

    /// Recovered signer does not match the claimed requester
    #[error("Signer mismatch: expected {expected}, got {actual}")]
    SignerMismatch { expected: Address, actual: Address },

    /// Private key bytes are not a valid secp256k1 scalar
    #[error("Invalid private key: {0}")]
    InvalidPrivateKey(String),

    /// The signing backend refused to sign
    #[error("Signing failed: {0}")]
    SigningFailed(String),
}
