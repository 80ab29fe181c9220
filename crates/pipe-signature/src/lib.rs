//! # Pipe Signature Crate
//!
//! Signs Pipe request ids and authenticates inbound requests.
//!
//! ## Architecture
//!
//! - **Domain Layer** (`domain/`): secp256k1 keys, EIP-191 hashing, recovery
//! - **Ports Layer** (`ports/`): the [`RequestSigner`] seam a Pipe signs through
//! - **Service Layer** (`service.rs`): header attachment and request authentication
//!
//! ## Security Notes
//!
//! - **Malleability Prevention (EIP-2)**: signatures are produced and accepted with low S only
//! - **Zero-Trust**: the claimed `requester` is never trusted; it must equal the recovered signer
//! - **Key hygiene**: private keys are wiped from memory on drop

pub mod domain;
pub mod ports;
pub mod service;

// Re-export public API
pub use domain::account::LocalAccount;
pub use domain::ecdsa::{address_from_pubkey, eip191_hash, recover_address};
pub use domain::entities::{hash_to_hex, parse_hash, RecoverableSignature};
pub use domain::errors::SignatureError;
pub use ports::inbound::RequestSigner;
pub use service::{authenticate, sign_request};
