//! Local secp256k1 account.

use super::ecdsa::{address_from_pubkey, eip191_hash, sign_prehash};
use super::entities::RecoverableSignature;
use super::errors::SignatureError;
use k256::ecdsa::SigningKey;
use pipe_types::{Address, Hash, RequestId};
use std::fmt;
use zeroize::Zeroizing;

/// An identity holding its private key in memory.
///
/// The key is wiped when the account is dropped.
#[derive(Clone)]
pub struct LocalAccount {
    key: SigningKey,
    address: Address,
}

impl LocalAccount {
    /// Load from a 32-byte `0x`-prefixed (or bare) hex private key.
    pub fn from_private_key(hex_key: &str) -> Result<Self, SignatureError> {
        let hex_key = hex_key.trim();
        let digits = hex_key.strip_prefix("0x").unwrap_or(hex_key);
        let bytes = Zeroizing::new(
            hex::decode(digits).map_err(|e| SignatureError::InvalidPrivateKey(e.to_string()))?,
        );
        let key = SigningKey::from_slice(&bytes)
            .map_err(|_| SignatureError::InvalidPrivateKey("not a valid secp256k1 scalar".into()))?;
        Ok(Self::from_signing_key(key))
    }

    /// Fresh random identity.
    pub fn random() -> Self {
        Self::from_signing_key(SigningKey::random(&mut rand::thread_rng()))
    }

    fn from_signing_key(key: SigningKey) -> Self {
        let address = address_from_pubkey(key.verifying_key());
        Self { key, address }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// `0x`-prefixed hex private key, for persisting a generated account.
    pub fn private_key_hex(&self) -> Zeroizing<String> {
        Zeroizing::new(format!("0x{}", hex::encode(self.key.to_bytes())))
    }

    /// Sign an arbitrary message using the EIP-191 personal-message scheme.
    pub fn sign_message(
        &self,
        message: &[u8],
    ) -> Result<(RecoverableSignature, Hash), SignatureError> {
        let hash = eip191_hash(message);
        let signature = sign_prehash(&hash, &self.key)?;
        Ok((signature, hash))
    }

    /// Sign the string form of a request id.
    pub fn sign_request_id(
        &self,
        id: &RequestId,
    ) -> Result<(RecoverableSignature, Hash), SignatureError> {
        self.sign_message(id.to_string().as_bytes())
    }
}

impl fmt::Debug for LocalAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalAccount")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}
