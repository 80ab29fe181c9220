//! # Inbound Ports (Driving Ports / API)
//!
//! The identity a Pipe signs its requests with. Implementations must be
//! thread-safe (`Send + Sync`) because one Pipe signs concurrent sends.

use crate::domain::account::LocalAccount;
use crate::domain::entities::RecoverableSignature;
use crate::domain::errors::SignatureError;
use pipe_types::{Address, Hash, RequestId};

/// Signs request ids on behalf of one address.
pub trait RequestSigner: Send + Sync {
    /// Address every signature from this signer recovers to.
    fn address(&self) -> Address;

    /// Produce a detached signature over `id` and the hash it covers.
    fn sign_request_id(
        &self,
        id: &RequestId,
    ) -> Result<(RecoverableSignature, Hash), SignatureError>;
}

impl RequestSigner for LocalAccount {
    fn address(&self) -> Address {
        LocalAccount::address(self)
    }

    fn sign_request_id(
        &self,
        id: &RequestId,
    ) -> Result<(RecoverableSignature, Hash), SignatureError> {
        LocalAccount::sign_request_id(self, id)
    }
}
