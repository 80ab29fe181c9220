//! # Request Authentication Service
//!
//! Attaches the authentication headers to outgoing requests and checks them
//! on incoming ones.
//!
//! A request is authentic iff both headers are present, the signature
//! recovers to an address, and that address equals `requester`.

use crate::domain::ecdsa;
use crate::domain::entities::{hash_to_hex, parse_hash, RecoverableSignature};
use crate::domain::errors::SignatureError;
use crate::ports::inbound::RequestSigner;
use pipe_types::{Address, Request, SIGNATURE_HASH_HEADER, SIGNATURE_HEADER};
use tracing::debug;

/// Sign `request.id` and insert the signature and hash headers.
pub fn sign_request(
    signer: &dyn RequestSigner,
    request: &mut Request,
) -> Result<(), SignatureError> {
    let (signature, hash) = signer.sign_request_id(&request.id)?;
    request
        .headers
        .insert(SIGNATURE_HEADER.to_string(), signature.to_hex());
    request
        .headers
        .insert(SIGNATURE_HASH_HEADER.to_string(), hash_to_hex(&hash));
    Ok(())
}

/// Verify the authentication headers of `request`.
///
/// Returns the recovered signer address, which equals `request.requester`.
pub fn authenticate(request: &Request) -> Result<Address, SignatureError> {
    let (Some(signature), Some(hash)) = (request.signature(), request.signature_hash()) else {
        debug!(request_id = %request.id, "Request without authentication headers");
        return Err(SignatureError::MissingSignature);
    };

    let signature: RecoverableSignature = signature.parse()?;
    let hash = parse_hash(hash)?;
    let recovered = ecdsa::recover_address(&hash, &signature)?;

    if recovered != request.requester {
        debug!(
            request_id = %request.id,
            requester = %request.requester,
            recovered = %recovered,
            "Signer does not match requester"
        );
        return Err(SignatureError::SignerMismatch {
            expected: request.requester,
            actual: recovered,
        });
    }

    Ok(recovered)
}
