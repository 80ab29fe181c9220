//! # Pipe Types Crate
//!
//! Data model for Pipe calls: the request and response records, the
//! identifiers that correlate them, and the rules for telling the two
//! envelope kinds apart when they arrive as untyped JSON.
//!
//! ## Design Principles
//!
//! - **Pure data**: nothing in this crate performs I/O.
//! - **Single correlation key**: a [`Response`] is matched to its [`Request`]
//!   by [`RequestId`] alone; there is no transport-level envelope id.
//! - **Structural classification**: an inbound document is a request when it
//!   carries `requester`, and a response when it carries `id` and `code`
//!   without `requester`. See [`Envelope::classify`].

pub mod address;
pub mod envelope;
pub mod environment;
pub mod errors;
pub mod hashing;
pub mod request;
pub mod response;

pub use address::Address;
pub use envelope::Envelope;
pub use environment::Environment;
pub use errors::{AddressError, ParseError};
pub use hashing::{keccak256, Hash};
pub use request::{
    Method, Request, RequestId, SendRequest, DEFAULT_TIMEOUT_MS, SIGNATURE_HASH_HEADER,
    SIGNATURE_HEADER,
};
pub use response::{Response, ResponseCode};
