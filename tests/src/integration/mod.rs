//! # Integration Tests
//!
//! Cross-crate behavior of the Pipe contract:
//!
//! - `scenarios`: transport-agnostic checks shared by both transports
//! - `messaging`: MessagingPipe over the in-memory network
//! - `http`: HttpPipe over loopback, plus the CLI demo routes
//! - `security`: forged, unsigned and malformed envelopes
//! - `lifecycle`: close, abort, local state and installations

pub mod lifecycle;
pub mod messaging;
pub mod security;
