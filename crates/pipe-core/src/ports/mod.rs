//! # Ports Layer
//!
//! - `inbound`: the Pipe contract callers drive
//! - `outbound`: the messaging network the messaging Pipe drives

pub mod inbound;
pub mod outbound;
