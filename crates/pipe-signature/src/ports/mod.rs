//! # Ports Layer
//!
//! Trait definitions for the signing seam.

pub mod inbound;
