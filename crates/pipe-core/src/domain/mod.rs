//! # Domain Layer
//!
//! Routing, correlation, cancellation and local state. No network I/O.

pub mod config;
pub mod error;
pub mod local_store;
pub mod pending;
pub mod router;
pub mod signal;
