//! # Pipe HTTP Crate
//!
//! The Pipe contract over synchronous HTTP. Requests are POSTed as JSON
//! envelopes to `<target>/pipe`; the reply body is the Response envelope.
//! Inbound envelopes go through the same [`RequestProcessor`](pipe_core::RequestProcessor)
//! as the messaging transport, so authentication, routing and error mapping
//! behave identically.

pub mod config;
pub mod server;
pub mod service;

pub use config::HttpPipeConfig;
pub use server::{build_router, spawn_server, HEALTH_PATH, PIPE_PATH};
pub use service::{endpoint_for, HttpPipe};
