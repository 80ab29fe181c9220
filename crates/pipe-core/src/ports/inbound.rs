//! # Inbound Ports (Driving Ports / API)
//!
//! The Pipe contract every transport implements.

use crate::domain::error::PipeError;
use crate::domain::router::Handler;
use async_trait::async_trait;
use pipe_types::{Address, Environment, Method, Response, SendRequest};

/// Authenticated request/response over some transport.
///
/// Lifecycle: Uninitialized → `init` → Running → `close` → Closed.
/// `send` and `route` fail with [`PipeError::NotInitialized`] before `init`
/// and with [`PipeError::Terminated`] after `close`.
#[async_trait]
pub trait Pipe: Send + Sync {
    /// Identity this Pipe signs requests as.
    fn address(&self) -> Address;

    /// Prepare local state and start receiving.
    async fn init(&self, env: Environment) -> Result<(), PipeError>;

    /// Send a signed request to `to` and wait for its response.
    ///
    /// Fails with [`PipeError::Timeout`] when no response arrives in time and
    /// with [`PipeError::Terminated`] or [`PipeError::Aborted`] when the Pipe
    /// shuts down first.
    async fn send(&self, to: &str, request: SendRequest) -> Result<Response, PipeError>;

    /// Bind `handler` to `method` on `pattern`. Re-binding replaces.
    fn route(&self, method: Method, pattern: &str, handler: Handler) -> Result<(), PipeError>;

    /// Fail pending sends, stop receiving and release local state. Idempotent.
    async fn close(&self) -> Result<(), PipeError>;
}
