//! Pipe error types.
//!
//! Sender-side failures are raised to the `send` caller as [`PipeError`].
//! Receiver-side failures never surface locally: they become a Response
//! (see [`crate::processor`]). Handlers pick a specific response code by
//! returning a [`RouteError`].

use crate::domain::config::ConfigError;
use crate::ports::outbound::TransportError;
use pipe_signature::SignatureError;
use pipe_types::ResponseCode;
use serde_json::{json, Value};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Errors raised to local Pipe callers.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PipeError {
    /// `send`/`route` called before `init`
    #[error("Pipe is not initialized")]
    NotInitialized,

    /// `init` called twice
    #[error("Pipe is already initialized")]
    AlreadyInitialized,

    /// Pipe was closed, or its message stream ended
    #[error("Pipe terminated: {0}")]
    Terminated(String),

    /// The caller-owned abort signal fired
    #[error("Pipe aborted")]
    Aborted,

    /// No response within the request timeout
    #[error("Request timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    /// Target has no identity on the messaging network
    #[error("Target is not available")]
    TargetUnavailable,

    /// Target string is not a valid address or URL
    #[error("Invalid target: {0}")]
    InvalidTarget(String),

    /// Route pattern failed to compile
    #[error("Invalid route pattern: {0}")]
    InvalidRoute(String),

    /// Reply did not answer the request that was sent
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Signing error: {0}")]
    Signing(String),

    /// Local identity state could not be prepared or released
    #[error("Local state error: {0}")]
    LocalState(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl PipeError {
    /// Shared reason delivered to pending calls when the Pipe closes.
    pub fn closed() -> Self {
        PipeError::Terminated("pipe closed".into())
    }
}

impl From<TransportError> for PipeError {
    fn from(err: TransportError) -> Self {
        PipeError::Transport(err.to_string())
    }
}

impl From<SignatureError> for PipeError {
    fn from(err: SignatureError) -> Self {
        PipeError::Signing(err.to_string())
    }
}

impl From<ConfigError> for PipeError {
    fn from(err: ConfigError) -> Self {
        PipeError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for PipeError {
    fn from(err: serde_json::Error) -> Self {
        PipeError::Serialization(err.to_string())
    }
}

// =============================================================================
// ROUTE ERROR
// =============================================================================

/// Application error a handler returns to answer with a specific code.
///
/// Found anywhere in a handler's `anyhow` error chain.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteError {
    pub code: ResponseCode,
    pub body: Option<Value>,
}

impl RouteError {
    /// Error with a `{"message": ...}` body.
    pub fn new(code: ResponseCode, message: impl Into<String>) -> Self {
        Self {
            code,
            body: Some(json!({ "message": message.into() })),
        }
    }

    /// Error with an arbitrary body.
    pub fn with_body(code: ResponseCode, body: Value) -> Self {
        Self {
            code,
            body: Some(body),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ResponseCode::BadRequest, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ResponseCode::NotFound, message)
    }

    pub fn not_authorized(message: impl Into<String>) -> Self {
        Self::new(ResponseCode::NotAuthorized, message)
    }
}

impl fmt::Display for RouteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.body {
            Some(body) => write!(f, "{}: {}", self.code, body),
            None => write!(f, "{}", self.code),
        }
    }
}

impl std::error::Error for RouteError {}
