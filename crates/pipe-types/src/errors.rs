//! # Error Types
//!
//! Parsing errors for the Pipe data model.

use thiserror::Error;

/// Errors produced while parsing an [`Address`](crate::Address).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AddressError {
    /// Address is not 20 bytes (40 hex characters).
    #[error("Invalid address length: expected 40 hex characters, got {0}")]
    InvalidLength(usize),

    /// Address contains non-hex characters.
    #[error("Invalid address encoding: {0}")]
    InvalidHex(String),
}

/// Errors produced while parsing protocol enums and identifiers.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParseError {
    /// Method is not one of GET, POST, PUT, PATCH, DELETE.
    #[error("Unknown method: {0}")]
    UnknownMethod(String),

    /// Response code is outside the closed set of outcomes.
    #[error("Unknown response code: {0}")]
    UnknownResponseCode(u16),

    /// Environment name is not recognised.
    #[error("Unknown environment: {0}")]
    UnknownEnvironment(String),

    /// Request id is not a valid UUID.
    #[error("Invalid request id: {0}")]
    InvalidRequestId(String),
}
