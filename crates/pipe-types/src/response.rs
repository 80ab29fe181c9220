//! Response envelope and outcome codes.

use crate::errors::ParseError;
use crate::request::RequestId;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;

/// Outcome of a request. Serialized as the numeric HTTP-style status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub enum ResponseCode {
    Ok,
    BadRequest,
    NotAuthorized,
    NotFound,
    InternalServerError,
}

impl ResponseCode {
    pub const fn as_u16(self) -> u16 {
        match self {
            ResponseCode::Ok => 200,
            ResponseCode::BadRequest => 400,
            ResponseCode::NotAuthorized => 401,
            ResponseCode::NotFound => 404,
            ResponseCode::InternalServerError => 500,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            ResponseCode::Ok => "OK",
            ResponseCode::BadRequest => "BAD_REQUEST",
            ResponseCode::NotAuthorized => "NOT_AUTHORIZED",
            ResponseCode::NotFound => "NOT_FOUND",
            ResponseCode::InternalServerError => "INTERNAL_SERVER_ERROR",
        }
    }

    pub fn is_ok(self) -> bool {
        self == ResponseCode::Ok
    }
}

impl TryFrom<u16> for ResponseCode {
    type Error = ParseError;

    fn try_from(code: u16) -> Result<Self, Self::Error> {
        match code {
            200 => Ok(ResponseCode::Ok),
            400 => Ok(ResponseCode::BadRequest),
            401 => Ok(ResponseCode::NotAuthorized),
            404 => Ok(ResponseCode::NotFound),
            500 => Ok(ResponseCode::InternalServerError),
            other => Err(ParseError::UnknownResponseCode(other)),
        }
    }
}

impl From<ResponseCode> for u16 {
    fn from(code: ResponseCode) -> Self {
        code.as_u16()
    }
}

impl fmt::Display for ResponseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.as_u16(), self.name())
    }
}

/// A response envelope. `id` is copied from the request it answers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub id: RequestId,
    pub code: ResponseCode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

impl Response {
    pub fn new(id: RequestId, code: ResponseCode, body: Option<Value>) -> Self {
        Self { id, code, body }
    }

    pub fn ok(id: RequestId, body: Option<Value>) -> Self {
        Self::new(id, ResponseCode::Ok, body)
    }

    /// Error response with a `{"message": ...}` body.
    pub fn error(id: RequestId, code: ResponseCode, message: impl Into<String>) -> Self {
        Self::new(id, code, Some(json!({ "message": message.into() })))
    }

    /// The `message` field of an error body, if any.
    pub fn message(&self) -> Option<&str> {
        self.body.as_ref()?.get("message")?.as_str()
    }
}
