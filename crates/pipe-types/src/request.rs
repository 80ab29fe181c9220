//! # Request Model
//!
//! The Request record as it travels on the wire, the identifier that
//! correlates it with its Response, and the caller-facing [`SendRequest`]
//! that `send` turns into a full Request.

use crate::address::Address;
use crate::errors::ParseError;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

/// Header carrying the detached signature over the request id.
pub const SIGNATURE_HEADER: &str = "X-Signature";

/// Header carrying the hash the signature was computed over.
pub const SIGNATURE_HASH_HEADER: &str = "X-Signature-Hash";

/// Default time a caller waits for a response.
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

// =============================================================================
// REQUEST ID
// =============================================================================

/// Identifier of a single request.
///
/// UUID v7, so ids are time-ordered. The id is both the correlation key
/// between a request and its response and the payload that gets signed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(Uuid);

impl RequestId {
    /// Generate a new request id (UUID v7)
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Parse from string
    pub fn parse(s: &str) -> Result<Self, ParseError> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|_| ParseError::InvalidRequestId(s.to_string()))
    }

    /// Get the underlying UUID
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Get timestamp from UUID v7 (milliseconds since Unix epoch)
    pub fn timestamp_ms(&self) -> Option<u64> {
        let bytes = self.0.as_bytes();
        if (bytes[6] >> 4) != 7 {
            return None;
        }
        let ts = bytes[..6]
            .iter()
            .fold(0u64, |acc, b| (acc << 8) | u64::from(*b));
        Some(ts)
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for RequestId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

// =============================================================================
// METHOD
// =============================================================================

/// Request verb. Serialized upper-case, accepted in any case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE", try_from = "String")]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    /// All supported verbs.
    pub const ALL: [Method; 5] = [
        Method::Get,
        Method::Post,
        Method::Put,
        Method::Patch,
        Method::Delete,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Method::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ParseError::UnknownMethod(s.to_string()))
    }
}

impl TryFrom<String> for Method {
    type Error = ParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

// =============================================================================
// REQUEST
// =============================================================================

/// A request envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    pub id: RequestId,
    pub requester: Address,
    pub method: Method,
    pub path: String,
    /// Named segments captured by the router. Never on the wire.
    #[serde(skip)]
    pub path_params: BTreeMap<String, String>,
    #[serde(
        default,
        skip_serializing_if = "BTreeMap::is_empty",
        deserialize_with = "deserialize_params"
    )]
    pub params: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    /// Milliseconds the sender is willing to wait. `0` means the default.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_timeout"
    )]
    pub timeout: Option<u64>,
}

impl Request {
    /// Ensure the path starts with `/` and move any `?query` suffix into
    /// `params`. Query values override params of the same name.
    pub fn normalize(&mut self) {
        let (path, query) = split_query(&self.path);
        let path = normalize_path(path);

        if let Some(query) = query {
            for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
                self.params.insert(key.into_owned(), value.into_owned());
            }
        }
        self.path = path;
    }

    /// Effective timeout, falling back to [`DEFAULT_TIMEOUT_MS`].
    pub fn timeout_duration(&self) -> Duration {
        effective_timeout(self.timeout, DEFAULT_TIMEOUT_MS)
    }

    pub fn signature(&self) -> Option<&str> {
        self.headers.get(SIGNATURE_HEADER).map(String::as_str)
    }

    pub fn signature_hash(&self) -> Option<&str> {
        self.headers.get(SIGNATURE_HASH_HEADER).map(String::as_str)
    }

    /// Query parameter by name.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    /// Path parameter captured by the matched route.
    pub fn path_param(&self, name: &str) -> Option<&str> {
        self.path_params.get(name).map(String::as_str)
    }
}

/// Prefix `/` when missing.
pub fn normalize_path(path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    }
}

fn split_query(path: &str) -> (&str, Option<&str>) {
    match path.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (path, None),
    }
}

/// Accepts an object whose values are strings or scalars; scalars are
/// stringified, nulls dropped, nested values kept as JSON text.
fn deserialize_params<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<BTreeMap<String, Value>> = Option::deserialize(deserializer)?;
    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .filter_map(|(key, value)| match value {
            Value::Null => None,
            Value::String(s) => Some((key, s)),
            other => Some((key, other.to_string())),
        })
        .collect())
}

/// Accepts any non-negative JSON number of milliseconds, rounding
/// fractions. Negative and null values count as unset.
fn deserialize_timeout<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => Ok(n.as_u64().or_else(|| {
            n.as_f64()
                .filter(|ms| ms.is_finite() && *ms >= 0.0)
                .map(|ms| ms.round() as u64)
        })),
        Some(other) => Err(<D::Error as serde::de::Error>::custom(format!(
            "invalid timeout: {other}"
        ))),
    }
}

fn effective_timeout(timeout: Option<u64>, default_ms: u64) -> Duration {
    Duration::from_millis(timeout.filter(|ms| *ms > 0).unwrap_or(default_ms))
}

// =============================================================================
// SEND REQUEST
// =============================================================================

/// What a caller hands to `send`.
///
/// The transport adds `id`, `requester` and the two authentication headers.
#[derive(Debug, Clone, PartialEq)]
pub struct SendRequest {
    pub method: Method,
    pub path: String,
    pub params: BTreeMap<String, String>,
    pub body: Option<Value>,
    pub headers: BTreeMap<String, String>,
    pub timeout: Option<u64>,
}

impl SendRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            params: BTreeMap::new(),
            body: None,
            headers: BTreeMap::new(),
            timeout: None,
        }
    }

    #[must_use]
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Timeout in milliseconds.
    #[must_use]
    pub fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout = Some(timeout_ms);
        self
    }

    /// Effective timeout, falling back to `default_ms` when unset or zero.
    pub fn timeout_or(&self, default_ms: u64) -> Duration {
        effective_timeout(self.timeout, default_ms)
    }

    /// Stamp the request with its id and requester.
    pub fn into_request(self, id: RequestId, requester: Address) -> Request {
        Request {
            id,
            requester,
            method: self.method,
            path: normalize_path(&self.path),
            path_params: BTreeMap::new(),
            params: self.params,
            body: self.body,
            headers: self.headers,
            timeout: self.timeout,
        }
    }
}
