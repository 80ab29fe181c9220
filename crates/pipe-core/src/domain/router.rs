//! # Router
//!
//! Path pattern → method → handler bindings.
//!
//! ## Pattern syntax
//!
//! - literal segments, compared case-insensitively
//! - `:name` matches exactly one non-empty segment
//! - `*name`, final segment only, matches the rest of the path
//!
//! ## Dispatch order
//!
//! Patterns are tested in registration order and the FIRST structural match
//! decides. If that pattern has no handler for the method, dispatch ends in
//! not-found; later patterns that would also match are never consulted.
//! Callers with overlapping patterns must register the more specific one first.

use crate::domain::error::PipeError;
use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::RwLock;
use pipe_types::{Method, Request, ResponseCode};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::Arc;

/// Application-registered request handler.
pub type Handler =
    Arc<dyn Fn(Request) -> BoxFuture<'static, anyhow::Result<RouteResponse>> + Send + Sync>;

/// Wrap an async closure as a [`Handler`].
pub fn handler<F, Fut, R>(f: F) -> Handler
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<R>> + Send + 'static,
    R: Into<RouteResponse>,
{
    Arc::new(
        move |request: Request| -> BoxFuture<'static, anyhow::Result<RouteResponse>> {
            f(request).map(|result| result.map(Into::into)).boxed()
        },
    )
}

/// What a handler returns. `code` defaults to OK.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RouteResponse {
    pub code: Option<ResponseCode>,
    pub body: Option<Value>,
}

impl RouteResponse {
    pub fn ok(body: Value) -> Self {
        Self {
            code: None,
            body: Some(body),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_code(code: ResponseCode, body: Option<Value>) -> Self {
        Self {
            code: Some(code),
            body,
        }
    }
}

impl From<Value> for RouteResponse {
    fn from(body: Value) -> Self {
        Self::ok(body)
    }
}

impl From<()> for RouteResponse {
    fn from(_: ()) -> Self {
        Self::empty()
    }
}

// =============================================================================
// PATH PATTERNS
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
    Wildcard(String),
}

/// A compiled path pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPattern {
    source: String,
    segments: Vec<Segment>,
}

impl PathPattern {
    /// Compile `pattern`, adding a leading `/` when missing.
    pub fn compile(pattern: &str) -> Result<Self, PipeError> {
        let source = pipe_types::request::normalize_path(pattern.trim());
        let trimmed = strip_trailing_slash(&source);

        let mut segments = Vec::new();
        let mut names: Vec<&str> = Vec::new();
        let raw: Vec<&str> = split_segments(trimmed).collect();

        for (index, part) in raw.iter().enumerate() {
            let segment = if let Some(name) = part.strip_prefix(':') {
                Segment::Param(valid_name(name, &source)?.to_string())
            } else if let Some(name) = part.strip_prefix('*') {
                if index + 1 != raw.len() {
                    return Err(PipeError::InvalidRoute(format!(
                        "{source}: wildcard must be the last segment"
                    )));
                }
                Segment::Wildcard(valid_name(name, &source)?.to_string())
            } else if part.is_empty() {
                return Err(PipeError::InvalidRoute(format!("{source}: empty segment")));
            } else {
                Segment::Literal(part.to_ascii_lowercase())
            };

            if let Segment::Param(name) | Segment::Wildcard(name) = &segment {
                if names.contains(&name.as_str()) {
                    return Err(PipeError::InvalidRoute(format!(
                        "{source}: duplicate parameter '{name}'"
                    )));
                }
            }
            if let Some(name) = part.strip_prefix(':').or_else(|| part.strip_prefix('*')) {
                names.push(name);
            }
            segments.push(segment);
        }

        Ok(Self {
            source: trimmed.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Match a concrete path (without query string), capturing parameters.
    pub fn matches(&self, path: &str) -> Option<BTreeMap<String, String>> {
        let path = strip_trailing_slash(path);
        let parts: Vec<&str> = split_segments(path).collect();
        let mut params = BTreeMap::new();

        for (index, segment) in self.segments.iter().enumerate() {
            match segment {
                Segment::Literal(literal) => {
                    let part = parts.get(index)?;
                    if !part.eq_ignore_ascii_case(literal) {
                        return None;
                    }
                }
                Segment::Param(name) => {
                    let part = parts.get(index)?;
                    if part.is_empty() {
                        return None;
                    }
                    params.insert(name.clone(), (*part).to_string());
                }
                Segment::Wildcard(name) => {
                    let rest = parts.get(index..)?;
                    if rest.is_empty() || rest.iter().any(|p| p.is_empty()) {
                        return None;
                    }
                    params.insert(name.clone(), rest.join("/"));
                    return Some(params);
                }
            }
        }

        (parts.len() == self.segments.len()).then_some(params)
    }
}

fn strip_trailing_slash(path: &str) -> &str {
    if path.len() > 1 {
        path.strip_suffix('/').unwrap_or(path)
    } else {
        path
    }
}

fn split_segments(path: &str) -> impl Iterator<Item = &str> {
    let rest = path.strip_prefix('/').unwrap_or(path);
    rest.split('/').filter({
        let root = rest.is_empty();
        move |_| !root
    })
}

fn valid_name<'a>(name: &'a str, source: &str) -> Result<&'a str, PipeError> {
    if !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Ok(name)
    } else {
        Err(PipeError::InvalidRoute(format!(
            "{source}: invalid parameter name '{name}'"
        )))
    }
}

// =============================================================================
// ROUTER
// =============================================================================

struct RouteEntry {
    pattern: PathPattern,
    handlers: HashMap<Method, Handler>,
}

/// Route table shared by the listening loop and `route` callers.
#[derive(Default)]
pub struct Router {
    routes: RwLock<Vec<RouteEntry>>,
}

impl Router {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `handler` to `method` on `pattern`, replacing any previous binding.
    pub fn register(
        &self,
        method: Method,
        pattern: &str,
        handler: Handler,
    ) -> Result<(), PipeError> {
        let compiled = PathPattern::compile(pattern)?;
        let mut routes = self.routes.write();

        match routes
            .iter_mut()
            .find(|entry| entry.pattern.segments == compiled.segments)
        {
            Some(entry) => {
                entry.handlers.insert(method, handler);
            }
            None => routes.push(RouteEntry {
                pattern: compiled,
                handlers: HashMap::from([(method, handler)]),
            }),
        }
        Ok(())
    }

    /// Find the handler for `method` on `path`, with captured path parameters.
    pub fn dispatch(
        &self,
        method: Method,
        path: &str,
    ) -> Option<(Handler, BTreeMap<String, String>)> {
        let routes = self.routes.read();
        let (entry, params) = routes
            .iter()
            .find_map(|entry| entry.pattern.matches(path).map(|params| (entry, params)))?;
        let handler = entry.handlers.get(&method)?.clone();
        Some((handler, params))
    }

    /// Registered patterns in dispatch order.
    pub fn patterns(&self) -> Vec<String> {
        self.routes
            .read()
            .iter()
            .map(|entry| entry.pattern.as_str().to_string())
            .collect()
    }
}
