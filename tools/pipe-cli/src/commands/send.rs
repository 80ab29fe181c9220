//! `pipe send`: one call over HTTP.

use crate::config::CliConfig;
use crate::error::CliError;
use pipe_core::Pipe;
use pipe_http::{HttpPipe, HttpPipeConfig};
use pipe_types::{Environment, Method, Response, SendRequest};
use serde_json::Value;
use std::sync::Arc;

pub struct SendArgs {
    pub to: String,
    pub method: String,
    pub path: String,
    pub body: Option<String>,
    pub params: Option<String>,
    /// Seconds
    pub timeout: Option<u64>,
}

/// Turn raw arguments into a request.
pub fn build_request(args: &SendArgs) -> Result<SendRequest, CliError> {
    let method: Method = args.method.parse().map_err(|e| CliError::InvalidArgument {
        name: "method",
        reason: format!("{e}"),
    })?;

    let mut request = SendRequest::new(method, args.path.clone());
    if let Some(body) = &args.body {
        let body: Value = serde_json::from_str(body).map_err(|e| CliError::InvalidArgument {
            name: "body",
            reason: e.to_string(),
        })?;
        request = request.with_body(body);
    }
    if let Some(params) = &args.params {
        for (key, value) in parse_params(params)? {
            request = request.with_param(key, value);
        }
    }
    if let Some(secs) = args.timeout {
        if secs == 0 {
            return Err(CliError::InvalidArgument {
                name: "timeout",
                reason: "must be at least 1 second".into(),
            });
        }
        request = request.with_timeout(secs.saturating_mul(1_000));
    }
    Ok(request)
}

/// A JSON object of scalars; values are sent as strings.
fn parse_params(raw: &str) -> Result<Vec<(String, String)>, CliError> {
    let invalid = |reason: String| CliError::InvalidArgument {
        name: "params",
        reason,
    };
    let value: Value = serde_json::from_str(raw).map_err(|e| invalid(e.to_string()))?;
    let Value::Object(map) = value else {
        return Err(invalid("expected a JSON object".into()));
    };

    map.into_iter()
        .filter(|(_, v)| !v.is_null())
        .map(|(key, value)| match value {
            Value::String(s) => Ok((key, s)),
            Value::Bool(_) | Value::Number(_) => Ok((key, value.to_string())),
            _ => Err(invalid(format!("{key} must be a string, number or boolean"))),
        })
        .collect()
}

pub async fn run(
    config: &CliConfig,
    args: SendArgs,
    env: Environment,
) -> Result<Response, CliError> {
    let request = build_request(&args)?;
    let (account, _) = crate::account::load_or_create(config)?;

    let http = HttpPipeConfig {
        listen: None,
        ..config.http.clone()
    };
    let pipe = HttpPipe::new(Arc::new(account), http)?;
    pipe.init(env).await?;
    let result = pipe.send(&args.to, request).await;
    pipe.close().await?;
    Ok(result?)
}

/// Print a response the way `pipe send` shows it.
pub fn render(response: &Response) -> String {
    let mut out = format!("Response {}", response.code);
    if let Some(body) = &response.body {
        let pretty = serde_json::to_string_pretty(body).unwrap_or_else(|_| body.to_string());
        out.push('\n');
        out.push_str(&pretty);
    }
    out
}
