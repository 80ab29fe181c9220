//! `pipe serve`: an HTTP Pipe with demo routes.

use crate::config::{ActorRecord, CliConfig};
use crate::error::CliError;
use pipe_core::{handler, Pipe, PipeError, RouteError};
use pipe_http::HttpPipe;
use pipe_throttle::SlidingWindowLimiter;
use pipe_types::{Address, Environment, Method, Request};
use serde_json::json;
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

pub type ActorRegistry = Arc<BTreeMap<Address, ActorRecord>>;

/// Register `GET /ping`, `POST /echo` and `GET /actors/:address` on `pipe`.
pub fn register_demo_routes(
    pipe: &dyn Pipe,
    actors: ActorRegistry,
    limiter: Arc<SlidingWindowLimiter>,
) -> Result<(), PipeError> {
    pipe.route(
        Method::Get,
        "/ping",
        handler(|_req| async { anyhow::Ok(json!({ "message": "pong" })) }),
    )?;

    pipe.route(
        Method::Post,
        "/echo",
        handler(|req: Request| async move {
            anyhow::Ok(json!({
                "requester": req.requester,
                "params": req.params,
                "body": req.body,
            }))
        }),
    )?;

    pipe.route(
        Method::Get,
        "/actors/:address",
        handler(move |req: Request| {
            let actors = actors.clone();
            let limiter = limiter.clone();
            async move {
                let raw = req.path_param("address").unwrap_or_default();
                let address: Address = raw
                    .parse()
                    .map_err(|e| RouteError::bad_request(format!("Invalid address {raw}: {e}")))?;

                let record = limiter.execute(|| async { actors.get(&address).cloned() }).await?;
                let record = record.ok_or_else(|| {
                    RouteError::not_found(format!("Actor {address} is not registered"))
                })?;
                anyhow::Ok(json!({ "address": address, "actor": record }))
            }
        }),
    )?;

    Ok(())
}

pub async fn run(
    config: &CliConfig,
    listen: Option<SocketAddr>,
    env: Environment,
) -> Result<(), CliError> {
    let (account, _) = crate::account::load_or_create(config)?;
    let http = config.serve_http(listen)?;

    let pipe = HttpPipe::new(Arc::new(account), http)?;
    pipe.init(env).await?;

    let limiter = Arc::new(SlidingWindowLimiter::new(
        config.rate_limit.capacity,
        config.rate_limit.window(),
    ));
    register_demo_routes(&pipe, Arc::new(config.actors.clone()), limiter)?;

    info!(
        address = %pipe.address(),
        listen = ?pipe.local_addr(),
        actors = config.actors.len(),
        "Serving. Press Ctrl+C to stop."
    );
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to wait for Ctrl+C; shutting down");
    }

    pipe.close().await?;
    Ok(())
}
