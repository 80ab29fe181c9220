//! Shared fixtures: ready-to-use Pipes on both transports and a common
//! route set, so every scenario can run against either.

use pipe_core::{
    handler, CancelSignal, InMemoryNetwork, MessagingPipe, MessagingPipeConfig, Pipe, RouteError,
};
use pipe_http::{HttpPipe, HttpPipeConfig};
use pipe_signature::LocalAccount;
use pipe_types::{Environment, Method, Request, ResponseCode};
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

pub const ENV: Environment = Environment::Local;

/// A Pipe plus the string other Pipes use to reach it.
pub struct Node<P> {
    pub pipe: P,
    pub target: String,
}

// =============================================================================
// MESSAGING TRANSPORT
// =============================================================================

/// Ephemeral local state under `dir`.
pub fn messaging_config(dir: &Path) -> MessagingPipeConfig {
    let mut config = MessagingPipeConfig::default();
    config.local_store.directory = Some(dir.to_path_buf());
    config
}

/// Initialized messaging Pipe with a fresh identity.
pub async fn messaging_node(network: &Arc<InMemoryNetwork>, dir: &Path) -> Node<MessagingPipe> {
    let account = LocalAccount::random();
    messaging_node_with(network, account, messaging_config(dir), CancelSignal::new()).await
}

pub async fn messaging_node_with(
    network: &Arc<InMemoryNetwork>,
    account: LocalAccount,
    config: MessagingPipeConfig,
    abort: CancelSignal,
) -> Node<MessagingPipe> {
    let pipe = MessagingPipe::with_abort_signal(network.clone(), Arc::new(account), config, abort);
    pipe.init(ENV).await.expect("messaging pipe init");
    let target = pipe.address().to_string();
    Node { pipe, target }
}

// =============================================================================
// HTTP TRANSPORT
// =============================================================================

/// Initialized HTTP Pipe serving on an ephemeral loopback port.
pub async fn http_server() -> Node<HttpPipe> {
    let listen = "127.0.0.1:0".parse().expect("loopback address");
    let pipe = HttpPipe::new(Arc::new(LocalAccount::random()), HttpPipeConfig::listening(listen))
        .expect("http pipe");
    pipe.init(ENV).await.expect("http pipe init");
    let target = pipe
        .local_addr()
        .expect("server bound")
        .to_string();
    Node { pipe, target }
}

/// Initialized client-only HTTP Pipe.
pub async fn http_client() -> HttpPipe {
    http_client_with(CancelSignal::new()).await
}

pub async fn http_client_with(abort: CancelSignal) -> HttpPipe {
    let pipe = HttpPipe::with_abort_signal(
        Arc::new(LocalAccount::random()),
        HttpPipeConfig::default(),
        abort,
    )
    .expect("http pipe");
    pipe.init(ENV).await.expect("http pipe init");
    pipe
}

// =============================================================================
// ROUTES
// =============================================================================

/// Routes shared by the cross-transport scenarios:
///
/// - `GET /whoami`: the authenticated requester
/// - `POST /echo`: body and params back
/// - `GET /items/:id/*rest`: captured path params
/// - `GET /delay/:ms`: answers after `ms` milliseconds
/// - `GET /forbidden`: a typed NOT_AUTHORIZED from the handler
/// - `GET /crash`: a handler fault
pub fn install_routes(pipe: &dyn Pipe) {
    let routes = [
        (
            Method::Get,
            "/whoami",
            handler(|req: Request| async move {
                anyhow::Ok(json!({ "requester": req.requester }))
            }),
        ),
        (
            Method::Post,
            "/echo",
            handler(|req: Request| async move {
                anyhow::Ok(json!({ "body": req.body, "params": req.params }))
            }),
        ),
        (
            Method::Get,
            "/items/:id/*rest",
            handler(|req: Request| async move {
                anyhow::Ok(json!({
                    "id": req.path_param("id"),
                    "rest": req.path_param("rest"),
                }))
            }),
        ),
        (
            Method::Get,
            "/delay/:ms",
            handler(|req: Request| async move {
                let ms: u64 = req.path_param("ms").unwrap_or("0").parse()?;
                tokio::time::sleep(Duration::from_millis(ms)).await;
                anyhow::Ok(json!({ "ms": ms }))
            }),
        ),
        (
            Method::Get,
            "/forbidden",
            handler(|_req| async {
                Err::<(), _>(anyhow::Error::new(RouteError::new(
                    ResponseCode::NotAuthorized,
                    "members only",
                )))
            }),
        ),
        (
            Method::Get,
            "/crash",
            handler(|_req| async { Err::<(), _>(anyhow::anyhow!("connection string leaked")) }),
        ),
    ];

    for (method, pattern, route) in routes {
        pipe.route(method, pattern, route).expect("route registers");
    }
}
