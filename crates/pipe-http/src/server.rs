//! # Inbound HTTP Endpoint
//!
//! | Route | Body | Reply |
//! |---|---|---|
//! | `POST /pipe` | Request envelope | 200 + Response envelope |
//! | `POST /pipe` | request-shaped, readable `id`, bad fields | 200 + BAD_REQUEST envelope |
//! | `POST /pipe` | anything else | 400 + `{"message": ...}` |
//! | `GET /health` | | 200 + `{"status": "ok"}` |
//!
//! Every decodable envelope is answered with 200, whatever its Response code:
//! the HTTP status reports framing, the envelope reports the call.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response as HttpResponse},
    routing::{get, post},
    Json, Router,
};
use pipe_core::{CancelSignal, RequestProcessor};
use pipe_types::{Envelope, Request};
use serde_json::{json, Value};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

pub const PIPE_PATH: &str = "/pipe";
pub const HEALTH_PATH: &str = "/health";

/// Build the axum router over `processor`.
pub fn build_router(processor: RequestProcessor) -> Router {
    Router::new()
        .route(PIPE_PATH, post(handle_envelope))
        .route(HEALTH_PATH, get(health_check))
        .with_state(processor)
}

/// Bind `listen` and serve until `shutdown` fires.
///
/// Returns the bound address, which differs from `listen` when it asked for
/// port 0.
pub async fn spawn_server(
    listen: SocketAddr,
    processor: RequestProcessor,
    shutdown: CancelSignal,
) -> std::io::Result<(SocketAddr, JoinHandle<()>)> {
    let listener = TcpListener::bind(listen).await?;
    let local_addr = listener.local_addr()?;
    let router = build_router(processor);

    info!(addr = %local_addr, "Starting HTTP pipe server");
    let handle = tokio::spawn(async move {
        let result = axum::serve(listener, router)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await;
        if let Err(e) = result {
            error!(error = %e, "HTTP pipe server error");
        }
        debug!(addr = %local_addr, "HTTP pipe server stopped");
    });

    Ok((local_addr, handle))
}

async fn handle_envelope(
    State(processor): State<RequestProcessor>,
    body: String,
) -> HttpResponse {
    let reason = match Envelope::classify(&body) {
        Some(Envelope::Request(request)) => {
            return Json(processor.process(request).await).into_response();
        }
        Some(Envelope::Malformed { id, reason }) => {
            return Json(RequestProcessor::reject_malformed(id, &reason)).into_response();
        }
        Some(Envelope::Response(_)) => "expected a request, got a response".to_string(),
        None => match serde_json::from_str::<Request>(&body) {
            Err(e) => e.to_string(),
            Ok(_) => "not a request".to_string(),
        },
    };

    debug!(reason = %reason, "Rejected undecodable envelope");
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "message": format!("Invalid request envelope: {reason}") })),
    )
        .into_response()
}

async fn health_check() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
