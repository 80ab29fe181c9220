//! # Request Processor
//!
//! Turns one inbound Request into exactly one Response. Shared by every
//! transport.
//!
//! | Failure | Code | Body message |
//! |---|---|---|
//! | request-shaped but undecodable | BAD_REQUEST | `Invalid request envelope: <reason>` |
//! | no auth headers | NOT_AUTHORIZED | `Request doesn't include a signature` |
//! | bad or mismatched signature | NOT_AUTHORIZED | `Request has an invalid signature` |
//! | no route | NOT_FOUND | `<METHOD> <path> is not found` |
//! | handler returned [`RouteError`] | its code | its body |
//! | any other handler error or panic | INTERNAL_SERVER_ERROR | `Internal server error` |
//!
//! Internal error details are logged, never sent.

use crate::domain::error::RouteError;
use crate::domain::router::Router;
use futures::FutureExt;
use pipe_signature::SignatureError;
use pipe_types::{Request, RequestId, Response, ResponseCode};
use serde_json::json;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, error};

pub const MISSING_SIGNATURE_MESSAGE: &str = "Request doesn't include a signature";
pub const INVALID_SIGNATURE_MESSAGE: &str = "Request has an invalid signature";
pub const INTERNAL_ERROR_MESSAGE: &str = "Internal server error";

/// Authenticates, routes and runs inbound requests.
#[derive(Clone)]
pub struct RequestProcessor {
    router: Arc<Router>,
}

impl RequestProcessor {
    pub fn new(router: Arc<Router>) -> Self {
        Self { router }
    }

    pub fn router(&self) -> &Arc<Router> {
        &self.router
    }

    /// Answer to a request whose `id` is readable but whose envelope is not.
    pub fn reject_malformed(id: RequestId, reason: &str) -> Response {
        debug!(request_id = %id, reason, "Rejected malformed request envelope");
        Response::error(
            id,
            ResponseCode::BadRequest,
            format!("Invalid request envelope: {reason}"),
        )
    }

    /// Produce the Response for `request`. Never fails.
    pub async fn process(&self, mut request: Request) -> Response {
        request.normalize();
        let id = request.id;

        if let Err(err) = pipe_signature::authenticate(&request) {
            let message = match err {
                SignatureError::MissingSignature => MISSING_SIGNATURE_MESSAGE,
                _ => INVALID_SIGNATURE_MESSAGE,
            };
            debug!(request_id = %id, error = %err, "Rejected unauthenticated request");
            return Response::error(id, ResponseCode::NotAuthorized, message);
        }

        let Some((handler, path_params)) = self.router.dispatch(request.method, &request.path)
        else {
            return Response::error(
                id,
                ResponseCode::NotFound,
                format!("{} {} is not found", request.method, request.path),
            );
        };
        request.path_params = path_params;

        let method = request.method;
        let path = request.path.clone();
        debug!(
            request_id = %id,
            %method,
            path = %path,
            requester = %request.requester,
            "Dispatching request"
        );

        match AssertUnwindSafe(handler(request)).catch_unwind().await {
            Ok(Ok(result)) => {
                Response::new(id, result.code.unwrap_or(ResponseCode::Ok), result.body)
            }
            Ok(Err(err)) => {
                let route_error = err.chain().find_map(|e| e.downcast_ref::<RouteError>());
                if let Some(route_error) = route_error {
                    let body = route_error
                        .body
                        .clone()
                        .unwrap_or_else(|| json!({ "message": route_error.code.name() }));
                    return Response::new(id, route_error.code, Some(body));
                }
                error!(
                    request_id = %id,
                    %method,
                    path = %path,
                    error = ?err,
                    "Unhandled route error"
                );
                Response::error(id, ResponseCode::InternalServerError, INTERNAL_ERROR_MESSAGE)
            }
            Err(panic) => {
                let detail = panic
                    .downcast_ref::<&str>()
                    .map(|s| (*s).to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_default();
                error!(
                    request_id = %id,
                    %method,
                    path = %path,
                    panic = %detail,
                    "Route handler panicked"
                );
                Response::error(id, ResponseCode::InternalServerError, INTERNAL_ERROR_MESSAGE)
            }
        }
    }
}
