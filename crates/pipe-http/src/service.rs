//! # HTTP Pipe
//!
//! [`Pipe`] over plain HTTP. `send` is one POST whose reply body is the
//! Response envelope, so no correlation table is needed: the only check is
//! that the reply answers the request that was sent.

use crate::config::HttpPipeConfig;
use crate::server::{spawn_server, PIPE_PATH};
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use pipe_core::{CancelSignal, Handler, Pipe, PipeError, RequestProcessor, Router};
use pipe_signature::RequestSigner;
use pipe_types::{Address, Environment, Method, RequestId, Response, SendRequest};
use reqwest::Client;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HttpState {
    Uninitialized,
    Initializing,
    Running,
    Closed,
}

/// Pipe over HTTP.
pub struct HttpPipe {
    signer: Arc<dyn RequestSigner>,
    config: HttpPipeConfig,
    client: Client,
    processor: RequestProcessor,
    state: RwLock<HttpState>,
    server: Mutex<Option<JoinHandle<()>>>,
    local_addr: Mutex<Option<SocketAddr>>,
    shutdown: CancelSignal,
    abort: CancelSignal,
}

impl HttpPipe {
    pub fn new(signer: Arc<dyn RequestSigner>, config: HttpPipeConfig) -> Result<Self, PipeError> {
        Self::with_abort_signal(signer, config, CancelSignal::new())
    }

    /// Like [`new`](Self::new), with a caller-owned abort signal.
    pub fn with_abort_signal(
        signer: Arc<dyn RequestSigner>,
        config: HttpPipeConfig,
        abort: CancelSignal,
    ) -> Result<Self, PipeError> {
        config.validate()?;
        let client = Client::builder()
            .connect_timeout(config.connect_timeout())
            .build()
            .map_err(|e| PipeError::Transport(e.to_string()))?;

        Ok(Self {
            signer,
            config,
            client,
            processor: RequestProcessor::new(Arc::new(Router::new())),
            state: RwLock::new(HttpState::Uninitialized),
            server: Mutex::new(None),
            local_addr: Mutex::new(None),
            shutdown: CancelSignal::new(),
            abort,
        })
    }

    /// Address the server is bound to, once serving.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock()
    }

    fn check_running(&self) -> Result<(), PipeError> {
        if self.abort.is_cancelled() {
            return Err(PipeError::Aborted);
        }
        match *self.state.read() {
            HttpState::Running => Ok(()),
            HttpState::Closed => Err(PipeError::closed()),
            HttpState::Uninitialized | HttpState::Initializing => Err(PipeError::NotInitialized),
        }
    }

    async fn interrupted(&self) -> PipeError {
        tokio::select! {
            _ = self.shutdown.cancelled() => PipeError::closed(),
            _ = self.abort.cancelled() => PipeError::Aborted,
        }
    }

    async fn exchange(
        &self,
        endpoint: Url,
        payload: String,
        id: RequestId,
    ) -> Result<Response, PipeError> {
        let reply = self
            .client
            .post(endpoint)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(payload)
            .send()
            .await
            .map_err(|e| PipeError::Transport(e.to_string()))?;

        let status = reply.status();
        if !status.is_success() {
            let text = reply.text().await.unwrap_or_default();
            return Err(PipeError::UnexpectedResponse(format!("HTTP {status}: {text}")));
        }

        let response: Response = reply
            .json()
            .await
            .map_err(|e| PipeError::UnexpectedResponse(e.to_string()))?;
        if response.id != id {
            return Err(PipeError::UnexpectedResponse(format!(
                "reply {} does not answer request {id}",
                response.id
            )));
        }
        Ok(response)
    }
}

/// `POST` endpoint for a target given as a base URL or `host:port`.
pub fn endpoint_for(to: &str) -> Result<Url, PipeError> {
    let base = to.trim().trim_end_matches('/');
    if base.is_empty() {
        return Err(PipeError::InvalidTarget("empty target".into()));
    }
    let base = if base.contains("://") {
        base.to_string()
    } else {
        format!("http://{base}")
    };

    let url = Url::parse(&format!("{base}{PIPE_PATH}"))
        .map_err(|e| PipeError::InvalidTarget(format!("{to}: {e}")))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(PipeError::InvalidTarget(format!("unsupported scheme {other}"))),
    }
}

#[async_trait]
impl Pipe for HttpPipe {
    fn address(&self) -> Address {
        self.signer.address()
    }

    async fn init(&self, env: Environment) -> Result<(), PipeError> {
        {
            let mut state = self.state.write();
            match *state {
                HttpState::Uninitialized => *state = HttpState::Initializing,
                HttpState::Initializing | HttpState::Running => {
                    return Err(PipeError::AlreadyInitialized)
                }
                HttpState::Closed => return Err(PipeError::closed()),
            }
        }
        if self.abort.is_cancelled() {
            *self.state.write() = HttpState::Closed;
            return Err(PipeError::Aborted);
        }

        if let Some(listen) = self.config.listen {
            let signal = CancelSignal::new();
            let (local_addr, handle) =
                match spawn_server(listen, self.processor.clone(), signal.clone()).await {
                    Ok(bound) => bound,
                    Err(e) => {
                        let mut state = self.state.write();
                        if *state == HttpState::Initializing {
                            *state = HttpState::Uninitialized;
                        }
                        return Err(PipeError::Transport(format!("bind {listen}: {e}")));
                    }
                };

            // Either of the Pipe's signals stops the server.
            let shutdown = self.shutdown.clone();
            let abort = self.abort.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = shutdown.cancelled() => {}
                    _ = abort.cancelled() => {}
                }
                signal.cancel();
            });

            *self.local_addr.lock() = Some(local_addr);
            *self.server.lock() = Some(handle);
        }

        {
            let mut state = self.state.write();
            if *state != HttpState::Initializing {
                // Closed while binding; close() found no server to stop.
                self.shutdown.cancel();
                return Err(PipeError::closed());
            }
            *state = HttpState::Running;
        }
        info!(
            address = %self.address(),
            env = %env,
            listen = ?self.local_addr(),
            "HTTP pipe initialized"
        );
        Ok(())
    }

    async fn send(&self, to: &str, request: SendRequest) -> Result<Response, PipeError> {
        self.check_running()?;
        let endpoint = endpoint_for(to)?;

        let timeout = request.timeout_or(self.config.default_timeout_ms);
        let mut request = request.into_request(RequestId::new(), self.signer.address());
        request.timeout = Some(timeout.as_millis() as u64);
        pipe_signature::sign_request(self.signer.as_ref(), &mut request)?;

        let id = request.id;
        let payload = serde_json::to_string(&request)?;
        debug!(
            request_id = %id,
            to,
            method = %request.method,
            path = %request.path,
            "Sending request"
        );

        tokio::select! {
            result = tokio::time::timeout(timeout, self.exchange(endpoint, payload, id)) => {
                result.unwrap_or(Err(PipeError::Timeout(timeout)))
            }
            reason = self.interrupted() => Err(reason),
        }
    }

    fn route(&self, method: Method, pattern: &str, handler: Handler) -> Result<(), PipeError> {
        match *self.state.read() {
            HttpState::Running => {}
            HttpState::Closed => return Err(PipeError::closed()),
            HttpState::Uninitialized | HttpState::Initializing => {
                return Err(PipeError::NotInitialized)
            }
        }
        self.processor.router().register(method, pattern, handler)
    }

    async fn close(&self) -> Result<(), PipeError> {
        {
            let mut state = self.state.write();
            if *state == HttpState::Closed {
                return Ok(());
            }
            *state = HttpState::Closed;
        }
        self.shutdown.cancel();

        let server = self.server.lock().take();
        if let Some(handle) = server {
            let abort = handle.abort_handle();
            if tokio::time::timeout(self.config.shutdown_grace(), handle).await.is_err() {
                warn!("HTTP pipe server did not stop in time; aborting");
                abort.abort();
            }
        }

        info!(address = %self.address(), "HTTP pipe closed");
        Ok(())
    }
}
