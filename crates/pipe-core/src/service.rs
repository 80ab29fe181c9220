//! # Messaging Pipe
//!
//! [`Pipe`] over a store-and-forward messaging network.
//!
//! ## Flow
//!
//! ```text
//! send(to, req) ──► resolve conversation (cached) ──► sign id ──► register
//!        ▲                                                          │
//!        │                                                     transmit
//!        │                                                          ▼
//!   PendingCalls ◄── Response ◄── listening loop ◄── message stream
//!                                      │
//!                                 Request ──► spawn: RequestProcessor ──► reply
//! ```
//!
//! One listening loop per instance; each inbound request is processed in its
//! own task so a slow handler never delays the next envelope.

use crate::domain::config::MessagingPipeConfig;
use crate::domain::error::PipeError;
use crate::domain::local_store::LocalStore;
use crate::domain::pending::PendingCalls;
use crate::domain::router::{Handler, Router};
use crate::domain::signal::CancelSignal;
use crate::ports::inbound::Pipe;
use crate::ports::outbound::{
    ClientOptions, Conversation, ConversationId, InboundMessage, MessageStream, MessagingClient,
    MessagingNetwork,
};
use crate::processor::RequestProcessor;
use async_trait::async_trait;
use dashmap::DashMap;
use futures::StreamExt;
use parking_lot::{Mutex, RwLock};
use pipe_signature::RequestSigner;
use pipe_types::{Address, Envelope, Environment, Method, Response, SendRequest};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

type ConversationCell = Arc<OnceCell<Arc<dyn Conversation>>>;

enum PipeState {
    Uninitialized,
    Initializing,
    Running(Arc<dyn MessagingClient>),
    Closed,
}

/// State shared between callers, the listening loop and processing tasks.
struct PipeShared {
    network: Arc<dyn MessagingNetwork>,
    signer: Arc<dyn RequestSigner>,
    config: MessagingPipeConfig,
    state: RwLock<PipeState>,
    processor: RequestProcessor,
    pending: PendingCalls,
    /// Peer address → DM, created lazily and shared by concurrent sends
    conversations: DashMap<Address, ConversationCell>,
    store: Mutex<Option<LocalStore>>,
    shutdown: CancelSignal,
    abort: CancelSignal,
}

/// Pipe over a messaging network.
pub struct MessagingPipe {
    shared: Arc<PipeShared>,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl MessagingPipe {
    pub fn new(
        network: Arc<dyn MessagingNetwork>,
        signer: Arc<dyn RequestSigner>,
        config: MessagingPipeConfig,
    ) -> Self {
        Self::with_abort_signal(network, signer, config, CancelSignal::new())
    }

    /// Like [`new`](Self::new), with a caller-owned abort signal.
    ///
    /// Firing it fails pending sends with [`PipeError::Aborted`], stops the
    /// listening loop and makes later sends fail immediately.
    pub fn with_abort_signal(
        network: Arc<dyn MessagingNetwork>,
        signer: Arc<dyn RequestSigner>,
        config: MessagingPipeConfig,
        abort: CancelSignal,
    ) -> Self {
        Self {
            shared: Arc::new(PipeShared {
                network,
                signer,
                config,
                state: RwLock::new(PipeState::Uninitialized),
                processor: RequestProcessor::new(Arc::new(Router::new())),
                pending: PendingCalls::new(),
                conversations: DashMap::new(),
                store: Mutex::new(None),
                shutdown: CancelSignal::new(),
                abort,
            }),
            listener: Mutex::new(None),
        }
    }

    /// Calls waiting for a response.
    pub fn pending(&self) -> &PendingCalls {
        &self.shared.pending
    }

    /// Inbox id on the messaging network, once running.
    pub fn inbox_id(&self) -> Option<String> {
        match &*self.shared.state.read() {
            PipeState::Running(client) => Some(client.inbox_id()),
            _ => None,
        }
    }

    /// Installation id on the messaging network, once running.
    pub fn installation_id(&self) -> Option<String> {
        match &*self.shared.state.read() {
            PipeState::Running(client) => Some(client.installation_id()),
            _ => None,
        }
    }

    /// Path of the local database, once initialized.
    pub fn db_path(&self) -> Option<std::path::PathBuf> {
        self.shared
            .store
            .lock()
            .as_ref()
            .map(|store| store.db_path().to_path_buf())
    }

    async fn start(&self, env: Environment) -> Result<MessageStream, PipeError> {
        let shared = &self.shared;
        let address = shared.signer.address();
        let store = LocalStore::prepare(&shared.config.local_store, env, &address)?;

        let options = ClientOptions {
            address,
            db_path: store.db_path().to_path_buf(),
            db_encryption_key: zeroize::Zeroizing::new(*store.encryption_key()),
        };
        // Keep the store registered so a failed start can release it.
        *shared.store.lock() = Some(store);

        let client = shared.network.connect(env, options).await?;

        if shared.config.revoke_other_installations {
            let installations = client.installations().await?;
            if installations.len() > 1 {
                info!(
                    address = %address,
                    revoked = installations.len() - 1,
                    "Revoking other installations"
                );
                client.revoke_all_other_installations().await?;
            }
        }

        let stream = client.stream_all_messages().await?;

        let mut state = shared.state.write();
        match *state {
            PipeState::Initializing => {
                *state = PipeState::Running(client);
                Ok(stream)
            }
            // Closed while connecting.
            _ => Err(PipeError::closed()),
        }
    }

    fn release_store(&self) {
        if let Some(store) = self.shared.store.lock().take() {
            store.release();
        }
    }
}

#[async_trait]
impl Pipe for MessagingPipe {
    fn address(&self) -> Address {
        self.shared.signer.address()
    }

    async fn init(&self, env: Environment) -> Result<(), PipeError> {
        self.shared.config.validate()?;
        {
            let mut state = self.shared.state.write();
            match *state {
                PipeState::Uninitialized => *state = PipeState::Initializing,
                PipeState::Closed => return Err(PipeError::closed()),
                PipeState::Initializing | PipeState::Running(_) => {
                    return Err(PipeError::AlreadyInitialized)
                }
            }
        }
        if self.shared.abort.is_cancelled() {
            *self.shared.state.write() = PipeState::Closed;
            return Err(PipeError::Aborted);
        }

        let stream = match self.start(env).await {
            Ok(stream) => stream,
            Err(err) => {
                self.release_store();
                let mut state = self.shared.state.write();
                if matches!(*state, PipeState::Initializing) {
                    *state = PipeState::Uninitialized;
                }
                return Err(err);
            }
        };

        let handle = tokio::spawn(listen(self.shared.clone(), stream));
        *self.listener.lock() = Some(handle);

        info!(
            address = %self.address(),
            env = %env,
            db_path = ?self.db_path(),
            "Messaging pipe initialized"
        );
        Ok(())
    }

    async fn send(&self, to: &str, request: SendRequest) -> Result<Response, PipeError> {
        let shared = &self.shared;
        let client = shared.running_client()?;

        let target: Address = to
            .parse()
            .map_err(|e| PipeError::InvalidTarget(format!("{to}: {e}")))?;
        let conversation = shared.conversation_for(&client, target).await?;

        let timeout = request.timeout_or(shared.config.default_timeout_ms);
        let mut request =
            request.into_request(pipe_types::RequestId::new(), shared.signer.address());
        request.timeout = Some(timeout.as_millis() as u64);
        pipe_signature::sign_request(shared.signer.as_ref(), &mut request)?;

        let id = request.id;
        let payload = serde_json::to_string(&request)?;

        let rx = shared.pending.register(id, request.method, &request.path);
        if let Err(err) = conversation.send(&payload).await {
            shared.pending.cancel(&id);
            return Err(err.into());
        }
        debug!(
            request_id = %id,
            to = %target,
            method = %request.method,
            path = %request.path,
            "Sent request"
        );

        shared
            .pending
            .wait(id, rx, timeout, shared.interrupted())
            .await
    }

    fn route(&self, method: Method, pattern: &str, handler: Handler) -> Result<(), PipeError> {
        match &*self.shared.state.read() {
            PipeState::Running(_) => {}
            PipeState::Closed => return Err(PipeError::closed()),
            PipeState::Uninitialized | PipeState::Initializing => {
                return Err(PipeError::NotInitialized)
            }
        }
        self.shared.processor.router().register(method, pattern, handler)
    }

    async fn close(&self) -> Result<(), PipeError> {
        let previous = std::mem::replace(&mut *self.shared.state.write(), PipeState::Closed);
        let client = match previous {
            PipeState::Closed => return Ok(()),
            PipeState::Running(client) => Some(client),
            PipeState::Uninitialized | PipeState::Initializing => None,
        };

        self.shared.shutdown.cancel();
        let cancelled = self.shared.pending.cancel_all(PipeError::closed());

        if let Some(client) = &client {
            if self.shared.config.revoke_installation {
                revoke_own_installation(client.as_ref()).await;
            }
        }

        let listener = self.listener.lock().take();
        if let Some(handle) = listener {
            if let Err(e) = handle.await {
                warn!(error = %e, "Listening loop ended abnormally");
            }
        }

        self.shared.conversations.clear();
        self.release_store();

        info!(address = %self.address(), cancelled, "Messaging pipe closed");
        Ok(())
    }
}

impl Drop for MessagingPipe {
    fn drop(&mut self) {
        self.shared.shutdown.cancel();
        // No-op after close(); otherwise ephemeral files would outlive the Pipe.
        self.release_store();
    }
}

impl PipeShared {
    fn running_client(&self) -> Result<Arc<dyn MessagingClient>, PipeError> {
        if self.abort.is_cancelled() {
            return Err(PipeError::Aborted);
        }
        match &*self.state.read() {
            PipeState::Running(client) => Ok(client.clone()),
            PipeState::Closed => Err(PipeError::closed()),
            PipeState::Uninitialized | PipeState::Initializing => Err(PipeError::NotInitialized),
        }
    }

    /// Resolves to the reason a pending call must stop waiting.
    async fn interrupted(&self) -> PipeError {
        tokio::select! {
            _ = self.shutdown.cancelled() => PipeError::closed(),
            _ = self.abort.cancelled() => PipeError::Aborted,
        }
    }

    /// DM with `target`, created on first use.
    ///
    /// Concurrent sends to the same peer share one creation; sends to other
    /// peers are not blocked by it.
    async fn conversation_for(
        &self,
        client: &Arc<dyn MessagingClient>,
        target: Address,
    ) -> Result<Arc<dyn Conversation>, PipeError> {
        let cell = self.conversations.entry(target).or_default().clone();
        let conversation = cell
            .get_or_try_init(|| async {
                let inbox = client
                    .inbox_id_for(&target)
                    .await?
                    .ok_or(PipeError::TargetUnavailable)?;
                if let Some(existing) = client.find_dm(&inbox).await? {
                    return Ok(existing);
                }
                debug!(to = %target, inbox_id = %inbox, "Creating conversation");
                Ok::<_, PipeError>(client.new_dm(&inbox).await?)
            })
            .await?;
        Ok(conversation.clone())
    }

    /// Send a response back over the conversation the request came in on,
    /// falling back to a DM with `requester` when that one is gone.
    async fn reply(
        &self,
        conversation_id: ConversationId,
        requester: Option<Address>,
        response: Response,
    ) {
        let client = match self.running_client() {
            Ok(client) => client,
            Err(reason) => {
                debug!(request_id = %response.id, reason = %reason, "Dropping response");
                return;
            }
        };

        let conversation = match client.conversation(&conversation_id).await {
            Ok(Some(conversation)) => conversation,
            _ => {
                let Some(requester) = requester else {
                    warn!(
                        request_id = %response.id,
                        conversation_id = %conversation_id,
                        "Arrival conversation is gone"
                    );
                    return;
                };
                match self.conversation_for(&client, requester).await {
                    Ok(conversation) => conversation,
                    Err(e) => {
                        warn!(
                            request_id = %response.id,
                            requester = %requester,
                            error = %e,
                            "No route back to requester"
                        );
                        return;
                    }
                }
            }
        };

        let payload = match serde_json::to_string(&response) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(request_id = %response.id, error = %e, "Failed to encode response");
                return;
            }
        };
        if let Err(e) = conversation.send(&payload).await {
            warn!(request_id = %response.id, error = %e, "Failed to send response");
        }
    }

    fn handle_message(self: &Arc<Self>, own_inbox: &str, message: InboundMessage) {
        if message.sender_inbox_id == own_inbox {
            return;
        }

        match Envelope::classify(&message.content) {
            Some(Envelope::Request(request)) => {
                let shared = self.clone();
                let conversation_id = message.conversation_id;
                tokio::spawn(async move {
                    let requester = request.requester;
                    let response = shared.processor.process(request).await;
                    shared.reply(conversation_id, Some(requester), response).await;
                });
            }
            Some(Envelope::Malformed { id, reason }) => {
                let shared = self.clone();
                let conversation_id = message.conversation_id;
                tokio::spawn(async move {
                    let response = RequestProcessor::reject_malformed(id, &reason);
                    shared.reply(conversation_id, None, response).await;
                });
            }
            Some(Envelope::Response(response)) => {
                self.pending.resolve(response);
            }
            None => {
                debug!(
                    conversation_id = %message.conversation_id,
                    sender = %message.sender_inbox_id,
                    "Skipping non-envelope message"
                );
            }
        }
    }
}

/// The listening loop. Runs until close, abort, or the stream ends.
async fn listen(shared: Arc<PipeShared>, mut stream: MessageStream) {
    let own_inbox = match shared.running_client() {
        Ok(client) => client.inbox_id(),
        Err(_) => return,
    };
    debug!(inbox_id = %own_inbox, "Listening loop started");

    loop {
        tokio::select! {
            biased;
            _ = shared.shutdown.cancelled() => break,
            _ = shared.abort.cancelled() => {
                shared.pending.cancel_all(PipeError::Aborted);
                break;
            }
            next = stream.next() => match next {
                Some(Ok(message)) => shared.handle_message(&own_inbox, message),
                Some(Err(e)) => warn!(error = %e, "Message stream error"),
                None => {
                    warn!("Message stream ended");
                    shared.pending.cancel_all(PipeError::Terminated("message stream ended".into()));
                    break;
                }
            },
        }
    }

    debug!(inbox_id = %own_inbox, "Listening loop stopped");
}

async fn revoke_own_installation(client: &dyn MessagingClient) {
    let own = client.installation_id();
    match client.installations().await {
        Ok(installations) if installations.len() > 1 => {
            if let Err(e) = client.revoke_installations(&[own.clone()]).await {
                warn!(installation_id = %own, error = %e, "Failed to revoke installation");
            } else {
                info!(installation_id = %own, "Revoked installation");
            }
        }
        Ok(_) => {}
        Err(e) => warn!(error = %e, "Failed to list installations"),
    }
}
