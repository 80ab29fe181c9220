//! # In-Memory Messaging Network
//!
//! A process-local implementation of the messaging ports, used for `local`
//! development and tests.
//!
//! Behaves like the real network where the Pipe layer can tell:
//! - one isolated deployment per [`Environment`]
//! - each connect registers the address's inbox and a new installation
//! - a DM message is delivered to every live installation of BOTH members,
//!   including the sending one, so senders see their own messages
//! - revoking an installation ends its message stream
//! - the local database at `db_path` is bound to the key that created it;
//!   reopening it with another key fails

use crate::ports::outbound::{
    ClientOptions, Conversation, ConversationId, InboundMessage, InboxId, InstallationId,
    MessageStream, MessagingClient, MessagingNetwork, TransportError,
};
use async_trait::async_trait;
use futures::channel::mpsc;
use futures::StreamExt;
use parking_lot::Mutex;
use pipe_types::{keccak256, Address, Environment};
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracing::debug;
use uuid::Uuid;

type StreamSender = mpsc::UnboundedSender<Result<InboundMessage, TransportError>>;

struct Installation {
    inbox_id: InboxId,
    db_path: PathBuf,
    stream: Option<StreamSender>,
    revoked: bool,
}

#[derive(Default)]
struct DeploymentState {
    inboxes: HashMap<Address, InboxId>,
    installations: HashMap<InstallationId, Installation>,
    /// DM id → its two members
    dms: HashMap<ConversationId, [InboxId; 2]>,
}

struct Deployment {
    env: Environment,
    state: Mutex<DeploymentState>,
}

impl Deployment {
    fn ensure_active(&self, installation: &InstallationId) -> Result<(), TransportError> {
        let state = self.state.lock();
        match state.installations.get(installation) {
            Some(i) if !i.revoked => Ok(()),
            _ => Err(TransportError::Revoked),
        }
    }
}

/// In-memory messaging network.
pub struct InMemoryNetwork {
    deployments: Mutex<HashMap<Environment, Arc<Deployment>>>,
    dm_delay: Duration,
}

impl InMemoryNetwork {
    #[must_use]
    pub fn new() -> Self {
        Self {
            deployments: Mutex::new(HashMap::new()),
            dm_delay: Duration::ZERO,
        }
    }

    /// Delay every DM creation, to exercise slow conversation setup.
    #[must_use]
    pub fn with_dm_delay(mut self, delay: Duration) -> Self {
        self.dm_delay = delay;
        self
    }

    fn deployment(&self, env: Environment) -> Arc<Deployment> {
        self.deployments
            .lock()
            .entry(env)
            .or_insert_with(|| {
                Arc::new(Deployment {
                    env,
                    state: Mutex::new(DeploymentState::default()),
                })
            })
            .clone()
    }

    /// Inbox registered for `address` on `env`.
    pub fn inbox_of(&self, env: Environment, address: &Address) -> Option<InboxId> {
        self.deployment(env).state.lock().inboxes.get(address).cloned()
    }

    /// Live installations of `address` on `env`.
    pub fn live_installations(&self, env: Environment, address: &Address) -> usize {
        let deployment = self.deployment(env);
        let state = deployment.state.lock();
        let Some(inbox) = state.inboxes.get(address) else {
            return 0;
        };
        state
            .installations
            .values()
            .filter(|i| &i.inbox_id == inbox && !i.revoked)
            .count()
    }
}

impl Default for InMemoryNetwork {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessagingNetwork for InMemoryNetwork {
    async fn connect(
        &self,
        env: Environment,
        options: ClientOptions,
    ) -> Result<Arc<dyn MessagingClient>, TransportError> {
        let resumed = open_database(&options.db_path, &options.db_encryption_key).await?;
        let deployment = self.deployment(env);

        let (inbox_id, installation_id) = {
            let mut state = deployment.state.lock();
            let inbox_id = state
                .inboxes
                .entry(options.address)
                .or_insert_with(|| inbox_id_for_address(&options.address))
                .clone();

            let existing = resumed
                .then(|| {
                    state
                        .installations
                        .iter()
                        .find(|(_, i)| i.db_path == options.db_path && !i.revoked)
                        .map(|(id, _)| id.clone())
                })
                .flatten();

            let installation_id = match existing {
                Some(id) => id,
                None => {
                    let id = Uuid::new_v4().to_string();
                    state.installations.insert(
                        id.clone(),
                        Installation {
                            inbox_id: inbox_id.clone(),
                            db_path: options.db_path.clone(),
                            stream: None,
                            revoked: false,
                        },
                    );
                    id
                }
            };
            (inbox_id, installation_id)
        };

        debug!(
            env = %env,
            address = %options.address,
            inbox_id = %inbox_id,
            installation_id = %installation_id,
            "Connected in-memory messaging client"
        );

        Ok(Arc::new(InMemoryClient {
            deployment,
            inbox_id,
            installation_id,
            dm_delay: self.dm_delay,
        }))
    }
}

/// Bind the database file to `key`. Returns whether it already existed.
async fn open_database(path: &Path, key: &[u8; 32]) -> Result<bool, TransportError> {
    let fingerprint = hex::encode(keccak256(key));
    match tokio::fs::read_to_string(path).await {
        Ok(existing) if existing.trim() == fingerprint => Ok(true),
        Ok(_) => Err(TransportError::Connect(format!(
            "local database {} was created with a different key",
            path.display()
        ))),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            tokio::fs::write(path, &fingerprint)
                .await
                .map_err(|e| {
                    TransportError::Connect(format!("cannot create {}: {e}", path.display()))
                })?;
            Ok(false)
        }
        Err(e) => Err(TransportError::Connect(format!(
            "cannot open {}: {e}",
            path.display()
        ))),
    }
}

fn inbox_id_for_address(address: &Address) -> InboxId {
    hex::encode(keccak256(address.as_bytes()))
}

fn dm_id(a: &InboxId, b: &InboxId) -> ConversationId {
    if a <= b {
        format!("dm:{a}:{b}")
    } else {
        format!("dm:{b}:{a}")
    }
}

// =============================================================================
// CLIENT
// =============================================================================

struct InMemoryClient {
    deployment: Arc<Deployment>,
    inbox_id: InboxId,
    installation_id: InstallationId,
    dm_delay: Duration,
}

impl InMemoryClient {
    fn conversation_handle(&self, id: ConversationId) -> Arc<dyn Conversation> {
        Arc::new(InMemoryConversation {
            deployment: self.deployment.clone(),
            id,
            sender_inbox: self.inbox_id.clone(),
            sender_installation: self.installation_id.clone(),
        })
    }
}

#[async_trait]
impl MessagingClient for InMemoryClient {
    fn inbox_id(&self) -> InboxId {
        self.inbox_id.clone()
    }

    fn installation_id(&self) -> InstallationId {
        self.installation_id.clone()
    }

    async fn inbox_id_for(&self, address: &Address) -> Result<Option<InboxId>, TransportError> {
        self.deployment.ensure_active(&self.installation_id)?;
        Ok(self.deployment.state.lock().inboxes.get(address).cloned())
    }

    async fn find_dm(
        &self,
        inbox: &InboxId,
    ) -> Result<Option<Arc<dyn Conversation>>, TransportError> {
        self.deployment.ensure_active(&self.installation_id)?;
        let id = dm_id(&self.inbox_id, inbox);
        let exists = self.deployment.state.lock().dms.contains_key(&id);
        Ok(exists.then(|| self.conversation_handle(id)))
    }

    async fn conversation(
        &self,
        id: &ConversationId,
    ) -> Result<Option<Arc<dyn Conversation>>, TransportError> {
        self.deployment.ensure_active(&self.installation_id)?;
        let visible = self
            .deployment
            .state
            .lock()
            .dms
            .get(id)
            .is_some_and(|members| members.contains(&self.inbox_id));
        Ok(visible.then(|| self.conversation_handle(id.clone())))
    }

    async fn new_dm(&self, inbox: &InboxId) -> Result<Arc<dyn Conversation>, TransportError> {
        self.deployment.ensure_active(&self.installation_id)?;
        if !self.dm_delay.is_zero() {
            tokio::time::sleep(self.dm_delay).await;
        }

        let id = dm_id(&self.inbox_id, inbox);
        {
            let mut state = self.deployment.state.lock();
            if !state.inboxes.values().any(|known| known == inbox) {
                return Err(TransportError::Conversation(format!("unknown inbox {inbox}")));
            }
            state
                .dms
                .entry(id.clone())
                .or_insert_with(|| [self.inbox_id.clone(), inbox.clone()]);
        }

        debug!(env = %self.deployment.env, conversation_id = %id, "Opened DM");
        Ok(self.conversation_handle(id))
    }

    async fn stream_all_messages(&self) -> Result<MessageStream, TransportError> {
        let mut state = self.deployment.state.lock();
        let installation = state
            .installations
            .get_mut(&self.installation_id)
            .filter(|i| !i.revoked)
            .ok_or(TransportError::Revoked)?;
        // A previous client of a resumed installation may have gone away.
        if installation.stream.as_ref().is_some_and(|s| !s.is_closed()) {
            return Err(TransportError::Stream("already streaming".into()));
        }

        let (tx, rx) = mpsc::unbounded();
        installation.stream = Some(tx);
        Ok(rx.boxed())
    }

    async fn installations(&self) -> Result<Vec<InstallationId>, TransportError> {
        self.deployment.ensure_active(&self.installation_id)?;
        let state = self.deployment.state.lock();
        let mut ids: Vec<InstallationId> = state
            .installations
            .iter()
            .filter(|(_, i)| i.inbox_id == self.inbox_id && !i.revoked)
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        Ok(ids)
    }

    async fn revoke_installations(&self, ids: &[InstallationId]) -> Result<(), TransportError> {
        self.deployment.ensure_active(&self.installation_id)?;
        let mut state = self.deployment.state.lock();
        for id in ids {
            match state.installations.get_mut(id) {
                Some(installation) if installation.inbox_id == self.inbox_id => {
                    installation.revoked = true;
                    // Dropping the sender ends that installation's stream.
                    installation.stream = None;
                    debug!(
                        inbox_id = %self.inbox_id,
                        installation_id = %id,
                        "Revoked installation"
                    );
                }
                Some(_) => {
                    return Err(TransportError::Identity(format!(
                        "installation {id} belongs to another inbox"
                    )))
                }
                None => {}
            }
        }
        Ok(())
    }

    async fn revoke_all_other_installations(&self) -> Result<(), TransportError> {
        let others: Vec<InstallationId> = self
            .installations()
            .await?
            .into_iter()
            .filter(|id| id != &self.installation_id)
            .collect();
        self.revoke_installations(&others).await
    }
}

// =============================================================================
// CONVERSATION
// =============================================================================

struct InMemoryConversation {
    deployment: Arc<Deployment>,
    id: ConversationId,
    sender_inbox: InboxId,
    sender_installation: InstallationId,
}

#[async_trait]
impl Conversation for InMemoryConversation {
    fn id(&self) -> ConversationId {
        self.id.clone()
    }

    async fn send(&self, content: &str) -> Result<(), TransportError> {
        self.deployment.ensure_active(&self.sender_installation)?;

        let mut state = self.deployment.state.lock();
        let members = state
            .dms
            .get(&self.id)
            .cloned()
            .ok_or_else(|| TransportError::Send(format!("unknown conversation {}", self.id)))?;

        let message = InboundMessage {
            conversation_id: self.id.clone(),
            sender_inbox_id: self.sender_inbox.clone(),
            content: content.to_string(),
            sent_at: SystemTime::now(),
        };

        for installation in state.installations.values_mut() {
            if installation.revoked || !members.contains(&installation.inbox_id) {
                continue;
            }
            if let Some(stream) = &installation.stream {
                if stream.unbounded_send(Ok(message.clone())).is_err() {
                    installation.stream = None;
                }
            }
        }
        Ok(())
    }
}
