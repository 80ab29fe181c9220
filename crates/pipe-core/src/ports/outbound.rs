//! # Outbound Ports (Driven Ports / SPI)
//!
//! The messaging network a [`MessagingPipe`](crate::MessagingPipe) runs on,
//! treated as a black box: identities (inboxes) with one or more devices
//! (installations), pairwise conversations, and a stream of every message
//! the installation can see.

use async_trait::async_trait;
use futures::stream::BoxStream;
use pipe_types::{Address, Environment};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::SystemTime;
use thiserror::Error;
use zeroize::Zeroizing;

/// Identity on the messaging network.
pub type InboxId = String;

/// One authorized device/session of an inbox.
pub type InstallationId = String;

pub type ConversationId = String;

/// Messages visible to one installation, in arrival order.
pub type MessageStream = BoxStream<'static, Result<InboundMessage, TransportError>>;

/// Messaging transport errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("connect failed: {0}")]
    Connect(String),

    #[error("identity error: {0}")]
    Identity(String),

    #[error("conversation error: {0}")]
    Conversation(String),

    #[error("send failed: {0}")]
    Send(String),

    #[error("stream error: {0}")]
    Stream(String),

    /// This installation has been revoked
    #[error("installation revoked")]
    Revoked,
}

/// What a client needs to open its local state.
#[derive(Clone)]
pub struct ClientOptions {
    pub address: Address,
    pub db_path: PathBuf,
    pub db_encryption_key: Zeroizing<[u8; 32]>,
}

impl fmt::Debug for ClientOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientOptions")
            .field("address", &self.address)
            .field("db_path", &self.db_path)
            .finish_non_exhaustive()
    }
}

/// A message as delivered to an installation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub conversation_id: ConversationId,
    pub sender_inbox_id: InboxId,
    pub content: String,
    pub sent_at: SystemTime,
}

/// Entry point to one messaging network.
#[async_trait]
pub trait MessagingNetwork: Send + Sync {
    /// Create or resume a client for `options.address` on `env`.
    async fn connect(
        &self,
        env: Environment,
        options: ClientOptions,
    ) -> Result<Arc<dyn MessagingClient>, TransportError>;
}

/// One installation of one identity.
#[async_trait]
pub trait MessagingClient: Send + Sync {
    fn inbox_id(&self) -> InboxId;

    fn installation_id(&self) -> InstallationId;

    /// Resolve an address to its inbox, `None` when it has never registered.
    async fn inbox_id_for(&self, address: &Address) -> Result<Option<InboxId>, TransportError>;

    /// Existing DM with `inbox`, if any.
    async fn find_dm(
        &self,
        inbox: &InboxId,
    ) -> Result<Option<Arc<dyn Conversation>>, TransportError>;

    /// Conversation by id, if this installation can see it.
    async fn conversation(
        &self,
        id: &ConversationId,
    ) -> Result<Option<Arc<dyn Conversation>>, TransportError>;

    /// Open a DM with `inbox`. May be slow.
    async fn new_dm(&self, inbox: &InboxId) -> Result<Arc<dyn Conversation>, TransportError>;

    /// Start streaming every message this installation can see. Once per client.
    async fn stream_all_messages(&self) -> Result<MessageStream, TransportError>;

    /// Live installations of this identity.
    async fn installations(&self) -> Result<Vec<InstallationId>, TransportError>;

    async fn revoke_installations(&self, ids: &[InstallationId]) -> Result<(), TransportError>;

    async fn revoke_all_other_installations(&self) -> Result<(), TransportError>;
}

/// A pairwise channel between two inboxes.
#[async_trait]
pub trait Conversation: Send + Sync {
    fn id(&self) -> ConversationId;

    async fn send(&self, content: &str) -> Result<(), TransportError>;
}
