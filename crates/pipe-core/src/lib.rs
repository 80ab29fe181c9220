//! # Pipe Core Crate
//!
//! Authenticated request/response calls between addresses over an
//! asynchronous, store-and-forward messaging network.
//!
//! ## Architecture
//!
//! Hexagonal layout:
//!
//! - **Domain Layer** (`domain/`): router, pending-call correlation,
//!   cancellation signals, local identity state, configuration and errors
//! - **Ports Layer** (`ports/`): the [`Pipe`] contract (inbound) and the
//!   [`MessagingNetwork`] black box (outbound)
//! - **Processor** (`processor.rs`): authenticate, route, run a handler,
//!   always produce one Response
//! - **Service Layer** (`service.rs`): [`MessagingPipe`], which ties them together
//! - **Adapters** (`adapters/`): [`InMemoryNetwork`] for local runs and tests
//!
//! ## Example
//!
//! ```no_run
//! use pipe_core::{handler, InMemoryNetwork, MessagingPipe, MessagingPipeConfig, Pipe};
//! use pipe_signature::LocalAccount;
//! use pipe_types::{Environment, Method, SendRequest};
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), pipe_core::PipeError> {
//! let network = Arc::new(InMemoryNetwork::new());
//! let config = MessagingPipeConfig::default();
//! let server_key = Arc::new(LocalAccount::random());
//! let client_key = Arc::new(LocalAccount::random());
//! let server = MessagingPipe::new(network.clone(), server_key, config.clone());
//! let client = MessagingPipe::new(network, client_key, config);
//! server.init(Environment::Dev).await?;
//! client.init(Environment::Dev).await?;
//!
//! let ping = handler(|_req| async { anyhow::Ok(serde_json::json!("pong")) });
//! server.route(Method::Get, "/ping", ping)?;
//! let response = client
//!     .send(&server.address().to_string(), SendRequest::new(Method::Get, "/ping"))
//!     .await?;
//! assert!(response.code.is_ok());
//! # Ok(())
//! # }
//! ```

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod processor;
pub mod service;

// Re-export public API
pub use adapters::InMemoryNetwork;
pub use domain::config::{ConfigError, LocalStoreConfig, MessagingPipeConfig};
pub use domain::error::{PipeError, RouteError};
pub use domain::local_store::LocalStore;
pub use domain::pending::{CallOutcome, PendingCalls, PendingStats};
pub use domain::router::{handler, Handler, PathPattern, RouteResponse, Router};
pub use domain::signal::CancelSignal;
pub use ports::inbound::Pipe;
pub use ports::outbound::{
    ClientOptions, Conversation, ConversationId, InboundMessage, InboxId, InstallationId,
    MessageStream, MessagingClient, MessagingNetwork, TransportError,
};
pub use processor::RequestProcessor;
pub use service::MessagingPipe;
