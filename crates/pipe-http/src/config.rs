//! HTTP Pipe configuration.

use pipe_core::ConfigError;
use pipe_types::DEFAULT_TIMEOUT_MS;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

/// HTTP Pipe configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpPipeConfig {
    /// Address to serve `POST /pipe` on. Client-only when unset.
    pub listen: Option<SocketAddr>,
    /// Timeout applied when a request does not carry its own
    pub default_timeout_ms: u64,
    /// TCP connect timeout for outbound calls
    pub connect_timeout_ms: u64,
    /// Time `close` waits for in-flight requests before forcing the server down
    pub shutdown_grace_ms: u64,
}

impl Default for HttpPipeConfig {
    fn default() -> Self {
        Self {
            listen: None,
            default_timeout_ms: DEFAULT_TIMEOUT_MS,
            connect_timeout_ms: 2_000,
            shutdown_grace_ms: 5_000,
        }
    }
}

impl HttpPipeConfig {
    /// Serve on `listen`.
    pub fn listening(listen: SocketAddr) -> Self {
        Self {
            listen: Some(listen),
            ..Self::default()
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_timeout_ms == 0 {
            return Err(ConfigError::InvalidTimeout(
                "default_timeout_ms cannot be 0".into(),
            ));
        }
        if self.connect_timeout_ms == 0 {
            return Err(ConfigError::InvalidTimeout(
                "connect_timeout_ms cannot be 0".into(),
            ));
        }
        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}
