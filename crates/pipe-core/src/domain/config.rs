//! Pipe configuration with validation.

use pipe_types::DEFAULT_TIMEOUT_MS;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Messaging Pipe configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MessagingPipeConfig {
    /// Timeout applied when a request does not carry its own
    pub default_timeout_ms: u64,
    /// Local identity state
    pub local_store: LocalStoreConfig,
    /// Revoke every other installation of this identity during `init`
    pub revoke_other_installations: bool,
    /// Revoke this installation during `close`
    pub revoke_installation: bool,
}

impl Default for MessagingPipeConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: DEFAULT_TIMEOUT_MS,
            local_store: LocalStoreConfig::default(),
            revoke_other_installations: false,
            revoke_installation: false,
        }
    }
}

impl MessagingPipeConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_timeout_ms == 0 {
            return Err(ConfigError::InvalidTimeout(
                "default_timeout_ms cannot be 0".into(),
            ));
        }
        self.local_store.validate()
    }

    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }
}

/// Local identity state configuration.
///
/// A configured `encryption_key` makes the state persistent: it is reused
/// across runs and never deleted. Without one, the state is ephemeral.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalStoreConfig {
    /// Database file. Derived from `directory`, environment and address when unset.
    pub db_path: Option<PathBuf>,
    /// Passphrase for persistent state
    pub encryption_key: Option<String>,
    /// Directory for derived database paths (default: system temp dir)
    pub directory: Option<PathBuf>,
}

impl LocalStoreConfig {
    pub fn is_persistent(&self) -> bool {
        self.encryption_key.is_some()
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(key) = &self.encryption_key {
            if key.is_empty() {
                return Err(ConfigError::InvalidLocalStore(
                    "encryption_key cannot be empty".into(),
                ));
            }
        }
        if let Some(path) = &self.db_path {
            if path.file_name().is_none() {
                return Err(ConfigError::InvalidLocalStore(format!(
                    "db_path {} has no file name",
                    path.display()
                )));
            }
        }
        Ok(())
    }
}

/// Configuration errors
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid timeout: {0}")]
    InvalidTimeout(String),

    #[error("invalid local store: {0}")]
    InvalidLocalStore(String),
}
