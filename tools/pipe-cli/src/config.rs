//! # CLI Configuration
//!
//! Loaded from `$PIPE_CONFIG`, else `~/.pipe/config.toml`; a missing file
//! means defaults. `PIPE_*` environment variables override the file.
//!
//! ```toml
//! env = "dev"
//! key_file = "/home/me/.pipe/account.key"
//!
//! [http]
//! listen = "127.0.0.1:7070"
//! default_timeout_ms = 30000
//!
//! [rate_limit]
//! capacity = 25
//! window_ms = 1000
//!
//! [actors."0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266"]
//! name = "Alpha Storage"
//! role = "provider"
//! ```

use crate::error::CliError;
use pipe_http::HttpPipeConfig;
use pipe_types::{Address, Environment};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_ENV: &str = "PIPE_CONFIG";
pub const ACCOUNT_ENV: &str = "PIPE_ACCOUNT";
pub const ENVIRONMENT_ENV: &str = "PIPE_ENV";
pub const LISTEN_ENV: &str = "PIPE_LISTEN";
pub const TIMEOUT_ENV: &str = "PIPE_TIMEOUT_MS";

const DEFAULT_LISTEN: &str = "127.0.0.1:7070";

/// Effective CLI configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    pub env: Environment,
    /// Private key (0x-hex). Takes precedence over `key_file`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,
    /// Where the account key is kept (default `~/.pipe/account.key`)
    pub key_file: Option<PathBuf>,
    pub http: HttpPipeConfig,
    pub rate_limit: RateLimitConfig,
    /// Static registry answered by `GET /actors/:address`
    pub actors: BTreeMap<Address, ActorRecord>,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            env: Environment::default(),
            account: None,
            key_file: None,
            http: HttpPipeConfig::default(),
            rate_limit: RateLimitConfig::default(),
            actors: BTreeMap::new(),
        }
    }
}

/// Limits lookups served by `pipe serve`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Lookups per window; 0 disables limiting
    pub capacity: usize,
    pub window_ms: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            capacity: 25,
            window_ms: 1_000,
        }
    }
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorRecord {
    pub name: String,
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
}

impl CliConfig {
    /// Load from the default location and apply environment overrides.
    pub fn load() -> Result<Self, CliError> {
        let path = std::env::var_os(CONFIG_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| pipe_home().join("config.toml"));
        let mut config = Self::from_file(&path)?;
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Parse `path`, or defaults when it does not exist.
    pub fn from_file(path: &Path) -> Result<Self, CliError> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file, using defaults");
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(CliError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        toml::from_str(&text).map_err(|source| CliError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply `PIPE_*` overrides read through `var`.
    pub fn apply_overrides<F>(&mut self, var: F) -> Result<(), CliError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(account) = var(ACCOUNT_ENV) {
            self.account = Some(account);
        }
        if let Some(env) = var(ENVIRONMENT_ENV) {
            self.env = env
                .parse()
                .map_err(|e| CliError::Config(format!("{ENVIRONMENT_ENV}: {e}")))?;
        }
        if let Some(listen) = var(LISTEN_ENV) {
            let listen = listen
                .parse()
                .map_err(|e| CliError::Config(format!("{LISTEN_ENV}: {e}")))?;
            self.http.listen = Some(listen);
        }
        if let Some(timeout) = var(TIMEOUT_ENV) {
            self.http.default_timeout_ms = timeout
                .parse()
                .map_err(|e| CliError::Config(format!("{TIMEOUT_ENV}: {e}")))?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), CliError> {
        self.http
            .validate()
            .map_err(|e| CliError::Config(e.to_string()))?;
        if self.rate_limit.capacity > 0 && self.rate_limit.window_ms == 0 {
            return Err(CliError::Config(
                "rate_limit.window_ms cannot be 0 when capacity is set".into(),
            ));
        }
        Ok(())
    }

    pub fn key_file(&self) -> PathBuf {
        self.key_file
            .clone()
            .unwrap_or_else(|| pipe_home().join("account.key"))
    }

    /// HTTP settings for `pipe serve`, listening on the default address
    /// unless one is configured.
    pub fn serve_http(
        &self,
        listen: Option<std::net::SocketAddr>,
    ) -> Result<HttpPipeConfig, CliError> {
        let mut http = self.http.clone();
        http.listen = match listen.or(http.listen) {
            Some(listen) => Some(listen),
            None => Some(DEFAULT_LISTEN.parse().map_err(|e| {
                CliError::Config(format!("default listen address: {e}"))
            })?),
        };
        Ok(http)
    }

    /// Printable form with secrets masked.
    pub fn redacted(&self) -> Self {
        let mut shown = self.clone();
        if shown.account.is_some() {
            shown.account = Some("<redacted>".into());
        }
        shown
    }
}

/// `~/.pipe`, or `./.pipe` when no home directory is known.
pub fn pipe_home() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".pipe")
}
