//! Local identity state.
//!
//! The messaging client keeps an encrypted database per identity. This
//! module decides where it lives, which key opens it, and whether it is
//! deleted when the Pipe closes.
//!
//! - **Persistent**: a passphrase is configured. The key is derived from it,
//!   the default path is stable per environment and address, and the files
//!   are never deleted.
//! - **Ephemeral**: a random key per run, a unique default path, and the
//!   files are deleted before use and on release.

use crate::domain::config::LocalStoreConfig;
use crate::domain::error::PipeError;
use pipe_types::{keccak256, Address, Environment};
use rand::RngCore;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};
use zeroize::Zeroizing;

/// Suffixes of the files that make up one database.
pub const DB_FILE_SUFFIXES: [&str; 4] = ["", "-shm", "-wal", ".sqlcipher_salt"];

/// Where the local database lives and the key that opens it.
pub struct LocalStore {
    db_path: PathBuf,
    encryption_key: Zeroizing<[u8; 32]>,
    persistent: bool,
    released: AtomicBool,
}

impl LocalStore {
    /// Resolve path and key for `address` on `env`.
    pub fn prepare(
        config: &LocalStoreConfig,
        env: Environment,
        address: &Address,
    ) -> Result<Self, PipeError> {
        let directory = config
            .directory
            .clone()
            .unwrap_or_else(std::env::temp_dir);

        let store = match &config.encryption_key {
            Some(passphrase) => {
                let db_path = config.db_path.clone().unwrap_or_else(|| {
                    directory.join(format!("pipe-{env}-{}.db", address.to_lower_hex()))
                });
                Self {
                    db_path,
                    encryption_key: Zeroizing::new(keccak256(passphrase.as_bytes())),
                    persistent: true,
                    released: AtomicBool::new(false),
                }
            }
            None => {
                let db_path = config.db_path.clone().unwrap_or_else(|| {
                    directory.join(format!(
                        "pipe-{env}-{}-{}{}.db",
                        address.to_lower_hex(),
                        unix_millis(),
                        rand::random::<u32>()
                    ))
                });
                let mut key = Zeroizing::new([0u8; 32]);
                rand::thread_rng().fill_bytes(&mut key[..]);
                let store = Self {
                    db_path,
                    encryption_key: key,
                    persistent: false,
                    released: AtomicBool::new(false),
                };
                // Leftovers from a crashed run would not open with the new key.
                store.remove_files();
                store
            }
        };

        if let Some(parent) = store.db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| {
                PipeError::LocalState(format!("cannot create {}: {e}", parent.display()))
            })?;
        }

        debug!(
            db_path = %store.db_path.display(),
            persistent = store.persistent,
            "Prepared local store"
        );
        Ok(store)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub fn encryption_key(&self) -> &[u8; 32] {
        &self.encryption_key
    }

    pub fn is_persistent(&self) -> bool {
        self.persistent
    }

    /// Every file belonging to this database.
    pub fn files(&self) -> Vec<PathBuf> {
        DB_FILE_SUFFIXES
            .iter()
            .map(|suffix| {
                let mut name = self.db_path.as_os_str().to_owned();
                name.push(suffix);
                PathBuf::from(name)
            })
            .collect()
    }

    /// Delete an ephemeral store's files.
    ///
    /// Returns `true` only for the call that performed the deletion.
    /// Persistent stores are left alone.
    pub fn release(&self) -> bool {
        if self.persistent || self.released.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.remove_files();
        true
    }

    fn remove_files(&self) {
        for file in self.files() {
            match fs::remove_file(&file) {
                Ok(()) => debug!(file = %file.display(), "Removed local store file"),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => warn!(
                    file = %file.display(),
                    error = %e,
                    "Failed to remove local store file"
                ),
            }
        }
    }
}

impl std::fmt::Debug for LocalStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalStore")
            .field("db_path", &self.db_path)
            .field("persistent", &self.persistent)
            .finish_non_exhaustive()
    }
}

fn unix_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default()
}
