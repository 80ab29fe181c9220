//! Account key loading.

use crate::config::CliConfig;
use crate::error::CliError;
use pipe_signature::LocalAccount;
use std::path::Path;
use tracing::info;

/// The configured account, generating and saving a key on first use.
///
/// Returns the account and whether it was just created.
pub fn load_or_create(config: &CliConfig) -> Result<(LocalAccount, bool), CliError> {
    if let Some(key) = &config.account {
        return Ok((LocalAccount::from_private_key(key)?, false));
    }

    let path = config.key_file();
    match read_key(&path)? {
        Some(account) => Ok((account, false)),
        None => {
            let account = LocalAccount::random();
            write_key(&path, &account)?;
            info!(address = %account.address(), path = %path.display(), "Generated new account");
            Ok((account, true))
        }
    }
}

fn read_key(path: &Path) -> Result<Option<LocalAccount>, CliError> {
    match std::fs::read_to_string(path) {
        Ok(text) => Ok(Some(LocalAccount::from_private_key(text.trim())?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(CliError::Read {
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn write_key(path: &Path, account: &LocalAccount) -> Result<(), CliError> {
    let write_err = |source| CliError::Write {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(write_err)?;
    }
    std::fs::write(path, account.private_key_hex().as_bytes()).map_err(write_err)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).map_err(write_err)?;
    }
    Ok(())
}
