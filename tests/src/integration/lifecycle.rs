//! # Lifecycle
//!
//! init → send/route → close, abort signals, local state files and
//! installation management, observed from outside the Pipe.

#[cfg(test)]
mod tests {
    use crate::fixtures::{
        install_routes, messaging_config, messaging_node, messaging_node_with, Node, ENV,
    };
    use pipe_core::{
        handler, CancelSignal, InMemoryNetwork, MessagingPipe, MessagingPipeConfig, Pipe, PipeError,
    };
    use pipe_signature::LocalAccount;
    use pipe_types::{Method, SendRequest};
    use std::path::{Path, PathBuf};
    use std::sync::Arc;
    use std::time::Duration;

    const DEV_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    fn dev_account() -> LocalAccount {
        LocalAccount::from_private_key(DEV_KEY).unwrap()
    }

    fn persistent_config(dir: &Path, passphrase: &str) -> MessagingPipeConfig {
        let mut config = messaging_config(dir);
        config.local_store.encryption_key = Some(passphrase.into());
        config
    }

    async fn dev_node(
        network: &Arc<InMemoryNetwork>,
        config: MessagingPipeConfig,
    ) -> Node<MessagingPipe> {
        messaging_node_with(network, dev_account(), config, CancelSignal::new()).await
    }

    fn companions(db: &Path) -> Vec<PathBuf> {
        ["-shm", "-wal", ".sqlcipher_salt"]
            .iter()
            .map(|suffix| PathBuf::from(format!("{}{suffix}", db.display())))
            .collect()
    }

    // =============================================================================
    // CLOSE
    // =============================================================================

    #[tokio::test]
    async fn test_close_fails_pending_calls_and_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let network = Arc::new(InMemoryNetwork::new());
        let server = messaging_node(&network, dir.path()).await;
        let client = messaging_node(&network, dir.path()).await;
        install_routes(&server.pipe);

        let call = client
            .pipe
            .send(&server.target, SendRequest::new(Method::Get, "/delay/5000"));
        let close = async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            client.pipe.close().await
        };
        let (result, closed) = tokio::join!(call, close);
        assert_eq!(result.unwrap_err(), PipeError::closed());
        closed.unwrap();
        assert_eq!(client.pipe.pending().pending_count(), 0);

        client.pipe.close().await.unwrap();
        assert_eq!(
            client
                .pipe
                .send(&server.target, SendRequest::new(Method::Get, "/whoami"))
                .await
                .unwrap_err(),
            PipeError::closed()
        );
        assert_eq!(
            client
                .pipe
                .route(Method::Get, "/x", handler(|_req| async { anyhow::Ok(()) }))
                .unwrap_err(),
            PipeError::closed()
        );
        assert_eq!(client.pipe.init(ENV).await.unwrap_err(), PipeError::closed());

        server.pipe.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_close_before_init() {
        let dir = tempfile::tempdir().unwrap();
        let network = Arc::new(InMemoryNetwork::new());
        let account = Arc::new(LocalAccount::random());
        let pipe = MessagingPipe::new(network, account, messaging_config(dir.path()));
        pipe.close().await.unwrap();
        assert_eq!(pipe.init(ENV).await.unwrap_err(), PipeError::closed());
    }

    // =============================================================================
    // ABORT
    // =============================================================================

    #[tokio::test]
    async fn test_abort_fails_pending_and_future_sends() {
        let dir = tempfile::tempdir().unwrap();
        let network = Arc::new(InMemoryNetwork::new());
        let server = messaging_node(&network, dir.path()).await;
        install_routes(&server.pipe);
        let abort = CancelSignal::new();
        let client = messaging_node_with(
            &network,
            LocalAccount::random(),
            messaging_config(dir.path()),
            abort.clone(),
        )
        .await;

        let call = client
            .pipe
            .send(&server.target, SendRequest::new(Method::Get, "/delay/5000"));
        let fire = async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            abort.cancel();
        };
        let (result, _) = tokio::join!(call, fire);
        assert_eq!(result.unwrap_err(), PipeError::Aborted);

        assert_eq!(
            client
                .pipe
                .send(&server.target, SendRequest::new(Method::Get, "/whoami"))
                .await
                .unwrap_err(),
            PipeError::Aborted
        );
        client.pipe.close().await.unwrap();
        server.pipe.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_init_after_abort_fails() {
        let dir = tempfile::tempdir().unwrap();
        let network = Arc::new(InMemoryNetwork::new());
        let abort = CancelSignal::new();
        abort.cancel();
        let pipe = MessagingPipe::with_abort_signal(
            network,
            Arc::new(LocalAccount::random()),
            messaging_config(dir.path()),
            abort,
        );
        assert_eq!(pipe.init(ENV).await.unwrap_err(), PipeError::Aborted);
        pipe.close().await.unwrap();
    }

    // =============================================================================
    // LOCAL STATE
    // =============================================================================

    #[tokio::test]
    async fn test_ephemeral_state_is_deleted_on_close() {
        let dir = tempfile::tempdir().unwrap();
        let network = Arc::new(InMemoryNetwork::new());
        let node = messaging_node(&network, dir.path()).await;

        let db = node.pipe.db_path().unwrap();
        assert!(db.starts_with(dir.path()));
        assert!(db.exists());
        for companion in companions(&db) {
            std::fs::write(&companion, b"").unwrap();
        }

        node.pipe.close().await.unwrap();
        assert!(!db.exists());
        for companion in companions(&db) {
            assert!(!companion.exists(), "{} left behind", companion.display());
        }
    }

    #[tokio::test]
    async fn test_persistent_state_resumes_installation() {
        let dir = tempfile::tempdir().unwrap();
        let network = Arc::new(InMemoryNetwork::new());

        let first = messaging_node_with(
            &network,
            dev_account(),
            persistent_config(dir.path(), "correct horse"),
            CancelSignal::new(),
        )
        .await;
        let installation = first.pipe.installation_id().unwrap();
        let db = first.pipe.db_path().unwrap();
        first.pipe.close().await.unwrap();
        assert!(db.exists());

        let second = messaging_node_with(
            &network,
            dev_account(),
            persistent_config(dir.path(), "correct horse"),
            CancelSignal::new(),
        )
        .await;
        assert_eq!(second.pipe.db_path().unwrap(), db);
        assert_eq!(second.pipe.installation_id().unwrap(), installation);
        second.pipe.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_wrong_passphrase_fails_init_and_allows_retry() {
        let dir = tempfile::tempdir().unwrap();
        let network = Arc::new(InMemoryNetwork::new());

        let first = messaging_node_with(
            &network,
            dev_account(),
            persistent_config(dir.path(), "right"),
            CancelSignal::new(),
        )
        .await;
        first.pipe.close().await.unwrap();

        let pipe = MessagingPipe::new(
            network.clone(),
            Arc::new(dev_account()),
            persistent_config(dir.path(), "wrong"),
        );
        assert!(matches!(pipe.init(ENV).await, Err(PipeError::Transport(_))));
        assert_eq!(
            pipe.send(&format!("0x{}", "00".repeat(20)), SendRequest::new(Method::Get, "/"))
                .await
                .unwrap_err(),
            PipeError::NotInitialized
        );
    }

    // =============================================================================
    // INSTALLATIONS
    // =============================================================================

    #[tokio::test]
    async fn test_revoke_other_installations_on_init() {
        let dir = tempfile::tempdir().unwrap();
        let network = Arc::new(InMemoryNetwork::new());
        let address = dev_account().address();

        let old = dev_node(&network, messaging_config(dir.path())).await;
        let other = dev_node(&network, messaging_config(dir.path())).await;
        assert_eq!(network.live_installations(ENV, &address), 2);

        let mut config = messaging_config(dir.path());
        config.revoke_other_installations = true;
        let fresh = dev_node(&network, config).await;
        assert_eq!(network.live_installations(ENV, &address), 1);

        fresh.pipe.close().await.unwrap();
        old.pipe.close().await.unwrap();
        other.pipe.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_revoke_own_installation_on_close() {
        let dir = tempfile::tempdir().unwrap();
        let network = Arc::new(InMemoryNetwork::new());
        let address = dev_account().address();

        let keep = dev_node(&network, messaging_config(dir.path())).await;
        let mut config = messaging_config(dir.path());
        config.revoke_installation = true;
        let leave = dev_node(&network, config).await;
        assert_eq!(network.live_installations(ENV, &address), 2);

        leave.pipe.close().await.unwrap();
        assert_eq!(network.live_installations(ENV, &address), 1);

        // The last installation is never revoked.
        let mut config = messaging_config(dir.path());
        config.revoke_installation = true;
        let last = MessagingPipe::new(network.clone(), Arc::new(LocalAccount::random()), config);
        last.init(ENV).await.unwrap();
        let last_address = last.address();
        last.close().await.unwrap();
        assert_eq!(network.live_installations(ENV, &last_address), 1);

        keep.pipe.close().await.unwrap();
    }
}
