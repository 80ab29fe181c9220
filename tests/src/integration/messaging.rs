//! # Messaging Transport
//!
//! Two or more MessagingPipes on one InMemoryNetwork: the shared scenarios,
//! plus correlation and routing behavior specific to the messaging path.

#[cfg(test)]
mod tests {
    use crate::fixtures::{install_routes, messaging_node};
    use crate::integration::scenarios;
    use pipe_core::{InMemoryNetwork, Pipe, PipeError};
    use pipe_types::{Method, ResponseCode, SendRequest};
    use serde_json::json;
    use std::sync::atomic::Ordering;
    use std::sync::Arc;
    use std::time::Duration;

    // =============================================================================
    // SHARED SCENARIOS
    // =============================================================================

    #[tokio::test]
    async fn test_shared_scenarios() {
        let dir = tempfile::tempdir().unwrap();
        let network = Arc::new(InMemoryNetwork::new());
        let server = messaging_node(&network, dir.path()).await;
        let client = messaging_node(&network, dir.path()).await;
        install_routes(&server.pipe);

        scenarios::authenticated_round_trip(&client.pipe, &server.target).await;
        scenarios::body_and_params(&client.pipe, &server.target).await;
        scenarios::path_params(&client.pipe, &server.target).await;
        scenarios::unknown_route(&client.pipe, &server.target).await;
        scenarios::handler_errors(&client.pipe, &server.target).await;

        client.pipe.close().await.unwrap();
        server.pipe.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_concurrent_calls_resolve_out_of_order() {
        let dir = tempfile::tempdir().unwrap();
        let network = Arc::new(InMemoryNetwork::new());
        let server = messaging_node(&network, dir.path()).await;
        let client = messaging_node(&network, dir.path()).await;
        install_routes(&server.pipe);

        scenarios::concurrent_out_of_order(&client.pipe, &server.target).await;

        let stats = client.pipe.pending().stats();
        assert_eq!(stats.total_registered.load(Ordering::Relaxed), 10);
        assert_eq!(stats.total_completed.load(Ordering::Relaxed), 10);
        assert_eq!(client.pipe.pending().pending_count(), 0);

        client.pipe.close().await.unwrap();
        server.pipe.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_timeout_leaves_nothing_pending_and_late_reply_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let network = Arc::new(InMemoryNetwork::new());
        let server = messaging_node(&network, dir.path()).await;
        let client = messaging_node(&network, dir.path()).await;
        install_routes(&server.pipe);

        let err = client
            .pipe
            .send(&server.target, SendRequest::new(Method::Get, "/delay/150").with_timeout(50))
            .await
            .unwrap_err();
        assert_eq!(err, PipeError::Timeout(Duration::from_millis(50)));
        assert_eq!(client.pipe.pending().pending_count(), 0);

        // The late reply arrives and is counted, not delivered.
        tokio::time::sleep(Duration::from_millis(250)).await;
        let stats = client.pipe.pending().stats();
        assert_eq!(stats.total_timeouts.load(Ordering::Relaxed), 1);
        assert_eq!(stats.total_unmatched.load(Ordering::Relaxed), 1);

        // The Pipe is still usable.
        scenarios::authenticated_round_trip(&client.pipe, &server.target).await;

        client.pipe.close().await.unwrap();
        server.pipe.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_zero_timeout_uses_default() {
        let dir = tempfile::tempdir().unwrap();
        let network = Arc::new(InMemoryNetwork::new());
        let server = messaging_node(&network, dir.path()).await;
        let client = messaging_node(&network, dir.path()).await;
        install_routes(&server.pipe);

        let response = client
            .pipe
            .send(&server.target, SendRequest::new(Method::Get, "/delay/20").with_timeout(0))
            .await
            .unwrap();
        assert_eq!(response.code, ResponseCode::Ok);
        assert_eq!(client.pipe.pending().stats().total_timeouts.load(Ordering::Relaxed), 0);

        client.pipe.close().await.unwrap();
        server.pipe.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_peers_call_each_other() {
        let dir = tempfile::tempdir().unwrap();
        let network = Arc::new(InMemoryNetwork::new());
        let a = messaging_node(&network, dir.path()).await;
        let b = messaging_node(&network, dir.path()).await;
        install_routes(&a.pipe);
        install_routes(&b.pipe);

        // Each side sees its own outbound envelopes echoed back by the
        // network and must ignore them.
        let (from_a, from_b) = tokio::join!(
            a.pipe.send(&b.target, SendRequest::new(Method::Get, "/whoami")),
            b.pipe.send(&a.target, SendRequest::new(Method::Get, "/whoami")),
        );
        assert_eq!(from_a.unwrap().body, Some(json!({ "requester": a.pipe.address() })));
        assert_eq!(from_b.unwrap().body, Some(json!({ "requester": b.pipe.address() })));

        a.pipe.close().await.unwrap();
        b.pipe.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_concurrent_first_contact_creates_one_conversation() {
        let dir = tempfile::tempdir().unwrap();
        let network = Arc::new(InMemoryNetwork::new().with_dm_delay(Duration::from_millis(40)));
        let server = messaging_node(&network, dir.path()).await;
        let client = messaging_node(&network, dir.path()).await;
        install_routes(&server.pipe);

        let calls = (0..5).map(|_| {
            client
                .pipe
                .send(&server.target, SendRequest::new(Method::Get, "/whoami"))
        });
        for response in futures::future::join_all(calls).await {
            assert_eq!(response.unwrap().code, ResponseCode::Ok);
        }

        client.pipe.close().await.unwrap();
        server.pipe.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_route_rebinding_replaces_handler() {
        let dir = tempfile::tempdir().unwrap();
        let network = Arc::new(InMemoryNetwork::new());
        let server = messaging_node(&network, dir.path()).await;
        let client = messaging_node(&network, dir.path()).await;

        for version in [1, 2] {
            server
                .pipe
                .route(
                    Method::Get,
                    "version",
                    pipe_core::handler(move |_req| async move { anyhow::Ok(json!(version)) }),
                )
                .unwrap();
        }

        let response = client
            .pipe
            .send(&server.target, SendRequest::new(Method::Get, "/version"))
            .await
            .unwrap();
        assert_eq!(response.body, Some(json!(2)));

        client.pipe.close().await.unwrap();
        server.pipe.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_environments_do_not_see_each_other() {
        let dir = tempfile::tempdir().unwrap();
        let network = Arc::new(InMemoryNetwork::new());
        let server = messaging_node(&network, dir.path()).await;

        let other = pipe_core::MessagingPipe::new(
            network.clone(),
            Arc::new(pipe_signature::LocalAccount::random()),
            crate::fixtures::messaging_config(dir.path()),
        );
        other.init(pipe_types::Environment::Dev).await.unwrap();

        let err = other
            .send(&server.target, SendRequest::new(Method::Get, "/whoami"))
            .await
            .unwrap_err();
        assert_eq!(err, PipeError::TargetUnavailable);

        other.close().await.unwrap();
        server.pipe.close().await.unwrap();
    }
}
