//! # Adversarial Envelopes
//!
//! A raw messaging client, bypassing the Pipe, injects forged, unsigned,
//! tampered and malformed envelopes. The server must answer the real sender
//! with NOT_AUTHORIZED (never run the handler), and clients must ignore
//! responses they did not ask for.

#[cfg(test)]
mod tests {
    use crate::fixtures::{install_routes, messaging_node, ENV};
    use futures::StreamExt;
    use pipe_core::{
        handler, ClientOptions, InMemoryNetwork, MessageStream, MessagingClient, MessagingNetwork,
        Pipe,
    };
    use pipe_signature::{sign_request, LocalAccount};
    use pipe_types::{
        Address, Envelope, Method, Request, RequestId, Response, ResponseCode, SendRequest,
        SIGNATURE_HASH_HEADER,
    };
    use serde_json::json;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    // =============================================================================
    // TEST FIXTURES
    // =============================================================================

    struct RawPeer {
        account: LocalAccount,
        client: Arc<dyn MessagingClient>,
        stream: MessageStream,
    }

    async fn raw_peer(network: &InMemoryNetwork, dir: &Path) -> RawPeer {
        let account = LocalAccount::random();
        let options = ClientOptions {
            address: account.address(),
            db_path: dir.join(format!("raw-{}.db", account.address().to_lower_hex())),
            db_encryption_key: zeroize::Zeroizing::new([7u8; 32]),
        };
        let client = network.connect(ENV, options).await.unwrap();
        let stream = client.stream_all_messages().await.unwrap();
        RawPeer {
            account,
            client,
            stream,
        }
    }

    impl RawPeer {
        async fn send_raw(&self, to: Address, content: &str) {
            let inbox = self.client.inbox_id_for(&to).await.unwrap().unwrap();
            let dm = match self.client.find_dm(&inbox).await.unwrap() {
                Some(dm) => dm,
                None => self.client.new_dm(&inbox).await.unwrap(),
            };
            dm.send(content).await.unwrap();
        }

        /// Next Response envelope from someone else.
        async fn next_response(&mut self) -> Response {
            let own_inbox = self.client.inbox_id();
            let wait = async {
                while let Some(message) = self.stream.next().await {
                    let message = message.unwrap();
                    if message.sender_inbox_id == own_inbox {
                        continue;
                    }
                    let envelope = Envelope::classify(&message.content);
                    if let Some(Envelope::Response(response)) = envelope {
                        return response;
                    }
                }
                panic!("stream ended");
            };
            tokio::time::timeout(Duration::from_secs(2), wait)
                .await
                .expect("response within 2s")
        }

        fn signed(&self, path: &str) -> Request {
            let mut request = SendRequest::new(Method::Get, path)
                .into_request(RequestId::new(), self.account.address());
            sign_request(&self.account, &mut request).unwrap();
            request
        }
    }

    /// A server whose `/secret` handler counts its invocations.
    async fn counting_server(
        network: &Arc<InMemoryNetwork>,
        dir: &Path,
    ) -> (crate::fixtures::Node<pipe_core::MessagingPipe>, Arc<AtomicUsize>) {
        let server = messaging_node(network, dir).await;
        install_routes(&server.pipe);
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        server
            .pipe
            .route(
                Method::Get,
                "/secret",
                handler(move |_req| {
                    let counter = counter.clone();
                    async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        anyhow::Ok(json!("classified"))
                    }
                }),
            )
            .unwrap();
        (server, calls)
    }

    // =============================================================================
    // SERVER SIDE
    // =============================================================================

    #[tokio::test]
    async fn test_forged_requester_is_rejected_and_answered_to_real_sender() {
        let dir = tempfile::tempdir().unwrap();
        let network = Arc::new(InMemoryNetwork::new());
        let (server, calls) = counting_server(&network, dir.path()).await;
        let victim = messaging_node(&network, dir.path()).await;
        let mut attacker = raw_peer(&network, dir.path()).await;

        let mut forged = attacker.signed("/secret");
        forged.requester = victim.pipe.address();
        let id = forged.id;
        attacker
            .send_raw(server.pipe.address(), &serde_json::to_string(&forged).unwrap())
            .await;

        let response = attacker.next_response().await;
        assert_eq!(response.id, id);
        assert_eq!(response.code, ResponseCode::NotAuthorized);
        assert_eq!(response.message(), Some("Request has an invalid signature"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        victim.pipe.close().await.unwrap();
        server.pipe.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_unsigned_and_tampered_requests_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let network = Arc::new(InMemoryNetwork::new());
        let (server, calls) = counting_server(&network, dir.path()).await;
        let mut attacker = raw_peer(&network, dir.path()).await;
        let target = server.pipe.address();

        let unsigned = SendRequest::new(Method::Get, "/secret")
            .into_request(RequestId::new(), attacker.account.address());
        attacker
            .send_raw(target, &serde_json::to_string(&unsigned).unwrap())
            .await;
        let response = attacker.next_response().await;
        assert_eq!(response.code, ResponseCode::NotAuthorized);
        assert_eq!(response.message(), Some("Request doesn't include a signature"));

        let mut tampered = attacker.signed("/secret");
        tampered
            .headers
            .insert(SIGNATURE_HASH_HEADER.to_string(), format!("0x{}", "ab".repeat(32)));
        attacker
            .send_raw(target, &serde_json::to_string(&tampered).unwrap())
            .await;
        let response = attacker.next_response().await;
        assert_eq!(response.code, ResponseCode::NotAuthorized);
        assert_eq!(response.message(), Some("Request has an invalid signature"));

        // A properly signed request from the same raw peer goes through.
        let honest = attacker.signed("/secret");
        attacker
            .send_raw(target, &serde_json::to_string(&honest).unwrap())
            .await;
        let response = attacker.next_response().await;
        assert_eq!(response.code, ResponseCode::Ok);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        server.pipe.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_malformed_messages_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let network = Arc::new(InMemoryNetwork::new());
        let (server, _calls) = counting_server(&network, dir.path()).await;
        let mut peer = raw_peer(&network, dir.path()).await;
        let target = server.pipe.address();

        for junk in ["hello", "{}", "[1,2]", r#"{"id": 5}"#, r#"{"requester": 1}"#] {
            peer.send_raw(target, junk).await;
        }

        let request = peer.signed("/whoami");
        peer.send_raw(target, &serde_json::to_string(&request).unwrap())
            .await;
        let response = peer.next_response().await;
        assert_eq!(response.id, request.id);
        assert_eq!(response.code, ResponseCode::Ok);

        server.pipe.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_loosely_typed_request_is_processed() {
        let dir = tempfile::tempdir().unwrap();
        let network = Arc::new(InMemoryNetwork::new());
        let (server, calls) = counting_server(&network, dir.path()).await;
        let mut peer = raw_peer(&network, dir.path()).await;

        let request = peer.signed("/secret");
        let mut value = serde_json::to_value(&request).unwrap();
        value["timeout"] = json!(1500.5);
        value["method"] = json!("get");
        peer.send_raw(server.pipe.address(), &value.to_string()).await;

        let response = peer.next_response().await;
        assert_eq!(response.id, request.id);
        assert_eq!(response.code, ResponseCode::Ok);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        server.pipe.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_undecodable_request_with_id_is_answered() {
        let dir = tempfile::tempdir().unwrap();
        let network = Arc::new(InMemoryNetwork::new());
        let (server, calls) = counting_server(&network, dir.path()).await;
        let mut peer = raw_peer(&network, dir.path()).await;

        let request = peer.signed("/secret");
        let mut value = serde_json::to_value(&request).unwrap();
        value["method"] = json!("TRACE");
        peer.send_raw(server.pipe.address(), &value.to_string()).await;

        let response = peer.next_response().await;
        assert_eq!(response.id, request.id);
        assert_eq!(response.code, ResponseCode::BadRequest);
        assert!(response
            .message()
            .unwrap()
            .starts_with("Invalid request envelope"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        server.pipe.close().await.unwrap();
    }

    // =============================================================================
    // CLIENT SIDE
    // =============================================================================

    #[tokio::test]
    async fn test_unsolicited_responses_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let network = Arc::new(InMemoryNetwork::new());
        let server = messaging_node(&network, dir.path()).await;
        install_routes(&server.pipe);
        let client = messaging_node(&network, dir.path()).await;
        let peer = raw_peer(&network, dir.path()).await;

        let bogus = Response::ok(RequestId::new(), Some(json!("surprise")));
        peer.send_raw(client.pipe.address(), &serde_json::to_string(&bogus).unwrap())
            .await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        let stats = client.pipe.pending().stats();
        assert_eq!(stats.total_unmatched.load(Ordering::Relaxed), 1);

        let response = client
            .pipe
            .send(&server.target, SendRequest::new(Method::Get, "/whoami"))
            .await
            .unwrap();
        assert_eq!(response.body, Some(json!({ "requester": client.pipe.address() })));

        client.pipe.close().await.unwrap();
        server.pipe.close().await.unwrap();
    }
}
