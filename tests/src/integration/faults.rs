//! # Fault Scenarios
//!
//! Misbehaving nodes, scripted through the in-memory transport: garbage on
//! the wire, transport failures, a session that ends mid-wait, and
//! responses that never come.

#[cfg(test)]
mod tests {
    use ledger_events::predicates::accept_any;
    use ledger_events::{
        ClientConfig, ClientError, EventClient, MemoryTransport, ServerEnd, TransportError,
        WaitError, WaitOutcome,
    };
    use ledger_types::{Block, EventPayload, Hash, NewBlockData, Topic};
    use serde_json::json;
    use std::time::Duration;

    // =============================================================================
    // TEST FIXTURES
    // =============================================================================

    const WINDOW: Duration = Duration::from_millis(200);

    fn scripted_client() -> (EventClient, ServerEnd) {
        let config = ClientConfig::new("ws://memory/websocket").with_timeout(WINDOW);
        let (conn, server) = MemoryTransport::pair(64);
        (EventClient::with_connection(config, conn), server)
    }

    fn block(height: u64) -> EventPayload {
        EventPayload::NewBlock(NewBlockData {
            block: Block::next(height, Hash::zero(), 0),
        })
    }

    // =============================================================================
    // FAULTS DURING A WAIT
    // =============================================================================

    #[tokio::test]
    async fn test_malformed_frame_fails_wait() {
        let (mut client, server) = scripted_client();
        let topic = Topic::new_block();

        let outcome = client
            .wait_for_event(&topic, server.push("{not json"), accept_any())
            .await;

        match outcome {
            WaitOutcome::Errored(WaitError::Malformed { topic: failed, .. }) => {
                assert_eq!(failed, topic)
            }
            other => panic!("expected malformed, got {:?}", other),
        }
    }

    /// A payload whose `type` is unknown is malformed, not skipped.
    #[tokio::test]
    async fn test_unknown_payload_type_fails_wait() {
        let (mut client, server) = scripted_client();
        let topic = Topic::new_block();
        let frame = json!({
            "jsonrpc": "2.0",
            "method": "event",
            "params": { "event": "NewBlock", "data": { "type": "somethingElse" } },
        });

        let outcome = client
            .wait_for_event(&topic, server.push_json(&frame), accept_any())
            .await;

        assert!(matches!(
            outcome,
            WaitOutcome::Errored(WaitError::Malformed { .. })
        ));
    }

    #[tokio::test]
    async fn test_transport_fault_fails_wait() {
        let (mut client, server) = scripted_client();
        let topic = Topic::new_block();

        let outcome = client
            .wait_for_event(
                &topic,
                server.fail(TransportError::Socket("connection reset".into())),
                accept_any(),
            )
            .await;

        let err = outcome.error().expect("wait should fail");
        assert!(matches!(err, WaitError::Transport { .. }));
        assert!(err.to_string().contains("connection reset"));
    }

    /// Frames queued before the session ended are still read; only then
    /// does the wait run out its window.
    #[tokio::test]
    async fn test_session_end_after_queued_event() {
        let (mut client, server) = scripted_client();
        let topic = Topic::new_block();

        let outcome = client
            .wait_for_event(
                &topic,
                async {
                    server.push_event(&topic, &block(7)).await;
                    server.close();
                },
                accept_any(),
            )
            .await;
        assert_eq!(outcome.payload().and_then(|p| p.as_block()).map(|b| b.height), Some(7));

        let started = tokio::time::Instant::now();
        let outcome = client.wait(&topic, accept_any()).await;
        assert!(outcome.is_timed_out());
        assert!(started.elapsed() >= WINDOW);
        assert!(!client.is_connected());
    }

    // =============================================================================
    // FAULTS DURING CORRELATION
    // =============================================================================

    /// Whatever arrives ahead of the acknowledgement is dropped, including
    /// events on the topic being subscribed to.
    #[tokio::test]
    async fn test_unrelated_traffic_discarded_while_subscribing() {
        let (mut client, mut server) = scripted_client();
        let topic = Topic::new_block();

        let node = async {
            server.push_event(&topic, &block(1)).await;
            server.push("garbage").await;
            server.accept_subscribe("0x1").await;
        };
        let (subscription, _) = tokio::join!(client.subscribe(&topic), node);
        assert_eq!(subscription.unwrap().id().as_str(), "0x1");

        let stats = client.registry().stats();
        assert_eq!(stats.discarded, 1);
        assert_eq!(stats.malformed, 1);

        let outcome = client.wait(&topic, accept_any()).await;
        assert!(outcome.is_timed_out());
    }

    /// Nodes that do not echo request ids are still understood.
    #[tokio::test]
    async fn test_ack_without_request_id() {
        let (mut client, mut server) = scripted_client();
        let topic = Topic::new_block();

        let node = async {
            server.next_request().await;
            server
                .push_json(&json!({ "jsonrpc": "2.0", "result": { "subscriptionId": "0x9" } }))
                .await;
        };
        let (subscription, _) = tokio::join!(client.subscribe(&topic), node);
        assert_eq!(subscription.unwrap().id().as_str(), "0x9");
    }

    #[tokio::test]
    async fn test_subscribe_rejected_by_node() {
        let (mut client, mut server) = scripted_client();

        let topic = Topic::new_block();
        let (result, _) = tokio::join!(
            client.subscribe(&topic),
            server.reject(-32000, "too many subscriptions"),
        );

        match result.unwrap_err() {
            ClientError::Rejected { code, message, .. } => {
                assert_eq!(code, -32000);
                assert_eq!(message, "too many subscriptions");
            }
            other => panic!("expected rejection, got {:?}", other),
        }
        assert_eq!(client.registry().live_count(), 0);
    }

    #[tokio::test]
    async fn test_subscribe_times_out_without_ack() {
        let (mut client, _server) = scripted_client();
        let topic = Topic::new_block();

        let err = client.subscribe(&topic).await.unwrap_err();
        match err {
            ClientError::Timeout {
                operation,
                topic: timed_out,
                window,
            } => {
                assert_eq!(operation, "subscribe");
                assert_eq!(timed_out, topic);
                assert_eq!(window, WINDOW);
            }
            other => panic!("expected timeout, got {:?}", other),
        }
        assert_eq!(client.registry().stats().timeouts, 1);
    }

    #[tokio::test]
    async fn test_subscribe_after_session_end_fails() {
        let (mut client, server) = scripted_client();
        server.close();

        let err = client.subscribe(&Topic::new_block()).await.unwrap_err();
        assert!(
            matches!(err, ClientError::Transport(TransportError::Closed)),
            "got {:?}",
            err
        );
    }
}
