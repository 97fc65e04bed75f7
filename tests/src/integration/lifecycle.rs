//! # Session Lifecycle
//!
//! Connecting, subscribing and unsubscribing against a live node, plus what
//! happens to a client when the node goes away underneath it.

#[cfg(test)]
mod tests {
    use crate::fixtures::TestNet;
    use ledger_events::predicates::accept_any;
    use ledger_events::{ClientConfig, ClientError, EventClient};
    use ledger_types::{address_from_label, Topic};
    use std::time::Duration;

    // =============================================================================
    // TEST FIXTURES
    // =============================================================================

    /// Poll `f` until it holds or a second has passed.
    async fn eventually(mut f: impl FnMut() -> bool) -> bool {
        for _ in 0..100 {
            if f() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        f()
    }

    // =============================================================================
    // CONNECT / STOP
    // =============================================================================

    #[tokio::test]
    async fn test_connect_and_stop() {
        let net = TestNet::builder().build().await.unwrap();
        let mut client = net.client().await.unwrap();
        assert!(client.is_connected());
        assert!(eventually(|| net.node().connection_count() == 1).await);

        client.stop().await;
        assert!(!client.is_connected());
        assert!(eventually(|| net.node().connection_count() == 0).await);

        net.shutdown().await;
    }

    #[tokio::test]
    async fn test_connect_to_missing_node_fails() {
        let net = TestNet::builder().build().await.unwrap();
        let endpoint = net.node().endpoint();
        net.shutdown().await;

        let config = ClientConfig::new(endpoint).with_timeout(Duration::from_millis(300));
        let err = EventClient::connect(config).await.err().expect("connect should fail");
        assert!(matches!(err, ClientError::ConnectionFailed { .. }));
    }

    #[tokio::test]
    async fn test_operations_after_stop_fail() {
        let net = TestNet::builder().build().await.unwrap();
        let mut client = net.client().await.unwrap();
        client.stop().await;

        assert!(client.subscribe(&Topic::new_block()).await.is_err());
        net.shutdown().await;
    }

    // =============================================================================
    // SUBSCRIBE / UNSUBSCRIBE
    // =============================================================================

    #[tokio::test]
    async fn test_subscription_lifecycle() {
        let net = TestNet::builder().build().await.unwrap();
        let mut client = net.client().await.unwrap();

        let blocks = client.subscribe(&Topic::new_block()).await.unwrap();
        let input = client
            .subscribe(&Topic::account_input(&address_from_label("alice")))
            .await
            .unwrap();
        assert_ne!(blocks.id(), input.id());
        assert_eq!(client.registry().live_count(), 2);
        assert_eq!(net.node().subscription_count(), 2);

        client.unsubscribe_confirmed(blocks).await.unwrap();
        assert_eq!(client.registry().live_count(), 1);
        assert_eq!(net.node().subscription_count(), 1);

        client.unsubscribe_confirmed(input).await.unwrap();
        assert_eq!(net.node().subscription_count(), 0);

        let stats = client.registry().stats();
        assert_eq!(stats.subscribed, 2);
        assert_eq!(stats.unsubscribed, 2);

        client.stop().await;
        net.shutdown().await;
    }

    /// Stopping a client releases every subscription it left behind.
    #[tokio::test]
    async fn test_stop_releases_leftover_subscriptions() {
        let net = TestNet::builder().build().await.unwrap();
        let mut client = net.client().await.unwrap();

        client.subscribe(&Topic::new_block()).await.unwrap();
        client
            .subscribe(&Topic::account_output(&address_from_label("bob")))
            .await
            .unwrap();
        assert_eq!(net.node().subscription_count(), 2);

        client.stop().await;
        assert_eq!(client.registry().live_count(), 0);
        assert!(eventually(|| net.node().subscription_count() == 0).await);

        net.shutdown().await;
    }

    #[tokio::test]
    async fn test_subscription_limit_rejects() {
        let net = TestNet::builder().max_subscriptions(1).build().await.unwrap();
        let mut client = net.client().await.unwrap();

        let first = client.subscribe(&Topic::new_block()).await.unwrap();
        let err = client
            .subscribe(&Topic::account_input(&address_from_label("alice")))
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Rejected { method: "subscribe", .. }));
        assert_eq!(client.registry().live_count(), 1);

        client.unsubscribe_confirmed(first).await.unwrap();
        client.stop().await;
        net.shutdown().await;
    }

    /// A node only lets the owning connection end a subscription; a
    /// confirmed unsubscribe from anyone else is rejected and changes nothing.
    #[tokio::test]
    async fn test_unsubscribe_foreign_subscription_rejected() {
        let net = TestNet::builder().build().await.unwrap();
        let mut owner = net.client().await.unwrap();
        let mut other = net.client().await.unwrap();

        let subscription = owner.subscribe(&Topic::new_block()).await.unwrap();
        let id = subscription.id().clone();

        let err = other.unsubscribe_confirmed(subscription).await.unwrap_err();
        match err {
            ClientError::Rejected { method, message, .. } => {
                assert_eq!(method, "unsubscribe");
                assert!(message.contains("not found"), "message: {}", message);
            }
            other => panic!("expected rejection, got {:?}", other),
        }
        assert_eq!(net.node().subscription_count(), 1);
        assert!(owner.registry().is_live(&id));

        // The owner still receives blocks on it.
        let (block, outcome) = owner
            .run_then_wait(&Topic::new_block(), async { net.commit() }, accept_any())
            .await;
        assert_eq!(outcome.payload().and_then(|p| p.as_block()), Some(&block));

        owner.stop().await;
        other.stop().await;
        net.shutdown().await;
    }

    // =============================================================================
    // NODE SHUTDOWN
    // =============================================================================

    /// When the node goes away mid-wait the wait still runs out its window
    /// and resolves as timed out, and the client reports the session ended.
    #[tokio::test]
    async fn test_node_shutdown_during_wait() {
        let net = TestNet::builder()
            .timeout(Duration::from_millis(300))
            .build()
            .await
            .unwrap();
        let mut client = net.client().await.unwrap();
        let topic = Topic::new_block();
        client.subscribe(&topic).await.unwrap();

        let started = tokio::time::Instant::now();
        let outcome = client
            .wait_for_event(&topic, net.shutdown(), accept_any())
            .await;

        assert!(outcome.is_timed_out(), "wait: {:?}", outcome);
        assert!(started.elapsed() >= Duration::from_millis(300));
        assert!(!client.is_connected());

        client.stop().await;
    }
}
