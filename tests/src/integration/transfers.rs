//! # Transfer Scenarios
//!
//! Send transactions observed through the sender's input topic and the
//! receiver's output topic.

#[cfg(test)]
mod tests {
    use crate::fixtures::TestNet;
    use ledger_events::predicates::{accept_any, never_match, validate_send};
    use ledger_events::{ClientError, PredicateMismatch};
    use ledger_types::{EventPayload, Topic};
    use std::time::Duration;

    // =============================================================================
    // TEST FIXTURES
    // =============================================================================

    async fn funded_net() -> TestNet {
        TestNet::builder()
            .account("alice", 1_000_000)
            .account("bob", 0)
            .build()
            .await
            .expect("test network should start")
    }

    // =============================================================================
    // SEND
    // =============================================================================

    /// The transfer shows up on the sender's input and the receiver's output
    /// topic, both validated field by field.
    #[tokio::test]
    async fn test_send_validates_input_and_output() {
        let net = funded_net().await;
        let mut client = net.client().await.unwrap();
        let alice = net.address("alice");
        let bob = net.address("bob");

        let input = Topic::account_input(&alice);
        let output = Topic::account_output(&bob);
        let input_sub = client.subscribe(&input).await.unwrap();
        let output_sub = client.subscribe(&output).await.unwrap();

        let tx = net.send_tx("alice", bob, 100);
        let outcome = client
            .wait_for_event(
                &input,
                async {
                    net.broadcast_and_commit(tx).await.unwrap();
                },
                validate_send(alice, 100, bob),
            )
            .await;
        assert!(outcome.is_matched(), "input wait: {:?}", outcome);

        let outcome = client
            .wait_for_event(&output, async {}, validate_send(alice, 100, bob))
            .await;
        assert!(outcome.is_matched(), "output wait: {:?}", outcome);
        assert!(matches!(outcome.payload(), Some(EventPayload::AccountOutput(_))));

        client.unsubscribe(input_sub).await.unwrap();
        client.unsubscribe(output_sub).await.unwrap();
        client.stop().await;
        net.shutdown().await;
    }

    /// Expecting 99 when 100 was sent fails the wait with both amounts.
    #[tokio::test]
    async fn test_send_amount_mismatch_errors() {
        let net = funded_net().await;
        let mut client = net.client().await.unwrap();
        let alice = net.address("alice");
        let bob = net.address("bob");
        let topic = Topic::account_input(&alice);

        let tx = net.send_tx("alice", bob, 100);
        let (_, outcome) = client
            .subscribe_and_wait_for_next(
                &topic,
                async { net.broadcast_and_commit(tx).await.unwrap() },
                validate_send(alice, 99, bob),
            )
            .await
            .unwrap();

        let err = outcome.error().expect("wait should fail");
        assert_eq!(err.topic(), &topic);
        assert_eq!(
            err.mismatch(),
            Some(&PredicateMismatch::Amount {
                expected: 99,
                got: 100
            })
        );

        let err = outcome.into_result(&topic, client.window()).unwrap_err();
        assert!(err.to_string().contains("expected 99, got 100"));
        client.stop().await;
        net.shutdown().await;
    }

    /// A transaction is reported once: a second wait on the same topic
    /// times out.
    #[tokio::test]
    async fn test_double_fire() {
        let net = TestNet::builder()
            .account("alice", 1_000_000)
            .timeout(Duration::from_millis(300))
            .build()
            .await
            .unwrap();
        let mut client = net.client().await.unwrap();
        let alice = net.address("alice");
        let topic = Topic::account_input(&alice);
        let subscription = client.subscribe(&topic).await.unwrap();

        let tx = net.send_tx("alice", net.address("bob"), 100);
        let outcome = client
            .wait_for_event(
                &topic,
                async {
                    net.broadcast_and_commit(tx).await.unwrap();
                },
                accept_any(),
            )
            .await;
        assert!(outcome.is_matched());

        net.commit();
        let outcome = client.wait(&topic, never_match()).await;
        assert!(outcome.is_timed_out(), "second wait: {:?}", outcome);

        let err = outcome.into_result(&topic, client.window()).unwrap_err();
        assert!(matches!(err, ClientError::Timeout { .. }));

        client.unsubscribe(subscription).await.unwrap();
        client.stop().await;
        net.shutdown().await;
    }

    /// Events of other accounts never satisfy a wait on this account.
    #[tokio::test]
    async fn test_other_account_traffic_is_ignored() {
        let net = TestNet::builder()
            .account("alice", 1_000)
            .account("carol", 1_000)
            .timeout(Duration::from_millis(300))
            .build()
            .await
            .unwrap();
        let mut client = net.client().await.unwrap();
        let alice = net.address("alice");
        let carol = net.address("carol");

        let alice_topic = Topic::account_input(&alice);
        let carol_topic = Topic::account_input(&carol);
        let alice_sub = client.subscribe(&alice_topic).await.unwrap();
        let carol_sub = client.subscribe(&carol_topic).await.unwrap();

        let tx = net.send_tx("carol", net.address("bob"), 5);
        let outcome = client
            .wait_for_event(
                &alice_topic,
                async {
                    net.broadcast_and_commit(tx).await.unwrap();
                },
                accept_any(),
            )
            .await;
        assert!(outcome.is_timed_out());

        client.unsubscribe(alice_sub).await.unwrap();
        client.unsubscribe(carol_sub).await.unwrap();
        client.stop().await;
        net.shutdown().await;
    }
}
