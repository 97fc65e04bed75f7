//! # Contract Scenarios
//!
//! Contract creation and invocation observed through account input, output
//! and call topics.

#[cfg(test)]
mod tests {
    use crate::fixtures::TestNet;
    use ledger_devnode::{forwarding_contract, return_contract};
    use ledger_events::predicates::{accept_any, skip_first, validate_call, validate_tx};
    use ledger_events::{Broadcaster, EventPredicate, PredicateMismatch};
    use ledger_types::{contract_address, Bytes, EventPayload, Topic};

    // =============================================================================
    // TEST FIXTURES
    // =============================================================================

    const DEPLOY_AMOUNT: u64 = 10_000;
    const CALL_AMOUNT: u64 = 10_001;

    fn return_value() -> Bytes {
        let mut value = vec![0u8; 32];
        value[31] = 5;
        Bytes(value)
    }

    async fn funded_net() -> TestNet {
        TestNet::builder()
            .account("alice", 1_000_000)
            .build()
            .await
            .expect("test network should start")
    }

    // =============================================================================
    // CREATION THEN INVOCATION
    // =============================================================================

    /// One wait spans a creation and a call from the same account: the
    /// creation event is declined and the wait continues until the call's
    /// return value matches.
    #[tokio::test]
    async fn test_creation_ignored_then_invocation_matched() {
        let net = funded_net().await;
        let mut client = net.client().await.unwrap();
        let alice = net.address("alice");
        let topic = Topic::account_input(&alice);
        let subscription = client.subscribe(&topic).await.unwrap();

        let code = return_contract(return_value().as_slice());
        let contract = contract_address(&alice, net.node().next_sequence(&alice));

        let mut inner = skip_first(1, validate_tx(alice, CALL_AMOUNT, return_value()));
        let mut rounds = 0;
        let counting = |topic: &Topic, payload: &EventPayload| -> Result<bool, PredicateMismatch> {
            rounds += 1;
            inner.check(topic, payload)
        };

        let outcome = client
            .wait_for_event(
                &topic,
                async {
                    net.broadcast_and_commit(net.call_tx("alice", None, code.clone(), DEPLOY_AMOUNT))
                        .await
                        .unwrap();
                    net.broadcast_and_commit(net.call_tx(
                        "alice",
                        Some(contract),
                        Bytes::from_slice(&[0x1]),
                        CALL_AMOUNT,
                    ))
                    .await
                    .unwrap();
                },
                counting,
            )
            .await;

        assert!(outcome.is_matched(), "wait: {:?}", outcome);
        assert_eq!(rounds, 2);

        client.unsubscribe(subscription).await.unwrap();
        client.stop().await;
        net.shutdown().await;
    }

    // =============================================================================
    // CALL WAIT / NO WAIT
    // =============================================================================

    /// Wait for the creation on the caller's input topic, then subscribe to
    /// the new contract and validate the return value of a call.
    #[tokio::test]
    async fn test_call_wait() {
        let net = funded_net().await;
        let mut client = net.client().await.unwrap();
        let alice = net.address("alice");
        let input = Topic::account_input(&alice);
        let code = return_contract(return_value().as_slice());

        let (receipt, outcome) = client
            .subscribe_and_wait_for_next(
                &input,
                async {
                    net.broadcast_and_commit(net.call_tx("alice", None, code.clone(), DEPLOY_AMOUNT))
                        .await
                        .unwrap()
                },
                validate_tx(alice, DEPLOY_AMOUNT, code.clone()),
            )
            .await
            .unwrap();
        assert!(outcome.is_matched(), "creation wait: {:?}", outcome);
        let contract = receipt.contract_address.expect("deployment address");

        let output = Topic::account_output(&contract);
        let (_, outcome) = client
            .subscribe_and_wait_for_next(
                &output,
                async {
                    net.broadcast_and_commit(net.call_tx(
                        "alice",
                        Some(contract),
                        Bytes::from_slice(&[0x1]),
                        CALL_AMOUNT,
                    ))
                    .await
                    .unwrap();
                },
                validate_tx(alice, CALL_AMOUNT, return_value()),
            )
            .await
            .unwrap();
        assert!(outcome.is_matched(), "call wait: {:?}", outcome);

        client.stop().await;
        net.shutdown().await;
    }

    /// Deploy without waiting, then wait on the contract's output topic.
    #[tokio::test]
    async fn test_call_no_wait() {
        let net = funded_net().await;
        let mut client = net.client().await.unwrap();
        let alice = net.address("alice");

        let contract = net
            .deploy("alice", return_contract(return_value().as_slice()), DEPLOY_AMOUNT)
            .await
            .unwrap();

        let topic = Topic::account_output(&contract);
        let (_, outcome) = client
            .subscribe_and_wait_for_next(
                &topic,
                async {
                    net.broadcast_and_commit(net.call_tx(
                        "alice",
                        Some(contract),
                        Bytes::from_slice(&[0x1]),
                        CALL_AMOUNT,
                    ))
                    .await
                    .unwrap();
                },
                validate_tx(alice, CALL_AMOUNT, return_value()),
            )
            .await
            .unwrap();
        assert!(outcome.is_matched(), "wait: {:?}", outcome);

        client.stop().await;
        net.shutdown().await;
    }

    /// A wrong expected return value fails the wait with both values.
    #[tokio::test]
    async fn test_call_return_mismatch_errors() {
        let net = funded_net().await;
        let mut client = net.client().await.unwrap();
        let alice = net.address("alice");
        let contract = net
            .deploy("alice", return_contract(return_value().as_slice()), DEPLOY_AMOUNT)
            .await
            .unwrap();

        let topic = Topic::account_output(&contract);
        let (_, outcome) = client
            .subscribe_and_wait_for_next(
                &topic,
                async {
                    net.broadcast_and_commit(net.call_tx("alice", Some(contract), Bytes::new(), 1))
                        .await
                        .unwrap();
                },
                validate_tx(alice, 1, Bytes::from_slice(&[0xde, 0xad])),
            )
            .await
            .unwrap();

        assert!(matches!(
            outcome.error().and_then(|e| e.mismatch()),
            Some(PredicateMismatch::Return { got, .. }) if got == &return_value()
        ));

        client.stop().await;
        net.shutdown().await;
    }

    /// A contract with invalid code reports an exception, which fails the
    /// wait.
    #[tokio::test]
    async fn test_call_exception_errors() {
        let net = funded_net().await;
        let mut client = net.client().await.unwrap();
        let alice = net.address("alice");
        let contract = net
            .deploy("alice", Bytes::from_slice(&[0xff]), 0)
            .await
            .unwrap();

        let topic = Topic::account_input(&alice);
        let (_, outcome) = client
            .subscribe_and_wait_for_next(
                &topic,
                async {
                    net.broadcast_and_commit(net.call_tx("alice", Some(contract), Bytes::new(), 1))
                        .await
                        .unwrap();
                },
                validate_tx(alice, 1, Bytes::new()),
            )
            .await
            .unwrap();

        assert!(matches!(
            outcome.error().and_then(|e| e.mismatch()),
            Some(PredicateMismatch::Exception(msg)) if msg.contains("invalid opcode")
        ));

        client.stop().await;
        net.shutdown().await;
    }

    // =============================================================================
    // CONTRACT CALLING CONTRACT
    // =============================================================================

    /// Calling a forwarding contract emits a call event on the contract it
    /// forwards to, carrying the outer transaction's origin and id.
    #[tokio::test]
    async fn test_call_call() {
        let net = funded_net().await;
        let mut client = net.client().await.unwrap();
        let alice = net.address("alice");

        let target = contract_address(&alice, net.node().next_sequence(&alice));
        let topic = Topic::account_call(&target);
        let subscription = client.subscribe(&topic).await.unwrap();

        // Let the target get created first.
        let outcome = client
            .wait_for_event(
                &topic,
                async {
                    net.deploy("alice", return_contract(return_value().as_slice()), DEPLOY_AMOUNT)
                        .await
                        .unwrap();
                },
                accept_any(),
            )
            .await;
        assert!(outcome.is_matched(), "creation wait: {:?}", outcome);

        let forwarder = net
            .deploy("alice", forwarding_contract(&target), DEPLOY_AMOUNT)
            .await
            .unwrap();

        let tx = net.call_tx("alice", Some(forwarder), Bytes::new(), CALL_AMOUNT);
        let tx_id = tx.hash(net.node().chain_id());
        let outcome = client
            .wait_for_event(
                &topic,
                async {
                    net.broadcast_and_commit(tx).await.unwrap();
                },
                validate_call(alice, return_value(), tx_id),
            )
            .await;
        assert!(outcome.is_matched(), "call wait: {:?}", outcome);

        let call = outcome
            .payload()
            .and_then(|p| p.as_call_data())
            .expect("call payload");
        assert_eq!(call.call.caller, forwarder);
        assert_eq!(call.call.callee, target);

        client.unsubscribe(subscription).await.unwrap();
        client.stop().await;
        net.shutdown().await;
    }
}
