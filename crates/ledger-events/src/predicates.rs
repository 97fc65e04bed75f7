//! Event predicate library.
//!
//! Ready-made predicates for the common waits. Each validator decodes the
//! payload shape it expects and checks it field by field with exact
//! equality; the first violated expectation is reported with both the
//! expected and the actual value.

use crate::error::PredicateMismatch;
use crate::waiter::EventPredicate;
use ledger_types::{Address, Block, Bytes, CallData, EventPayload, Hash, Topic, Transaction, TxData};

/// Accept the first event on the topic.
pub fn accept_any() -> impl FnMut(&Topic, &EventPayload) -> Result<bool, PredicateMismatch> {
    |_: &Topic, _: &EventPayload| Ok(true)
}

/// Accept nothing. A wait using it can only time out or fail.
pub fn never_match() -> impl FnMut(&Topic, &EventPayload) -> Result<bool, PredicateMismatch> {
    |_: &Topic, _: &EventPayload| Ok(false)
}

/// Accept the first `NewBlock` whose block satisfies `f`.
///
/// Non-block payloads are a mismatch.
pub fn block_matching<F>(mut f: F) -> impl FnMut(&Topic, &EventPayload) -> Result<bool, PredicateMismatch>
where
    F: FnMut(&Block) -> bool,
{
    move |_: &Topic, payload: &EventPayload| match payload.as_block() {
        Some(block) => Ok(f(block)),
        None => Err(PredicateMismatch::UnexpectedPayload {
            expected: "newBlock",
            got: payload.kind(),
        }),
    }
}

/// Validate a value transfer: first input from `sender` for `amount`, first
/// output to `receiver`, no exception.
pub fn validate_send(
    sender: Address,
    amount: u64,
    receiver: Address,
) -> impl FnMut(&Topic, &EventPayload) -> Result<bool, PredicateMismatch> {
    move |_: &Topic, payload: &EventPayload| {
        let data = tx_data(payload)?;
        let Transaction::Send(tx) = &data.tx else {
            return Err(PredicateMismatch::UnexpectedTransaction {
                expected: "send",
                got: data.tx.kind(),
            });
        };
        let input = tx
            .inputs
            .first()
            .ok_or(PredicateMismatch::EmptyTransaction("inputs"))?;
        let output = tx
            .outputs
            .first()
            .ok_or(PredicateMismatch::EmptyTransaction("outputs"))?;

        expect_sender(sender, input.address)?;
        expect_amount(amount, input.amount)?;
        if output.address != receiver {
            return Err(PredicateMismatch::Receiver {
                expected: receiver,
                got: output.address,
            });
        }
        Ok(true)
    }
}

/// Validate a contract call transaction: sent by `sender` with `amount`,
/// returned `return_data`, no exception.
pub fn validate_tx(
    sender: Address,
    amount: u64,
    return_data: Bytes,
) -> impl FnMut(&Topic, &EventPayload) -> Result<bool, PredicateMismatch> {
    move |_: &Topic, payload: &EventPayload| {
        let data = tx_data(payload)?;
        let Transaction::Call(tx) = &data.tx else {
            return Err(PredicateMismatch::UnexpectedTransaction {
                expected: "call",
                got: data.tx.kind(),
            });
        };

        expect_sender(sender, tx.input.address)?;
        expect_amount(amount, tx.input.amount)?;
        expect_return(&return_data, &data.return_data)?;
        Ok(true)
    }
}

/// Validate a contract execution event: originated by `origin`, returned
/// `return_data`, part of transaction `tx_id`, no exception.
pub fn validate_call(
    origin: Address,
    return_data: Bytes,
    tx_id: Hash,
) -> impl FnMut(&Topic, &EventPayload) -> Result<bool, PredicateMismatch> {
    move |_: &Topic, payload: &EventPayload| {
        let data = call_data(payload)?;
        if data.origin != origin {
            return Err(PredicateMismatch::Origin {
                expected: origin,
                got: data.origin,
            });
        }
        expect_return(&return_data, &data.return_data)?;
        if data.tx_id != tx_id {
            return Err(PredicateMismatch::TxId {
                expected: tx_id,
                got: data.tx_id,
            });
        }
        Ok(true)
    }
}

/// Decline the first `n` events on the topic, then defer to `inner`.
///
/// Skipped events are not inspected at all, so a malformed-by-expectation
/// event (a contract creation ahead of the call under test) cannot fail the
/// wait.
pub fn skip_first<P>(n: usize, mut inner: P) -> impl FnMut(&Topic, &EventPayload) -> Result<bool, PredicateMismatch>
where
    P: EventPredicate,
{
    let mut remaining = n;
    move |topic: &Topic, payload: &EventPayload| {
        if remaining > 0 {
            remaining -= 1;
            return Ok(false);
        }
        inner.check(topic, payload)
    }
}

fn tx_data(payload: &EventPayload) -> Result<&TxData, PredicateMismatch> {
    let data = payload
        .as_tx_data()
        .ok_or(PredicateMismatch::UnexpectedPayload {
            expected: "accountInput or accountOutput",
            got: payload.kind(),
        })?;
    if !data.exception.is_empty() {
        return Err(PredicateMismatch::Exception(data.exception.clone()));
    }
    Ok(data)
}

fn call_data(payload: &EventPayload) -> Result<&CallData, PredicateMismatch> {
    let data = payload
        .as_call_data()
        .ok_or(PredicateMismatch::UnexpectedPayload {
            expected: "contractCall",
            got: payload.kind(),
        })?;
    if !data.exception.is_empty() {
        return Err(PredicateMismatch::Exception(data.exception.clone()));
    }
    Ok(data)
}

fn expect_sender(expected: Address, got: Address) -> Result<(), PredicateMismatch> {
    if expected == got {
        Ok(())
    } else {
        Err(PredicateMismatch::Sender { expected, got })
    }
}

fn expect_amount(expected: u64, got: u64) -> Result<(), PredicateMismatch> {
    if expected == got {
        Ok(())
    } else {
        Err(PredicateMismatch::Amount { expected, got })
    }
}

fn expect_return(expected: &Bytes, got: &Bytes) -> Result<(), PredicateMismatch> {
    if expected == got {
        Ok(())
    } else {
        Err(PredicateMismatch::Return {
            expected: expected.clone(),
            got: got.clone(),
        })
    }
}
