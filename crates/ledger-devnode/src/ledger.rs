//! # Simulated Ledger
//!
//! Account state, transaction execution and block commits for the
//! development node.
//!
//! Transactions are validated and applied when they are broadcast; the
//! events they produce are buffered and published when the next block is
//! committed, followed by the `NewBlock` event of that block.
//!
//! ## Contracts
//!
//! Contract code is a one-byte opcode followed by its operand:
//!
//! | opcode | operand | execution |
//! |--------|---------|-----------|
//! | `0x01` | return value | returns the operand |
//! | `0x02` | 20-byte address | calls that contract, returns its result |
//!
//! Deploying a contract stores the transaction data as code and returns it.

use crate::config::GenesisAccount;
use ledger_types::{
    contract_address, Address, Block, BlockHeight, Bytes, CallData, CallInfo, CallTx,
    EventPayload, Hash, NewBlockData, Receipt, SendTx, Topic, Transaction, TxData,
};
use std::collections::HashMap;
use thiserror::Error;
use tracing::debug;

/// Opcode: return the operand.
pub const OP_RETURN: u8 = 0x01;

/// Opcode: call the contract at the 20-byte operand and return its result.
pub const OP_CALL: u8 = 0x02;

/// Nested calls deeper than this raise an exception.
pub const MAX_CALL_DEPTH: usize = 16;

/// Code of a contract that returns `value`.
pub fn return_contract(value: &[u8]) -> Bytes {
    let mut code = Vec::with_capacity(1 + value.len());
    code.push(OP_RETURN);
    code.extend_from_slice(value);
    Bytes(code)
}

/// Code of a contract that forwards to `target` and returns its result.
pub fn forwarding_contract(target: &Address) -> Bytes {
    let mut code = Vec::with_capacity(21);
    code.push(OP_CALL);
    code.extend_from_slice(target.as_bytes());
    Bytes(code)
}

/// Transaction rejections.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("unknown account {0:#x}")]
    UnknownAccount(Address),

    #[error("invalid sequence for {address:#x}: expected {expected}, got {got}")]
    InvalidSequence {
        address: Address,
        expected: u64,
        got: u64,
    },

    #[error("insufficient funds in {address:#x}: balance {balance}, needed {needed}")]
    InsufficientFunds {
        address: Address,
        balance: u64,
        needed: u64,
    },

    #[error("send transaction needs at least one input and one output")]
    EmptySend,

    #[error("outputs ({outputs}) exceed inputs ({inputs})")]
    Overspend { inputs: u64, outputs: u64 },

    #[error("amount overflow")]
    Overflow,

    #[error("no contract at {0:#x}")]
    NoContract(Address),
}

/// Account state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Account {
    pub balance: u64,
    /// Sequence of the last transaction this account signed.
    pub sequence: u64,
    /// Contract code; empty for plain accounts.
    pub code: Bytes,
}

/// An event waiting to be published.
#[derive(Debug, Clone, PartialEq)]
pub struct Emitted {
    pub topic: Topic,
    pub payload: EventPayload,
}

impl Emitted {
    fn new(topic: Topic, payload: EventPayload) -> Self {
        Self { topic, payload }
    }
}

/// Result of running contract code.
struct Execution {
    return_data: Bytes,
    exception: String,
}

impl Execution {
    fn ok(return_data: Bytes) -> Self {
        Self {
            return_data,
            exception: String::new(),
        }
    }

    fn failed(exception: impl Into<String>) -> Self {
        Self {
            return_data: Bytes::new(),
            exception: exception.into(),
        }
    }

    fn succeeded(&self) -> bool {
        self.exception.is_empty()
    }
}

/// In-memory ledger state.
pub struct Ledger {
    chain_id: String,
    accounts: HashMap<Address, Account>,
    pending: Vec<Emitted>,
    pending_txs: u32,
    head: Block,
}

impl Ledger {
    /// Create a ledger at height 0 with the given funded accounts.
    pub fn new(chain_id: impl Into<String>, genesis: &[GenesisAccount]) -> Self {
        let accounts = genesis
            .iter()
            .map(|g| {
                (
                    g.address,
                    Account {
                        balance: g.balance,
                        ..Account::default()
                    },
                )
            })
            .collect();
        Self {
            chain_id: chain_id.into(),
            accounts,
            pending: Vec::new(),
            pending_txs: 0,
            head: Block::next(0, Hash::zero(), 0),
        }
    }

    pub fn chain_id(&self) -> &str {
        &self.chain_id
    }

    pub fn account(&self, address: &Address) -> Option<&Account> {
        self.accounts.get(address)
    }

    pub fn balance(&self, address: &Address) -> u64 {
        self.accounts.get(address).map_or(0, |a| a.balance)
    }

    /// Sequence the next transaction signed by `address` must carry.
    pub fn next_sequence(&self, address: &Address) -> u64 {
        self.accounts.get(address).map_or(1, |a| a.sequence + 1)
    }

    /// Last committed block.
    pub fn head(&self) -> &Block {
        &self.head
    }

    pub fn height(&self) -> BlockHeight {
        self.head.height
    }

    /// Transactions applied since the last commit.
    pub fn pending_txs(&self) -> u32 {
        self.pending_txs
    }

    /// Validate and apply `tx`, buffering its events for the next block.
    ///
    /// A rejected transaction leaves the state untouched.
    pub fn execute(&mut self, tx: &Transaction) -> Result<Receipt, LedgerError> {
        let tx_hash = tx.hash(&self.chain_id);
        let receipt = match tx {
            Transaction::Send(send) => self.execute_send(tx, send, tx_hash)?,
            Transaction::Call(call) => self.execute_call(tx, call, tx_hash)?,
        };
        self.pending_txs += 1;
        debug!(tx_hash = ?tx_hash, kind = tx.kind(), "Transaction applied");
        Ok(receipt)
    }

    /// Close the current block: returns it together with the buffered
    /// events, `NewBlock` last.
    pub fn commit(&mut self) -> (Block, Vec<Emitted>) {
        let block = Block::next(self.head.height + 1, self.head.hash, self.pending_txs);
        self.head = block.clone();
        self.pending_txs = 0;

        let mut events = std::mem::take(&mut self.pending);
        events.push(Emitted::new(
            Topic::new_block(),
            EventPayload::NewBlock(NewBlockData {
                block: block.clone(),
            }),
        ));
        (block, events)
    }

    fn check_input(&self, address: &Address, sequence: u64, needed: u64) -> Result<(), LedgerError> {
        let account = self
            .accounts
            .get(address)
            .ok_or(LedgerError::UnknownAccount(*address))?;
        if sequence != account.sequence + 1 {
            return Err(LedgerError::InvalidSequence {
                address: *address,
                expected: account.sequence + 1,
                got: sequence,
            });
        }
        if account.balance < needed {
            return Err(LedgerError::InsufficientFunds {
                address: *address,
                balance: account.balance,
                needed,
            });
        }
        Ok(())
    }

    fn execute_send(
        &mut self,
        tx: &Transaction,
        send: &SendTx,
        tx_hash: Hash,
    ) -> Result<Receipt, LedgerError> {
        if send.inputs.is_empty() || send.outputs.is_empty() {
            return Err(LedgerError::EmptySend);
        }
        let inputs = checked_sum(send.inputs.iter().map(|i| i.amount))?;
        let outputs = checked_sum(send.outputs.iter().map(|o| o.amount))?;
        if outputs > inputs {
            return Err(LedgerError::Overspend { inputs, outputs });
        }
        for input in &send.inputs {
            self.check_input(&input.address, input.sequence, input.amount)?;
        }

        for input in &send.inputs {
            let account = self.accounts.entry(input.address).or_default();
            account.balance -= input.amount;
            account.sequence = input.sequence;
        }
        for output in &send.outputs {
            let account = self.accounts.entry(output.address).or_default();
            account.balance = account
                .balance
                .checked_add(output.amount)
                .ok_or(LedgerError::Overflow)?;
        }

        let data = TxData {
            tx: tx.clone(),
            return_data: Bytes::new(),
            exception: String::new(),
        };
        for input in &send.inputs {
            self.pending.push(Emitted::new(
                Topic::account_input(&input.address),
                EventPayload::AccountInput(data.clone()),
            ));
        }
        for output in &send.outputs {
            self.pending.push(Emitted::new(
                Topic::account_output(&output.address),
                EventPayload::AccountOutput(data.clone()),
            ));
        }

        Ok(Receipt {
            tx_hash,
            creates_contract: false,
            contract_address: None,
        })
    }

    fn execute_call(
        &mut self,
        tx: &Transaction,
        call: &CallTx,
        tx_hash: Hash,
    ) -> Result<Receipt, LedgerError> {
        let caller = call.input.address;
        let needed = call
            .input
            .amount
            .checked_add(call.fee)
            .ok_or(LedgerError::Overflow)?;
        self.check_input(&caller, call.input.sequence, needed)?;

        let callee = match call.address {
            Some(address) => {
                if self.accounts.get(&address).map_or(true, |a| a.code.is_empty()) {
                    return Err(LedgerError::NoContract(address));
                }
                address
            }
            None => contract_address(&caller, call.input.sequence),
        };

        let account = self.accounts.entry(caller).or_default();
        account.balance -= needed;
        account.sequence = call.input.sequence;

        let execution = if call.creates_contract() {
            let contract = self.accounts.entry(callee).or_default();
            contract.code = call.data.clone();
            Execution::ok(call.data.clone())
        } else {
            self.run(&callee, caller, call.gas_limit, tx_hash, 0)
        };

        if execution.succeeded() {
            let contract = self.accounts.entry(callee).or_default();
            contract.balance = contract
                .balance
                .checked_add(call.input.amount)
                .ok_or(LedgerError::Overflow)?;
        } else if let Some(account) = self.accounts.get_mut(&caller) {
            // Value returns to the caller; the fee is kept.
            account.balance += call.input.amount;
        }

        let data = TxData {
            tx: tx.clone(),
            return_data: execution.return_data.clone(),
            exception: execution.exception.clone(),
        };
        self.pending.push(Emitted::new(
            Topic::account_input(&caller),
            EventPayload::AccountInput(data.clone()),
        ));
        self.pending.push(Emitted::new(
            Topic::account_output(&callee),
            EventPayload::AccountOutput(data),
        ));
        self.pending.push(Emitted::new(
            Topic::account_call(&callee),
            EventPayload::ContractCall(CallData {
                call: CallInfo {
                    caller,
                    callee,
                    data: call.data.clone(),
                    value: call.input.amount,
                    gas: call.gas_limit,
                },
                origin: caller,
                tx_id: tx_hash,
                return_data: execution.return_data,
                exception: execution.exception,
            }),
        ));

        Ok(Receipt {
            tx_hash,
            creates_contract: call.creates_contract(),
            contract_address: call.creates_contract().then_some(callee),
        })
    }

    /// Run the code at `contract`. Nested calls emit their own `Call` events.
    fn run(
        &mut self,
        contract: &Address,
        origin: Address,
        gas: u64,
        tx_id: Hash,
        depth: usize,
    ) -> Execution {
        if depth >= MAX_CALL_DEPTH {
            return Execution::failed("call depth exceeded");
        }
        let code = match self.accounts.get(contract) {
            Some(account) if !account.code.is_empty() => account.code.clone(),
            _ => return Execution::failed(format!("no code at {:#x}", contract)),
        };

        match code.as_slice().split_first() {
            Some((&OP_RETURN, value)) => Execution::ok(Bytes::from_slice(value)),
            Some((&OP_CALL, operand)) if operand.len() == 20 => {
                let target = Address::from_slice(operand);
                let nested = self.run(&target, origin, gas, tx_id, depth + 1);
                self.pending.push(Emitted::new(
                    Topic::account_call(&target),
                    EventPayload::ContractCall(CallData {
                        call: CallInfo {
                            caller: *contract,
                            callee: target,
                            data: Bytes::new(),
                            value: 0,
                            gas,
                        },
                        origin,
                        tx_id,
                        return_data: nested.return_data.clone(),
                        exception: nested.exception.clone(),
                    }),
                ));
                nested
            }
            Some((op, _)) => Execution::failed(format!("invalid opcode {:#04x}", op)),
            None => Execution::failed("empty code"),
        }
    }
}

fn checked_sum(mut amounts: impl Iterator<Item = u64>) -> Result<u64, LedgerError> {
    amounts.try_fold(0u64, |acc, amount| {
        acc.checked_add(amount).ok_or(LedgerError::Overflow)
    })
}
