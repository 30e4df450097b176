//! Shared utilities for integration testing.
//!
//! [`MockLedger`] is an in-memory chain that understands just enough of the
//! escrow contract to deploy, read and approve it.

#![allow(dead_code)]

use alloy::primitives::{keccak256, Address, Bytes, Log, TxHash, TxKind, B256, U256};
use alloy::rpc::types::TransactionRequest;
use alloy::sol_types::{SolCall, SolEvent, SolValue};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

use escrow_client::blockchain::client::classify_error_response;
use escrow_client::blockchain::types::{
    BlockchainError, BlockchainResult, ConfirmedTransaction, EventSubscription,
};
use escrow_client::blockchain::{Ledger, Wallet};
use escrow_client::escrow::contract::Escrow;
use escrow_client::escrow::{ContractArtifact, EscrowSession};

/// Anvil's first two development keys.
pub const DEPLOYER_KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
pub const ARBITER_KEY: &str = "59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d";

pub const CHAIN_ID: u64 = 31337;

pub fn wallet(key: &str) -> Wallet {
    Wallet::from_private_key(key, CHAIN_ID).unwrap()
}

pub fn artifact() -> ContractArtifact {
    ContractArtifact::from_bytecode(Bytes::from_static(&[0x60, 0x80, 0x60, 0x40, 0x52]))
}

/// Session over a fresh mock, able to deploy, with `signer` connected.
pub fn session(signer: Option<&str>) -> (Arc<MockLedger>, EscrowSession<MockLedger>) {
    let ledger = Arc::new(MockLedger::new());
    let session = EscrowSession::new(ledger.clone()).with_artifact(artifact());
    if let Some(key) = signer {
        session.connect_signer(wallet(key));
    }
    (ledger, session)
}

#[derive(Debug, Clone)]
struct MockEscrow {
    arbiter: Address,
    beneficiary: Address,
    is_approved: bool,
}

struct Subscriber {
    address: Address,
    signature: B256,
    tx: mpsc::UnboundedSender<Log>,
}

#[derive(Default)]
struct State {
    block: u64,
    escrows: HashMap<Address, MockEscrow>,
    balances: HashMap<Address, U256>,
    reverting: HashSet<Address>,
    receipts: HashMap<TxHash, ConfirmedTransaction>,
    subscribers: Vec<Subscriber>,
}

/// In-memory ledger with fault injection.
pub struct MockLedger {
    state: Mutex<State>,
    calls: AtomicUsize,
    sends: AtomicUsize,
    offline: AtomicBool,
    node_error: Mutex<Option<(i64, &'static str)>>,
    emit_events: AtomicBool,
    duplicate_events: AtomicBool,
    event_delay: Mutex<Duration>,
    receipt_delay: Mutex<Duration>,
}

impl MockLedger {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            calls: AtomicUsize::new(0),
            sends: AtomicUsize::new(0),
            offline: AtomicBool::new(false),
            node_error: Mutex::new(None),
            emit_events: AtomicBool::new(true),
            duplicate_events: AtomicBool::new(false),
            event_delay: Mutex::new(Duration::ZERO),
            receipt_delay: Mutex::new(Duration::ZERO),
        }
    }

    /// Every ledger request made so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Transactions submitted so far.
    pub fn sends(&self) -> usize {
        self.sends.load(Ordering::SeqCst)
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Answer every request with a JSON-RPC error response.
    pub fn set_node_error(&self, error: Option<(i64, &'static str)>) {
        *self.node_error.lock().unwrap() = error;
    }

    /// When off, approvals succeed without emitting `Approved`.
    pub fn set_emit_events(&self, emit: bool) {
        self.emit_events.store(emit, Ordering::SeqCst);
    }

    /// Deliver every event twice to subscribers.
    pub fn set_duplicate_events(&self, duplicate: bool) {
        self.duplicate_events.store(duplicate, Ordering::SeqCst);
    }

    pub fn set_event_delay(&self, delay: Duration) {
        *self.event_delay.lock().unwrap() = delay;
    }

    pub fn set_receipt_delay(&self, delay: Duration) {
        *self.receipt_delay.lock().unwrap() = delay;
    }

    /// Put a contract at `address` that reverts every call.
    pub fn add_reverting_contract(&self, address: Address) {
        self.state.lock().unwrap().reverting.insert(address);
    }

    pub fn fund(&self, address: Address, amount: U256) {
        *self.state.lock().unwrap().balances.entry(address).or_default() += amount;
    }

    pub fn balance_of(&self, address: Address) -> U256 {
        self.state
            .lock()
            .unwrap()
            .balances
            .get(&address)
            .copied()
            .unwrap_or_default()
    }

    pub fn is_approved_on_chain(&self, address: Address) -> bool {
        self.state
            .lock()
            .unwrap()
            .escrows
            .get(&address)
            .map(|e| e.is_approved)
            .unwrap_or(false)
    }

    fn check_online(&self, op: &'static str) -> BlockchainResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.offline.load(Ordering::SeqCst) {
            return Err(BlockchainError::Rpc("connection refused".to_string()));
        }
        if let Some((code, message)) = *self.node_error.lock().unwrap() {
            return Err(classify_error_response(op, code, message));
        }
        Ok(())
    }

    fn publish(&self, state: &State, log: Log) {
        let delay = *self.event_delay.lock().unwrap();
        let copies = if self.duplicate_events.load(Ordering::SeqCst) { 2 } else { 1 };
        let topic = log.data.topics().first().copied();

        for sub in &state.subscribers {
            if sub.address != log.address || Some(sub.signature) != topic {
                continue;
            }
            for _ in 0..copies {
                let tx = sub.tx.clone();
                let log = log.clone();
                if delay.is_zero() {
                    let _ = tx.send(log);
                } else {
                    tokio::spawn(async move {
                        tokio::time::sleep(delay).await;
                        let _ = tx.send(log);
                    });
                }
            }
        }
    }

    fn execute(&self, state: &mut State, from: Address, nonce: u64, tx: TransactionRequest) -> ConfirmedTransaction {
        state.block += 1;
        let tx_hash = keccak256([from.as_slice(), &nonce.to_be_bytes()].concat());
        let mut receipt = ConfirmedTransaction {
            tx_hash,
            block_number: state.block,
            success: false,
            contract_address: None,
            logs: Vec::new(),
        };
        let input = tx.input.input().cloned().unwrap_or_default();
        let value = tx.value.unwrap_or_default();

        match tx.to {
            Some(TxKind::Create) => {
                if input.len() < 64 {
                    return receipt;
                }
                let args = &input[input.len() - 64..];
                let address = from.create(nonce);
                state.escrows.insert(
                    address,
                    MockEscrow {
                        arbiter: Address::from_slice(&args[12..32]),
                        beneficiary: Address::from_slice(&args[44..64]),
                        is_approved: false,
                    },
                );
                *state.balances.entry(address).or_default() += value;
                receipt.success = true;
                receipt.contract_address = Some(address);
            }
            Some(TxKind::Call(to)) => {
                let is_approve = input.get(..4) == Some(&Escrow::approveCall::SELECTOR[..]);
                let Some(escrow) = state.escrows.get_mut(&to) else {
                    return receipt;
                };
                if !is_approve || escrow.arbiter != from {
                    return receipt;
                }
                escrow.is_approved = true;
                let beneficiary = escrow.beneficiary;
                let released = state.balances.remove(&to).unwrap_or_default();
                *state.balances.entry(beneficiary).or_default() += released;
                receipt.success = true;

                if self.emit_events.load(Ordering::SeqCst) {
                    let log = Log {
                        address: to,
                        data: Escrow::Approved { balance: released }.encode_log_data(),
                    };
                    receipt.logs.push(log.clone());
                    self.publish(state, log);
                }
            }
            None => {}
        }
        receipt
    }
}

impl Ledger for MockLedger {
    async fn call(&self, to: Address, input: Bytes) -> BlockchainResult<Bytes> {
        self.check_online("eth_call")?;
        let state = self.state.lock().unwrap();
        if state.reverting.contains(&to) {
            return Err(BlockchainError::ExecutionReverted("execution reverted".to_string()));
        }
        let Some(escrow) = state.escrows.get(&to) else {
            // No code at the address
            return Ok(Bytes::new());
        };

        let selector = input.get(..4);
        let encoded = if selector == Some(&Escrow::arbiterCall::SELECTOR[..]) {
            escrow.arbiter.abi_encode()
        } else if selector == Some(&Escrow::beneficiaryCall::SELECTOR[..]) {
            escrow.beneficiary.abi_encode()
        } else if selector == Some(&Escrow::isApprovedCall::SELECTOR[..]) {
            escrow.is_approved.abi_encode()
        } else {
            return Err(BlockchainError::ExecutionReverted("execution reverted".to_string()));
        };
        Ok(encoded.into())
    }

    async fn balance(&self, address: Address) -> BlockchainResult<U256> {
        self.check_online("get_balance")?;
        Ok(self.balance_of(address))
    }

    async fn send_transaction(&self, tx: TransactionRequest, wallet: &Wallet) -> BlockchainResult<TxHash> {
        self.check_online("send_transaction")?;
        self.sends.fetch_add(1, Ordering::SeqCst);
        let nonce = wallet.get_and_increment_nonce();
        let mut state = self.state.lock().unwrap();
        let receipt = self.execute(&mut state, wallet.address(), nonce, tx);
        let tx_hash = receipt.tx_hash;
        state.receipts.insert(tx_hash, receipt);
        Ok(tx_hash)
    }

    async fn wait_for_confirmation(&self, tx_hash: TxHash) -> BlockchainResult<ConfirmedTransaction> {
        let delay = *self.receipt_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.check_online("get_transaction_receipt")?;
        self.state
            .lock()
            .unwrap()
            .receipts
            .get(&tx_hash)
            .cloned()
            .ok_or_else(|| BlockchainError::Rpc(format!("unknown transaction {}", tx_hash)))
    }

    async fn subscribe_events(&self, address: Address, signature: B256) -> BlockchainResult<EventSubscription> {
        self.check_online("get_logs")?;
        let (tx, rx) = mpsc::unbounded_channel();
        self.state.lock().unwrap().subscribers.push(Subscriber {
            address,
            signature,
            tx,
        });
        Ok(EventSubscription::new(rx, None))
    }
}
