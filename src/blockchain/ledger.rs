//! The ledger accessor seam.
//!
//! Everything above this module talks to the chain through [`Ledger`]; the
//! production implementation is [`BlockchainClient`](super::BlockchainClient).

use std::future::Future;

use alloy::primitives::{Address, Bytes, TxHash, B256, U256};
use alloy::rpc::types::TransactionRequest;
use futures_util::future::join_all;

use crate::blockchain::types::{BlockchainResult, ConfirmedTransaction, EventSubscription};
use crate::blockchain::wallet::Wallet;

/// Read/write access to a single network endpoint.
pub trait Ledger: Send + Sync + 'static {
    /// Execute a read-only call (`eth_call`) against `to`.
    fn call(&self, to: Address, input: Bytes)
        -> impl Future<Output = BlockchainResult<Bytes>> + Send;

    /// Execute several read-only calls against `to` concurrently.
    ///
    /// Results are returned in request order; each call fails independently.
    fn call_batch(
        &self,
        to: Address,
        inputs: Vec<Bytes>,
    ) -> impl Future<Output = Vec<BlockchainResult<Bytes>>> + Send {
        async move { join_all(inputs.into_iter().map(|input| self.call(to, input))).await }
    }

    /// Native balance of `address` in wei.
    fn balance(&self, address: Address) -> impl Future<Output = BlockchainResult<U256>> + Send;

    /// Sign `tx` with `wallet` and broadcast it. Resolves once the node has
    /// accepted the transaction, not when it is mined.
    fn send_transaction(
        &self,
        tx: TransactionRequest,
        wallet: &Wallet,
    ) -> impl Future<Output = BlockchainResult<TxHash>> + Send;

    /// Wait until `tx_hash` is mined with the configured confirmation depth.
    fn wait_for_confirmation(
        &self,
        tx_hash: TxHash,
    ) -> impl Future<Output = BlockchainResult<ConfirmedTransaction>> + Send;

    /// Subscribe to logs emitted by `address` whose first topic is `signature`.
    fn subscribe_events(
        &self,
        address: Address,
        signature: B256,
    ) -> impl Future<Output = BlockchainResult<EventSubscription>> + Send;
}
