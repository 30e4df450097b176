//! Chain-specific types and error definitions.

use alloy::primitives::{Address, Log, TxHash};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

// Re-export BlockchainConfig from config module to avoid duplication
pub use crate::config::schema::BlockchainConfig;

/// Chain ID type for strong typing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChainId(pub u64);

/// Errors that can occur during blockchain operations.
#[derive(Debug, Error)]
pub enum BlockchainError {
    /// RPC connection or request failed.
    #[error("RPC error: {0}")]
    Rpc(String),

    /// RPC request timed out.
    #[error("RPC timeout after {0} seconds")]
    Timeout(u64),

    /// The node rejected a call or gas estimate (e.g. `execution reverted`).
    #[error("Execution reverted: {0}")]
    ExecutionReverted(String),

    /// Transaction was not confirmed within expected time.
    #[error("Transaction not confirmed after {0} blocks")]
    ConfirmationTimeout(u32),

    /// The node refused to accept a signed transaction (e.g. insufficient funds).
    #[error("Transaction rejected by node: {0}")]
    Rejected(String),

    /// Transaction was reverted on-chain.
    #[error("Transaction reverted: {0}")]
    Reverted(String),

    /// Returned data could not be decoded as the expected ABI type.
    #[error("Decode error: {0}")]
    Decode(String),

    /// Invalid private key format, derivation or signing error.
    #[error("Wallet error: {0}")]
    Wallet(String),

    /// Gas price exceeded maximum allowed.
    #[error("Gas price {current_gwei} gwei exceeds maximum {max_gwei} gwei")]
    GasPriceTooHigh { current_gwei: u64, max_gwei: u64 },

    /// Chain configuration mismatch.
    #[error("Chain ID mismatch: expected {expected}, got {actual}")]
    ChainMismatch { expected: u64, actual: u64 },
}

impl BlockchainError {
    /// Whether the failure is a transport problem rather than a contract answer.
    ///
    /// A chain id mismatch is a configuration error and is not included.
    pub fn is_network(&self) -> bool {
        matches!(
            self,
            BlockchainError::Rpc(_)
                | BlockchainError::Timeout(_)
                | BlockchainError::ConfirmationTimeout(_)
        )
    }
}

/// Result type for blockchain operations.
pub type BlockchainResult<T> = Result<T, BlockchainError>;

/// A mined transaction as seen by the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmedTransaction {
    pub tx_hash: TxHash,
    pub block_number: u64,
    /// Receipt status; `false` means the transaction reverted.
    pub success: bool,
    /// Set for contract creation transactions.
    pub contract_address: Option<Address>,
    pub logs: Vec<Log>,
}

/// Live stream of contract logs matching one address and event signature.
///
/// Dropping the subscription stops the background feeder task, if any.
#[derive(Debug)]
pub struct EventSubscription {
    rx: mpsc::UnboundedReceiver<Log>,
    feeder: Option<JoinHandle<()>>,
}

impl EventSubscription {
    /// Wrap a receiver, optionally owning the task that feeds it.
    pub fn new(rx: mpsc::UnboundedReceiver<Log>, feeder: Option<JoinHandle<()>>) -> Self {
        Self { rx, feeder }
    }

    /// Wait for the next log; `None` once the feed has closed.
    pub async fn next(&mut self) -> Option<Log> {
        self.rx.recv().await
    }
}

impl Drop for EventSubscription {
    fn drop(&mut self) {
        if let Some(feeder) = self.feeder.take() {
            feeder.abort();
        }
    }
}
