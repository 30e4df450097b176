//! Blockchain RPC client with timeout and error handling.
//!
//! # Responsibilities
//! - Connect to JSON-RPC endpoint (primary + failovers)
//! - Query chain state (block number, balances, receipts, calls, logs)
//! - Submit signed transactions and wait for confirmation
//! - Feed event subscriptions (WebSocket when configured, else log polling)
//! - Handle timeouts and network errors gracefully

use alloy::consensus::TxEnvelope;
use alloy::network::TransactionBuilder;
use alloy::primitives::{Address, Bytes, TxHash, B256, U256};
use alloy::providers::{Provider, ProviderBuilder, WsConnect};
use alloy::rpc::types::{Filter, Log as RpcLog, TransactionReceipt, TransactionRequest};
use alloy::transports::{RpcError, TransportResult};
use futures_util::StreamExt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout};

use crate::blockchain::ledger::Ledger;
use crate::blockchain::transaction::TxBuilder;
use crate::blockchain::types::{
    BlockchainConfig, BlockchainError, BlockchainResult, ChainId, ConfirmedTransaction,
    EventSubscription,
};
use crate::blockchain::wallet::Wallet;
use crate::observability::metrics;

type DynProvider = Arc<dyn Provider + Send + Sync>;

/// Blockchain RPC client wrapper with failover support.
#[derive(Clone)]
pub struct BlockchainClient {
    /// List of providers (primary + failovers).
    providers: Vec<DynProvider>,
    /// Configuration.
    config: BlockchainConfig,
    /// Request timeout duration.
    timeout_duration: Duration,
}

impl BlockchainClient {
    /// Create a new blockchain client.
    ///
    /// Succeeds even when the endpoint is unreachable; chain verification
    /// failures are logged, not returned.
    pub async fn new(config: BlockchainConfig) -> BlockchainResult<Self> {
        let timeout_duration = Duration::from_secs(config.rpc_timeout_secs);
        let mut providers = Vec::new();

        // 1. Add primary provider
        let primary_url: url::Url = config.rpc_url.parse().map_err(|e| {
            BlockchainError::Rpc(format!("Invalid RPC URL '{}': {}", config.rpc_url, e))
        })?;
        providers.push(Arc::new(ProviderBuilder::new().connect_http(primary_url)) as DynProvider);

        // 2. Add failover providers
        for url_str in &config.failover_urls {
            if let Ok(url) = url_str.parse() {
                providers.push(Arc::new(ProviderBuilder::new().connect_http(url)) as DynProvider);
            } else {
                tracing::warn!(url = %url_str, "Ignoring invalid failover RPC URL");
            }
        }

        let client = Self {
            providers,
            config: config.clone(),
            timeout_duration,
        };

        let verification = client.verify_chain_id().await;
        metrics::record_rpc_health(node_reachable(&verification));

        match verification {
            Ok(()) => {
                tracing::info!(
                    rpc_url = %config.rpc_url,
                    chain_id = config.chain_id,
                    "Blockchain client initialized"
                );
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    "Blockchain client initialized but chain verification failed"
                );
            }
        }

        Ok(client)
    }

    /// Run `op` against each provider in turn until one answers.
    ///
    /// Reverts and refusals reported by a node are final. Any other error
    /// response (rate limits, pruned state) is treated like a transport
    /// failure and the next provider is tried.
    async fn with_failover<T, F, Fut>(&self, op: &'static str, f: F) -> BlockchainResult<T>
    where
        F: Fn(DynProvider) -> Fut,
        Fut: Future<Output = TransportResult<T>>,
    {
        let mut all_timed_out = true;
        for (i, provider) in self.providers.iter().enumerate() {
            match timeout(self.timeout_duration, f(provider.clone())).await {
                Ok(Ok(result)) => return Ok(result),
                Ok(Err(RpcError::ErrorResp(payload))) => {
                    let err = classify_error_response(op, payload.code, &payload.message);
                    if !err.is_network() {
                        return Err(err);
                    }
                    all_timed_out = false;
                    tracing::warn!(provider_idx = i, op, error = %err, "Node error, trying next provider");
                }
                Ok(Err(e)) => {
                    all_timed_out = false;
                    tracing::warn!(provider_idx = i, op, error = %e, "RPC error, trying next provider");
                }
                Err(_) => {
                    tracing::warn!(provider_idx = i, op, "RPC timeout, trying next provider");
                }
            }
        }

        if all_timed_out {
            Err(BlockchainError::Timeout(self.config.rpc_timeout_secs))
        } else {
            Err(BlockchainError::Rpc(format!("All RPC providers failed: {}", op)))
        }
    }

    /// Verify the connected chain ID matches configuration.
    pub async fn verify_chain_id(&self) -> BlockchainResult<()> {
        let chain_id = self.get_chain_id().await?;
        if chain_id.0 != self.config.chain_id {
            return Err(BlockchainError::ChainMismatch {
                expected: self.config.chain_id,
                actual: chain_id.0,
            });
        }
        Ok(())
    }

    /// Get the chain ID from the RPC.
    pub async fn get_chain_id(&self) -> BlockchainResult<ChainId> {
        self.with_failover("get_chain_id", |p| async move { p.get_chain_id().await })
            .await
            .map(ChainId)
    }

    /// Get the latest block number.
    pub async fn get_block_number(&self) -> BlockchainResult<u64> {
        self.with_failover("get_block_number", |p| async move { p.get_block_number().await })
            .await
    }

    /// Get the balance of an address.
    pub async fn get_balance(&self, address: Address) -> BlockchainResult<U256> {
        self.with_failover("get_balance", |p| async move { p.get_balance(address).await })
            .await
    }

    /// Get the transaction count (nonce) for an address.
    pub async fn get_transaction_count(&self, address: Address) -> BlockchainResult<u64> {
        self.with_failover("get_transaction_count", |p| async move {
            p.get_transaction_count(address).await
        })
        .await
    }

    /// Get a transaction receipt by hash.
    pub async fn get_transaction_receipt(
        &self,
        tx_hash: TxHash,
    ) -> BlockchainResult<Option<TransactionReceipt>> {
        self.with_failover("get_transaction_receipt", |p| async move {
            p.get_transaction_receipt(tx_hash).await
        })
        .await
    }

    /// Get current gas price in wei.
    pub async fn get_gas_price(&self) -> BlockchainResult<u128> {
        self.with_failover("get_gas_price", |p| async move { p.get_gas_price().await })
            .await
    }

    /// Execute a read-only call.
    pub async fn eth_call(&self, to: Address, input: Bytes) -> BlockchainResult<Bytes> {
        let tx = TransactionRequest::default().with_to(to).with_input(input);
        self.with_failover("eth_call", |p| {
            let tx = tx.clone();
            async move { p.call(tx).await }
        })
        .await
    }

    /// Ask the node for a gas limit for `tx`.
    pub async fn estimate_gas(&self, tx: TransactionRequest) -> BlockchainResult<u64> {
        self.with_failover("estimate_gas", |p| {
            let tx = tx.clone();
            async move { p.estimate_gas(tx).await }
        })
        .await
    }

    /// Fetch logs matching `filter`.
    pub async fn get_logs(&self, filter: &Filter) -> BlockchainResult<Vec<RpcLog>> {
        self.with_failover("get_logs", |p| {
            let filter = filter.clone();
            async move { p.get_logs(&filter).await }
        })
        .await
    }

    /// Broadcast a signed transaction through the primary provider only.
    pub async fn send_envelope(&self, envelope: TxEnvelope) -> BlockchainResult<TxHash> {
        let fut = self.providers[0].send_tx_envelope(envelope);
        match timeout(self.timeout_duration, fut).await {
            Ok(Ok(pending)) => Ok(*pending.tx_hash()),
            Ok(Err(RpcError::ErrorResp(payload))) => Err(classify_error_response(
                "send_transaction",
                payload.code,
                &payload.message,
            )),
            Ok(Err(e)) => Err(BlockchainError::Rpc(e.to_string())),
            Err(_) => Err(BlockchainError::Timeout(self.config.rpc_timeout_secs)),
        }
    }

    /// Wait for a transaction to be mined with the configured depth.
    ///
    /// A reverted transaction resolves immediately with `success == false`.
    pub async fn wait_for_confirmation(
        &self,
        tx_hash: TxHash,
    ) -> BlockchainResult<ConfirmedTransaction> {
        let required_confirmations = self.config.confirmation_blocks.max(1);
        let timeout_duration = Duration::from_secs(self.config.confirmation_timeout_secs);
        let poll_interval = Duration::from_millis(self.config.poll_interval_ms);

        let result = timeout(timeout_duration, async {
            let mut ticker = interval(poll_interval);

            loop {
                ticker.tick().await;

                let receipt = match self.get_transaction_receipt(tx_hash).await {
                    Ok(Some(r)) => r,
                    Ok(None) => {
                        tracing::debug!(tx_hash = %tx_hash, "Transaction pending");
                        continue;
                    }
                    Err(e) if e.is_network() => {
                        tracing::warn!(tx_hash = %tx_hash, error = %e, "Receipt poll failed");
                        continue;
                    }
                    Err(e) => return Err(e),
                };

                let current_block = self.get_block_number().await?;
                let tx_block = receipt.block_number.unwrap_or(current_block);

                if !receipt.status() {
                    return Ok(confirmed_from_receipt(&receipt, tx_block));
                }

                // The including block counts as the first confirmation
                let confirmations = current_block.saturating_sub(tx_block) as u32 + 1;
                if confirmations >= required_confirmations {
                    return Ok(confirmed_from_receipt(&receipt, tx_block));
                }

                tracing::debug!(
                    tx_hash = %tx_hash,
                    confirmations = confirmations,
                    required = required_confirmations,
                    "Waiting for confirmations"
                );
            }
        })
        .await;

        match result {
            Ok(status) => status,
            Err(_) => Err(BlockchainError::ConfirmationTimeout(required_confirmations)),
        }
    }

    /// Subscribe to logs from `address` with topic0 `signature`.
    pub async fn subscribe_logs(
        &self,
        address: Address,
        signature: B256,
    ) -> BlockchainResult<EventSubscription> {
        let filter = Filter::new().address(address).event_signature(signature);
        let (tx, rx) = mpsc::unbounded_channel();

        let feeder = match &self.config.ws_url {
            Some(ws_url) => self.spawn_ws_feeder(ws_url.clone(), filter, tx).await?,
            None => self.spawn_poll_feeder(filter, tx).await?,
        };

        tracing::debug!(address = %address, event = %signature, "Event subscription opened");
        Ok(EventSubscription::new(rx, Some(feeder)))
    }

    async fn spawn_ws_feeder(
        &self,
        ws_url: String,
        filter: Filter,
        tx: mpsc::UnboundedSender<alloy::primitives::Log>,
    ) -> BlockchainResult<JoinHandle<()>> {
        let provider = ProviderBuilder::new()
            .connect_ws(WsConnect::new(ws_url.clone()))
            .await
            .map_err(|e| BlockchainError::Rpc(format!("WebSocket connect to '{}' failed: {}", ws_url, e)))?;
        let subscription = provider
            .subscribe_logs(&filter)
            .await
            .map_err(|e| BlockchainError::Rpc(format!("Log subscription failed: {}", e)))?;

        Ok(tokio::spawn(async move {
            // The stream ends when the provider is dropped
            let _provider = provider;
            let mut stream = std::pin::pin!(subscription.into_stream());
            while let Some(log) = stream.next().await {
                let Some(log) = canonical(log) else { continue };
                if tx.send(log).is_err() {
                    break;
                }
            }
            tracing::debug!("WebSocket log feed closed");
        }))
    }

    async fn spawn_poll_feeder(
        &self,
        filter: Filter,
        tx: mpsc::UnboundedSender<alloy::primitives::Log>,
    ) -> BlockchainResult<JoinHandle<()>> {
        let mut last_block = self.get_block_number().await?;
        let client = self.clone();
        let poll_interval = Duration::from_millis(self.config.poll_interval_ms);

        Ok(tokio::spawn(async move {
            let mut ticker = interval(poll_interval);
            loop {
                ticker.tick().await;

                let current_block = match client.get_block_number().await {
                    Ok(block) => block,
                    Err(e) => {
                        tracing::warn!(error = %e, "Log poll failed to read block number");
                        continue;
                    }
                };
                if current_block <= last_block {
                    continue;
                }

                let range = filter.clone().from_block(last_block + 1).to_block(current_block);
                match client.get_logs(&range).await {
                    Ok(logs) => {
                        for log in logs.into_iter().filter_map(canonical) {
                            if tx.send(log).is_err() {
                                return;
                            }
                        }
                        last_block = current_block;
                    }
                    Err(e) => tracing::warn!(error = %e, "Log poll failed"),
                }
            }
        }))
    }

    /// Get the configuration.
    pub fn config(&self) -> &BlockchainConfig {
        &self.config
    }
}

/// A node that answered at all is reachable, even with the wrong chain.
fn node_reachable(verification: &BlockchainResult<()>) -> bool {
    !matches!(verification, Err(e) if e.is_network())
}

/// The primitive log, or `None` when a reorg dropped it.
fn canonical(log: RpcLog) -> Option<alloy::primitives::Log> {
    (!log.removed).then_some(log.inner)
}

/// Substrings of node messages refusing a transaction outright.
const REFUSALS: &[&str] = &[
    "insufficient funds",
    "nonce too low",
    "replacement transaction underpriced",
    "already known",
    "intrinsic gas too low",
    "exceeds block gas limit",
    "fee cap less than block base fee",
    "max fee per gas less than block base fee",
];

/// Substrings of node messages that describe a transient condition.
const TRANSIENT: &[&str] = &["rate limit", "too many requests", "limit exceeded", "timeout", "unavailable"];

/// JSON-RPC code for "limit exceeded" (EIP-1474).
const LIMIT_EXCEEDED_CODE: i64 = -32005;

/// JSON-RPC code geth uses for execution reverted.
const EXECUTION_REVERTED_CODE: i64 = 3;

/// Map a node's JSON-RPC error answer for `op` to a [`BlockchainError`].
///
/// Only `eth_call`/`eth_estimateGas` can revert. Refusals of a transaction
/// become [`BlockchainError::Rejected`]; everything else is an
/// [`BlockchainError::Rpc`] failure.
pub fn classify_error_response(op: &'static str, code: i64, message: &str) -> BlockchainError {
    let lower = message.to_ascii_lowercase();
    let executes = matches!(op, "eth_call" | "estimate_gas");
    let submits = op == "send_transaction";

    if executes && (code == EXECUTION_REVERTED_CODE || lower.contains("execution reverted")) {
        return BlockchainError::ExecutionReverted(message.to_string());
    }
    if (executes || submits) && REFUSALS.iter().any(|needle| lower.contains(needle)) {
        return BlockchainError::Rejected(message.to_string());
    }
    let transient =
        code == LIMIT_EXCEEDED_CODE || TRANSIENT.iter().any(|needle| lower.contains(needle));
    if submits && !transient {
        return BlockchainError::Rejected(message.to_string());
    }
    BlockchainError::Rpc(format!("{} failed with node error {}: {}", op, code, message))
}

fn confirmed_from_receipt(receipt: &TransactionReceipt, block_number: u64) -> ConfirmedTransaction {
    ConfirmedTransaction {
        tx_hash: receipt.transaction_hash,
        block_number,
        success: receipt.status(),
        contract_address: receipt.contract_address,
        logs: receipt.inner.logs().iter().map(|log| log.inner.clone()).collect(),
    }
}

impl Ledger for BlockchainClient {
    async fn call(&self, to: Address, input: Bytes) -> BlockchainResult<Bytes> {
        self.eth_call(to, input).await
    }

    async fn balance(&self, address: Address) -> BlockchainResult<U256> {
        self.get_balance(address).await
    }

    async fn send_transaction(
        &self,
        tx: TransactionRequest,
        wallet: &Wallet,
    ) -> BlockchainResult<TxHash> {
        if wallet.chain_id() != self.config.chain_id {
            return Err(BlockchainError::ChainMismatch {
                expected: self.config.chain_id,
                actual: wallet.chain_id(),
            });
        }
        TxBuilder::new(self, wallet).submit(tx).await
    }

    async fn wait_for_confirmation(&self, tx_hash: TxHash) -> BlockchainResult<ConfirmedTransaction> {
        BlockchainClient::wait_for_confirmation(self, tx_hash).await
    }

    async fn subscribe_events(
        &self,
        address: Address,
        signature: B256,
    ) -> BlockchainResult<EventSubscription> {
        self.subscribe_logs(address, signature).await
    }
}

impl std::fmt::Debug for BlockchainClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockchainClient")
            .field("rpc_url", &self.config.rpc_url)
            .field("ws_url", &self.config.ws_url)
            .field("chain_id", &self.config.chain_id)
            .field("timeout_secs", &self.config.rpc_timeout_secs)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> BlockchainConfig {
        BlockchainConfig {
            rpc_url: "http://localhost:8545".to_string(),
            chain_id: 31337, // Anvil default
            rpc_timeout_secs: 5,
            ..BlockchainConfig::default()
        }
    }

    #[test]
    fn test_reverts_only_from_execution() {
        let err = classify_error_response("eth_call", 3, "execution reverted: not arbiter");
        assert!(matches!(err, BlockchainError::ExecutionReverted(ref m) if m.contains("not arbiter")));

        let err = classify_error_response("estimate_gas", -32000, "execution reverted");
        assert!(matches!(err, BlockchainError::ExecutionReverted(_)));

        // Same message on a state read is not a contract answer
        let err = classify_error_response("get_balance", 3, "execution reverted");
        assert!(matches!(err, BlockchainError::Rpc(_)));
    }

    #[test]
    fn test_node_errors_stay_network() {
        for (op, code, message) in [
            ("eth_call", -32005, "rate limit exceeded"),
            ("get_balance", -32005, "rate limit exceeded"),
            ("eth_call", -32000, "header not found"),
            ("get_block_number", -32603, "internal error"),
            ("send_transaction", -32005, "too many requests"),
        ] {
            let err = classify_error_response(op, code, message);
            assert!(err.is_network(), "{op} {message}: {err:?}");
        }
    }

    #[test]
    fn test_refusals_are_rejections() {
        let err = classify_error_response(
            "estimate_gas",
            -32000,
            "insufficient funds for gas * price + value",
        );
        assert!(matches!(err, BlockchainError::Rejected(_)));

        let err = classify_error_response("send_transaction", -32000, "nonce too low");
        assert!(matches!(err, BlockchainError::Rejected(_)));

        let err = classify_error_response("send_transaction", -32000, "invalid sender");
        assert!(matches!(err, BlockchainError::Rejected(_)));
    }

    #[test]
    fn test_removed_logs_skipped() {
        let live = RpcLog::default();
        assert!(canonical(live).is_some());

        let dropped = RpcLog {
            removed: true,
            ..RpcLog::default()
        };
        assert!(canonical(dropped).is_none());
    }

    #[test]
    fn test_health_from_chain_verification() {
        assert!(node_reachable(&Ok(())));
        assert!(node_reachable(&Err(BlockchainError::ChainMismatch {
            expected: 1,
            actual: 5,
        })));
        assert!(!node_reachable(&Err(BlockchainError::Timeout(5))));
        assert!(!node_reachable(&Err(BlockchainError::Rpc("connection refused".into()))));
    }

    #[tokio::test]
    async fn test_client_creation() {
        // Client creation should succeed even if RPC is unreachable
        let result = BlockchainClient::new(test_config()).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_invalid_rpc_url_rejected() {
        let mut config = test_config();
        config.rpc_url = "not a url".to_string();
        let err = BlockchainClient::new(config).await.unwrap_err();
        assert!(err.to_string().contains("Invalid RPC URL"));
    }

    #[tokio::test]
    async fn test_rpc_failover() {
        let mut config = test_config();
        config.failover_urls.push("http://invalid:8545".to_string());

        let client = BlockchainClient::new(config).await.unwrap();

        // Both endpoints are unreachable, so every provider is tried and fails
        let result = client.get_chain_id().await;
        let err = result.unwrap_err();
        assert!(err.is_network());
    }
}
