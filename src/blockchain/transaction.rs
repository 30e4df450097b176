//! Transaction preparation, signing and submission.
//!
//! # Responsibilities
//! - Fill nonce, gas price, gas limit and chain id
//! - Sign locally and broadcast through the primary provider
//!
//! Submission is never retried: a transaction that may have reached the
//! mempool cannot be resent safely without explicit nonce handling.

use alloy::network::TransactionBuilder;
use alloy::primitives::TxHash;
use alloy::rpc::types::TransactionRequest;

use crate::blockchain::client::BlockchainClient;
use crate::blockchain::types::{BlockchainError, BlockchainResult};
use crate::blockchain::wallet::Wallet;

/// Transaction builder bound to one client and one signer.
pub struct TxBuilder<'a> {
    client: &'a BlockchainClient,
    wallet: &'a Wallet,
}

impl<'a> TxBuilder<'a> {
    /// Create a new transaction builder.
    pub fn new(client: &'a BlockchainClient, wallet: &'a Wallet) -> Self {
        Self { client, wallet }
    }

    /// Fill in everything the signer needs.
    ///
    /// The caller provides `to`/deploy code, `value` and `input`.
    pub async fn prepare(&self, tx: TransactionRequest) -> BlockchainResult<TransactionRequest> {
        // Never move the local nonce backwards past transactions we already sent
        let chain_nonce = self.client.get_transaction_count(self.wallet.address()).await?;
        if chain_nonce > self.wallet.current_nonce() {
            self.wallet.set_nonce(chain_nonce);
        }

        let gas_price = self.client.get_gas_price().await?;
        let gas_price_gwei = gas_price / 1_000_000_000;

        let config = self.client.config();
        if gas_price_gwei > config.max_gas_price_gwei as u128 {
            return Err(BlockchainError::GasPriceTooHigh {
                current_gwei: gas_price_gwei as u64,
                max_gwei: config.max_gas_price_gwei,
            });
        }

        // Apply multiplier for safety margin
        let adjusted_gas_price = (gas_price as f64 * config.gas_price_multiplier) as u128;

        let tx = tx
            .with_from(self.wallet.address())
            .with_gas_price(adjusted_gas_price)
            .with_chain_id(self.wallet.chain_id());

        // Estimate before reserving a nonce so a reverting call leaves no gap
        let gas_limit = self.client.estimate_gas(tx.clone()).await?;
        let nonce = self.wallet.get_and_increment_nonce();

        Ok(tx.with_gas_limit(gas_limit).with_nonce(nonce))
    }

    /// Prepare, sign and broadcast `tx`, returning its hash.
    pub async fn submit(&self, tx: TransactionRequest) -> BlockchainResult<TxHash> {
        let prepared = self.prepare(tx).await?;
        let nonce = prepared.nonce.unwrap_or_default();

        let result = match self.wallet.sign_transaction(prepared).await {
            Ok(envelope) => self.client.send_envelope(envelope).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(tx_hash) => {
                tracing::info!(
                    tx_hash = %tx_hash,
                    from = %self.wallet.address(),
                    nonce = nonce,
                    "Transaction submitted"
                );
                Ok(tx_hash)
            }
            Err(e) if never_broadcast(&e) => {
                if !self.wallet.release_nonce(nonce) {
                    tracing::debug!(nonce = nonce, "Nonce not released; a later reservation exists");
                }
                Err(e)
            }
            Err(e) => {
                tracing::warn!(
                    nonce = nonce,
                    error = %e,
                    "Broadcast outcome unknown; keeping nonce reserved"
                );
                Err(e)
            }
        }
    }
}

/// Whether the signed transaction certainly did not reach the mempool.
fn never_broadcast(err: &BlockchainError) -> bool {
    matches!(err, BlockchainError::Wallet(_) | BlockchainError::Rejected(_))
}
