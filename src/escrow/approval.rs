//! Approval orchestration.
//!
//! # Flow
//! ```text
//! begin_approval (registry guard)
//!     → subscribe to Approved
//!     → submit approve()
//!     → first of { Approved event, confirmed receipt }
//!     → apply_approved (idempotent, notifies once)
//! ```

use alloy::primitives::{Address, TxHash, U256};
use std::sync::Arc;

use crate::blockchain::ledger::Ledger;
use crate::blockchain::types::EventSubscription;
use crate::escrow::contract::{is_approved_log, released_amount, SignableEscrow};
use crate::escrow::registry::{ApprovalStart, EscrowRegistry};
use crate::escrow::types::{ApprovalOutcome, EscrowError, EscrowResult};
use crate::observability::metrics;

/// Drives `approve()` for records held in a registry.
pub struct ApprovalOrchestrator<L> {
    registry: Arc<EscrowRegistry<L>>,
}

impl<L: Ledger> ApprovalOrchestrator<L> {
    pub fn new(registry: Arc<EscrowRegistry<L>>) -> Self {
        Self { registry }
    }

    /// Approve the escrow at `address` and wait for the confirmation.
    pub async fn approve(&self, address: Address) -> EscrowResult<ApprovalOutcome> {
        let handle = match self.registry.begin_approval(&address) {
            Ok(ApprovalStart::Ready(handle)) => handle,
            Ok(ApprovalStart::AlreadyApproved) => {
                tracing::info!(address = %address, "Escrow already approved");
                metrics::record_approval("already_approved");
                return Ok(ApprovalOutcome::AlreadyApproved);
            }
            Err(e) => {
                metrics::record_approval("rejected");
                return Err(e);
            }
        };

        match self.run(&handle).await {
            Ok((tx_hash, released)) => {
                self.registry.apply_approved(&address, released);
                metrics::record_approval("approved");
                Ok(ApprovalOutcome::Approved { tx_hash, released })
            }
            Err(e) => {
                self.registry.abort_approval(&address);
                tracing::warn!(address = %address, error = %e, "Approval failed");
                metrics::record_approval("failed");
                Err(e)
            }
        }
    }

    async fn run(&self, handle: &SignableEscrow<L>) -> EscrowResult<(TxHash, Option<U256>)> {
        let address = handle.address();

        // Subscribe first so an event mined right after submission is not missed
        let mut events = handle.subscribe_approved().await?;
        let tx_hash = handle.submit_approve().await?;
        tracing::info!(
            address = %address,
            tx_hash = %tx_hash,
            signer = %handle.signer().address(),
            "Approval submitted"
        );

        tokio::select! {
            Some(released) = next_approval(&mut events, address) => {
                tracing::debug!(address = %address, "Approval confirmed by event");
                Ok((tx_hash, released))
            }
            confirmed = handle.confirm(tx_hash) => {
                let confirmed = confirmed?;
                if !confirmed.success {
                    return Err(EscrowError::TransactionReverted(format!(
                        "approve {} reverted in block {}",
                        tx_hash, confirmed.block_number
                    )));
                }
                let log = confirmed
                    .logs
                    .iter()
                    .find(|log| is_approved_log(log, address))
                    .ok_or(EscrowError::MissingConfirmationEvent(tx_hash))?;
                tracing::debug!(address = %address, "Approval confirmed by receipt");
                Ok((tx_hash, released_amount(log)))
            }
        }
    }
}

/// Wait for the next `Approved` log of `address`.
///
/// Resolves to `None` when the feed closes, which disables that branch.
async fn next_approval(events: &mut EventSubscription, address: Address) -> Option<Option<U256>> {
    while let Some(log) = events.next().await {
        if is_approved_log(&log, address) {
            return Some(released_amount(&log));
        }
    }
    None
}
