//! Escrow records, outcomes and the client error taxonomy.

use alloy::primitives::{Address, TxHash, U256};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::blockchain::types::BlockchainError;
use crate::escrow::encoding::{format_amount, short_address};

/// The local view of one escrow contract.
///
/// Records produced by deployment and by lookup carry the same fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscrowRecord {
    /// Contract address; unique within a registry.
    pub address: Address,
    /// Account allowed to release the funds.
    pub arbiter: Address,
    /// Account receiving the funds on approval.
    pub beneficiary: Address,
    /// Funded amount in wei (deposit for deployments, balance for lookups).
    pub value: U256,
    /// Monotonic: once `true`, never `false` again.
    pub is_approved: bool,
}

impl EscrowRecord {
    /// A freshly deployed, unapproved record.
    pub fn deployed(address: Address, arbiter: Address, beneficiary: Address, value: U256) -> Self {
        Self {
            address,
            arbiter,
            beneficiary,
            value,
            is_approved: false,
        }
    }
}

impl fmt::Display for EscrowRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Escrow      {}", self.address)?;
        writeln!(f, "Arbiter     {}", short_address(&self.arbiter))?;
        writeln!(f, "Beneficiary {}", short_address(&self.beneficiary))?;
        writeln!(f, "Value       {} ETH", format_amount(self.value))?;
        if self.is_approved {
            write!(f, "Status      approved")
        } else {
            write!(f, "Status      awaiting approval")
        }
    }
}

/// Notification published when a record changes status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusChange {
    pub address: Address,
    pub is_approved: bool,
    /// Amount released to the beneficiary, when the event carried it.
    pub released: Option<U256>,
}

/// Result of an approval request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum ApprovalOutcome {
    /// The approve transaction confirmed and the record was updated.
    Approved {
        tx_hash: TxHash,
        released: Option<U256>,
    },
    /// The record was already approved; no transaction was sent.
    AlreadyApproved,
}

/// Errors surfaced by the escrow lifecycle client.
#[derive(Debug, Error)]
pub enum EscrowError {
    /// Input is not a syntactically valid account identifier.
    #[error("Invalid address format: '{0}'")]
    InvalidAddressFormat(String),

    /// Deposit amount could not be parsed or scaled to wei.
    #[error("Invalid amount format '{input}': {reason}")]
    InvalidAmountFormat { input: String, reason: String },

    /// The ledger could not be reached (timeout, connection error).
    #[error("Network unavailable: {0}")]
    NetworkUnavailable(String),

    /// A transaction or call was reverted; the reason is passed through.
    #[error("Transaction reverted: {0}")]
    TransactionReverted(String),

    /// No escrow known or readable at the address.
    #[error("No escrow found at {0}")]
    NotFound(Address),

    /// A write operation needs a connected signer.
    #[error("No signer bound; connect a wallet first")]
    NoSignerBound,

    /// Another approval for the same record has not finished yet.
    #[error("Approval already in flight for {0}")]
    ApprovalInFlight(Address),

    /// A deployed record collided with an existing registry entry.
    #[error("Escrow {0} is already registered")]
    DuplicateAddress(Address),

    /// The deployment confirmed without yielding a contract.
    #[error("Deployment failed: {0}")]
    DeploymentFailed(String),

    /// The approve transaction succeeded but no `Approved` event was seen.
    #[error("Transaction {0} confirmed without an Approved event")]
    MissingConfirmationEvent(TxHash),

    /// The compiled contract artifact is missing or malformed.
    #[error("Contract artifact error: {0}")]
    Artifact(String),

    /// Any other ledger failure (wallet, gas cap, node rejection).
    #[error(transparent)]
    Ledger(BlockchainError),
}

impl From<BlockchainError> for EscrowError {
    fn from(err: BlockchainError) -> Self {
        match err {
            BlockchainError::Reverted(reason) | BlockchainError::ExecutionReverted(reason) => {
                EscrowError::TransactionReverted(reason)
            }
            err if err.is_network() => EscrowError::NetworkUnavailable(err.to_string()),
            err => EscrowError::Ledger(err),
        }
    }
}

/// Result type for escrow operations.
pub type EscrowResult<T> = Result<T, EscrowError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_mapping_keeps_revert_reason() {
        let err: EscrowError =
            BlockchainError::ExecutionReverted("execution reverted: not arbiter".into()).into();
        match err {
            EscrowError::TransactionReverted(reason) => assert!(reason.contains("not arbiter")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_error_mapping_network() {
        let err: EscrowError = BlockchainError::Timeout(10).into();
        assert!(matches!(err, EscrowError::NetworkUnavailable(_)));

        let err: EscrowError = BlockchainError::Rpc("connection refused".into()).into();
        assert!(matches!(err, EscrowError::NetworkUnavailable(_)));
    }

    #[test]
    fn test_error_mapping_passthrough() {
        let err: EscrowError = BlockchainError::GasPriceTooHigh {
            current_gwei: 900,
            max_gwei: 500,
        }
        .into();
        assert!(matches!(err, EscrowError::Ledger(_)));
        assert!(err.to_string().contains("900"));
    }

    #[test]
    fn test_chain_mismatch_is_ledger_error() {
        let err: EscrowError = BlockchainError::ChainMismatch {
            expected: 11_155_111,
            actual: 1,
        }
        .into();
        assert!(matches!(err, EscrowError::Ledger(_)));
    }

    #[test]
    fn test_record_display_uses_short_addresses() {
        let record = EscrowRecord::deployed(
            Address::repeat_byte(0x01),
            Address::repeat_byte(0xaa),
            Address::repeat_byte(0xbb),
            U256::from(1_500_000_000_000_000_000u64),
        );
        let rendered = record.to_string();
        assert!(rendered.contains(&short_address(&record.arbiter)));
        assert!(!rendered.contains(&record.beneficiary.to_string()));
        assert!(rendered.contains("1.5 ETH"));
        assert!(rendered.contains("awaiting approval"));
    }

    #[test]
    fn test_outcome_serializes_with_status_tag() {
        let json = serde_json::to_value(ApprovalOutcome::AlreadyApproved).unwrap();
        assert_eq!(json["status"], "already_approved");
    }
}
