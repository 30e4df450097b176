//! Resolving an address typed by the user into an escrow record.

use alloy::primitives::Address;
use std::sync::Arc;

use crate::blockchain::ledger::Ledger;
use crate::blockchain::types::BlockchainError;
use crate::blockchain::wallet::Wallet;
use crate::escrow::contract::{ReadableEscrow, SignableEscrow};
use crate::escrow::encoding::parse_address;
use crate::escrow::types::{EscrowError, EscrowRecord, EscrowResult};
use crate::observability::metrics;

/// A record read from the ledger, with a handle when a signer was given.
#[derive(Debug)]
pub struct ResolvedEscrow<L> {
    pub record: EscrowRecord,
    pub handle: Option<SignableEscrow<L>>,
}

#[derive(Debug)]
pub enum LookupOutcome<L> {
    Found(ResolvedEscrow<L>),
    /// The address does not hold a readable escrow contract.
    NotFound(Address),
}

/// Reads escrow state for arbitrary addresses.
pub struct LookupService<L> {
    ledger: Arc<L>,
}

impl<L: Ledger> LookupService<L> {
    pub fn new(ledger: Arc<L>) -> Self {
        Self { ledger }
    }

    /// Validate `input`, then resolve it.
    ///
    /// An invalid address fails before any ledger access.
    pub async fn lookup(&self, input: &str, signer: Option<&Wallet>) -> EscrowResult<LookupOutcome<L>> {
        let address = parse_address(input)?;
        self.resolve(address, signer).await
    }

    /// Read the three contract fields and the balance concurrently.
    pub async fn resolve(
        &self,
        address: Address,
        signer: Option<&Wallet>,
    ) -> EscrowResult<LookupOutcome<L>> {
        let escrow = ReadableEscrow::bind(address, self.ledger.clone());
        let (fields, balance) = tokio::join!(escrow.read_fields(), escrow.balance());

        let fields = match fields {
            Ok(fields) => fields,
            Err(e) if is_not_an_escrow(&e) => {
                tracing::info!(address = %address, reason = %e, "No escrow at address");
                metrics::record_lookup("not_found");
                return Ok(LookupOutcome::NotFound(address));
            }
            Err(e) => {
                metrics::record_lookup("error");
                return Err(e.into());
            }
        };
        let balance = balance.map_err(|e| {
            metrics::record_lookup("error");
            EscrowError::from(e)
        })?;

        let record = EscrowRecord {
            address,
            arbiter: fields.arbiter,
            beneficiary: fields.beneficiary,
            value: balance,
            is_approved: fields.is_approved,
        };
        tracing::info!(
            address = %address,
            is_approved = record.is_approved,
            "Escrow resolved"
        );
        metrics::record_lookup("found");

        let handle = signer.map(|wallet| SignableEscrow::bind(address, self.ledger.clone(), wallet.clone()));
        Ok(LookupOutcome::Found(ResolvedEscrow { record, handle }))
    }
}

/// A revert or undecodable answer means the contract is not an escrow.
fn is_not_an_escrow(err: &BlockchainError) -> bool {
    matches!(
        err,
        BlockchainError::ExecutionReverted(_) | BlockchainError::Decode(_)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_an_escrow_classification() {
        assert!(is_not_an_escrow(&BlockchainError::Decode("empty".into())));
        assert!(is_not_an_escrow(&BlockchainError::ExecutionReverted("revert".into())));
        assert!(!is_not_an_escrow(&BlockchainError::Timeout(10)));
        assert!(!is_not_an_escrow(&BlockchainError::Rpc("refused".into())));
    }
}
