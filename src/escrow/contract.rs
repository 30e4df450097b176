//! Typed bindings to a deployed escrow contract.
//!
//! [`ReadableEscrow`] only reads state; [`SignableEscrow`] also holds a
//! signer and is the only way to submit `approve()`.

use alloy::network::TransactionBuilder;
use alloy::primitives::{Address, Bytes, Log, TxHash, U256};
use alloy::rpc::types::TransactionRequest;
use alloy::sol;
use alloy::sol_types::{SolCall, SolEvent};
use std::ops::Deref;
use std::sync::Arc;

use crate::blockchain::ledger::Ledger;
use crate::blockchain::types::{
    BlockchainError, BlockchainResult, ConfirmedTransaction, EventSubscription,
};
use crate::blockchain::wallet::Wallet;

sol! {
    /// Two-party escrow released by an arbiter.
    contract Escrow {
        /// Emitted once, when the arbiter releases the funds.
        event Approved(uint256 balance);

        function arbiter() external view returns (address);
        function beneficiary() external view returns (address);
        function depositor() external view returns (address);
        function isApproved() external view returns (bool);
        function approve() external;
    }
}

/// The three immutable-or-monotonic fields read from a contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EscrowFields {
    pub arbiter: Address,
    pub beneficiary: Address,
    pub is_approved: bool,
}

fn decode_returns<C: SolCall>(data: &[u8]) -> BlockchainResult<C::Return> {
    C::abi_decode_returns(data).map_err(|e| {
        BlockchainError::Decode(format!("{} returned {} bytes: {}", C::SIGNATURE, data.len(), e))
    })
}

/// Pick the error to report from a set of failed reads.
///
/// Transport failures win over contract answers so an outage is never
/// mistaken for a missing escrow.
fn first_error(results: Vec<BlockchainResult<Bytes>>) -> BlockchainResult<Vec<Bytes>> {
    let mut values = Vec::with_capacity(results.len());
    let mut fallback = None;
    for result in results {
        match result {
            Ok(bytes) => values.push(bytes),
            Err(e) if e.is_network() => return Err(e),
            Err(e) => {
                fallback.get_or_insert(e);
            }
        }
    }
    match fallback {
        Some(e) => Err(e),
        None => Ok(values),
    }
}

/// Read-only binding.
pub struct ReadableEscrow<L> {
    address: Address,
    ledger: Arc<L>,
}

impl<L> Clone for ReadableEscrow<L> {
    fn clone(&self) -> Self {
        Self {
            address: self.address,
            ledger: self.ledger.clone(),
        }
    }
}

impl<L> std::fmt::Debug for ReadableEscrow<L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadableEscrow")
            .field("address", &self.address)
            .finish()
    }
}

impl<L: Ledger> ReadableEscrow<L> {
    /// Bind to `address` for reading. No network access happens here.
    pub fn bind(address: Address, ledger: Arc<L>) -> Self {
        Self { address, ledger }
    }

    /// The contract address.
    pub fn address(&self) -> Address {
        self.address
    }

    /// The ledger this binding reads through.
    pub fn ledger(&self) -> &Arc<L> {
        &self.ledger
    }

    async fn read<C: SolCall>(&self, call: C) -> BlockchainResult<C::Return> {
        let data = self.ledger.call(self.address, call.abi_encode().into()).await?;
        decode_returns::<C>(&data)
    }

    pub async fn arbiter(&self) -> BlockchainResult<Address> {
        self.read(Escrow::arbiterCall {}).await
    }

    pub async fn beneficiary(&self) -> BlockchainResult<Address> {
        self.read(Escrow::beneficiaryCall {}).await
    }

    pub async fn is_approved(&self) -> BlockchainResult<bool> {
        self.read(Escrow::isApprovedCall {}).await
    }

    /// Native balance held by the contract.
    pub async fn balance(&self) -> BlockchainResult<U256> {
        self.ledger.balance(self.address).await
    }

    /// Read arbiter, beneficiary and approval state in one batch.
    pub async fn read_fields(&self) -> BlockchainResult<EscrowFields> {
        let inputs = vec![
            Bytes::from(Escrow::arbiterCall {}.abi_encode()),
            Bytes::from(Escrow::beneficiaryCall {}.abi_encode()),
            Bytes::from(Escrow::isApprovedCall {}.abi_encode()),
        ];
        let results = self.ledger.call_batch(self.address, inputs).await;
        let values = first_error(results)?;

        match values.as_slice() {
            [arbiter, beneficiary, is_approved] => Ok(EscrowFields {
                arbiter: decode_returns::<Escrow::arbiterCall>(arbiter)?,
                beneficiary: decode_returns::<Escrow::beneficiaryCall>(beneficiary)?,
                is_approved: decode_returns::<Escrow::isApprovedCall>(is_approved)?,
            }),
            other => Err(BlockchainError::Decode(format!(
                "expected 3 results from batch read, got {}",
                other.len()
            ))),
        }
    }
}

/// Read/write binding carrying the signer that submits `approve()`.
pub struct SignableEscrow<L> {
    readable: ReadableEscrow<L>,
    signer: Wallet,
}

impl<L> Clone for SignableEscrow<L> {
    fn clone(&self) -> Self {
        Self {
            readable: self.readable.clone(),
            signer: self.signer.clone(),
        }
    }
}

impl<L> std::fmt::Debug for SignableEscrow<L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignableEscrow")
            .field("address", &self.readable.address)
            .field("signer", &self.signer.address())
            .finish()
    }
}

impl<L> Deref for SignableEscrow<L> {
    type Target = ReadableEscrow<L>;

    fn deref(&self) -> &Self::Target {
        &self.readable
    }
}

impl<L: Ledger> SignableEscrow<L> {
    pub fn bind(address: Address, ledger: Arc<L>, signer: Wallet) -> Self {
        Self {
            readable: ReadableEscrow::bind(address, ledger),
            signer,
        }
    }

    /// The signer approvals are submitted with.
    pub fn signer(&self) -> &Wallet {
        &self.signer
    }

    /// Subscribe to this contract's `Approved` events.
    pub async fn subscribe_approved(&self) -> BlockchainResult<EventSubscription> {
        self.readable
            .ledger
            .subscribe_events(self.readable.address, Escrow::Approved::SIGNATURE_HASH)
            .await
    }

    /// Submit `approve()`; resolves once the node accepted the transaction.
    pub async fn submit_approve(&self) -> BlockchainResult<TxHash> {
        let tx = TransactionRequest::default()
            .with_to(self.readable.address)
            .with_input(Escrow::approveCall {}.abi_encode());
        self.readable.ledger.send_transaction(tx, &self.signer).await
    }

    /// Wait for `tx_hash` to be mined.
    pub async fn confirm(&self, tx_hash: TxHash) -> BlockchainResult<ConfirmedTransaction> {
        self.readable.ledger.wait_for_confirmation(tx_hash).await
    }
}

/// Whether `log` is an `Approved` event emitted by `escrow`.
pub fn is_approved_log(log: &Log, escrow: Address) -> bool {
    log.address == escrow && log.data.topics().first() == Some(&Escrow::Approved::SIGNATURE_HASH)
}

/// Amount carried by an `Approved` log, if its data is well formed.
pub fn released_amount(log: &Log) -> Option<U256> {
    log.data
        .data
        .get(..32)
        .and_then(|word| U256::try_from_be_slice(word))
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::LogData;

    #[test]
    fn test_selectors_match_abi() {
        assert_eq!(Escrow::arbiterCall::SIGNATURE, "arbiter()");
        assert_eq!(Escrow::isApprovedCall::SIGNATURE, "isApproved()");
        assert_eq!(Escrow::approveCall {}.abi_encode().len(), 4);
        assert_eq!(Escrow::Approved::SIGNATURE, "Approved(uint256)");
    }

    #[test]
    fn test_approved_log_detection() {
        let escrow = Address::repeat_byte(0x42);
        let amount = U256::from(1_500_000_000_000_000_000u64);
        let data = Escrow::Approved { balance: amount }.encode_log_data();
        let log = Log { address: escrow, data };

        assert!(is_approved_log(&log, escrow));
        assert!(!is_approved_log(&log, Address::repeat_byte(0x43)));
        assert_eq!(released_amount(&log), Some(amount));
    }

    #[test]
    fn test_foreign_log_ignored() {
        let escrow = Address::repeat_byte(0x42);
        let log = Log {
            address: escrow,
            data: LogData::new_unchecked(vec![alloy::primitives::B256::ZERO], Bytes::new()),
        };
        assert!(!is_approved_log(&log, escrow));
        assert_eq!(released_amount(&log), None);
    }

    #[test]
    fn test_empty_return_is_decode_error() {
        let err = decode_returns::<Escrow::arbiterCall>(&[]).unwrap_err();
        assert!(matches!(err, BlockchainError::Decode(_)));
        assert!(!err.is_network());
    }

    #[test]
    fn test_network_error_preferred_in_batch() {
        let results = vec![
            Err(BlockchainError::ExecutionReverted("revert".into())),
            Err(BlockchainError::Timeout(5)),
            Ok(Bytes::new()),
        ];
        let err = first_error(results).unwrap_err();
        assert!(matches!(err, BlockchainError::Timeout(5)));
    }
}
