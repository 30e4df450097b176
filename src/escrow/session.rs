//! The client session: one ledger, one registry, at most one signer.

use alloy::primitives::Address;
use arc_swap::ArcSwapOption;
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::blockchain::ledger::Ledger;
use crate::blockchain::wallet::Wallet;
use crate::escrow::approval::ApprovalOrchestrator;
use crate::escrow::contract::SignableEscrow;
use crate::escrow::deploy::{ContractArtifact, Deployer};
use crate::escrow::encoding::{parse_address, parse_amount};
use crate::escrow::lookup::{LookupOutcome, LookupService};
use crate::escrow::registry::EscrowRegistry;
use crate::escrow::types::{ApprovalOutcome, EscrowError, EscrowRecord, EscrowResult, StatusChange};

/// Entry point for deploying, looking up and approving escrows.
///
/// All string inputs are validated here, before any ledger access.
pub struct EscrowSession<L> {
    ledger: Arc<L>,
    registry: Arc<EscrowRegistry<L>>,
    deployer: Option<Deployer<L>>,
    lookups: LookupService<L>,
    approvals: ApprovalOrchestrator<L>,
    signer: ArcSwapOption<Wallet>,
}

impl<L: Ledger> EscrowSession<L> {
    /// Create a session with an empty registry and no deployment support.
    pub fn new(ledger: Arc<L>) -> Self {
        Self::with_registry(ledger, Arc::new(EscrowRegistry::new()))
    }

    /// Create a session over an existing registry.
    pub fn with_registry(ledger: Arc<L>, registry: Arc<EscrowRegistry<L>>) -> Self {
        Self {
            lookups: LookupService::new(ledger.clone()),
            approvals: ApprovalOrchestrator::new(registry.clone()),
            deployer: None,
            signer: ArcSwapOption::empty(),
            ledger,
            registry,
        }
    }

    /// Enable [`deploy`](Self::deploy) with the given compiled contract.
    pub fn with_artifact(mut self, artifact: ContractArtifact) -> Self {
        self.deployer = Some(Deployer::new(self.ledger.clone(), artifact));
        self
    }

    /// Bind `wallet` as the session signer.
    ///
    /// Every registered entry is rebound to the new signer, so records found
    /// before connecting become approvable.
    pub fn connect_signer(&self, wallet: Wallet) {
        self.registry.detach_handles();
        let unbound = self.registry.unbound_addresses();
        for address in &unbound {
            let handle = SignableEscrow::bind(*address, self.ledger.clone(), wallet.clone());
            self.registry.attach_handle(address, handle);
        }
        tracing::info!(
            signer = %wallet.address(),
            attached = unbound.len(),
            "Signer connected"
        );
        self.signer.store(Some(Arc::new(wallet)));
    }

    /// Unbind the signer; approvals fail with `NoSignerBound` afterwards.
    pub fn disconnect_signer(&self) {
        if self.signer.swap(None).is_some() {
            self.registry.detach_handles();
            tracing::info!("Signer disconnected");
        }
    }

    pub fn signer(&self) -> Option<Arc<Wallet>> {
        self.signer.load_full()
    }

    /// Deploy a new escrow funded with `amount` ether and register it.
    pub async fn deploy(
        &self,
        arbiter: &str,
        beneficiary: &str,
        amount: &str,
    ) -> EscrowResult<EscrowRecord> {
        let arbiter = parse_address(arbiter)?;
        let beneficiary = parse_address(beneficiary)?;
        let deposit = parse_amount(amount)?;

        let signer = self.signer().ok_or(EscrowError::NoSignerBound)?;
        let deployer = self.deployer.as_ref().ok_or_else(|| {
            EscrowError::Artifact("no contract artifact loaded for deployment".to_string())
        })?;

        let (record, handle) = deployer.deploy(&signer, arbiter, beneficiary, deposit).await?;
        self.registry.insert_deployed(record.clone(), handle)?;
        Ok(record)
    }

    /// Resolve `input` and reconcile it into the registry.
    ///
    /// `Ok(None)` means the address holds no escrow.
    pub async fn lookup(&self, input: &str) -> EscrowResult<Option<EscrowRecord>> {
        let signer = self.signer();
        match self.lookups.lookup(input, signer.as_deref()).await? {
            LookupOutcome::Found(resolved) => Ok(Some(
                self.registry.upsert_resolved(resolved.record, resolved.handle),
            )),
            LookupOutcome::NotFound(_) => Ok(None),
        }
    }

    /// Approve a registered escrow.
    pub async fn approve(&self, input: &str) -> EscrowResult<ApprovalOutcome> {
        let address = parse_address(input)?;
        self.approve_address(address).await
    }

    pub async fn approve_address(&self, address: Address) -> EscrowResult<ApprovalOutcome> {
        self.approvals.approve(address).await
    }

    pub fn registry(&self) -> &Arc<EscrowRegistry<L>> {
        &self.registry
    }

    /// Receive status changes for every record in this session.
    pub fn subscribe(&self) -> broadcast::Receiver<StatusChange> {
        self.registry.subscribe()
    }

    pub fn ledger(&self) -> &Arc<L> {
        &self.ledger
    }
}
