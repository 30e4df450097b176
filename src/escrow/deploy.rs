//! Escrow contract deployment.

use alloy::network::TransactionBuilder;
use alloy::primitives::{Address, Bytes, U256};
use alloy::rpc::types::TransactionRequest;
use alloy::sol_types::SolValue;
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;

use crate::blockchain::ledger::Ledger;
use crate::blockchain::wallet::Wallet;
use crate::escrow::contract::SignableEscrow;
use crate::escrow::types::{EscrowError, EscrowRecord, EscrowResult};
use crate::observability::metrics;

/// Compiled contract as emitted by Hardhat (`artifacts/.../Escrow.json`).
///
/// Only the creation bytecode is used; the ABI is compiled in.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractArtifact {
    #[serde(default)]
    pub contract_name: Option<String>,
    pub bytecode: Bytes,
}

impl ContractArtifact {
    /// Read an artifact file from disk.
    pub fn load(path: &Path) -> EscrowResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            EscrowError::Artifact(format!("Failed to read '{}': {}", path.display(), e))
        })?;
        let artifact = Self::from_json(&content)?;
        tracing::debug!(
            path = %path.display(),
            contract = artifact.contract_name.as_deref().unwrap_or("unknown"),
            bytecode_len = artifact.bytecode.len(),
            "Loaded contract artifact"
        );
        Ok(artifact)
    }

    pub fn from_json(content: &str) -> EscrowResult<Self> {
        let artifact: Self = serde_json::from_str(content)
            .map_err(|e| EscrowError::Artifact(format!("Invalid artifact JSON: {}", e)))?;
        if artifact.bytecode.is_empty() {
            return Err(EscrowError::Artifact(
                "Artifact has no creation bytecode (abstract contract or interface?)".to_string(),
            ));
        }
        Ok(artifact)
    }

    pub fn from_bytecode(bytecode: Bytes) -> Self {
        Self {
            contract_name: None,
            bytecode,
        }
    }

    /// Creation bytecode followed by the ABI-encoded constructor arguments.
    pub fn creation_code(&self, arbiter: Address, beneficiary: Address) -> Bytes {
        let mut code = self.bytecode.to_vec();
        code.extend_from_slice(&(arbiter, beneficiary).abi_encode_params());
        code.into()
    }
}

/// Deploys new escrow contracts through a ledger.
pub struct Deployer<L> {
    ledger: Arc<L>,
    artifact: ContractArtifact,
}

impl<L: Ledger> Deployer<L> {
    pub fn new(ledger: Arc<L>, artifact: ContractArtifact) -> Self {
        Self { ledger, artifact }
    }

    /// Deploy an escrow funded with `deposit` wei and wait for it to be mined.
    ///
    /// Nothing is returned (and nothing should be registered) unless the
    /// deployment confirmed with a contract address.
    pub async fn deploy(
        &self,
        signer: &Wallet,
        arbiter: Address,
        beneficiary: Address,
        deposit: U256,
    ) -> EscrowResult<(EscrowRecord, SignableEscrow<L>)> {
        let result = self.deploy_inner(signer, arbiter, beneficiary, deposit).await;
        metrics::record_deployment(if result.is_ok() { "success" } else { "failure" });
        result
    }

    async fn deploy_inner(
        &self,
        signer: &Wallet,
        arbiter: Address,
        beneficiary: Address,
        deposit: U256,
    ) -> EscrowResult<(EscrowRecord, SignableEscrow<L>)> {
        let tx = TransactionRequest::default()
            .with_deploy_code(self.artifact.creation_code(arbiter, beneficiary))
            .with_value(deposit);

        let tx_hash = self.ledger.send_transaction(tx, signer).await?;
        tracing::info!(
            tx_hash = %tx_hash,
            arbiter = %arbiter,
            beneficiary = %beneficiary,
            deposit = %deposit,
            "Escrow deployment submitted"
        );

        let confirmed = self.ledger.wait_for_confirmation(tx_hash).await?;
        if !confirmed.success {
            return Err(EscrowError::TransactionReverted(format!(
                "deployment {} reverted in block {}",
                tx_hash, confirmed.block_number
            )));
        }
        let address = confirmed.contract_address.ok_or_else(|| {
            EscrowError::DeploymentFailed(format!("receipt for {} has no contract address", tx_hash))
        })?;

        tracing::info!(
            address = %address,
            block = confirmed.block_number,
            "Escrow deployed"
        );

        let record = EscrowRecord::deployed(address, arbiter, beneficiary, deposit);
        let handle = SignableEscrow::bind(address, self.ledger.clone(), signer.clone());
        Ok((record, handle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_from_hardhat_json() {
        let json = r#"{
            "_format": "hh-sol-artifact-1",
            "contractName": "Escrow",
            "sourceName": "contracts/Escrow.sol",
            "abi": [],
            "bytecode": "0x6080604052",
            "deployedBytecode": "0x6080"
        }"#;
        let artifact = ContractArtifact::from_json(json).unwrap();
        assert_eq!(artifact.contract_name.as_deref(), Some("Escrow"));
        assert_eq!(artifact.bytecode.as_ref(), &[0x60, 0x80, 0x60, 0x40, 0x52]);
    }

    #[test]
    fn test_artifact_without_bytecode_rejected() {
        let err = ContractArtifact::from_json(r#"{"bytecode": "0x"}"#).unwrap_err();
        assert!(matches!(err, EscrowError::Artifact(_)));

        let err = ContractArtifact::from_json("not json").unwrap_err();
        assert!(matches!(err, EscrowError::Artifact(_)));
    }

    #[test]
    fn test_missing_artifact_file() {
        let err = ContractArtifact::load(Path::new("/nonexistent/Escrow.json")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/Escrow.json"));
    }

    #[test]
    fn test_creation_code_appends_constructor_args() {
        let artifact = ContractArtifact::from_bytecode(Bytes::from_static(&[0xfe]));
        let arbiter = Address::repeat_byte(0xaa);
        let beneficiary = Address::repeat_byte(0xbb);
        let code = artifact.creation_code(arbiter, beneficiary);

        assert_eq!(code.len(), 1 + 64);
        assert_eq!(code[0], 0xfe);
        assert_eq!(&code[1 + 12..1 + 32], arbiter.as_slice());
        assert_eq!(&code[33 + 12..], beneficiary.as_slice());
    }
}
