//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the client.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the escrow client.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ClientConfig {
    /// Network endpoint and transaction settings.
    pub blockchain: BlockchainConfig,

    /// Escrow contract artifact location.
    pub contract: ContractConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Blockchain network configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BlockchainConfig {
    /// JSON-RPC endpoint URL.
    pub rpc_url: String,

    /// WebSocket endpoint URL used for event subscriptions.
    ///
    /// When unset, subscriptions fall back to polling `eth_getLogs`.
    pub ws_url: Option<String>,

    /// Failover JSON-RPC endpoint URLs for the same network.
    #[serde(default)]
    pub failover_urls: Vec<String>,

    /// Chain ID (e.g., 11155111 for Sepolia, 31337 for local Anvil).
    pub chain_id: u64,

    /// RPC request timeout in seconds.
    pub rpc_timeout_secs: u64,

    /// Number of block confirmations required for finality.
    pub confirmation_blocks: u32,

    /// Maximum time to wait for a transaction receipt, in seconds.
    pub confirmation_timeout_secs: u64,

    /// Receipt and log polling interval in milliseconds.
    pub poll_interval_ms: u64,

    /// Gas price multiplier (1.0 = estimated, 1.2 = 20% buffer).
    pub gas_price_multiplier: f64,

    /// Maximum gas price in gwei (protection against spikes).
    pub max_gas_price_gwei: u64,
}

impl Default for BlockchainConfig {
    fn default() -> Self {
        Self {
            rpc_url: "http://localhost:8545".to_string(),
            ws_url: None,
            failover_urls: Vec::new(),
            chain_id: 11_155_111,
            rpc_timeout_secs: 10,
            confirmation_blocks: 1,
            confirmation_timeout_secs: 120,
            poll_interval_ms: 2000,
            gas_price_multiplier: 1.2,
            max_gas_price_gwei: 500,
        }
    }
}

/// Escrow contract configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ContractConfig {
    /// Path to the compiled contract artifact (Hardhat JSON layout).
    pub artifact_path: String,
}

impl Default for ContractConfig {
    fn default() -> Self {
        Self {
            artifact_path: "artifacts/contracts/Escrow.sol/Escrow.json".to_string(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_target_sepolia() {
        let config = ClientConfig::default();
        assert_eq!(config.blockchain.chain_id, 11_155_111);
        assert!(config.blockchain.ws_url.is_none());
        assert_eq!(config.observability.log_level, "info");
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: ClientConfig = toml::from_str(
            r#"
            [blockchain]
            rpc_url = "http://127.0.0.1:8545"
            chain_id = 31337
            "#,
        )
        .unwrap();

        assert_eq!(config.blockchain.chain_id, 31337);
        assert_eq!(config.blockchain.rpc_timeout_secs, 10);
        assert_eq!(
            config.contract.artifact_path,
            "artifacts/contracts/Escrow.sol/Escrow.json"
        );
    }
}
