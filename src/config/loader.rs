//! Configuration loading from disk and environment.

use std::path::Path;
use std::fs;
use crate::config::schema::ClientConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Overrides `blockchain.rpc_url`.
pub const RPC_URL_ENV_VAR: &str = "ESCROW_RPC_URL";

/// Overrides `blockchain.ws_url`.
pub const WS_URL_ENV_VAR: &str = "ESCROW_WS_URL";

/// Error type for configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Validation(Vec<ValidationError>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
            ConfigError::Validation(errors) => {
                write!(f, "Validation failed: ")?;
                for (i, err) in errors.iter().enumerate() {
                    if i > 0 { write!(f, ", ")?; }
                    write!(f, "{}", err)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<ClientConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(ConfigError::Io)?;
    let config: ClientConfig = toml::from_str(&content).map_err(ConfigError::Parse)?;
    finish(config)
}

/// Load from `path` when given, otherwise start from defaults.
///
/// Environment overrides are applied before validation in both cases.
pub fn load_or_default(path: Option<&Path>) -> Result<ClientConfig, ConfigError> {
    match path {
        Some(path) => load_config(path),
        None => finish(ClientConfig::default()),
    }
}

fn finish(mut config: ClientConfig) -> Result<ClientConfig, ConfigError> {
    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

fn apply_env_overrides(config: &mut ClientConfig, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(rpc_url) = lookup(RPC_URL_ENV_VAR).filter(|v| !v.is_empty()) {
        tracing::debug!(rpc_url = %rpc_url, "RPC URL overridden from environment");
        config.blockchain.rpc_url = rpc_url;
    }
    if let Some(ws_url) = lookup(WS_URL_ENV_VAR).filter(|v| !v.is_empty()) {
        config.blockchain.ws_url = Some(ws_url);
    }
}
