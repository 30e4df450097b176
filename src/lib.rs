//! Escrow lifecycle client library

pub mod blockchain;
pub mod config;
pub mod escrow;
pub mod observability;

pub use blockchain::{BlockchainClient, Ledger, Wallet};
pub use config::ClientConfig;
pub use escrow::{EscrowError, EscrowRecord, EscrowSession};
