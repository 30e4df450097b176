//! Escrow lifecycle: deploy, look up, approve.
//!
//! # Data Flow
//! ```text
//! user input (addresses, decimal amount)
//!     → encoding.rs (validation, no network)
//!     → deploy.rs | lookup.rs (ledger reads and writes)
//!     → registry.rs (session-local records, status notifications)
//!     → approval.rs (approve tx + Approved event → registry)
//! ```
//!
//! [`EscrowSession`] ties these together and is what callers use.

pub mod approval;
pub mod contract;
pub mod deploy;
pub mod encoding;
pub mod lookup;
pub mod registry;
pub mod session;
pub mod types;

pub use contract::{ReadableEscrow, SignableEscrow};
pub use deploy::{ContractArtifact, Deployer};
pub use registry::EscrowRegistry;
pub use session::EscrowSession;
pub use types::{ApprovalOutcome, EscrowError, EscrowRecord, EscrowResult, StatusChange};
