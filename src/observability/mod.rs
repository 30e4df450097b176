//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events via `tracing`)
//!     → metrics.rs (counters and gauges via the `metrics` facade)
//!
//! Consumers:
//!     → Log output (stderr, filtered by RUST_LOG or config)
//!     → Whatever metrics recorder the host installs
//! ```
//!
//! # Design Decisions
//! - Structured fields (address, tx_hash) on every lifecycle event
//! - Metrics are cheap no-ops when no recorder is installed

pub mod logging;
pub mod metrics;
