//! Metrics collection.
//!
//! # Metrics
//! - `escrow_deployments_total` (counter): deployments by outcome
//! - `escrow_lookups_total` (counter): lookups by outcome (found, not_found, error)
//! - `escrow_approvals_total` (counter): approvals by outcome
//! - `escrow_status_changes_total` (counter): registry approval transitions
//! - `escrow_registry_size` (gauge): records known to the session
//! - `escrow_rpc_health` (gauge): 1=healthy, 0=unhealthy
//!
//! # Design Decisions
//! - Emitted through the `metrics` facade; exporting is the host's choice
//! - Outcome labels are static strings to bound cardinality

/// Record a deployment attempt.
pub fn record_deployment(outcome: &'static str) {
    ::metrics::counter!("escrow_deployments_total", "outcome" => outcome).increment(1);
}

/// Record a lookup result.
pub fn record_lookup(outcome: &'static str) {
    ::metrics::counter!("escrow_lookups_total", "outcome" => outcome).increment(1);
}

/// Record an approval attempt.
pub fn record_approval(outcome: &'static str) {
    ::metrics::counter!("escrow_approvals_total", "outcome" => outcome).increment(1);
}

/// Record a record flipping to approved.
pub fn record_status_change() {
    ::metrics::counter!("escrow_status_changes_total").increment(1);
}

/// Record the number of registry entries.
pub fn record_registry_size(size: usize) {
    ::metrics::gauge!("escrow_registry_size").set(size as f64);
}

/// Record RPC endpoint health.
pub fn record_rpc_health(healthy: bool) {
    ::metrics::gauge!("escrow_rpc_health").set(if healthy { 1.0 } else { 0.0 });
}
