//! Session-local store of known escrows.
//!
//! Keyed by contract address; entries are only ever added or have their
//! approval flag raised. Status changes are published on a broadcast
//! channel so presentation code never reaches into the store.

use alloy::primitives::{Address, U256};
use dashmap::mapref::entry::Entry as MapEntry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;

use crate::escrow::contract::SignableEscrow;
use crate::escrow::types::{EscrowError, EscrowRecord, EscrowResult, StatusChange};
use crate::observability::metrics;

/// Capacity of the status change channel; slow observers see `Lagged`.
const STATUS_CHANNEL_CAPACITY: usize = 64;

struct Entry<L> {
    seq: u64,
    record: EscrowRecord,
    handle: Option<SignableEscrow<L>>,
    approval_in_flight: bool,
}

/// What [`EscrowRegistry::begin_approval`] decided.
#[derive(Debug)]
pub enum ApprovalStart<L> {
    /// The record is now marked in flight; submit with this handle.
    Ready(SignableEscrow<L>),
    /// Nothing to do.
    AlreadyApproved,
}

/// Thread-safe registry of escrow records and their signable handles.
pub struct EscrowRegistry<L> {
    entries: DashMap<Address, Entry<L>>,
    next_seq: AtomicU64,
    status_tx: broadcast::Sender<StatusChange>,
}

impl<L> Default for EscrowRegistry<L> {
    fn default() -> Self {
        Self::new()
    }
}

impl<L> EscrowRegistry<L> {
    /// Create an empty registry.
    pub fn new() -> Self {
        let (status_tx, _) = broadcast::channel(STATUS_CHANNEL_CAPACITY);
        Self {
            entries: DashMap::new(),
            next_seq: AtomicU64::new(0),
            status_tx,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Snapshot of one record.
    pub fn get(&self, address: &Address) -> Option<EscrowRecord> {
        self.entries.get(address).map(|e| e.record.clone())
    }

    /// Whether the entry for `address` can submit approvals.
    pub fn has_handle(&self, address: &Address) -> bool {
        self.entries
            .get(address)
            .map(|e| e.handle.is_some())
            .unwrap_or(false)
    }

    /// All records, in the order they were first registered.
    pub fn records(&self) -> Vec<EscrowRecord> {
        let mut entries: Vec<(u64, EscrowRecord)> = self
            .entries
            .iter()
            .map(|e| (e.seq, e.record.clone()))
            .collect();
        entries.sort_by_key(|(seq, _)| *seq);
        entries.into_iter().map(|(_, record)| record).collect()
    }

    /// Receive every future status change.
    pub fn subscribe(&self) -> broadcast::Receiver<StatusChange> {
        self.status_tx.subscribe()
    }

    fn new_entry(&self, record: EscrowRecord, handle: Option<SignableEscrow<L>>) -> Entry<L> {
        Entry {
            seq: self.next_seq.fetch_add(1, Ordering::Relaxed),
            record,
            handle,
            approval_in_flight: false,
        }
    }

    fn notify(&self, change: StatusChange) {
        tracing::info!(
            address = %change.address,
            is_approved = change.is_approved,
            "Escrow status changed"
        );
        metrics::record_status_change();
        // No receivers is fine
        let _ = self.status_tx.send(change);
    }

    /// Register a freshly deployed escrow.
    ///
    /// Fails with `DuplicateAddress` if the address is already known; the
    /// existing entry is left untouched.
    pub fn insert_deployed(
        &self,
        record: EscrowRecord,
        handle: SignableEscrow<L>,
    ) -> EscrowResult<()> {
        let address = record.address;
        match self.entries.entry(address) {
            MapEntry::Occupied(_) => {
                tracing::warn!(address = %address, "Rejected duplicate deployment record");
                return Err(EscrowError::DuplicateAddress(address));
            }
            MapEntry::Vacant(vacant) => {
                vacant.insert(self.new_entry(record, Some(handle)));
            }
        }
        metrics::record_registry_size(self.entries.len());
        Ok(())
    }

    /// Insert or reconcile a record resolved from the ledger.
    ///
    /// Arbiter, beneficiary and value of an existing entry are kept; the
    /// approval flag only moves from `false` to `true`. `handle` is attached
    /// when the entry has none. Returns the stored record.
    pub fn upsert_resolved(
        &self,
        record: EscrowRecord,
        handle: Option<SignableEscrow<L>>,
    ) -> EscrowRecord {
        let address = record.address;
        let (stored, newly_approved) = match self.entries.entry(address) {
            MapEntry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();
                let newly_approved = record.is_approved && !entry.record.is_approved;
                if newly_approved {
                    entry.record.is_approved = true;
                }
                if entry.handle.is_none() {
                    entry.handle = handle;
                }
                (entry.record.clone(), newly_approved)
            }
            MapEntry::Vacant(vacant) => {
                let stored = record.clone();
                vacant.insert(self.new_entry(record, handle));
                (stored, false)
            }
        };

        metrics::record_registry_size(self.entries.len());
        if newly_approved {
            self.notify(StatusChange {
                address,
                is_approved: true,
                released: None,
            });
        }
        stored
    }

    /// Attach a signable handle to an existing entry. Returns `false` if
    /// the address is unknown.
    pub fn attach_handle(&self, address: &Address, handle: SignableEscrow<L>) -> bool {
        match self.entries.get_mut(address) {
            Some(mut entry) => {
                entry.handle = Some(handle);
                true
            }
            None => false,
        }
    }

    /// Drop every signable handle, e.g. when the signer disconnects.
    pub fn detach_handles(&self) {
        for mut entry in self.entries.iter_mut() {
            entry.handle = None;
        }
    }

    /// Addresses whose entry has no signable handle.
    pub fn unbound_addresses(&self) -> Vec<Address> {
        self.entries
            .iter()
            .filter(|e| e.handle.is_none())
            .map(|e| *e.key())
            .collect()
    }

    /// Claim the right to approve `address`.
    ///
    /// On `Ready` the entry is marked in flight until [`apply_approved`] or
    /// [`abort_approval`] is called.
    ///
    /// [`apply_approved`]: Self::apply_approved
    /// [`abort_approval`]: Self::abort_approval
    pub fn begin_approval(&self, address: &Address) -> EscrowResult<ApprovalStart<L>> {
        let mut entry = self
            .entries
            .get_mut(address)
            .ok_or(EscrowError::NotFound(*address))?;

        if entry.record.is_approved {
            return Ok(ApprovalStart::AlreadyApproved);
        }
        if entry.approval_in_flight {
            return Err(EscrowError::ApprovalInFlight(*address));
        }
        let handle = entry.handle.clone().ok_or(EscrowError::NoSignerBound)?;
        entry.approval_in_flight = true;
        Ok(ApprovalStart::Ready(handle))
    }

    /// Clear the in-flight mark after a failed approval.
    pub fn abort_approval(&self, address: &Address) {
        if let Some(mut entry) = self.entries.get_mut(address) {
            entry.approval_in_flight = false;
        }
    }

    /// Record an observed `Approved` event.
    ///
    /// Idempotent: only the first call for an address changes the record
    /// and publishes a [`StatusChange`]. Returns whether this call did.
    pub fn apply_approved(&self, address: &Address, released: Option<U256>) -> bool {
        let applied = match self.entries.get_mut(address) {
            Some(mut entry) => {
                entry.approval_in_flight = false;
                if entry.record.is_approved {
                    false
                } else {
                    entry.record.is_approved = true;
                    true
                }
            }
            None => false,
        };

        if applied {
            self.notify(StatusChange {
                address: *address,
                is_approved: true,
                released,
            });
        } else {
            tracing::debug!(address = %address, "Ignoring repeated approval");
        }
        applied
    }
}

impl<L> std::fmt::Debug for EscrowRegistry<L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EscrowRegistry")
            .field("entries", &self.entries.len())
            .finish()
    }
}
