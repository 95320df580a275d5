//! In-memory resource cache.
//!
//! Holds the latest known server state per [`ResourceHandle`] together with
//! the optimistic mutations still waiting for the server. The visible payload
//! of every entry is always the last confirmed payload with the pending
//! deltas applied in submission order, so mutations can resolve in any order
//! without corrupting each other.
//!
//! Versions never decrease: writes carrying an older version are dropped.

use std::collections::HashMap;

use chrono::Utc;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::models::{
    Delta, MutationId, MutationStatus, PendingMutation, PushBody, PushEvent, ResourceHandle,
    ResourceState, ServerSnapshot, SyncStatus,
};

/// Result of a versioned write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    Applied,
    /// The write was older than the cached version and was dropped
    Stale { current: u64 },
}

impl PutOutcome {
    pub const fn is_applied(self) -> bool {
        matches!(self, Self::Applied)
    }
}

/// How an optimistic mutation ends
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// The server accepted the write and returned its authoritative state
    Commit(ServerSnapshot),
    /// The write failed; its delta is removed from the visible payload
    Rollback,
}

/// What the cache did with a push event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushDecision {
    Applied,
    /// Version at or below the cached one (duplicate or reordered delivery)
    Stale { current: u64 },
    /// Version jumped past `current + 1`; events were missed
    Gap { current: u64 },
    /// A delta arrived for a resource with no cached baseline
    NeedsBaseline,
}

/// Result of adopting a freshly fetched snapshot
#[derive(Debug, Clone, PartialEq)]
pub enum ResetOutcome {
    /// Snapshot adopted; `discarded` were pending on an older baseline and are rolled back
    Adopted { discarded: Vec<PendingMutation> },
    /// Snapshot older than the cache; dropped
    Stale { current: u64 },
}

#[derive(Debug, Clone)]
struct Entry {
    state: ResourceState,
    confirmed: Value,
}

impl Entry {
    fn new(handle: ResourceHandle, version: u64, payload: Value) -> Self {
        Self {
            state: ResourceState {
                handle,
                version,
                payload: payload.clone(),
                last_synced_at: Utc::now(),
                pending_mutations: Vec::new(),
                status: SyncStatus::Fresh,
            },
            confirmed: payload,
        }
    }

    fn confirm(&mut self, version: u64, payload: Value) {
        self.confirmed = payload;
        self.state.version = version;
        self.state.last_synced_at = Utc::now();
        self.state.status = SyncStatus::Fresh;
        self.recompute();
    }

    fn recompute(&mut self) {
        let mut payload = self.confirmed.clone();
        for mutation in &self.state.pending_mutations {
            mutation.delta.apply(&mut payload);
        }
        self.state.payload = payload;
    }
}

/// Keyed store of resource states
#[derive(Debug, Clone, Default)]
pub struct ResourceCache {
    entries: HashMap<ResourceHandle, Entry>,
    mutations: HashMap<MutationId, ResourceHandle>,
}

impl ResourceCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, handle: &ResourceHandle) -> Option<&ResourceState> {
        self.entries.get(handle).map(|entry| &entry.state)
    }

    pub fn version(&self, handle: &ResourceHandle) -> Option<u64> {
        self.get(handle).map(|state| state.version)
    }

    pub fn contains(&self, handle: &ResourceHandle) -> bool {
        self.entries.contains_key(handle)
    }

    pub fn handles(&self) -> impl Iterator<Item = &ResourceHandle> {
        self.entries.keys()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Handle owning an unresolved mutation
    pub fn mutation_handle(&self, mutation_id: &MutationId) -> Option<&ResourceHandle> {
        self.mutations.get(mutation_id)
    }

    /// Replace the confirmed payload if `version` is not older than the cached one.
    pub fn put(&mut self, handle: &ResourceHandle, version: u64, payload: Value) -> PutOutcome {
        match self.entries.get_mut(handle) {
            Some(entry) if version < entry.state.version => PutOutcome::Stale {
                current: entry.state.version,
            },
            Some(entry) => {
                entry.confirm(version, payload);
                PutOutcome::Applied
            }
            None => {
                self.entries
                    .insert(handle.clone(), Entry::new(handle.clone(), version, payload));
                PutOutcome::Applied
            }
        }
    }

    /// Apply `delta` to the visible payload without touching the version.
    pub fn apply_optimistic(
        &mut self,
        handle: &ResourceHandle,
        mutation_id: MutationId,
        delta: Delta,
    ) -> Result<PendingMutation> {
        if self.mutations.contains_key(&mutation_id) {
            return Err(Error::InvalidInput(format!(
                "mutation {mutation_id} is already pending"
            )));
        }
        let entry = self
            .entries
            .get_mut(handle)
            .ok_or_else(|| Error::NotCached(handle.clone()))?;

        let pending = PendingMutation {
            mutation_id,
            handle: handle.clone(),
            delta,
            submitted_at: Utc::now(),
            baseline_version: entry.state.version,
            status: MutationStatus::InFlight,
        };
        pending.delta.apply(&mut entry.state.payload);
        entry.state.pending_mutations.push(pending.clone());
        self.mutations.insert(mutation_id, handle.clone());
        Ok(pending)
    }

    /// Settle a pending mutation.
    ///
    /// Returns `None` for an unknown id: the mutation was already resolved,
    /// typically discarded by a reconciliation that raced the REST response.
    pub fn resolve_optimistic(
        &mut self,
        mutation_id: &MutationId,
        resolution: Resolution,
    ) -> Option<PendingMutation> {
        let handle = self.mutations.remove(mutation_id)?;
        let entry = self.entries.get_mut(&handle)?;
        let position = entry
            .state
            .pending_mutations
            .iter()
            .position(|pending| pending.mutation_id == *mutation_id)?;
        let mut mutation = entry.state.pending_mutations.remove(position);
        entry.recompute();

        match resolution {
            Resolution::Commit(snapshot) => {
                mutation.status = if snapshot.version >= mutation.baseline_version {
                    MutationStatus::Committed
                } else {
                    MutationStatus::RolledBack
                };
                self.put(&handle, snapshot.version, snapshot.payload);
            }
            Resolution::Rollback => mutation.status = MutationStatus::RolledBack,
        }
        Some(mutation)
    }

    /// Decide and, when in order, apply a push event.
    pub fn accept_push(&mut self, event: &PushEvent) -> PushDecision {
        let Some(entry) = self.entries.get(&event.handle) else {
            return match &event.body {
                PushBody::Payload(payload) => {
                    self.put(&event.handle, event.version, payload.clone());
                    PushDecision::Applied
                }
                PushBody::Delta(_) => PushDecision::NeedsBaseline,
            };
        };

        let current = entry.state.version;
        if event.version <= current {
            return PushDecision::Stale { current };
        }
        if event.version > current.saturating_add(1) {
            return PushDecision::Gap { current };
        }

        let payload = match &event.body {
            PushBody::Payload(payload) => payload.clone(),
            PushBody::Delta(delta) => delta.applied_to(&entry.confirmed),
        };
        self.put(&event.handle, event.version, payload);
        PushDecision::Applied
    }

    /// Adopt an authoritative snapshot fetched by reconciliation.
    ///
    /// Pending mutations whose baseline predates the snapshot are rolled back.
    pub fn reset(&mut self, handle: &ResourceHandle, snapshot: ServerSnapshot) -> ResetOutcome {
        let Some(entry) = self.entries.get_mut(handle) else {
            self.put(handle, snapshot.version, snapshot.payload);
            return ResetOutcome::Adopted {
                discarded: Vec::new(),
            };
        };

        if snapshot.version < entry.state.version {
            return ResetOutcome::Stale {
                current: entry.state.version,
            };
        }

        let (mut discarded, kept): (Vec<_>, Vec<_>) = entry
            .state
            .pending_mutations
            .drain(..)
            .partition(|pending| pending.baseline_version < snapshot.version);
        entry.state.pending_mutations = kept;
        entry.confirm(snapshot.version, snapshot.payload);

        for mutation in &mut discarded {
            mutation.status = MutationStatus::RolledBack;
            self.mutations.remove(&mutation.mutation_id);
        }
        ResetOutcome::Adopted { discarded }
    }

    /// Flag a resource as possibly out of date. Returns false when not cached.
    pub fn mark_stale(&mut self, handle: &ResourceHandle) -> bool {
        self.entries.get_mut(handle).is_some_and(|entry| {
            entry.state.status = SyncStatus::Stale;
            true
        })
    }
}
