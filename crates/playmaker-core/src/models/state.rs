//! Cached resource state and pending optimistic mutations

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{Delta, MutationId, ResourceHandle};

/// Authoritative `{ version, payload }` body returned by the REST API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerSnapshot {
    pub version: u64,
    pub payload: Value,
}

impl ServerSnapshot {
    pub const fn new(version: u64, payload: Value) -> Self {
        Self { version, payload }
    }
}

/// Whether the cached state can be trusted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    /// Last confirmed state came from the server and no resync is outstanding
    #[default]
    Fresh,
    /// Reconciliation exhausted its retries; data may be out of date
    Stale,
}

/// Lifecycle of an optimistic mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationStatus {
    InFlight,
    Committed,
    RolledBack,
}

/// A local change applied before server confirmation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingMutation {
    pub mutation_id: MutationId,
    pub handle: ResourceHandle,
    pub delta: Delta,
    pub submitted_at: DateTime<Utc>,
    /// Cache version when the delta was applied
    pub baseline_version: u64,
    pub status: MutationStatus,
}

/// Latest known state of one resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceState {
    pub handle: ResourceHandle,
    /// Only advances on a server-confirmed write or an accepted push event
    pub version: u64,
    /// Visible payload: last confirmed payload plus pending deltas in submission order
    pub payload: Value,
    pub last_synced_at: DateTime<Utc>,
    /// In-flight mutations, oldest first
    pub pending_mutations: Vec<PendingMutation>,
    pub status: SyncStatus,
}

impl ResourceState {
    pub fn has_pending(&self) -> bool {
        !self.pending_mutations.is_empty()
    }

    pub fn is_stale(&self) -> bool {
        self.status == SyncStatus::Stale
    }
}
