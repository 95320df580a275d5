//! Process-wide cache service shared by every screen.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::broadcast;

use crate::cache::{PushDecision, PutOutcome, ResetOutcome, Resolution, ResourceCache};
use crate::error::Result;
use crate::models::{
    Delta, MutationId, PendingMutation, PushEvent, ResourceHandle, ResourceState, ServerSnapshot,
};

const CHANGE_CHANNEL_CAPACITY: usize = 256;

/// Why a cached resource changed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeCause {
    Optimistic,
    Committed,
    RolledBack,
    Pushed,
    Reconciled,
    MarkedStale,
}

/// Notification broadcast after every applied cache write
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheChange {
    pub handle: ResourceHandle,
    pub version: u64,
    pub cause: ChangeCause,
}

/// Thread-safe handle to the shared [`ResourceCache`].
///
/// Reads are public. Writes are crate-private and funneled through the
/// mutation coordinator and the reconciler so version checks always apply.
/// The lock is never held across an await point.
#[derive(Clone)]
pub struct SharedCache {
    cache: Arc<Mutex<ResourceCache>>,
    changes: broadcast::Sender<CacheChange>,
}

impl SharedCache {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            cache: Arc::new(Mutex::new(ResourceCache::new())),
            changes,
        }
    }

    fn lock(&self) -> MutexGuard<'_, ResourceCache> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn notify(&self, handle: &ResourceHandle, version: u64, cause: ChangeCause) {
        // No receivers is fine: nobody is rendering this resource.
        let _ = self.changes.send(CacheChange {
            handle: handle.clone(),
            version,
            cause,
        });
    }

    /// Subscribe to change notifications. Lagging receivers skip ahead and
    /// should re-read the cache.
    pub fn changes(&self) -> broadcast::Receiver<CacheChange> {
        self.changes.subscribe()
    }

    /// Snapshot of a resource's current state
    pub fn get(&self, handle: &ResourceHandle) -> Option<ResourceState> {
        self.lock().get(handle).cloned()
    }

    pub fn version(&self, handle: &ResourceHandle) -> Option<u64> {
        self.lock().version(handle)
    }

    pub fn contains(&self, handle: &ResourceHandle) -> bool {
        self.lock().contains(handle)
    }

    /// Read a resource under the lock without cloning it
    pub fn read<T>(
        &self,
        handle: &ResourceHandle,
        read: impl FnOnce(&ResourceState) -> T,
    ) -> Option<T> {
        self.lock().get(handle).map(read)
    }

    pub(crate) fn put(&self, handle: &ResourceHandle, snapshot: ServerSnapshot) -> PutOutcome {
        let version = snapshot.version;
        let outcome = self.lock().put(handle, version, snapshot.payload);
        if outcome.is_applied() {
            self.notify(handle, version, ChangeCause::Committed);
        }
        outcome
    }

    pub(crate) fn apply_optimistic(
        &self,
        handle: &ResourceHandle,
        mutation_id: MutationId,
        delta: Delta,
    ) -> Result<PendingMutation> {
        let pending = self.lock().apply_optimistic(handle, mutation_id, delta)?;
        self.notify(handle, pending.baseline_version, ChangeCause::Optimistic);
        Ok(pending)
    }

    pub(crate) fn resolve_optimistic(
        &self,
        mutation_id: &MutationId,
        resolution: Resolution,
    ) -> Option<PendingMutation> {
        let cause = match resolution {
            Resolution::Commit(_) => ChangeCause::Committed,
            Resolution::Rollback => ChangeCause::RolledBack,
        };
        let (resolved, version) = {
            let mut cache = self.lock();
            let resolved = cache.resolve_optimistic(mutation_id, resolution);
            let version = resolved
                .as_ref()
                .and_then(|mutation| cache.version(&mutation.handle));
            (resolved, version)
        };

        match (&resolved, version) {
            (Some(mutation), Some(version)) => self.notify(&mutation.handle, version, cause),
            _ => tracing::debug!("Ignoring resolution of unknown mutation {mutation_id}"),
        }
        resolved
    }

    pub(crate) fn accept_push(&self, event: &PushEvent) -> PushDecision {
        let decision = self.lock().accept_push(event);
        if decision == PushDecision::Applied {
            self.notify(&event.handle, event.version, ChangeCause::Pushed);
        }
        decision
    }

    pub(crate) fn reset(&self, handle: &ResourceHandle, snapshot: ServerSnapshot) -> ResetOutcome {
        let version = snapshot.version;
        let outcome = self.lock().reset(handle, snapshot);
        if matches!(outcome, ResetOutcome::Adopted { .. }) {
            self.notify(handle, version, ChangeCause::Reconciled);
        }
        outcome
    }

    pub(crate) fn mark_stale(&self, handle: &ResourceHandle) -> bool {
        let version = {
            let mut cache = self.lock();
            if !cache.mark_stale(handle) {
                return false;
            }
            cache.version(handle).unwrap_or_default()
        };
        self.notify(handle, version, ChangeCause::MarkedStale);
        true
    }
}

impl Default for SharedCache {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SharedCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedCache")
            .field("resources", &self.lock().len())
            .field("change_receivers", &self.changes.receiver_count())
            .finish()
    }
}
