//! Reconciliation: replacing cached state with an authoritative snapshot.
//!
//! Triggered after a transport reconnect, when a push event reveals a version
//! gap, and on manual refresh. Fetches are retried with bounded backoff; when
//! retries run out the resource is marked stale so screens can say so.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::cache::{PushDecision, ResetOutcome};
use crate::config::RetryPolicy;
use crate::error::{Error, Result};
use crate::models::{MutationId, PushEvent, ResourceHandle, ServerSnapshot};
use crate::rest::ResourceApi;
use crate::services::SharedCache;

/// Result of one reconciliation request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Snapshot adopted; `discarded` pending mutations were rolled back
    Adopted {
        version: u64,
        discarded: Vec<MutationId>,
    },
    /// The fetched snapshot was older than the cache and was dropped
    StaleSnapshot { current: u64 },
    /// The last subscriber left while the fetch was in flight; result dropped
    Unobserved,
    /// A reconciliation for this handle was already running and will fetch again
    Coalesced,
    /// Every attempt failed; the resource (if cached) is now marked stale
    MarkedStale { error: FetchFailure },
}

/// Why the last reconcile attempt failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchFailure {
    Network(String),
    Rejected { status: u16, reason: String },
    Malformed(String),
    TimedOut { after_ms: u128 },
    /// Local error raised before the request left, e.g. an unusable URL
    Other(String),
}

impl From<Error> for FetchFailure {
    fn from(error: Error) -> Self {
        match error {
            Error::NetworkFailure(message) => Self::Network(message),
            Error::RejectedByServer { status, reason } => Self::Rejected { status, reason },
            Error::MalformedResponse(message) => Self::Malformed(message),
            other => Self::Other(other.to_string()),
        }
    }
}

impl From<FetchFailure> for Error {
    fn from(failure: FetchFailure) -> Self {
        match failure {
            FetchFailure::Network(message) | FetchFailure::Other(message) => {
                Self::NetworkFailure(message)
            }
            FetchFailure::Rejected { status, reason } => Self::RejectedByServer { status, reason },
            FetchFailure::Malformed(message) => Self::MalformedResponse(message),
            FetchFailure::TimedOut { after_ms } => {
                Self::NetworkFailure(format!("timed out after {after_ms}ms"))
            }
        }
    }
}

/// What happened to a routed push event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushOutcome {
    Applied,
    /// Duplicate or out-of-order version; dropped
    Stale { current: u64 },
    /// Missed events or no baseline; state was refetched instead
    Reconciled(ReconcileOutcome),
    /// No subscriber watches this resource in the event's scope
    Ignored,
}

/// Handles that currently have at least one subscriber
#[derive(Debug, Clone, Default)]
pub(crate) struct ObservedHandles(Arc<Mutex<HashMap<ResourceHandle, usize>>>);

impl ObservedHandles {
    fn lock(&self) -> MutexGuard<'_, HashMap<ResourceHandle, usize>> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns whether `handle` had no subscriber before this call.
    pub(crate) fn acquire(&self, handle: &ResourceHandle) -> bool {
        let mut observed = self.lock();
        let count = observed.entry(handle.clone()).or_default();
        *count += 1;
        *count == 1
    }

    pub(crate) fn release(&self, handle: &ResourceHandle) {
        let mut observed = self.lock();
        if let Some(count) = observed.get_mut(handle) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                observed.remove(handle);
            }
        }
    }

    pub(crate) fn contains(&self, handle: &ResourceHandle) -> bool {
        self.lock().contains_key(handle)
    }
}

struct ReconcilerInner {
    cache: SharedCache,
    api: Arc<dyn ResourceApi>,
    policy: RetryPolicy,
    observed: ObservedHandles,
    /// Handles with a fetch in flight, flagged when another request arrived meanwhile
    in_flight: Mutex<HashMap<ResourceHandle, bool>>,
}

#[derive(Clone)]
pub struct Reconciler {
    inner: Arc<ReconcilerInner>,
}

impl Reconciler {
    pub fn new(cache: SharedCache, api: Arc<dyn ResourceApi>, policy: RetryPolicy) -> Self {
        Self {
            inner: Arc::new(ReconcilerInner {
                cache,
                api,
                policy,
                observed: ObservedHandles::default(),
                in_flight: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn cache(&self) -> &SharedCache {
        &self.inner.cache
    }

    pub fn policy(&self) -> RetryPolicy {
        self.inner.policy
    }

    pub(crate) fn observed(&self) -> &ObservedHandles {
        &self.inner.observed
    }

    /// Refetch `handle` from the REST API and adopt the result.
    pub async fn reconcile(&self, handle: &ResourceHandle) -> ReconcileOutcome {
        let api = &self.inner.api;
        self.reconcile_with(handle, || api.fetch(handle)).await
    }

    /// Refetch `handle` with a caller-provided fetch and adopt the result.
    ///
    /// `fetch` is called once per attempt.
    pub async fn reconcile_with<F, Fut>(&self, handle: &ResourceHandle, mut fetch: F) -> ReconcileOutcome
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<ServerSnapshot>>,
    {
        let Some(mut guard) = InFlightGuard::begin(&self.inner, handle) else {
            tracing::debug!("Reconcile of {handle} already in flight; coalescing");
            return ReconcileOutcome::Coalesced;
        };

        loop {
            let observed_at_start = self.inner.observed.contains(handle);
            let outcome = self.fetch_and_adopt(handle, &mut fetch, observed_at_start).await;
            if !guard.take_rerun() {
                return outcome;
            }
            tracing::debug!("Reconcile of {handle} requested again while in flight; refetching");
        }
    }

    /// Route a push event to the cache, reconciling on gaps.
    pub async fn apply_push(&self, event: &PushEvent) -> PushOutcome {
        match self.inner.cache.accept_push(event) {
            PushDecision::Applied => PushOutcome::Applied,
            PushDecision::Stale { current } => {
                tracing::debug!(
                    "Dropping push for {} at version {} (cached {current})",
                    event.handle,
                    event.version
                );
                PushOutcome::Stale { current }
            }
            PushDecision::Gap { current } => {
                tracing::info!(
                    "Version gap on {}: cached {current}, pushed {}; reconciling",
                    event.handle,
                    event.version
                );
                PushOutcome::Reconciled(self.reconcile(&event.handle).await)
            }
            PushDecision::NeedsBaseline => {
                tracing::info!(
                    "Push delta for uncached {}; fetching baseline",
                    event.handle
                );
                PushOutcome::Reconciled(self.reconcile(&event.handle).await)
            }
        }
    }

    async fn fetch_and_adopt<F, Fut>(
        &self,
        handle: &ResourceHandle,
        fetch: &mut F,
        observed_at_start: bool,
    ) -> ReconcileOutcome
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<ServerSnapshot>>,
    {
        let policy = self.inner.policy;
        let mut last_error = FetchFailure::Other("no reconcile attempts configured".to_string());
        for attempt in 1..=policy.max_attempts {
            match tokio::time::timeout(policy.timeout, fetch()).await {
                Ok(Ok(snapshot)) => return self.adopt(handle, snapshot, observed_at_start),
                Ok(Err(error)) => {
                    tracing::warn!(
                        "Reconcile fetch for {handle} failed (attempt {attempt}/{}): {error}",
                        policy.max_attempts
                    );
                    last_error = error.into();
                }
                Err(_) => {
                    tracing::warn!(
                        "Reconcile fetch for {handle} timed out after {}ms (attempt {attempt}/{})",
                        policy.timeout.as_millis(),
                        policy.max_attempts
                    );
                    last_error = FetchFailure::TimedOut {
                        after_ms: policy.timeout.as_millis(),
                    };
                }
            }
            if attempt < policy.max_attempts {
                tokio::time::sleep(policy.backoff(attempt)).await;
            }
        }

        if self.inner.cache.mark_stale(handle) {
            tracing::warn!("Marked {handle} stale after {} failed reconcile attempts", policy.max_attempts);
        }
        ReconcileOutcome::MarkedStale { error: last_error }
    }

    fn adopt(
        &self,
        handle: &ResourceHandle,
        snapshot: ServerSnapshot,
        observed_at_start: bool,
    ) -> ReconcileOutcome {
        if observed_at_start && !self.inner.observed.contains(handle) {
            tracing::debug!("Discarding reconcile result for {handle}: no subscribers remain");
            return ReconcileOutcome::Unobserved;
        }

        let version = snapshot.version;
        match self.inner.cache.reset(handle, snapshot) {
            ResetOutcome::Adopted { discarded } => {
                for mutation in &discarded {
                    tracing::warn!(
                        "Discarded pending mutation {} on {handle}: baseline {} predates version {version}",
                        mutation.mutation_id,
                        mutation.baseline_version
                    );
                }
                tracing::info!("Reconciled {handle} at version {version}");
                ReconcileOutcome::Adopted {
                    version,
                    discarded: discarded
                        .into_iter()
                        .map(|mutation| mutation.mutation_id)
                        .collect(),
                }
            }
            ResetOutcome::Stale { current } => {
                tracing::debug!(
                    "Dropping reconcile snapshot for {handle} at version {version} (cached {current})"
                );
                ReconcileOutcome::StaleSnapshot { current }
            }
        }
    }
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("policy", &self.inner.policy)
            .finish_non_exhaustive()
    }
}

/// Marks a handle as being reconciled; clears the mark when dropped mid-fetch.
struct InFlightGuard<'a> {
    inner: &'a ReconcilerInner,
    handle: &'a ResourceHandle,
    armed: bool,
}

impl<'a> InFlightGuard<'a> {
    fn lock(inner: &ReconcilerInner) -> MutexGuard<'_, HashMap<ResourceHandle, bool>> {
        inner.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn begin(inner: &'a ReconcilerInner, handle: &'a ResourceHandle) -> Option<Self> {
        let mut in_flight = Self::lock(inner);
        if let Some(rerun) = in_flight.get_mut(handle) {
            *rerun = true;
            return None;
        }
        in_flight.insert(handle.clone(), false);
        Some(Self {
            inner,
            handle,
            armed: true,
        })
    }

    /// Consume a pending rerun request, or release the handle if there is none.
    fn take_rerun(&mut self) -> bool {
        let mut in_flight = Self::lock(self.inner);
        if in_flight.get(self.handle).copied().unwrap_or(false) {
            in_flight.insert(self.handle.clone(), false);
            true
        } else {
            in_flight.remove(self.handle);
            self.armed = false;
            false
        }
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            Self::lock(self.inner).remove(self.handle);
        }
    }
}
