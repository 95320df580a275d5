//! Optimistic mutation coordinator.
//!
//! Applies a delta locally, sends the request, and settles the mutation:
//! commit with the server's snapshot on success, roll back on failure or
//! timeout. The rollback is always applied before the failure is returned,
//! so a caller reporting an error never leaves optimistic state on screen.

use std::future::Future;
use std::time::Duration;

use crate::cache::Resolution;
use crate::error::{Error, Result};
use crate::models::{Delta, MutationId, MutationStatus, ResourceHandle, ServerSnapshot};
use crate::services::SharedCache;

/// Final state of a mutation as seen by its caller
///
/// `Committed` reports the server's answer to this request. It can arrive
/// after a reconciliation already discarded the optimistic delta (recorded
/// as rolled back in the cache). The cached state then reflects the
/// reconciled snapshot, so screens should render from the cache and not
/// from the outcome.
#[must_use]
#[derive(Debug)]
pub enum MutationOutcome {
    /// The server accepted the write at `version`
    Committed { mutation_id: MutationId, version: u64 },
    /// The write failed and its delta has been removed
    RolledBack { mutation_id: MutationId, error: Error },
}

impl MutationOutcome {
    pub const fn mutation_id(&self) -> MutationId {
        match self {
            Self::Committed { mutation_id, .. } | Self::RolledBack { mutation_id, .. } => {
                *mutation_id
            }
        }
    }

    pub const fn is_committed(&self) -> bool {
        matches!(self, Self::Committed { .. })
    }

    /// Committed version, or the error that caused the rollback
    pub fn into_result(self) -> Result<u64> {
        match self {
            Self::Committed { version, .. } => Ok(version),
            Self::RolledBack { error, .. } => Err(error),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MutationCoordinator {
    cache: SharedCache,
    timeout: Duration,
}

impl MutationCoordinator {
    pub const fn new(cache: SharedCache, timeout: Duration) -> Self {
        Self { cache, timeout }
    }

    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Apply `delta` optimistically and settle it with the result of `send`.
    ///
    /// `send` receives the mutation id to use as the request's idempotency key.
    /// Concurrent mutations on one handle settle independently in the order
    /// their responses arrive.
    pub async fn mutate<F, Fut>(
        &self,
        handle: &ResourceHandle,
        delta: Delta,
        send: F,
    ) -> MutationOutcome
    where
        F: FnOnce(MutationId) -> Fut,
        Fut: Future<Output = Result<ServerSnapshot>>,
    {
        let mutation_id = MutationId::new();
        if let Err(error) = self.cache.apply_optimistic(handle, mutation_id, delta) {
            return MutationOutcome::RolledBack { mutation_id, error };
        }
        tracing::debug!("Applied optimistic mutation {mutation_id} to {handle}");

        let mut guard = RollbackOnDrop {
            cache: &self.cache,
            mutation_id,
            armed: true,
        };
        let result = tokio::time::timeout(self.timeout, send(mutation_id))
            .await
            .unwrap_or_else(|_| {
                Err(Error::NetworkFailure(format!(
                    "request timed out after {}ms",
                    self.timeout.as_millis()
                )))
            });
        guard.armed = false;

        match result {
            Ok(snapshot) => self.commit(handle, mutation_id, snapshot),
            Err(error) => {
                self.cache
                    .resolve_optimistic(&mutation_id, Resolution::Rollback);
                tracing::warn!("Rolled back mutation {mutation_id} on {handle}: {error}");
                MutationOutcome::RolledBack { mutation_id, error }
            }
        }
    }

    fn commit(
        &self,
        handle: &ResourceHandle,
        mutation_id: MutationId,
        snapshot: ServerSnapshot,
    ) -> MutationOutcome {
        let version = snapshot.version;
        match self
            .cache
            .resolve_optimistic(&mutation_id, Resolution::Commit(snapshot))
        {
            Some(mutation) if mutation.status == MutationStatus::RolledBack => {
                let error = Error::MalformedResponse(format!(
                    "server version {version} predates baseline {} of mutation {mutation_id}",
                    mutation.baseline_version
                ));
                tracing::warn!("Rolled back mutation {mutation_id} on {handle}: {error}");
                MutationOutcome::RolledBack { mutation_id, error }
            }
            Some(_) => {
                tracing::debug!("Committed mutation {mutation_id} on {handle} at version {version}");
                MutationOutcome::Committed {
                    mutation_id,
                    version,
                }
            }
            None => {
                // A reconciliation already replaced the state this mutation was based on.
                tracing::debug!(
                    "Mutation {mutation_id} on {handle} committed at version {version} after being discarded by reconciliation"
                );
                MutationOutcome::Committed {
                    mutation_id,
                    version,
                }
            }
        }
    }
}

/// Rolls the mutation back if `mutate` is dropped while the request is in flight.
struct RollbackOnDrop<'a> {
    cache: &'a SharedCache,
    mutation_id: MutationId,
    armed: bool,
}

impl Drop for RollbackOnDrop<'_> {
    fn drop(&mut self) {
        if self.armed {
            tracing::warn!(
                "Mutation {} cancelled before the server answered; rolling back",
                self.mutation_id
            );
            self.cache
                .resolve_optimistic(&self.mutation_id, Resolution::Rollback);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ResetOutcome;
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::sync::oneshot;

    fn handle() -> ResourceHandle {
        ResourceHandle::match_score("42").unwrap()
    }

    fn score(home: i64, away: i64) -> Value {
        json!({ "home_score": home, "away_score": away })
    }

    fn setup(timeout: Duration) -> (SharedCache, MutationCoordinator) {
        let cache = SharedCache::new();
        cache.put(&handle(), ServerSnapshot::new(5, score(0, 0)));
        let coordinator = MutationCoordinator::new(cache.clone(), timeout);
        (cache, coordinator)
    }

    #[tokio::test]
    async fn commit_settles_at_server_version() {
        let (cache, coordinator) = setup(Duration::from_secs(10));
        let outcome = coordinator
            .mutate(&handle(), Delta::increment(["home_score"], 1), |_| async {
                Ok(ServerSnapshot::new(6, score(1, 0)))
            })
            .await;

        assert_eq!(outcome.into_result().unwrap(), 6);
        let state = cache.get(&handle()).unwrap();
        assert_eq!((state.version, state.payload), (6, score(1, 0)));
        assert!(state.pending_mutations.is_empty());
    }

    async fn wait_for_pending(cache: &SharedCache, count: usize) {
        while cache.read(&handle(), |state| state.pending_mutations.len()) != Some(count) {
            tokio::task::yield_now().await;
        }
    }

    fn spawn_mutation(
        coordinator: &MutationCoordinator,
        delta: Delta,
        response: oneshot::Receiver<Result<ServerSnapshot>>,
    ) -> tokio::task::JoinHandle<MutationOutcome> {
        let coordinator = coordinator.clone();
        tokio::spawn(async move {
            coordinator
                .mutate(&handle(), delta, move |_| async move {
                    response
                        .await
                        .unwrap_or_else(|_| Err(Error::NetworkFailure("dropped".to_string())))
                })
                .await
        })
    }

    #[tokio::test]
    async fn optimistic_change_is_visible_while_in_flight() {
        let (cache, coordinator) = setup(Duration::from_secs(10));
        let (respond, response) = oneshot::channel();
        let mutation = spawn_mutation(&coordinator, Delta::increment(["home_score"], 1), response);

        wait_for_pending(&cache, 1).await;
        let state = cache.get(&handle()).unwrap();
        assert_eq!(state.version, 5);
        assert_eq!(state.payload, score(1, 0));

        respond.send(Ok(ServerSnapshot::new(6, score(1, 0)))).unwrap();
        assert!(mutation.await.unwrap().is_committed());
    }

    #[tokio::test]
    async fn failure_rolls_back_before_reporting() {
        let (cache, coordinator) = setup(Duration::from_secs(10));
        let before = cache.get(&handle()).unwrap();

        let outcome = coordinator
            .mutate(&handle(), Delta::increment(["away_score"], 1), |_| async {
                Err(Error::RejectedByServer {
                    status: 409,
                    reason: "match is final".to_string(),
                })
            })
            .await;

        let MutationOutcome::RolledBack { error, .. } = outcome else {
            panic!("mutation should roll back");
        };
        assert!(matches!(error, Error::RejectedByServer { status: 409, .. }));
        assert_eq!(cache.get(&handle()).unwrap(), before);
    }

    #[tokio::test]
    async fn timeout_is_a_network_failure() {
        let (cache, coordinator) = setup(Duration::from_millis(20));
        let outcome = coordinator
            .mutate(&handle(), Delta::increment(["home_score"], 1), |_| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(ServerSnapshot::new(6, score(1, 0)))
            })
            .await;

        let error = outcome.into_result().unwrap_err();
        assert!(matches!(error, Error::NetworkFailure(_)));
        assert!(error.to_string().contains("timed out"));
        assert_eq!(cache.get(&handle()).unwrap().payload, score(0, 0));
    }

    #[tokio::test]
    async fn uncached_resource_is_refused_without_sending() {
        let cache = SharedCache::new();
        let coordinator = MutationCoordinator::new(cache, Duration::from_secs(1));
        let sent = AtomicBool::new(false);

        let outcome = coordinator
            .mutate(&handle(), Delta::increment(["home_score"], 1), |_| {
                sent.store(true, Ordering::SeqCst);
                async { Ok(ServerSnapshot::new(1, score(1, 0))) }
            })
            .await;

        assert!(matches!(
            outcome.into_result().unwrap_err(),
            Error::NotCached(_)
        ));
        assert!(!sent.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn mutation_id_is_passed_to_request() {
        let (_cache, coordinator) = setup(Duration::from_secs(1));
        let (seen_tx, seen_rx) = oneshot::channel();
        let outcome = coordinator
            .mutate(&handle(), Delta::increment(["home_score"], 1), |id| {
                let _ = seen_tx.send(id);
                async { Ok(ServerSnapshot::new(6, score(1, 0))) }
            })
            .await;
        assert_eq!(seen_rx.await.unwrap(), outcome.mutation_id());
    }

    #[tokio::test]
    async fn dropping_mutate_rolls_back() {
        let (cache, coordinator) = setup(Duration::from_secs(10));
        let cancelled = tokio::time::timeout(
            Duration::from_millis(20),
            coordinator.mutate(&handle(), Delta::increment(["home_score"], 1), |_| {
                std::future::pending::<Result<ServerSnapshot>>()
            }),
        )
        .await;
        assert!(cancelled.is_err());

        let state = cache.get(&handle()).unwrap();
        assert_eq!(state.payload, score(0, 0));
        assert!(state.pending_mutations.is_empty());
    }

    #[tokio::test]
    async fn commit_after_reconcile_discard_keeps_reconciled_state() {
        let (cache, coordinator) = setup(Duration::from_secs(10));
        let (respond, response) = oneshot::channel();
        let mutation = spawn_mutation(&coordinator, Delta::increment(["home_score"], 1), response);
        wait_for_pending(&cache, 1).await;

        let ResetOutcome::Adopted { discarded } =
            cache.reset(&handle(), ServerSnapshot::new(8, score(0, 2)))
        else {
            panic!("newer snapshot should be adopted");
        };
        assert_eq!(discarded.len(), 1);

        respond.send(Ok(ServerSnapshot::new(6, score(1, 0)))).unwrap();
        let outcome = mutation.await.unwrap();
        assert!(outcome.is_committed());
        assert_eq!(outcome.into_result().unwrap(), 6);

        let state = cache.get(&handle()).unwrap();
        assert_eq!((state.version, state.payload), (8, score(0, 2)));
        assert!(state.pending_mutations.is_empty());
    }

    #[tokio::test]
    async fn responses_settle_in_arrival_order() {
        let (cache, coordinator) = setup(Duration::from_secs(10));
        let (first_tx, first_rx) = oneshot::channel();
        let (second_tx, second_rx) = oneshot::channel();
        let first = spawn_mutation(&coordinator, Delta::increment(["home_score"], 1), first_rx);
        wait_for_pending(&cache, 1).await;
        let second = spawn_mutation(&coordinator, Delta::increment(["away_score"], 1), second_rx);
        wait_for_pending(&cache, 2).await;
        assert_eq!(cache.get(&handle()).unwrap().payload, score(1, 1));

        // The later mutation fails first; the earlier delta survives.
        second_tx
            .send(Err(Error::NetworkFailure("reset".to_string())))
            .unwrap();
        assert!(!second.await.unwrap().is_committed());
        assert_eq!(cache.get(&handle()).unwrap().payload, score(1, 0));

        first_tx.send(Ok(ServerSnapshot::new(6, score(1, 0)))).unwrap();
        assert!(first.await.unwrap().is_committed());
        let state = cache.get(&handle()).unwrap();
        assert_eq!((state.version, state.payload), (6, score(1, 0)));
        assert!(state.pending_mutations.is_empty());
    }
}
