//! Scope subscriptions over the single push connection.
//!
//! Screens subscribe to a scope together with the resources they render.
//! Scopes are refcounted: the first subscriber joins, the last one leaves.
//! A resource that gains its first subscriber is refetched, since pushes for
//! it were not routed while nobody watched it. Every `Connected` signal re-joins all live scopes and reconciles every
//! associated resource, since events emitted while disconnected are lost.

mod dedup;

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future::join_all;
use tokio::sync::mpsc;

use crate::config::SyncConfig;
use crate::models::{PushEvent, ResourceHandle, Scope};
use crate::reconciler::{ObservedHandles, PushOutcome, ReconcileOutcome, Reconciler};
use crate::transport::{PushTransport, TransportSignal};

pub use dedup::RecentEvents;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connected,
}

/// Membership of one scope on the push connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScopeStatus {
    #[default]
    Disconnected,
    Connecting,
    Joined,
}

/// Token for one `subscribe` call; hand it back to `unsubscribe`.
#[must_use = "dropping a subscription without unsubscribing keeps the scope joined"]
#[derive(Debug, PartialEq, Eq)]
pub struct Subscription {
    id: u64,
    scope: Scope,
    handles: Vec<ResourceHandle>,
}

impl Subscription {
    pub const fn id(&self) -> u64 {
        self.id
    }

    pub const fn scope(&self) -> &Scope {
        &self.scope
    }

    pub fn handles(&self) -> &[ResourceHandle] {
        &self.handles
    }
}

/// What handling one transport signal did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalOutcome {
    Connected {
        joined: usize,
        reconciled: Vec<(ResourceHandle, ReconcileOutcome)>,
    },
    Disconnected,
    /// Event id already seen inside the dedup window
    Duplicate,
    Pushed(PushOutcome),
}

#[derive(Debug, Default)]
struct ScopeEntry {
    refcount: usize,
    status: ScopeStatus,
    handles: HashMap<ResourceHandle, usize>,
}

#[derive(Debug)]
struct ManagerState {
    connection: ConnectionState,
    scopes: HashMap<Scope, ScopeEntry>,
    recent: RecentEvents,
    next_id: u64,
}

struct ManagerInner {
    transport: Arc<dyn PushTransport>,
    reconciler: Reconciler,
    observed: ObservedHandles,
    state: Mutex<ManagerState>,
}

#[derive(Clone)]
pub struct SubscriptionManager {
    inner: Arc<ManagerInner>,
}

impl SubscriptionManager {
    pub fn new(
        transport: Arc<dyn PushTransport>,
        reconciler: Reconciler,
        recent: RecentEvents,
    ) -> Self {
        let observed = reconciler.observed().clone();
        Self {
            inner: Arc::new(ManagerInner {
                transport,
                reconciler,
                observed,
                state: Mutex::new(ManagerState {
                    connection: ConnectionState::Disconnected,
                    scopes: HashMap::new(),
                    recent,
                    next_id: 1,
                }),
            }),
        }
    }

    pub fn from_config(
        config: &SyncConfig,
        transport: Arc<dyn PushTransport>,
        reconciler: Reconciler,
    ) -> Self {
        let recent = RecentEvents::new(config.dedup_capacity, config.dedup_max_age());
        Self::new(transport, reconciler, recent)
    }

    fn state(&self) -> MutexGuard<'_, ManagerState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.inner.reconciler
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.state().connection
    }

    /// Status of `scope`, or `None` when nobody is subscribed to it
    pub fn scope_status(&self, scope: &Scope) -> Option<ScopeStatus> {
        self.state().scopes.get(scope).map(|entry| entry.status)
    }

    pub fn refcount(&self, scope: &Scope) -> usize {
        self.state()
            .scopes
            .get(scope)
            .map_or(0, |entry| entry.refcount)
    }

    pub fn active_scopes(&self) -> Vec<Scope> {
        let mut scopes: Vec<Scope> = self.state().scopes.keys().cloned().collect();
        scopes.sort();
        scopes
    }

    /// Subscribe to `scope` on behalf of a screen rendering `handles`.
    ///
    /// Joins the scope if this is its first subscriber and the connection is
    /// up, then reconciles every handle that is not cached yet or had no
    /// subscriber before this call.
    pub async fn subscribe(
        &self,
        scope: Scope,
        handles: impl IntoIterator<Item = ResourceHandle>,
    ) -> Subscription {
        let handles: Vec<ResourceHandle> = handles.into_iter().collect();
        let (id, should_join, unwatched) = {
            let mut state = self.state();
            let connected = state.connection == ConnectionState::Connected;
            let id = state.next_id;
            state.next_id += 1;

            let entry = state.scopes.entry(scope.clone()).or_default();
            entry.refcount += 1;
            let mut unwatched = BTreeSet::new();
            for handle in &handles {
                *entry.handles.entry(handle.clone()).or_default() += 1;
                if self.inner.observed.acquire(handle) {
                    unwatched.insert(handle.clone());
                }
            }
            let should_join = connected && entry.status == ScopeStatus::Disconnected;
            if should_join {
                entry.status = ScopeStatus::Connecting;
            }
            (id, should_join, unwatched)
        };
        tracing::debug!("Subscription {id} on {scope} for {} resource(s)", handles.len());

        if should_join {
            self.join_scope(&scope).await;
        }

        let cache = self.inner.reconciler.cache();
        let mut targets = unwatched;
        targets.extend(handles.iter().filter(|handle| !cache.contains(handle)).cloned());
        join_all(
            targets
                .iter()
                .map(|handle| self.inner.reconciler.reconcile(handle)),
        )
        .await;

        Subscription { id, scope, handles }
    }

    /// Release a subscription; the last subscriber of a scope leaves it.
    pub async fn unsubscribe(&self, subscription: Subscription) {
        let Subscription { id, scope, handles } = subscription;
        let should_leave = {
            let mut state = self.state();
            let connected = state.connection == ConnectionState::Connected;
            let Some(entry) = state.scopes.get_mut(&scope) else {
                return;
            };
            entry.refcount = entry.refcount.saturating_sub(1);
            for handle in &handles {
                if let Some(count) = entry.handles.get_mut(handle) {
                    *count = count.saturating_sub(1);
                    if *count == 0 {
                        entry.handles.remove(handle);
                    }
                }
                self.inner.observed.release(handle);
            }
            if entry.refcount > 0 {
                false
            } else {
                let status = entry.status;
                state.scopes.remove(&scope);
                // A join still in flight leaves once it sees the scope is gone.
                connected && status == ScopeStatus::Joined
            }
        };
        tracing::debug!("Released subscription {id} on {scope}");

        if should_leave {
            if let Err(error) = self.inner.transport.leave(&scope).await {
                tracing::warn!("Failed to leave scope {scope}: {error}");
            } else {
                tracing::info!("Left scope {scope}");
            }
        }
    }

    /// React to one transport signal.
    pub async fn handle_signal(&self, signal: TransportSignal) -> SignalOutcome {
        match signal {
            TransportSignal::Connected => self.on_connected().await,
            TransportSignal::Disconnected => {
                let mut state = self.state();
                state.connection = ConnectionState::Disconnected;
                for entry in state.scopes.values_mut() {
                    entry.status = ScopeStatus::Disconnected;
                }
                tracing::info!("Push connection lost; {} scope(s) waiting for reconnect", state.scopes.len());
                SignalOutcome::Disconnected
            }
            TransportSignal::Event(event) => self.on_event(event).await,
        }
    }

    /// Consume the transport's signal stream until it closes.
    pub async fn run(self, mut signals: mpsc::Receiver<TransportSignal>) {
        while let Some(signal) = signals.recv().await {
            self.handle_signal(signal).await;
        }
        tracing::info!("Push signal stream ended");
    }

    async fn on_connected(&self) -> SignalOutcome {
        let (scopes, handles) = {
            let mut state = self.state();
            state.connection = ConnectionState::Connected;
            let mut handles = BTreeSet::new();
            for entry in state.scopes.values_mut() {
                entry.status = ScopeStatus::Connecting;
                handles.extend(entry.handles.keys().cloned());
            }
            let scopes: Vec<Scope> = state.scopes.keys().cloned().collect();
            (scopes, handles)
        };
        tracing::info!(
            "Push connection up; re-joining {} scope(s) and reconciling {} resource(s)",
            scopes.len(),
            handles.len()
        );

        let joined = join_all(scopes.iter().map(|scope| self.join_scope(scope)))
            .await
            .into_iter()
            .filter(|joined| *joined)
            .count();

        let reconciled = join_all(handles.into_iter().map(|handle| async move {
            let outcome = self.inner.reconciler.reconcile(&handle).await;
            (handle, outcome)
        }))
        .await;

        SignalOutcome::Connected { joined, reconciled }
    }

    async fn on_event(&self, event: PushEvent) -> SignalOutcome {
        let routed = {
            let mut state = self.state();
            if !state.recent.insert(event.event_id) {
                tracing::debug!("Dropping duplicate push event {}", event.event_id);
                return SignalOutcome::Duplicate;
            }
            state
                .scopes
                .get(&event.scope)
                .is_some_and(|entry| entry.handles.contains_key(&event.handle))
        };
        if !routed {
            tracing::debug!(
                "Ignoring push for {} on {}: no subscriber",
                event.handle,
                event.scope
            );
            return SignalOutcome::Pushed(PushOutcome::Ignored);
        }
        SignalOutcome::Pushed(self.inner.reconciler.apply_push(&event).await)
    }

    /// Join `scope` and record the result. Returns whether the scope is joined.
    async fn join_scope(&self, scope: &Scope) -> bool {
        let result = self.inner.transport.join(scope).await;

        let orphaned = {
            let mut state = self.state();
            let connected = state.connection == ConnectionState::Connected;
            match state.scopes.get_mut(scope) {
                Some(entry) => {
                    entry.status = match &result {
                        Ok(()) if connected => ScopeStatus::Joined,
                        _ => ScopeStatus::Disconnected,
                    };
                    false
                }
                None => result.is_ok() && connected,
            }
        };

        match result {
            Ok(()) if orphaned => {
                // Last subscriber left while the join was in flight.
                if let Err(error) = self.inner.transport.leave(scope).await {
                    tracing::warn!("Failed to leave scope {scope}: {error}");
                }
                false
            }
            Ok(()) => {
                tracing::info!("Joined scope {scope}");
                self.scope_status(scope) == Some(ScopeStatus::Joined)
            }
            Err(error) => {
                tracing::warn!("Failed to join scope {scope}; retrying on next reconnect: {error}");
                false
            }
        }
    }
}

impl std::fmt::Debug for SubscriptionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state();
        f.debug_struct("SubscriptionManager")
            .field("connection", &state.connection)
            .field("scopes", &state.scopes.len())
            .finish_non_exhaustive()
    }
}
