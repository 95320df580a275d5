//! `SyncClient`: the one service every screen is handed.

use std::future::Future;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::config::SyncConfig;
use crate::coordinator::{MutationCoordinator, MutationOutcome};
use crate::error::{Error, Result};
use crate::models::{Delta, MutationId, ResourceHandle, ResourceState, Scope, ServerSnapshot};
use crate::reconciler::{ReconcileOutcome, Reconciler};
use crate::rest::{MutationMethod, ResourceApi, RestClient};
use crate::services::{CacheChange, SharedCache};
use crate::subscription::{Subscription, SubscriptionManager};
use crate::transport::{PushTransport, TransportSignal, WsTransport};

/// Shared cache plus the components allowed to write to it
#[derive(Debug, Clone)]
pub struct SyncClient {
    cache: SharedCache,
    coordinator: MutationCoordinator,
    reconciler: Reconciler,
    subscriptions: SubscriptionManager,
}

impl SyncClient {
    pub fn new(
        config: &SyncConfig,
        api: Arc<dyn ResourceApi>,
        transport: Arc<dyn PushTransport>,
    ) -> Self {
        let cache = SharedCache::new();
        let coordinator = MutationCoordinator::new(cache.clone(), config.mutation_timeout());
        let reconciler = Reconciler::new(cache.clone(), api, config.reconcile_policy());
        let subscriptions =
            SubscriptionManager::from_config(config, transport, reconciler.clone());
        Self {
            cache,
            coordinator,
            reconciler,
            subscriptions,
        }
    }

    /// Build a client over the configured REST API and push endpoint and
    /// start its background tasks.
    pub fn connect(config: &SyncConfig) -> Result<LiveClient> {
        let rest = RestClient::from_config(config)?;
        let push_url = config
            .push_url
            .clone()
            .ok_or_else(|| Error::Config("push_url is not configured".to_string()))?;

        let (transport, signals, transport_task) =
            WsTransport::connect(push_url, config.reconnect_policy());
        let client = Self::new(config, Arc::new(rest.clone()), Arc::new(transport));
        let signal_task = client.spawn(signals);
        Ok(LiveClient {
            client,
            rest,
            transport_task,
            signal_task,
        })
    }

    /// Run the subscription loop over `signals` on the tokio runtime.
    pub fn spawn(&self, signals: mpsc::Receiver<TransportSignal>) -> JoinHandle<()> {
        tokio::spawn(self.subscriptions.clone().run(signals))
    }

    pub const fn cache(&self) -> &SharedCache {
        &self.cache
    }

    pub const fn subscriptions(&self) -> &SubscriptionManager {
        &self.subscriptions
    }

    pub fn changes(&self) -> broadcast::Receiver<CacheChange> {
        self.cache.changes()
    }

    pub fn state(&self, handle: &ResourceHandle) -> Option<ResourceState> {
        self.cache.get(handle)
    }

    /// Cached state of `handle`, fetching it first when absent.
    pub async fn load(&self, handle: &ResourceHandle) -> Result<ResourceState> {
        if let Some(state) = self.cache.get(handle) {
            return Ok(state);
        }
        let outcome = self.reconciler.reconcile(handle).await;
        match (self.cache.get(handle), outcome) {
            (Some(state), _) => Ok(state),
            (None, ReconcileOutcome::MarkedStale { error }) => Err(error.into()),
            (None, _) => Err(Error::NotCached(handle.clone())),
        }
    }

    /// Manual refresh: refetch and adopt the authoritative snapshot.
    pub async fn refresh(&self, handle: &ResourceHandle) -> ReconcileOutcome {
        self.reconciler.reconcile(handle).await
    }

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
        self.coordinator.mutate(handle, delta, send).await
    }

    /// Optimistic mutation sent to a REST action endpoint.
    pub async fn mutate_rest(
        &self,
        rest: &RestClient,
        handle: &ResourceHandle,
        delta: Delta,
        request: RestMutation,
    ) -> MutationOutcome {
        self.coordinator
            .mutate(handle, delta, |mutation_id| async move {
                rest.send_mutation(
                    handle,
                    request.method,
                    &request.action,
                    &request.body,
                    mutation_id,
                )
                .await
            })
            .await
    }

    pub async fn subscribe(
        &self,
        scope: Scope,
        handles: impl IntoIterator<Item = ResourceHandle>,
    ) -> Subscription {
        self.subscriptions.subscribe(scope, handles).await
    }

    pub async fn unsubscribe(&self, subscription: Subscription) {
        self.subscriptions.unsubscribe(subscription).await;
    }
}

/// REST request paired with an optimistic delta
#[derive(Debug, Clone, PartialEq)]
pub struct RestMutation {
    pub method: MutationMethod,
    pub action: String,
    pub body: Value,
}

impl RestMutation {
    pub fn post(action: impl Into<String>, body: Value) -> Self {
        Self {
            method: MutationMethod::Post,
            action: action.into(),
            body,
        }
    }

    pub fn put(action: impl Into<String>, body: Value) -> Self {
        Self {
            method: MutationMethod::Put,
            action: action.into(),
            body,
        }
    }
}

/// A connected client with its background tasks
#[derive(Debug)]
pub struct LiveClient {
    pub client: SyncClient,
    pub rest: RestClient,
    transport_task: JoinHandle<()>,
    signal_task: JoinHandle<()>,
}

impl LiveClient {
    pub fn shutdown(self) {
        self.signal_task.abort();
        self.transport_task.abort();
    }
}
