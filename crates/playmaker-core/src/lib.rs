//! playmaker-core - Live resource synchronization for Playmaker
//!
//! Keeps an in-memory view of server-owned resources (match scores,
//! attendance rosters, coach workloads, update feeds) consistent across
//! optimistic local mutations, REST responses and push events, while
//! tolerating reconnects, duplicate deliveries and partial failures.

pub mod cache;
pub mod client;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod models;
pub mod projection;
pub mod reconciler;
pub mod rest;
pub mod services;
pub mod subscription;
pub mod transport;
pub mod util;

#[cfg(test)]
mod testing;
#[cfg(test)]
mod tests;

pub use client::{LiveClient, RestMutation, SyncClient};
pub use config::{RetryPolicy, SyncConfig};
pub use coordinator::{MutationCoordinator, MutationOutcome};
pub use error::{Error, Result};
pub use models::{
    Delta, EventId, MutationId, PushBody, PushEvent, ResourceHandle, ResourceKind, ResourceState,
    Scope, ServerSnapshot, SyncStatus,
};
pub use reconciler::{FetchFailure, PushOutcome, ReconcileOutcome, Reconciler};
pub use rest::{MutationMethod, ResourceApi, RestClient};
pub use services::{CacheChange, ChangeCause, SharedCache};
pub use subscription::{ConnectionState, ScopeStatus, Subscription, SubscriptionManager};
pub use transport::{DetachedTransport, PushTransport, TransportSignal, WsTransport};
