//! Data models for Playmaker live resources

mod delta;
mod event;
mod handle;
mod ids;
mod state;

pub use delta::Delta;
pub use event::{PushBody, PushEvent};
pub use handle::{ResourceHandle, ResourceKind, Scope};
pub use ids::{EventId, MutationId};
pub use state::{MutationStatus, PendingMutation, ResourceState, ServerSnapshot, SyncStatus};
