//! Push events delivered over the transport

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{Delta, EventId, ResourceHandle, Scope};

/// Body of a push event: either a full snapshot or a delta on the previous version
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PushBody {
    Payload(Value),
    Delta(Delta),
}

/// Server notification that a resource changed.
///
/// Consumed at most once per `event_id`; never mutated after receipt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushEvent {
    pub scope: Scope,
    pub handle: ResourceHandle,
    pub version: u64,
    pub event_id: EventId,
    #[serde(flatten)]
    pub body: PushBody,
}
