//! Scripted collaborators for unit and scenario tests.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::error::{Error, Result};
use crate::models::{ResourceHandle, Scope, ServerSnapshot};
use crate::rest::ResourceApi;
use crate::transport::PushTransport;

/// REST API stand-in answering fetches from per-handle queues
#[derive(Debug, Default)]
pub struct ScriptedApi {
    responses: Mutex<HashMap<ResourceHandle, VecDeque<Result<ServerSnapshot>>>>,
    fetches: Mutex<HashMap<ResourceHandle, usize>>,
}

impl ScriptedApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the answer for the next fetch of `handle`.
    pub fn respond(&self, handle: &ResourceHandle, response: Result<ServerSnapshot>) {
        self.responses
            .lock()
            .unwrap()
            .entry(handle.clone())
            .or_default()
            .push_back(response);
    }

    pub fn fetch_count(&self, handle: &ResourceHandle) -> usize {
        self.fetches
            .lock()
            .unwrap()
            .get(handle)
            .copied()
            .unwrap_or_default()
    }

    pub fn total_fetches(&self) -> usize {
        self.fetches.lock().unwrap().values().sum()
    }
}

#[async_trait]
impl ResourceApi for ScriptedApi {
    async fn fetch(&self, handle: &ResourceHandle) -> Result<ServerSnapshot> {
        *self
            .fetches
            .lock()
            .unwrap()
            .entry(handle.clone())
            .or_default() += 1;
        self.responses
            .lock()
            .unwrap()
            .get_mut(handle)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| {
                Err(Error::NetworkFailure(format!(
                    "no scripted response for {handle}"
                )))
            })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MembershipCall {
    Join(Scope),
    Leave(Scope),
}

/// Push transport stand-in that records membership calls
#[derive(Debug, Default)]
pub struct RecordingTransport {
    calls: Mutex<Vec<MembershipCall>>,
    fail_joins: Mutex<bool>,
    join_gate: Mutex<Option<Arc<Notify>>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<MembershipCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.calls.lock().unwrap().clear();
    }

    pub fn fail_joins(&self, fail: bool) {
        *self.fail_joins.lock().unwrap() = fail;
    }

    /// Make every later `join` wait until the returned gate is notified.
    pub fn hold_joins(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.join_gate.lock().unwrap() = Some(gate.clone());
        gate
    }
}

#[async_trait]
impl PushTransport for RecordingTransport {
    async fn join(&self, scope: &Scope) -> Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push(MembershipCall::Join(scope.clone()));
        let gate = self.join_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        if *self.fail_joins.lock().unwrap() {
            return Err(Error::Transport("join refused".to_string()));
        }
        Ok(())
    }

    async fn leave(&self, scope: &Scope) -> Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push(MembershipCall::Leave(scope.clone()));
        Ok(())
    }
}
