//! Push transport seam.
//!
//! The transport owns the single persistent connection of the process. Scope
//! membership is requested through [`PushTransport`]; everything the
//! connection observes comes back as a stream of [`TransportSignal`]s. The
//! core assumes neither ordering nor at-most-once delivery from it.

mod ws;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{PushEvent, Scope};

pub use ws::{parse_server_frame, ClientFrame, ServerFrame, WsTransport};

/// Something the transport observed
#[derive(Debug, Clone, PartialEq)]
pub enum TransportSignal {
    /// The connection was (re-)established; previous scope membership is gone
    Connected,
    Disconnected,
    Event(PushEvent),
}

#[async_trait]
pub trait PushTransport: Send + Sync {
    async fn join(&self, scope: &Scope) -> Result<()>;
    async fn leave(&self, scope: &Scope) -> Result<()>;
}

/// Transport for one-shot commands that never open a push connection.
///
/// Membership calls succeed and do nothing; no signals are ever produced.
#[derive(Debug, Clone, Copy, Default)]
pub struct DetachedTransport;

#[async_trait]
impl PushTransport for DetachedTransport {
    async fn join(&self, scope: &Scope) -> Result<()> {
        tracing::debug!("Detached transport ignoring join of {scope}");
        Ok(())
    }

    async fn leave(&self, _scope: &Scope) -> Result<()> {
        Ok(())
    }
}
