//! Websocket push transport.
//!
//! Wire format is one JSON object per text frame:
//!
//! ```text
//! client -> server  {"type":"join","scope":"tournament:3"}
//!                   {"type":"leave","scope":"tournament:3"}
//! server -> client  {"type":"event","scope":..,"handle":{..},"version":7,"event_id":..,"payload":{..}}
//!                   {"type":"error","message":".."}
//! ```

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

use super::{PushTransport, TransportSignal};
use crate::config::RetryPolicy;
use crate::error::{Error, Result};
use crate::models::{PushEvent, Scope};

const SIGNAL_CHANNEL_CAPACITY: usize = 1024;

/// Frame sent by the client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    Join { scope: Scope },
    Leave { scope: Scope },
}

/// Frame sent by the push endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    Event(PushEvent),
    Error { message: String },
}

/// Handle to the background websocket connection.
///
/// Join/leave requests queued while the socket is down are dropped on
/// reconnect: the subscription manager re-joins every live scope when it
/// sees [`TransportSignal::Connected`].
#[derive(Debug, Clone)]
pub struct WsTransport {
    commands: mpsc::UnboundedSender<ClientFrame>,
}

impl WsTransport {
    /// Spawn the connection task. Returns the transport, its signal stream,
    /// and the task handle. The task stops once the signal receiver and
    /// every transport clone are dropped.
    pub fn connect(
        url: impl Into<String>,
        reconnect: RetryPolicy,
    ) -> (Self, mpsc::Receiver<TransportSignal>, JoinHandle<()>) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (signal_tx, signal_rx) = mpsc::channel(SIGNAL_CHANNEL_CAPACITY);
        let task = tokio::spawn(run_connection(
            url.into(),
            reconnect,
            command_rx,
            signal_tx,
        ));
        (
            Self {
                commands: command_tx,
            },
            signal_rx,
            task,
        )
    }

    fn send(&self, frame: ClientFrame) -> Result<()> {
        self.commands
            .send(frame)
            .map_err(|_| Error::Transport("push connection task has stopped".to_string()))
    }
}

#[async_trait]
impl PushTransport for WsTransport {
    async fn join(&self, scope: &Scope) -> Result<()> {
        self.send(ClientFrame::Join {
            scope: scope.clone(),
        })
    }

    async fn leave(&self, scope: &Scope) -> Result<()> {
        self.send(ClientFrame::Leave {
            scope: scope.clone(),
        })
    }
}

/// Parse one inbound text frame.
pub fn parse_server_frame(text: &str) -> Result<ServerFrame> {
    Ok(serde_json::from_str(text)?)
}

enum PumpExit {
    /// Socket closed or failed; reconnect
    Closed,
    /// Every consumer is gone; stop the task
    Shutdown,
}

async fn run_connection(
    url: String,
    reconnect: RetryPolicy,
    mut commands: mpsc::UnboundedReceiver<ClientFrame>,
    signals: mpsc::Sender<TransportSignal>,
) {
    let mut failures: u32 = 0;
    loop {
        match tokio_tungstenite::connect_async(url.as_str()).await {
            Ok((socket, _response)) => {
                failures = 0;
                while commands.try_recv().is_ok() {}
                tracing::info!("Connected to push endpoint {url}");
                if signals.send(TransportSignal::Connected).await.is_err() {
                    return;
                }

                if let PumpExit::Shutdown = pump(socket, &mut commands, &signals).await {
                    tracing::info!("Push transport shutting down");
                    return;
                }
                tracing::warn!("Push connection to {url} closed");
                if signals.send(TransportSignal::Disconnected).await.is_err() {
                    return;
                }
            }
            Err(error) => tracing::warn!("Push connection to {url} failed: {error}"),
        }

        if signals.is_closed() {
            return;
        }
        failures = failures.saturating_add(1);
        tokio::time::sleep(reconnect.backoff(failures)).await;
    }
}

async fn pump<S>(
    socket: WebSocketStream<S>,
    commands: &mut mpsc::UnboundedReceiver<ClientFrame>,
    signals: &mpsc::Sender<TransportSignal>,
) -> PumpExit
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (mut sink, mut stream) = socket.split();
    loop {
        tokio::select! {
            command = commands.recv() => {
                let Some(frame) = command else {
                    let _ = sink.close().await;
                    return PumpExit::Shutdown;
                };
                let text = match serde_json::to_string(&frame) {
                    Ok(text) => text,
                    Err(error) => {
                        tracing::warn!("Failed to encode push frame: {error}");
                        continue;
                    }
                };
                if let Err(error) = sink.send(Message::Text(text)).await {
                    tracing::warn!("Failed to send push frame: {error}");
                    return PumpExit::Closed;
                }
            }
            message = stream.next() => match message {
                Some(Ok(Message::Text(text))) => match parse_server_frame(&text) {
                    Ok(ServerFrame::Event(event)) => {
                        if signals.send(TransportSignal::Event(event)).await.is_err() {
                            return PumpExit::Shutdown;
                        }
                    }
                    Ok(ServerFrame::Error { message }) => {
                        tracing::warn!("Push endpoint reported an error: {message}");
                    }
                    Err(error) => tracing::warn!("Ignoring malformed push frame: {error}"),
                },
                Some(Ok(Message::Close(_))) | None => return PumpExit::Closed,
                Some(Ok(_)) => {}
                Some(Err(error)) => {
                    tracing::warn!("Push connection error: {error}");
                    return PumpExit::Closed;
                }
            }
        }
    }
}
