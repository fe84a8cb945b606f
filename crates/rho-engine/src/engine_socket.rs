//! Websocket transport speaking JSON envelope frames.
//!
//! Concrete [`WireConnector`] used by the binary. Credentials travel in the
//! auth frame; inbound `event` frames decode to [`WireEvent`]s on the single
//! ordered stream. Malformed frames are logged and skipped, never fatal to
//! the session.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};

use rho_session::SessionCredentials;

use crate::engine_wire::{
    GroupMetadata, MessageKey, OutboundPayload, WireClient, WireConnector, WireEvent, WireSession,
};

const DEFAULT_EVENT_BUFFER: usize = 64;
const DEFAULT_CALL_TIMEOUT_MS: u64 = 10_000;

#[derive(Debug, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub(crate) enum ClientFrame {
    Auth {
        credentials: SessionCredentials,
    },
    Send {
        target: String,
        payload: OutboundPayload,
    },
    Read {
        keys: Vec<MessageKey>,
    },
    Call {
        call_id: u64,
        method: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        chat_id: Option<String>,
    },
}

#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub(crate) enum ServerFrame {
    Hello {
        #[serde(default)]
        identity: Option<String>,
    },
    Event {
        event: WireEvent,
    },
    CallResult {
        call_id: u64,
        #[serde(default)]
        ok: bool,
        #[serde(default)]
        result: Option<Value>,
        #[serde(default)]
        error: Option<String>,
    },
}

pub(crate) fn decode_server_frame(raw: &str) -> Result<ServerFrame> {
    serde_json::from_str::<ServerFrame>(raw).context("failed to parse wire socket frame")
}

#[derive(Debug, Clone)]
/// Configuration for [`SocketWireConnector`].
pub struct SocketConnectorConfig {
    pub endpoint: String,
    pub event_buffer: usize,
    pub call_timeout: Duration,
}

impl SocketConnectorConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            event_buffer: DEFAULT_EVENT_BUFFER,
            call_timeout: Duration::from_millis(DEFAULT_CALL_TIMEOUT_MS),
        }
    }
}

/// Connects to a wire gateway endpoint over websocket.
pub struct SocketWireConnector {
    config: SocketConnectorConfig,
}

impl SocketWireConnector {
    pub fn new(config: SocketConnectorConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl WireConnector for SocketWireConnector {
    async fn connect(&self, credentials: SessionCredentials) -> Result<WireSession> {
        let (stream, _response) = connect_async(self.config.endpoint.as_str())
            .await
            .with_context(|| format!("failed to connect {}", self.config.endpoint))?;

        let auth_frame = serde_json::to_string(&ClientFrame::Auth { credentials })
            .context("failed to encode auth frame")?;
        let (commands_tx, commands_rx) = mpsc::channel::<SocketCommand>(DEFAULT_EVENT_BUFFER);
        let (events_tx, events_rx) = mpsc::channel::<WireEvent>(self.config.event_buffer);
        let identity = Arc::new(RwLock::new(None));
        let pending_calls = Arc::new(Mutex::new(HashMap::new()));

        tokio::spawn(run_socket_session(SocketSessionParams {
            stream,
            auth_frame,
            commands_rx,
            events_tx,
            identity: Arc::clone(&identity),
            pending_calls: Arc::clone(&pending_calls),
        }));

        let client = SocketWireClient {
            commands: commands_tx,
            identity,
            pending_calls,
            next_call_id: AtomicU64::new(1),
            call_timeout: self.config.call_timeout,
        };
        Ok(WireSession {
            client: Arc::new(client),
            events: events_rx,
        })
    }
}

enum SocketCommand {
    Frame(String),
    Shutdown,
}

type PendingCalls = Arc<Mutex<HashMap<u64, oneshot::Sender<Result<Value, String>>>>>;

struct SocketWireClient {
    commands: mpsc::Sender<SocketCommand>,
    identity: Arc<RwLock<Option<String>>>,
    pending_calls: PendingCalls,
    next_call_id: AtomicU64,
    call_timeout: Duration,
}

impl SocketWireClient {
    async fn send_frame(&self, frame: &ClientFrame) -> Result<()> {
        let text = serde_json::to_string(frame).context("failed to encode wire frame")?;
        self.commands
            .send(SocketCommand::Frame(text))
            .await
            .map_err(|_| anyhow!("wire connection is closed"))
    }
}

#[async_trait]
impl WireClient for SocketWireClient {
    fn own_identity(&self) -> Option<String> {
        self.identity.read().ok().and_then(|slot| slot.clone())
    }

    async fn send_message(&self, target: &str, payload: OutboundPayload) -> Result<()> {
        self.send_frame(&ClientFrame::Send {
            target: target.to_string(),
            payload,
        })
        .await
    }

    async fn read_messages(&self, keys: &[MessageKey]) -> Result<()> {
        self.send_frame(&ClientFrame::Read {
            keys: keys.to_vec(),
        })
        .await
    }

    async fn group_metadata(&self, chat_id: &str) -> Result<GroupMetadata> {
        let call_id = self.next_call_id.fetch_add(1, Ordering::SeqCst);
        let (result_tx, result_rx) = oneshot::channel();
        {
            let mut pending = self
                .pending_calls
                .lock()
                .map_err(|_| anyhow!("pending call table is poisoned"))?;
            pending.insert(call_id, result_tx);
        }

        let send_result = self
            .send_frame(&ClientFrame::Call {
                call_id,
                method: "group_metadata".to_string(),
                chat_id: Some(chat_id.to_string()),
            })
            .await;
        if let Err(error) = send_result {
            if let Ok(mut pending) = self.pending_calls.lock() {
                pending.remove(&call_id);
            }
            return Err(error);
        }

        let received = match tokio::time::timeout(self.call_timeout, result_rx).await {
            Ok(received) => received,
            Err(_) => {
                if let Ok(mut pending) = self.pending_calls.lock() {
                    pending.remove(&call_id);
                }
                bail!("group metadata call timed out for {chat_id}");
            }
        };
        let value = received
            .map_err(|_| anyhow!("wire connection closed mid-call"))?
            .map_err(|error| anyhow!("group metadata call failed: {error}"))?;
        serde_json::from_value(value).context("failed to decode group metadata")
    }

    async fn close(&self) -> Result<()> {
        self.commands
            .send(SocketCommand::Shutdown)
            .await
            .map_err(|_| anyhow!("wire connection is already closed"))
    }
}

struct SocketSessionParams {
    stream: tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >,
    auth_frame: String,
    commands_rx: mpsc::Receiver<SocketCommand>,
    events_tx: mpsc::Sender<WireEvent>,
    identity: Arc<RwLock<Option<String>>>,
    pending_calls: PendingCalls,
}

async fn run_socket_session(params: SocketSessionParams) {
    let SocketSessionParams {
        stream,
        auth_frame,
        mut commands_rx,
        events_tx,
        identity,
        pending_calls,
    } = params;
    let (mut sink, mut source) = stream.split();

    if sink.send(WsMessage::Text(auth_frame.into())).await.is_err() {
        eprintln!("wire socket auth send failed");
        fail_pending_calls(&pending_calls);
        return;
    }

    loop {
        tokio::select! {
            maybe_command = commands_rx.recv() => {
                match maybe_command {
                    Some(SocketCommand::Frame(text)) => {
                        if sink.send(WsMessage::Text(text.into())).await.is_err() {
                            break;
                        }
                    }
                    Some(SocketCommand::Shutdown) | None => {
                        let _ = sink.send(WsMessage::Close(None)).await;
                        break;
                    }
                }
            }
            maybe_message = source.next() => {
                let Some(message_result) = maybe_message else {
                    break;
                };
                let message = match message_result {
                    Ok(message) => message,
                    Err(error) => {
                        eprintln!("wire socket read failed: error={error}");
                        break;
                    }
                };
                let raw = match message {
                    WsMessage::Text(text) => text.to_string(),
                    WsMessage::Binary(bytes) => match String::from_utf8(bytes.to_vec()) {
                        Ok(text) => text,
                        Err(_) => {
                            eprintln!("wire socket frame skipped: invalid utf-8 payload");
                            continue;
                        }
                    },
                    WsMessage::Close(_) => break,
                    WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Frame(_) => continue,
                };
                let frame = match decode_server_frame(&raw) {
                    Ok(frame) => frame,
                    Err(error) => {
                        eprintln!("wire socket frame skipped: error={error:#}");
                        continue;
                    }
                };
                match frame {
                    ServerFrame::Hello { identity: reported } => {
                        if let Ok(mut slot) = identity.write() {
                            *slot = reported;
                        }
                    }
                    ServerFrame::Event { event } => {
                        if events_tx.send(event).await.is_err() {
                            break;
                        }
                    }
                    ServerFrame::CallResult { call_id, ok, result, error } => {
                        let waiter = pending_calls
                            .lock()
                            .ok()
                            .and_then(|mut pending| pending.remove(&call_id));
                        if let Some(waiter) = waiter {
                            let outcome = if ok {
                                Ok(result.unwrap_or(Value::Null))
                            } else {
                                Err(error.unwrap_or_else(|| "unspecified gateway error".to_string()))
                            };
                            let _ = waiter.send(outcome);
                        }
                    }
                }
            }
        }
    }

    fail_pending_calls(&pending_calls);
    // Dropping events_tx ends the supervisor's stream; it classifies the
    // drop as a lost connection.
}

fn fail_pending_calls(pending_calls: &PendingCalls) {
    if let Ok(mut pending) = pending_calls.lock() {
        for (_, waiter) in pending.drain() {
            let _ = waiter.send(Err("wire connection closed".to_string()));
        }
    }
}
