//! Wire contract between the engine and the transport client.
//!
//! The transport is a black box behind [`WireConnector`]/[`WireClient`]; the
//! engine only sees the event kinds and disconnect-cause codes defined here.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use rho_session::SessionCredentials;
use rho_store::StoredChat;

use crate::engine_greetings::ParticipantUpdate;

/// Chat id the transport uses for status-broadcast traffic.
pub const STATUS_BROADCAST_CHAT: &str = "status@broadcast";

/// Group chats carry a dedicated server suffix on the wire.
pub fn is_group_chat(chat_id: &str) -> bool {
    chat_id.ends_with("@g.us")
}

/// Coded reason accompanying a closed-connection event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DisconnectCause(pub u16);

impl DisconnectCause {
    pub const LOGGED_OUT: Self = Self(401);
    pub const TIMED_OUT: Self = Self(408);
    pub const CONNECTION_CLOSED: Self = Self(428);
    pub const CONNECTION_REPLACED: Self = Self(440);
    pub const BAD_SESSION: Self = Self(500);
    pub const RESTART_REQUIRED: Self = Self(515);

    pub fn code(self) -> u16 {
        self.0
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::LOGGED_OUT => "logged_out",
            Self::TIMED_OUT => "timed_out",
            Self::CONNECTION_CLOSED => "connection_closed",
            Self::CONNECTION_REPLACED => "connection_replaced",
            Self::BAD_SESSION => "bad_session",
            Self::RESTART_REQUIRED => "restart_required",
            _ => "unknown",
        }
    }

    /// Fixed classification of cause codes. Unknown codes classify transient
    /// so an unrecognized drop retries with full backoff instead of burning
    /// the persisted session.
    pub fn classify(self) -> DisconnectClass {
        match self {
            Self::LOGGED_OUT | Self::BAD_SESSION => DisconnectClass::Terminal,
            _ => DisconnectClass::Transient,
        }
    }
}

/// Enumerates supported `DisconnectClass` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectClass {
    /// Retry with backoff, capped attempts.
    Transient,
    /// The persisted session is invalid; clear it and pair fresh.
    Terminal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
/// Connection-level signal emitted by the transport.
pub enum ConnectionUpdate {
    Connecting,
    Open,
    Close { cause: DisconnectCause },
    /// Pairing prompt shown to the operator during a fresh login flow.
    PairingPrompt { code: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Addressing key of one message on the wire.
pub struct MessageKey {
    pub id: String,
    pub chat_id: String,
    #[serde(default)]
    pub from_self: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Reference to quoted content carried by an inbound message.
pub struct QuotedRef {
    pub message_id: String,
    #[serde(default)]
    pub sender_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
/// Payload variants an inbound message can carry; exactly one per message.
pub enum RawMessagePayload {
    Text {
        body: String,
    },
    Image {
        #[serde(default)]
        caption: Option<String>,
        #[serde(default)]
        media_ref: Option<String>,
    },
    Sticker {
        #[serde(default)]
        media_ref: Option<String>,
    },
    Video {
        #[serde(default)]
        caption: Option<String>,
        #[serde(default)]
        media_ref: Option<String>,
    },
    ProtocolControl {
        #[serde(default)]
        target_id: Option<String>,
    },
    #[serde(other)]
    Unrecognized,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// One inbound message event as delivered by the transport.
pub struct RawMessageEvent {
    pub key: MessageKey,
    pub sender_id: String,
    #[serde(default)]
    pub push_name: Option<String>,
    #[serde(default)]
    pub timestamp_ms: u64,
    pub payload: RawMessagePayload,
    #[serde(default)]
    pub quoted: Option<QuotedRef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
/// Inbound event kinds delivered on the single ordered event stream.
pub enum WireEvent {
    ConnectionUpdate(ConnectionUpdate),
    CredentialUpdate { credentials: SessionCredentials },
    ParticipantUpdate(ParticipantUpdate),
    ChatUpdate { chats: Vec<StoredChat> },
    MessageUpsert { messages: Vec<RawMessageEvent> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
/// Outbound message payloads understood by the transport.
pub enum OutboundPayload {
    Text { body: String },
    Sticker { media_ref: String },
}

impl OutboundPayload {
    pub fn text(body: impl Into<String>) -> Self {
        Self::Text { body: body.into() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
/// Metadata of a group chat as reported by the transport.
pub struct GroupMetadata {
    pub id: String,
    pub subject: String,
}

#[async_trait]
/// Live handle to an established transport connection.
pub trait WireClient: Send + Sync {
    /// Own identity on the wire, known once authenticated.
    fn own_identity(&self) -> Option<String>;

    async fn send_message(&self, target: &str, payload: OutboundPayload) -> Result<()>;

    async fn read_messages(&self, keys: &[MessageKey]) -> Result<()>;

    async fn group_metadata(&self, chat_id: &str) -> Result<GroupMetadata>;

    /// Closes the connection; the event stream ends after this.
    async fn close(&self) -> Result<()>;
}

/// An established connection: the client handle plus its ordered event
/// stream. Dropping the receiver tears the stream down.
pub struct WireSession {
    pub client: Arc<dyn WireClient>,
    pub events: mpsc::Receiver<WireEvent>,
}

#[async_trait]
/// Factory for transport connections, consumed by the supervisor.
pub trait WireConnector: Send + Sync {
    async fn connect(&self, credentials: SessionCredentials) -> Result<WireSession>;
}
