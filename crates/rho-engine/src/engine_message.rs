//! Normalization of raw inbound events into canonical messages.

use serde_json::Value;
use thiserror::Error;

use rho_store::ChatStore;

use crate::engine_wire::{MessageKey, RawMessageEvent, RawMessagePayload};

/// Enumerates supported `MessageKind` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Text,
    Image,
    Sticker,
    Video,
    ProtocolControl,
}

impl MessageKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::Sticker => "sticker",
            Self::Video => "video",
            Self::ProtocolControl => "protocol_control",
        }
    }
}

/// Enumerates supported `NormalizeError` values.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum NormalizeError {
    #[error("inbound event {message_id} carries no recognizable payload")]
    MalformedEvent { message_id: String },
}

#[derive(Debug, Clone)]
/// Quoted-content metadata resolved during normalization.
pub struct QuotedContent {
    pub message_id: String,
    pub sender_id: Option<String>,
    /// Stored raw event for the quoted message, when persistence has it.
    pub stored: Option<Value>,
}

#[derive(Debug, Clone)]
/// Canonical, immutable representation of one inbound message.
///
/// `matched_prefix`/`matched_command` stay empty on the original; the
/// dispatcher fills them on per-invocation clones only.
pub struct NormalizedMessage {
    pub id: String,
    pub chat_id: String,
    pub sender_id: String,
    pub sender_name: Option<String>,
    pub kind: MessageKind,
    pub body: Option<String>,
    pub quoted: Option<QuotedContent>,
    /// True only when the event originates from the authenticated identity.
    pub privileged_sender: bool,
    /// Message id targeted by a protocol-control event (e.g. a deletion).
    pub protocol_target_id: Option<String>,
    pub matched_prefix: Option<String>,
    pub matched_command: Option<String>,
    pub raw: RawMessageEvent,
}

impl NormalizedMessage {
    pub fn key(&self) -> MessageKey {
        self.raw.key.clone()
    }

    pub fn is_status_broadcast(&self) -> bool {
        self.chat_id == crate::engine_wire::STATUS_BROADCAST_CHAT
    }
}

/// Builds the canonical message for one raw event. Deterministic and
/// side-effect-free apart from the quoted-content read against the store.
pub fn normalize(raw: &RawMessageEvent, store: &ChatStore) -> Result<NormalizedMessage, NormalizeError> {
    let (kind, body, protocol_target_id) = match &raw.payload {
        RawMessagePayload::Text { body } => (MessageKind::Text, Some(body.clone()), None),
        RawMessagePayload::Image { caption, .. } => (MessageKind::Image, caption.clone(), None),
        RawMessagePayload::Sticker { .. } => (MessageKind::Sticker, None, None),
        RawMessagePayload::Video { caption, .. } => (MessageKind::Video, caption.clone(), None),
        RawMessagePayload::ProtocolControl { target_id } => {
            (MessageKind::ProtocolControl, None, target_id.clone())
        }
        RawMessagePayload::Unrecognized => {
            return Err(NormalizeError::MalformedEvent {
                message_id: raw.key.id.clone(),
            });
        }
    };

    let quoted = raw.quoted.as_ref().map(|reference| QuotedContent {
        message_id: reference.message_id.clone(),
        sender_id: reference.sender_id.clone(),
        stored: store
            .load_message(&reference.message_id)
            .ok()
            .flatten(),
    });

    Ok(NormalizedMessage {
        id: raw.key.id.clone(),
        chat_id: raw.key.chat_id.clone(),
        sender_id: raw.sender_id.clone(),
        sender_name: raw.push_name.clone(),
        kind,
        body,
        quoted,
        privileged_sender: raw.key.from_self,
        protocol_target_id,
        matched_prefix: None,
        matched_command: None,
        raw: raw.clone(),
    })
}
