//! Welcome and farewell responses for group participant updates.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::engine_wire::{OutboundPayload, WireClient};

/// Enumerates supported `ParticipantAction` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantAction {
    Add,
    Remove,
    Promote,
    Demote,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
/// One participant-update event from the transport.
pub struct ParticipantUpdate {
    pub chat_id: String,
    pub participants: Vec<String>,
    pub action: ParticipantAction,
}

fn display_handle(participant: &str) -> &str {
    participant
        .split_once('@')
        .map(|(user, _)| user)
        .unwrap_or(participant)
}

/// Renders the greeting text for an update, or `None` when the action takes
/// no greeting (promote/demote) or no participants are named.
pub fn render_greeting(update: &ParticipantUpdate, chat_title: &str) -> Option<String> {
    if update.participants.is_empty() {
        return None;
    }
    let handles = update
        .participants
        .iter()
        .map(|participant| format!("@{}", display_handle(participant)))
        .collect::<Vec<_>>()
        .join(", ");
    match update.action {
        ParticipantAction::Add => Some(format!("Welcome {handles} to {chat_title}.")),
        ParticipantAction::Remove => Some(format!("{handles} left {chat_title}.")),
        ParticipantAction::Promote | ParticipantAction::Demote => None,
    }
}

#[derive(Debug, Clone)]
/// Sends greeting texts for participant updates when enabled.
pub struct GreetingResponder {
    enabled: bool,
}

impl GreetingResponder {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    /// Best-effort: metadata lookup and delivery failures are logged only.
    pub async fn handle(&self, client: &Arc<dyn WireClient>, update: &ParticipantUpdate) {
        if !self.enabled {
            return;
        }
        let chat_title = match client.group_metadata(&update.chat_id).await {
            Ok(metadata) => metadata.subject,
            Err(_) => update.chat_id.clone(),
        };
        let Some(body) = render_greeting(update, &chat_title) else {
            return;
        };
        if let Err(error) = client
            .send_message(&update.chat_id, OutboundPayload::text(body))
            .await
        {
            eprintln!(
                "greeting delivery failed: chat={} error={error:#}",
                update.chat_id
            );
        }
    }
}
