//! Paused-chat gate evaluated before logging and dispatch.

use anyhow::{Context, Result};
use regex::Regex;

use rho_store::ChatStore;

use crate::engine_message::NormalizedMessage;

#[derive(Debug, Clone)]
/// Suppresses dispatch for paused chats unless the inbound body is the
/// explicit resume directive.
pub struct PausedChatGate {
    resume_directive: Regex,
}

impl PausedChatGate {
    pub fn new(resume_directive: Regex) -> Self {
        Self { resume_directive }
    }

    /// Builds the resume directive from the configured handler-prefix
    /// character class, e.g. `[!/.]` accepts `!resume`.
    pub fn from_prefix_pattern(prefix_pattern: &str) -> Result<Self> {
        let resume_directive = Regex::new(&format!("(?i)^{prefix_pattern}\\s?resume\\b"))
            .with_context(|| format!("invalid handler prefix pattern '{prefix_pattern}'"))?;
        Ok(Self::new(resume_directive))
    }

    /// Fresh read of the paused-chat set per message; the set can change
    /// between messages, so nothing is cached here.
    pub fn allow(&self, store: &ChatStore, message: &NormalizedMessage) -> Result<bool> {
        let paused = store.paused_chats()?;
        if !paused
            .iter()
            .any(|entry| entry.chat_id == message.chat_id)
        {
            return Ok(true);
        }
        Ok(message
            .body
            .as_deref()
            .is_some_and(|body| self.resume_directive.is_match(body)))
    }
}
