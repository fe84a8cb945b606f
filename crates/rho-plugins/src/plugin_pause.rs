//! Paused-chat control commands.
//!
//! Pausing flips the flag the gate reads on every inbound message; resume is
//! reachable from a paused chat because the gate lets the resume directive
//! through.

use anyhow::Result;

use rho_engine::{command_handler, CommandDescriptor, CommandMatcher, CommandRegistry};

use crate::command_pattern;

pub(crate) fn install(registry: &CommandRegistry, prefix_pattern: &str) -> Result<()> {
    registry.register(CommandDescriptor {
        name: "pause".to_string(),
        matcher: CommandMatcher::Pattern(command_pattern(prefix_pattern, "pause")?),
        privileged_only: true,
        category: "chat".to_string(),
        description: Some("suppress command dispatch in this chat".to_string()),
        listed: true,
        handler: command_handler(|context| async move {
            context.store.pause_chat(&context.message.chat_id)?;
            context.reply_text("dispatch paused for this chat").await
        }),
    });
    registry.register(CommandDescriptor {
        name: "resume".to_string(),
        matcher: CommandMatcher::Pattern(command_pattern(prefix_pattern, "resume")?),
        privileged_only: true,
        category: "chat".to_string(),
        description: Some("resume command dispatch in this chat".to_string()),
        listed: true,
        handler: command_handler(|context| async move {
            context.store.resume_chat(&context.message.chat_id)?;
            context.reply_text("dispatch resumed for this chat").await
        }),
    });
    Ok(())
}
