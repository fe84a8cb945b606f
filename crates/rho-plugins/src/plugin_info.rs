//! Liveness commands.

use std::time::Instant;

use anyhow::Result;

use rho_engine::{command_handler, CommandDescriptor, CommandMatcher, CommandRegistry};

use crate::command_pattern;

pub(crate) fn install(registry: &CommandRegistry, prefix_pattern: &str) -> Result<()> {
    registry.register(CommandDescriptor {
        name: "ping".to_string(),
        matcher: CommandMatcher::Pattern(command_pattern(prefix_pattern, "ping")?),
        privileged_only: false,
        category: "user".to_string(),
        description: Some("check whether the bot is awake".to_string()),
        listed: true,
        handler: command_handler(|context| async move {
            let started = Instant::now();
            context.reply_text("is this thing on?").await?;
            let elapsed_ms = started.elapsed().as_millis();
            context
                .reply_text(format!("pong, {elapsed_ms} ms round trip"))
                .await
        }),
    });
    Ok(())
}
