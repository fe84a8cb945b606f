//! Command listing.

use anyhow::Result;

use rho_engine::{command_handler, CommandDescriptor, CommandMatcher, CommandRegistry, WorkMode};

use crate::command_pattern;

/// Renders the command listing: categories in first-seen order, commands in
/// registration order, hidden descriptors skipped.
pub fn render_command_menu(registry: &CommandRegistry, work_mode: WorkMode) -> String {
    let mut sections: Vec<(String, Vec<String>)> = Vec::new();
    for descriptor in registry.snapshot() {
        if !descriptor.listed {
            continue;
        }
        let entry = match descriptor.description.as_deref() {
            Some(description) => format!("- {}: {description}", descriptor.name),
            None => format!("- {}", descriptor.name),
        };
        match sections
            .iter_mut()
            .find(|(category, _)| *category == descriptor.category)
        {
            Some((_, entries)) => entries.push(entry),
            None => sections.push((descriptor.category.clone(), vec![entry])),
        }
    }

    let mut lines = vec![format!(
        "rho v{} (mode: {})",
        env!("CARGO_PKG_VERSION"),
        work_mode.as_str()
    )];
    for (category, entries) in sections {
        lines.push(format!("[{category}]"));
        lines.extend(entries);
    }
    lines.join("\n")
}

pub(crate) fn install(registry: &CommandRegistry, prefix_pattern: &str) -> Result<()> {
    registry.register(CommandDescriptor {
        name: "menu".to_string(),
        matcher: CommandMatcher::Pattern(command_pattern(prefix_pattern, "menu|help")?),
        privileged_only: false,
        category: "user".to_string(),
        description: Some("list available commands".to_string()),
        listed: true,
        handler: command_handler(|context| async move {
            let body = render_command_menu(&context.registry, context.work_mode);
            context.reply_text(body).await
        }),
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use rho_engine::{command_handler, CommandDescriptor, CommandMatcher, CommandRegistry, WorkMode};

    use super::render_command_menu;

    fn plain_descriptor(name: &str, category: &str, listed: bool) -> CommandDescriptor {
        CommandDescriptor {
            name: name.to_string(),
            matcher: CommandMatcher::CatchAll,
            privileged_only: false,
            category: category.to_string(),
            description: Some(format!("{name} description")),
            listed,
            handler: command_handler(|_context| async move { Ok(()) }),
        }
    }

    #[test]
    fn menu_groups_by_category_and_skips_hidden_commands() {
        let registry = CommandRegistry::new();
        registry.register(plain_descriptor("ping", "user", true));
        registry.register(plain_descriptor("watcher", "system", false));
        registry.register(plain_descriptor("pause", "chat", true));
        registry.register(plain_descriptor("menu", "user", true));

        let rendered = render_command_menu(&registry, WorkMode::Public);
        let lines: Vec<&str> = rendered.lines().collect();
        assert!(lines[0].contains("mode: public"));
        assert_eq!(
            &lines[1..],
            &[
                "[user]",
                "- ping: ping description",
                "- menu: menu description",
                "[chat]",
                "- pause: pause description",
            ]
        );
        assert!(!rendered.contains("watcher"));
    }
}
