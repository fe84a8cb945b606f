//! Built-in command handlers registered at startup.
//!
//! Each plugin module contributes descriptors to the shared registry; the
//! dispatcher evaluates them in registration order.

use anyhow::{Context, Result};
use regex::Regex;

use rho_engine::CommandRegistry;

mod plugin_info;
mod plugin_menu;
mod plugin_pause;

pub use plugin_menu::render_command_menu;

/// Builds a command pattern with the capture groups the dispatcher expects:
/// `(prefix)(name)(args?)`. `prefix_pattern` is the configured character
/// class of accepted prefixes, e.g. `[!/.]`.
pub fn command_pattern(prefix_pattern: &str, name: &str) -> Result<Regex> {
    Regex::new(&format!(r"(?i)^({prefix_pattern})({name})(?:\s+(\S.*))?\s*$"))
        .with_context(|| format!("invalid command pattern for '{name}'"))
}

/// Installs the built-in command set in a fixed order.
pub fn install_builtin_commands(registry: &CommandRegistry, prefix_pattern: &str) -> Result<()> {
    plugin_info::install(registry, prefix_pattern)?;
    plugin_menu::install(registry, prefix_pattern)?;
    plugin_pause::install(registry, prefix_pattern)?;
    Ok(())
}

#[cfg(test)]
mod tests;
