//! Command registry and fan-out dispatch with per-handler isolation.

use std::sync::{Arc, RwLock};

use anyhow::Result;
use futures_util::future::BoxFuture;
use regex::Regex;

use rho_store::ChatStore;

use crate::engine_message::{MessageKind, NormalizedMessage};
use crate::engine_report::ErrorReporter;
use crate::engine_wire::{OutboundPayload, WireClient};

/// Enumerates supported `WorkMode` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkMode {
    /// Anyone may trigger non-privileged commands.
    Public,
    /// Only the authenticated identity triggers anything.
    Private,
}

impl WorkMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Private => "private",
        }
    }
}

/// Match condition of one registered command.
#[derive(Debug, Clone)]
pub enum CommandMatcher {
    /// Text pattern with capture groups `(prefix)(name)(args?)`.
    Pattern(Regex),
    /// Structural match on message kind.
    Kind(MessageKind),
    /// Matches every message that reaches the dispatcher.
    CatchAll,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Structured result of a text-pattern match.
pub struct PatternMatch {
    pub prefix: String,
    pub name: String,
    pub args: Option<String>,
}

/// Applies a command pattern to a message body. The capture-group layout is
/// the whole matcher contract; the regex engine behind it is swappable.
pub fn match_text_pattern(pattern: &Regex, body: &str) -> Option<PatternMatch> {
    let captures = pattern.captures(body)?;
    let group = |index: usize| {
        captures
            .get(index)
            .map(|capture| capture.as_str().to_string())
    };
    Some(PatternMatch {
        prefix: group(1).unwrap_or_default(),
        name: group(2).unwrap_or_default(),
        args: group(3).filter(|args| !args.is_empty()),
    })
}

/// Per-invocation context handed to a command handler.
#[derive(Clone)]
pub struct CommandContext {
    pub client: Arc<dyn WireClient>,
    pub message: NormalizedMessage,
    pub args: Option<String>,
    pub store: ChatStore,
    pub registry: CommandRegistry,
    pub work_mode: WorkMode,
}

impl CommandContext {
    /// Sends plain text back to the chat the message arrived in.
    pub async fn reply_text(&self, body: impl Into<String>) -> Result<()> {
        self.client
            .send_message(&self.message.chat_id, OutboundPayload::text(body))
            .await
    }
}

pub type CommandHandler =
    Arc<dyn Fn(CommandContext) -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// Wraps an async closure into the boxed handler shape the registry stores.
pub fn command_handler<F, Fut>(handler: F) -> CommandHandler
where
    F: Fn(CommandContext) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = Result<()>> + Send + 'static,
{
    Arc::new(move |context| Box::pin(handler(context)))
}

/// Immutable registration record pairing a match condition with a handler.
#[derive(Clone)]
pub struct CommandDescriptor {
    /// Stable name used for listing and diagnostics.
    pub name: String,
    pub matcher: CommandMatcher,
    /// Restricts the command to the authenticated identity.
    pub privileged_only: bool,
    pub category: String,
    pub description: Option<String>,
    /// Hidden from the command listing when false.
    pub listed: bool,
    pub handler: CommandHandler,
}

/// Append-only ordered command registry; insertion order is preserved for
/// deterministic listing and dispatch.
#[derive(Clone, Default)]
pub struct CommandRegistry {
    commands: Arc<RwLock<Vec<Arc<CommandDescriptor>>>>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, descriptor: CommandDescriptor) {
        if let Ok(mut commands) = self.commands.write() {
            commands.push(Arc::new(descriptor));
        }
    }

    pub fn snapshot(&self) -> Vec<Arc<CommandDescriptor>> {
        self.commands
            .read()
            .map(|commands| commands.clone())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.commands.read().map(|commands| commands.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

enum Invocation {
    Pattern(PatternMatch),
    Structural,
}

/// Matches a message against the registry and launches one task per match.
#[derive(Clone)]
pub struct CommandDispatcher {
    registry: CommandRegistry,
    work_mode: WorkMode,
    reporter: ErrorReporter,
}

impl CommandDispatcher {
    pub fn new(registry: CommandRegistry, work_mode: WorkMode, reporter: ErrorReporter) -> Self {
        Self {
            registry,
            work_mode,
            reporter,
        }
    }

    pub fn registry(&self) -> &CommandRegistry {
        &self.registry
    }

    pub fn work_mode(&self) -> WorkMode {
        self.work_mode
    }

    /// Evaluates every descriptor in insertion order and spawns handlers for
    /// the matches without awaiting them. Returns the number of invocations
    /// issued. A failing handler never affects later descriptors: each runs
    /// in its own task and its error stops with the reporter.
    pub fn dispatch(
        &self,
        client: &Arc<dyn WireClient>,
        store: &ChatStore,
        message: &NormalizedMessage,
    ) -> usize {
        let mut issued = 0usize;
        for descriptor in self.registry.snapshot() {
            if !message.privileged_sender
                && (descriptor.privileged_only || self.work_mode == WorkMode::Private)
            {
                continue;
            }

            let invocation = match &descriptor.matcher {
                CommandMatcher::Pattern(pattern) => message
                    .body
                    .as_deref()
                    .and_then(|body| match_text_pattern(pattern, body))
                    .map(Invocation::Pattern),
                CommandMatcher::Kind(kind) => {
                    let matches = message.kind == *kind
                        && (*kind != MessageKind::Text || message.body.is_some());
                    matches.then_some(Invocation::Structural)
                }
                CommandMatcher::CatchAll => Some(Invocation::Structural),
            };
            let Some(invocation) = invocation else {
                continue;
            };

            let mut invoked_message = message.clone();
            let args = match invocation {
                Invocation::Pattern(matched) => {
                    invoked_message.matched_prefix = Some(matched.prefix.clone());
                    invoked_message.matched_command =
                        Some(format!("{}{}", matched.prefix, matched.name));
                    matched.args
                }
                Invocation::Structural => message.body.clone(),
            };

            let context = CommandContext {
                client: Arc::clone(client),
                message: invoked_message,
                args,
                store: store.clone(),
                registry: self.registry.clone(),
                work_mode: self.work_mode,
            };
            let handler = Arc::clone(&descriptor.handler);
            let reporter = self.reporter.clone();
            let command_name = descriptor.name.clone();
            let chat_id = message.chat_id.clone();
            tokio::spawn(async move {
                if let Err(error) = handler(context).await {
                    eprintln!(
                        "command handler failed: command={command_name} chat={chat_id} error={error:#}"
                    );
                    reporter
                        .report(&format!("{error:#}"), &format!("command:{command_name}"))
                        .await;
                }
            });
            issued = issued.saturating_add(1);
        }
        issued
    }
}
