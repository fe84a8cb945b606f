//! Connection supervision: open, monitor, reconnect, tear down.
//!
//! One supervisor instance owns the connection state machine. All mutation
//! goes through `connect`, the event loop, and `shutdown`; there are no
//! ambient globals and never more than one in-flight connection attempt.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::Mutex;

use rho_session::{SessionCredentials, SessionStore, SessionStoreError};
use rho_store::ChatStore;

use crate::engine_dispatch::{CommandDispatcher, CommandRegistry, WorkMode};
use crate::engine_gate::PausedChatGate;
use crate::engine_greetings::GreetingResponder;
use crate::engine_message::{normalize, NormalizedMessage};
use crate::engine_report::ErrorReporter;
use crate::engine_wire::{
    is_group_chat, ConnectionUpdate, DisconnectCause, DisconnectClass, OutboundPayload,
    RawMessageEvent, WireClient, WireConnector, WireEvent, WireSession, STATUS_BROADCAST_CHAT,
};

/// Enumerates supported `ConnectionState` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Open,
    Closed,
}

impl ConnectionState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Closed => "closed",
        }
    }
}

/// Backoff for reconnect attempt `n` (0-based); the last slot repeats.
pub fn backoff_delay(schedule: &[Duration], attempt: usize) -> Duration {
    if schedule.is_empty() {
        return Duration::ZERO;
    }
    schedule[attempt.min(schedule.len() - 1)]
}

#[derive(Clone)]
/// Runtime configuration and collaborators for the supervisor.
pub struct SupervisorRuntimeConfig {
    pub connector: Arc<dyn WireConnector>,
    pub session: SessionStore,
    pub store: ChatStore,
    pub registry: CommandRegistry,
    pub gate: PausedChatGate,
    pub reporter: ErrorReporter,
    pub greetings: GreetingResponder,
    pub work_mode: WorkMode,
    pub auto_read: bool,
    pub auto_status_read: bool,
    pub log_messages: bool,
    pub backoff_schedule: Vec<Duration>,
    pub max_reconnect_attempts: usize,
    pub session_clear_cooldown: Duration,
    pub startup_retry_delay: Duration,
}

impl SupervisorRuntimeConfig {
    pub fn default_backoff_schedule() -> Vec<Duration> {
        [3_000, 5_000, 10_000, 20_000, 30_000]
            .into_iter()
            .map(Duration::from_millis)
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Snapshot of the supervisor state for diagnostics and tests.
pub struct SupervisorStatus {
    pub connection: ConnectionState,
    pub retry_counter: usize,
    pub has_client: bool,
}

struct SupervisorState {
    connection: ConnectionState,
    retry_counter: usize,
    client: Option<Arc<dyn WireClient>>,
}

enum CloseAction {
    Backoff { attempt: usize, delay: Duration },
    ClearSession,
}

struct SupervisorInner {
    config: SupervisorRuntimeConfig,
    dispatcher: CommandDispatcher,
    state: Mutex<SupervisorState>,
    shutting_down: AtomicBool,
}

/// Owns the session state machine and the inbound event pipeline. Cloning
/// yields another handle to the same supervisor.
#[derive(Clone)]
pub struct ConnectionSupervisor {
    inner: Arc<SupervisorInner>,
}

impl ConnectionSupervisor {
    pub fn new(config: SupervisorRuntimeConfig) -> Self {
        let dispatcher = CommandDispatcher::new(
            config.registry.clone(),
            config.work_mode,
            config.reporter.clone(),
        );
        Self {
            inner: Arc::new(SupervisorInner {
                config,
                dispatcher,
                state: Mutex::new(SupervisorState {
                    connection: ConnectionState::Idle,
                    retry_counter: 0,
                    client: None,
                }),
                shutting_down: AtomicBool::new(false),
            }),
        }
    }

    pub async fn status(&self) -> SupervisorStatus {
        let state = self.inner.state.lock().await;
        SupervisorStatus {
            connection: state.connection,
            retry_counter: state.retry_counter,
            has_client: state.client.is_some(),
        }
    }

    /// Idempotent connect. A call while an attempt is already in flight (or
    /// the connection is open) is a no-op returning the current client
    /// handle, so duplicate calls never construct a second transport client.
    pub fn connect(
        &self,
    ) -> std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Option<Arc<dyn WireClient>>>> + Send + '_>,
    > {
        Box::pin(async move {
        {
            let mut state = self.inner.state.lock().await;
            match state.connection {
                ConnectionState::Connecting | ConnectionState::Open => {
                    return Ok(state.client.clone());
                }
                ConnectionState::Idle | ConnectionState::Closed => {
                    state.connection = ConnectionState::Connecting;
                }
            }
        }

        match self.establish().await {
            Ok(client) => Ok(Some(client)),
            Err(error) => {
                {
                    let mut state = self.inner.state.lock().await;
                    state.connection = ConnectionState::Idle;
                    state.client = None;
                }
                eprintln!("connection attempt failed: error={error:#}");
                if !self.inner.shutting_down.load(Ordering::SeqCst) {
                    let supervisor = self.clone();
                    let delay = self.inner.config.startup_retry_delay;
                    tokio::spawn(async move {
                        tokio::time::sleep(delay).await;
                        if let Err(retry_error) = supervisor.connect().await {
                            eprintln!("connection retry failed: error={retry_error:#}");
                        }
                    });
                }
                Err(error)
            }
        }
        })
    }

    async fn establish(&self) -> Result<Arc<dyn WireClient>> {
        let credentials = self.load_or_init_credentials()?;
        let session = self
            .inner
            .config
            .connector
            .connect(credentials)
            .await
            .context("transport connect failed")?;
        let client = Arc::clone(&session.client);
        {
            let mut state = self.inner.state.lock().await;
            state.client = Some(Arc::clone(&client));
        }
        self.inner.config.reporter.bind_client(Arc::clone(&client));

        let supervisor = self.clone();
        tokio::spawn(async move {
            supervisor.run_event_loop(session).await;
        });
        Ok(client)
    }

    fn load_or_init_credentials(&self) -> Result<SessionCredentials> {
        match self.inner.config.session.load() {
            Ok(credentials) => Ok(credentials),
            Err(SessionStoreError::NotFound { .. }) => {
                println!("no persisted session; starting fresh pairing");
                let credentials = SessionCredentials::generate();
                self.inner.config.session.save(&credentials)?;
                Ok(credentials)
            }
            Err(SessionStoreError::Corrupt { path, reason }) => {
                eprintln!("persisted session unusable: path={path} reason={reason}");
                self.inner.config.session.clear()?;
                let credentials = SessionCredentials::generate();
                self.inner.config.session.save(&credentials)?;
                Ok(credentials)
            }
            Err(error) => Err(error.into()),
        }
    }

    async fn run_event_loop(self, session: WireSession) {
        let WireSession { client, mut events } = session;
        let mut close_handled = false;

        while let Some(event) = events.recv().await {
            match event {
                WireEvent::ConnectionUpdate(update) => {
                    if self.handle_connection_update(&client, update).await {
                        close_handled = true;
                        break;
                    }
                }
                WireEvent::CredentialUpdate { credentials } => {
                    self.handle_credential_update(&client, credentials).await;
                }
                WireEvent::MessageUpsert { messages } => {
                    for raw in messages {
                        self.handle_message(&client, raw).await;
                    }
                }
                WireEvent::ChatUpdate { chats } => {
                    for chat in chats {
                        if let Err(error) = self.inner.config.store.save_chat(&chat) {
                            eprintln!("chat persist failed: chat={} error={error:#}", chat.id);
                        }
                    }
                }
                WireEvent::ParticipantUpdate(update) => {
                    self.inner.config.greetings.handle(&client, &update).await;
                }
            }
        }

        // Stream ended without a close signal: treat the drop as a lost
        // connection unless a shutdown is in progress.
        if !close_handled && !self.inner.shutting_down.load(Ordering::SeqCst) {
            self.handle_close(DisconnectCause::CONNECTION_CLOSED).await;
        }
    }

    /// Returns true when the update closed the connection and the event loop
    /// must stop.
    async fn handle_connection_update(
        &self,
        client: &Arc<dyn WireClient>,
        update: ConnectionUpdate,
    ) -> bool {
        match update {
            ConnectionUpdate::Connecting => {
                println!("connecting to wire transport...");
                false
            }
            ConnectionUpdate::PairingPrompt { code } => {
                println!("pairing required; enter code on the paired device: {code}");
                false
            }
            ConnectionUpdate::Open => {
                {
                    let mut state = self.inner.state.lock().await;
                    state.connection = ConnectionState::Open;
                    state.retry_counter = 0;
                }
                println!("login successful");
                self.send_open_notice(client).await;
                false
            }
            ConnectionUpdate::Close { cause } => {
                self.handle_close(cause).await;
                true
            }
        }
    }

    /// One-time status notification after reaching Open; failures swallowed.
    async fn send_open_notice(&self, client: &Arc<dyn WireClient>) {
        let Some(own_chat) = client.own_identity() else {
            return;
        };
        let body = format!(
            "```rho connected\nversion: {}\ncommands: {}\nmode: {}```",
            env!("CARGO_PKG_VERSION"),
            self.inner.config.registry.len(),
            self.inner.config.work_mode.as_str(),
        );
        if let Err(error) = client.send_message(&own_chat, OutboundPayload::text(body)).await {
            eprintln!("status notice delivery failed: error={error:#}");
        }
    }

    async fn handle_close(&self, cause: DisconnectCause) {
        if self.inner.shutting_down.load(Ordering::SeqCst) {
            return;
        }

        let action = {
            let mut state = self.inner.state.lock().await;
            state.connection = ConnectionState::Closed;
            state.client = None;
            match cause.classify() {
                DisconnectClass::Terminal => {
                    state.retry_counter = 0;
                    CloseAction::ClearSession
                }
                DisconnectClass::Transient => {
                    if state.retry_counter >= self.inner.config.max_reconnect_attempts {
                        state.retry_counter = 0;
                        CloseAction::ClearSession
                    } else {
                        let attempt = state.retry_counter;
                        state.retry_counter = state.retry_counter.saturating_add(1);
                        CloseAction::Backoff {
                            attempt,
                            delay: backoff_delay(&self.inner.config.backoff_schedule, attempt),
                        }
                    }
                }
            }
        };

        match action {
            CloseAction::Backoff { attempt, delay } => {
                println!(
                    "connection closed: cause={} code={} attempt={} wait_ms={}",
                    cause.label(),
                    cause.code(),
                    attempt.saturating_add(1),
                    delay.as_millis(),
                );
                tokio::time::sleep(delay).await;
            }
            CloseAction::ClearSession => {
                eprintln!(
                    "session invalidated: cause={} code={}; clearing credentials for fresh pairing",
                    cause.label(),
                    cause.code(),
                );
                if let Err(error) = self.inner.config.session.clear() {
                    eprintln!("session clear failed: error={error:#}");
                }
                {
                    let mut state = self.inner.state.lock().await;
                    state.connection = ConnectionState::Idle;
                }
                tokio::time::sleep(self.inner.config.session_clear_cooldown).await;
            }
        }

        if self.inner.shutting_down.load(Ordering::SeqCst) {
            return;
        }
        if let Err(error) = self.connect().await {
            eprintln!("reconnect failed: error={error:#}");
        }
    }

    async fn handle_credential_update(
        &self,
        client: &Arc<dyn WireClient>,
        credentials: SessionCredentials,
    ) {
        if let Err(error) = self.inner.config.session.save(&credentials) {
            eprintln!("credential save failed: error={error:#}");
            self.inner
                .config
                .reporter
                .report(&format!("{error:#}"), "credential-save")
                .await;
            // Dropping the connection routes the failure through the
            // transient retry path; a lost credential update must not leave
            // the session silently divergent.
            let _ = client.close().await;
        }
    }

    async fn handle_message(&self, client: &Arc<dyn WireClient>, raw: RawMessageEvent) {
        match serde_json::to_value(&raw) {
            Ok(payload) => {
                if let Err(error) = self.inner.config.store.save_message(
                    &raw.key.id,
                    &raw.key.chat_id,
                    &raw.sender_id,
                    &payload,
                ) {
                    eprintln!("message persist failed: id={} error={error:#}", raw.key.id);
                }
            }
            Err(error) => {
                eprintln!("message encode failed: id={} error={error:#}", raw.key.id);
            }
        }
        if let Some(name) = raw.push_name.as_deref() {
            if let Err(error) = self.inner.config.store.record_name(&raw.sender_id, name) {
                eprintln!(
                    "contact name persist failed: sender={} error={error:#}",
                    raw.sender_id
                );
            }
        }

        if self.inner.config.auto_read
            || (self.inner.config.auto_status_read && raw.key.chat_id == STATUS_BROADCAST_CHAT)
        {
            if let Err(error) = client.read_messages(std::slice::from_ref(&raw.key)).await {
                tracing::debug!(message_id = %raw.key.id, error = %error, "read receipt failed");
            }
        }

        let message = match normalize(&raw, &self.inner.config.store) {
            Ok(message) => message,
            Err(error) => {
                eprintln!("inbound event dropped: {error}");
                return;
            }
        };

        match self.inner.config.gate.allow(&self.inner.config.store, &message) {
            Ok(true) => {}
            Ok(false) => return,
            Err(error) => {
                eprintln!(
                    "paused-chat read failed: chat={} error={error:#}",
                    message.chat_id
                );
                return;
            }
        }

        if self.inner.config.log_messages {
            self.log_inbound(client, &message).await;
        }

        let issued = self
            .inner
            .dispatcher
            .dispatch(client, &self.inner.config.store, &message);
        tracing::debug!(
            message_id = %message.id,
            kind = message.kind.as_str(),
            handlers = issued,
            "dispatched inbound message"
        );
    }

    async fn log_inbound(&self, client: &Arc<dyn WireClient>, message: &NormalizedMessage) {
        let sender_name = self
            .inner
            .config
            .store
            .get_name(&message.sender_id)
            .unwrap_or_else(|_| message.sender_id.clone());
        let chat_title = if is_group_chat(&message.chat_id) {
            client
                .group_metadata(&message.chat_id)
                .await
                .map(|metadata| metadata.subject)
                .unwrap_or_else(|_| message.chat_id.clone())
        } else {
            message.chat_id.clone()
        };
        println!(
            "message received: chat={} from={} sender={} kind={} body={}",
            chat_title,
            sender_name,
            message.sender_id,
            message.kind.as_str(),
            message.body.as_deref().unwrap_or("<none>"),
        );
    }

    /// Closes the transport and allows a bounded grace period for in-flight
    /// handler sends before the caller terminates the process.
    pub async fn shutdown(&self, grace: Duration) {
        self.inner.shutting_down.store(true, Ordering::SeqCst);
        let client = {
            let mut state = self.inner.state.lock().await;
            state.connection = ConnectionState::Idle;
            state.client.take()
        };
        if let Some(client) = client {
            if let Err(error) = client.close().await {
                eprintln!("transport close failed: error={error:#}");
            }
        }
        tokio::time::sleep(grace).await;
    }
}
