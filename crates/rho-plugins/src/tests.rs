//! Tests for built-in command registration and behavior.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

use rho_engine::{
    match_text_pattern, normalize, CommandDispatcher, CommandRegistry, ErrorReporter,
    GroupMetadata, MessageKey, OutboundPayload, RawMessageEvent, RawMessagePayload, WireClient,
    WorkMode,
};
use rho_store::ChatStore;

use super::{command_pattern, install_builtin_commands};

struct RecordingClient {
    sent: Mutex<Vec<(String, OutboundPayload)>>,
}

impl RecordingClient {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            sent: Mutex::new(Vec::new()),
        })
    }

    fn sent_bodies(&self) -> Vec<String> {
        self.sent
            .lock()
            .expect("sent lock")
            .iter()
            .filter_map(|(_, payload)| match payload {
                OutboundPayload::Text { body } => Some(body.clone()),
                OutboundPayload::Sticker { .. } => None,
            })
            .collect()
    }
}

#[async_trait]
impl WireClient for RecordingClient {
    fn own_identity(&self) -> Option<String> {
        Some("own@w.net".to_string())
    }

    async fn send_message(&self, target: &str, payload: OutboundPayload) -> Result<()> {
        self.sent
            .lock()
            .expect("sent lock")
            .push((target.to_string(), payload));
        Ok(())
    }

    async fn read_messages(&self, _keys: &[MessageKey]) -> Result<()> {
        Ok(())
    }

    async fn group_metadata(&self, chat_id: &str) -> Result<GroupMetadata> {
        Ok(GroupMetadata {
            id: chat_id.to_string(),
            subject: "Test Group".to_string(),
        })
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

fn privileged_text(id: &str, body: &str) -> RawMessageEvent {
    RawMessageEvent {
        key: MessageKey {
            id: id.to_string(),
            chat_id: "chat@w.net".to_string(),
            from_self: true,
        },
        sender_id: "own@w.net".to_string(),
        push_name: None,
        timestamp_ms: 1_700_000_000_000,
        payload: RawMessagePayload::Text {
            body: body.to_string(),
        },
        quoted: None,
    }
}

async fn wait_for_reply<F>(client: &RecordingClient, predicate: F) -> bool
where
    F: Fn(&[String]) -> bool,
{
    for _ in 0..200 {
        if predicate(&client.sent_bodies()) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    predicate(&client.sent_bodies())
}

#[test]
fn command_pattern_extracts_expected_groups() {
    let pattern = command_pattern("[!/.]", "ping").expect("pattern");

    let matched = match_text_pattern(&pattern, "!ping").expect("bare match");
    assert_eq!(matched.prefix, "!");
    assert_eq!(matched.name, "ping");
    assert_eq!(matched.args, None);

    let matched = match_text_pattern(&pattern, ".PING soon").expect("case-insensitive");
    assert_eq!(matched.prefix, ".");
    assert_eq!(matched.args.as_deref(), Some("soon"));

    assert!(match_text_pattern(&pattern, "ping").is_none());
    assert!(match_text_pattern(&pattern, "!pingpong").is_none());
}

#[test]
fn builtin_commands_install_in_fixed_order() {
    let registry = CommandRegistry::new();
    install_builtin_commands(&registry, "[!/.]").expect("install");
    let names: Vec<String> = registry
        .snapshot()
        .iter()
        .map(|descriptor| descriptor.name.clone())
        .collect();
    assert_eq!(names, vec!["ping", "menu", "pause", "resume"]);
}

#[tokio::test]
async fn ping_replies_with_latency_report() {
    let registry = CommandRegistry::new();
    install_builtin_commands(&registry, "[!/.]").expect("install");
    let store = ChatStore::open_in_memory().expect("store");
    let dispatcher = CommandDispatcher::new(registry, WorkMode::Public, ErrorReporter::new());
    let client = RecordingClient::new();
    let wire_client: Arc<dyn WireClient> = Arc::clone(&client) as Arc<dyn WireClient>;

    let message = normalize(&privileged_text("m1", "!ping"), &store).expect("normalize");
    assert_eq!(dispatcher.dispatch(&wire_client, &store, &message), 1);
    assert!(
        wait_for_reply(&client, |bodies| {
            bodies.iter().any(|body| body.contains("pong"))
        })
        .await
    );
}

#[tokio::test]
async fn pause_and_resume_commands_flip_the_paused_flag() {
    let registry = CommandRegistry::new();
    install_builtin_commands(&registry, "[!/.]").expect("install");
    let store = ChatStore::open_in_memory().expect("store");
    let dispatcher = CommandDispatcher::new(registry, WorkMode::Public, ErrorReporter::new());
    let client = RecordingClient::new();
    let wire_client: Arc<dyn WireClient> = Arc::clone(&client) as Arc<dyn WireClient>;

    let pause = normalize(&privileged_text("m1", "!pause"), &store).expect("normalize");
    assert_eq!(dispatcher.dispatch(&wire_client, &store, &pause), 1);
    assert!(
        wait_for_reply(&client, |bodies| {
            bodies.iter().any(|body| body.contains("paused"))
        })
        .await
    );
    let paused = store.paused_chats().expect("paused");
    assert_eq!(paused.len(), 1);
    assert_eq!(paused[0].chat_id, "chat@w.net");

    let resume = normalize(&privileged_text("m2", "!resume"), &store).expect("normalize");
    assert_eq!(dispatcher.dispatch(&wire_client, &store, &resume), 1);
    assert!(
        wait_for_reply(&client, |bodies| {
            bodies.iter().any(|body| body.contains("resumed"))
        })
        .await
    );
    assert!(store.paused_chats().expect("paused").is_empty());
}

#[tokio::test]
async fn menu_command_sends_the_listing() {
    let registry = CommandRegistry::new();
    install_builtin_commands(&registry, "[!/.]").expect("install");
    let store = ChatStore::open_in_memory().expect("store");
    let dispatcher = CommandDispatcher::new(registry, WorkMode::Public, ErrorReporter::new());
    let client = RecordingClient::new();
    let wire_client: Arc<dyn WireClient> = Arc::clone(&client) as Arc<dyn WireClient>;

    let message = normalize(&privileged_text("m1", "!help"), &store).expect("normalize");
    assert_eq!(dispatcher.dispatch(&wire_client, &store, &message), 1);
    assert!(
        wait_for_reply(&client, |bodies| {
            bodies
                .iter()
                .any(|body| body.contains("[user]") && body.contains("- ping"))
        })
        .await
    );
}
