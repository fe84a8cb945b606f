//! SQLite-backed chat, message, contact, and paused-chat persistence.
//!
//! Command handlers run concurrently, so every operation goes through one
//! mutexed connection. The engine reads the paused-chat set fresh on every
//! inbound message; nothing here is cached.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use rho_core::current_unix_timestamp_ms;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
/// Chat metadata persisted on chat-update events.
pub struct StoredChat {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// One entry of the paused-chat set.
pub struct PausedChat {
    pub chat_id: String,
}

#[derive(Clone)]
/// Shared handle to the chat/message database.
pub struct ChatStore {
    connection: Arc<Mutex<Connection>>,
}

impl ChatStore {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
        }
        let connection = Connection::open(path)
            .with_context(|| format!("failed to open chat store {}", path.display()))?;
        connection.busy_timeout(Duration::from_secs(5))?;
        connection.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            "#,
        )?;
        initialize_chat_store_schema(&connection)?;
        Ok(Self {
            connection: Arc::new(Mutex::new(connection)),
        })
    }

    /// In-memory store for tests and ephemeral runs.
    pub fn open_in_memory() -> Result<Self> {
        let connection = Connection::open_in_memory().context("failed to open in-memory store")?;
        initialize_chat_store_schema(&connection)?;
        Ok(Self {
            connection: Arc::new(Mutex::new(connection)),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.connection
            .lock()
            .map_err(|_| anyhow!("chat store lock is poisoned"))
    }

    pub fn save_message(
        &self,
        message_id: &str,
        chat_id: &str,
        sender_id: &str,
        raw_payload: &Value,
    ) -> Result<()> {
        let payload_json =
            serde_json::to_string(raw_payload).context("failed to encode message payload")?;
        let connection = self.lock()?;
        connection.execute(
            r#"
            INSERT INTO messages (id, chat_id, sender_id, payload_json, stored_unix_ms)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(id) DO UPDATE SET
                chat_id = excluded.chat_id,
                sender_id = excluded.sender_id,
                payload_json = excluded.payload_json,
                stored_unix_ms = excluded.stored_unix_ms
            "#,
            params![
                message_id,
                chat_id,
                sender_id,
                payload_json,
                current_unix_timestamp_ms()
            ],
        )?;
        Ok(())
    }

    pub fn load_message(&self, message_id: &str) -> Result<Option<Value>> {
        let connection = self.lock()?;
        let payload_json: Option<String> = connection
            .query_row(
                "SELECT payload_json FROM messages WHERE id = ?1",
                params![message_id],
                |row| row.get(0),
            )
            .optional()?;
        let Some(payload_json) = payload_json else {
            return Ok(None);
        };
        let payload = serde_json::from_str(&payload_json)
            .with_context(|| format!("stored message {message_id} has invalid payload"))?;
        Ok(Some(payload))
    }

    pub fn save_chat(&self, chat: &StoredChat) -> Result<()> {
        let connection = self.lock()?;
        connection.execute(
            r#"
            INSERT INTO chats (id, name, updated_unix_ms)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(id) DO UPDATE SET
                name = COALESCE(excluded.name, chats.name),
                updated_unix_ms = excluded.updated_unix_ms
            "#,
            params![chat.id, chat.name, current_unix_timestamp_ms()],
        )?;
        Ok(())
    }

    pub fn chat_name(&self, chat_id: &str) -> Result<Option<String>> {
        let connection = self.lock()?;
        let name: Option<Option<String>> = connection
            .query_row(
                "SELECT name FROM chats WHERE id = ?1",
                params![chat_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(name.flatten())
    }

    /// Remembers the display name a sender advertised on an inbound event.
    pub fn record_name(&self, sender_id: &str, name: &str) -> Result<()> {
        if name.trim().is_empty() {
            return Ok(());
        }
        let connection = self.lock()?;
        connection.execute(
            r#"
            INSERT INTO contacts (id, name, updated_unix_ms)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                updated_unix_ms = excluded.updated_unix_ms
            "#,
            params![sender_id, name.trim(), current_unix_timestamp_ms()],
        )?;
        Ok(())
    }

    /// Display name for a sender, falling back to the bare identifier before
    /// any `@server` suffix when no name was ever recorded.
    pub fn get_name(&self, sender_id: &str) -> Result<String> {
        let connection = self.lock()?;
        let name: Option<String> = connection
            .query_row(
                "SELECT name FROM contacts WHERE id = ?1",
                params![sender_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(name.unwrap_or_else(|| {
            sender_id
                .split_once('@')
                .map(|(user, _)| user.to_string())
                .unwrap_or_else(|| sender_id.to_string())
        }))
    }

    pub fn pause_chat(&self, chat_id: &str) -> Result<()> {
        let connection = self.lock()?;
        connection.execute(
            r#"
            INSERT INTO paused_chats (chat_id, paused_unix_ms)
            VALUES (?1, ?2)
            ON CONFLICT(chat_id) DO UPDATE SET paused_unix_ms = excluded.paused_unix_ms
            "#,
            params![chat_id, current_unix_timestamp_ms()],
        )?;
        Ok(())
    }

    pub fn resume_chat(&self, chat_id: &str) -> Result<()> {
        let connection = self.lock()?;
        connection.execute(
            "DELETE FROM paused_chats WHERE chat_id = ?1",
            params![chat_id],
        )?;
        Ok(())
    }

    pub fn paused_chats(&self) -> Result<Vec<PausedChat>> {
        let connection = self.lock()?;
        let mut statement =
            connection.prepare("SELECT chat_id FROM paused_chats ORDER BY chat_id ASC")?;
        let rows = statement.query_map([], |row| row.get::<_, String>(0))?;
        let mut paused = Vec::new();
        for row in rows {
            paused.push(PausedChat { chat_id: row? });
        }
        Ok(paused)
    }
}

fn initialize_chat_store_schema(connection: &Connection) -> Result<()> {
    connection.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS messages (
            id TEXT PRIMARY KEY,
            chat_id TEXT NOT NULL,
            sender_id TEXT NOT NULL,
            payload_json TEXT NOT NULL,
            stored_unix_ms INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_messages_chat_id ON messages(chat_id);
        CREATE TABLE IF NOT EXISTS chats (
            id TEXT PRIMARY KEY,
            name TEXT NULL,
            updated_unix_ms INTEGER NOT NULL
        );
        CREATE TABLE IF NOT EXISTS contacts (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            updated_unix_ms INTEGER NOT NULL
        );
        CREATE TABLE IF NOT EXISTS paused_chats (
            chat_id TEXT PRIMARY KEY,
            paused_unix_ms INTEGER NOT NULL
        );
        "#,
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tempfile::tempdir;

    use super::{ChatStore, StoredChat};

    #[test]
    fn open_creates_the_database_under_a_fresh_directory() {
        let tempdir = tempdir().expect("tempdir");
        let path = tempdir.path().join("state").join("store.db");
        let store = ChatStore::open(&path).expect("open");
        store
            .save_message("m1", "chat@w.net", "user@w.net", &json!({"body": "hi"}))
            .expect("save");
        assert!(path.exists());

        // Reopening sees the persisted row.
        let reopened = ChatStore::open(&path).expect("reopen");
        assert_eq!(
            reopened.load_message("m1").expect("load"),
            Some(json!({"body": "hi"}))
        );
    }

    #[test]
    fn message_round_trip_and_overwrite() {
        let store = ChatStore::open_in_memory().expect("store");
        store
            .save_message("m1", "chat@g.net", "user@w.net", &json!({"body": "hello"}))
            .expect("save");
        assert_eq!(
            store.load_message("m1").expect("load"),
            Some(json!({"body": "hello"}))
        );

        store
            .save_message("m1", "chat@g.net", "user@w.net", &json!({"body": "edited"}))
            .expect("overwrite");
        assert_eq!(
            store.load_message("m1").expect("load"),
            Some(json!({"body": "edited"}))
        );
        assert_eq!(store.load_message("missing").expect("load"), None);
    }

    #[test]
    fn chat_upsert_keeps_known_name_when_update_has_none() {
        let store = ChatStore::open_in_memory().expect("store");
        store
            .save_chat(&StoredChat {
                id: "chat@g.net".to_string(),
                name: Some("Ops Group".to_string()),
            })
            .expect("save named");
        store
            .save_chat(&StoredChat {
                id: "chat@g.net".to_string(),
                name: None,
            })
            .expect("save unnamed update");
        assert_eq!(
            store.chat_name("chat@g.net").expect("name"),
            Some("Ops Group".to_string())
        );
    }

    #[test]
    fn get_name_prefers_recorded_name_then_bare_id() {
        let store = ChatStore::open_in_memory().expect("store");
        assert_eq!(store.get_name("99887@w.net").expect("fallback"), "99887");

        store.record_name("99887@w.net", "Kara").expect("record");
        assert_eq!(store.get_name("99887@w.net").expect("named"), "Kara");

        store.record_name("99887@w.net", "   ").expect("blank ignored");
        assert_eq!(store.get_name("99887@w.net").expect("kept"), "Kara");
    }

    #[test]
    fn pause_and_resume_flow() {
        let store = ChatStore::open_in_memory().expect("store");
        assert!(store.paused_chats().expect("empty").is_empty());

        store.pause_chat("b@g.net").expect("pause b");
        store.pause_chat("a@g.net").expect("pause a");
        store.pause_chat("a@g.net").expect("pause a again");

        let paused = store.paused_chats().expect("paused");
        let ids: Vec<&str> = paused.iter().map(|entry| entry.chat_id.as_str()).collect();
        assert_eq!(ids, vec!["a@g.net", "b@g.net"]);

        store.resume_chat("a@g.net").expect("resume");
        store.resume_chat("a@g.net").expect("resume again");
        let paused = store.paused_chats().expect("paused");
        assert_eq!(paused.len(), 1);
        assert_eq!(paused[0].chat_id, "b@g.net");
    }
}
