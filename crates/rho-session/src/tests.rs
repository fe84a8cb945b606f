//! Tests for credential persistence lifecycle and failure modes.

use serde_json::json;
use tempfile::tempdir;

use super::{SessionCredentials, SessionStore, SessionStoreError};

#[test]
fn load_without_prior_session_reports_not_found() {
    let tempdir = tempdir().expect("tempdir");
    let store = SessionStore::new(tempdir.path().join("session"));
    match store.load() {
        Err(SessionStoreError::NotFound { .. }) => {}
        other => panic!("expected NotFound, got {other:?}"),
    }
}

#[test]
fn save_then_load_round_trips() {
    let tempdir = tempdir().expect("tempdir");
    let store = SessionStore::new(tempdir.path().join("session"));

    let mut credentials = SessionCredentials::generate();
    credentials.identity_id = Some("1234@w.net".to_string());
    credentials.registered = true;
    credentials.payload = json!({"noise_key": "abc", "signed_pre_keys": [1, 2, 3]});

    store.save(&credentials).expect("save");
    let loaded = store.load().expect("load");
    assert_eq!(loaded, credentials);
}

#[test]
fn save_is_an_idempotent_overwrite() {
    let tempdir = tempdir().expect("tempdir");
    let store = SessionStore::new(tempdir.path().join("session"));

    let mut first = SessionCredentials::generate();
    first.payload = json!({"epoch": 1});
    store.save(&first).expect("first save");

    let mut second = first.clone();
    second.payload = json!({"epoch": 2});
    store.save(&second).expect("second save");
    store.save(&second).expect("repeat save");

    let loaded = store.load().expect("load");
    assert_eq!(loaded.payload, json!({"epoch": 2}));
}

#[test]
fn clear_is_idempotent_and_safe_when_empty() {
    let tempdir = tempdir().expect("tempdir");
    let store = SessionStore::new(tempdir.path().join("session"));

    store.clear().expect("clear empty");

    store.save(&SessionCredentials::generate()).expect("save");
    store.clear().expect("clear existing");
    store.clear().expect("clear again");

    match store.load() {
        Err(SessionStoreError::NotFound { .. }) => {}
        other => panic!("expected NotFound after clear, got {other:?}"),
    }
}

#[test]
fn unparseable_credentials_report_corrupt() {
    let tempdir = tempdir().expect("tempdir");
    let dir = tempdir.path().join("session");
    std::fs::create_dir_all(&dir).expect("mkdir");
    std::fs::write(dir.join("creds.json"), "{not json").expect("write garbage");

    let store = SessionStore::new(&dir);
    match store.load() {
        Err(SessionStoreError::Corrupt { .. }) => {}
        other => panic!("expected Corrupt, got {other:?}"),
    }
}

#[test]
fn unsupported_schema_reports_corrupt() {
    let tempdir = tempdir().expect("tempdir");
    let dir = tempdir.path().join("session");
    std::fs::create_dir_all(&dir).expect("mkdir");
    std::fs::write(
        dir.join("creds.json"),
        json!({"schema_version": 99, "payload": null}).to_string(),
    )
    .expect("write future schema");

    let store = SessionStore::new(&dir);
    match store.load() {
        Err(SessionStoreError::Corrupt { reason, .. }) => {
            assert!(reason.contains("schema"));
        }
        other => panic!("expected Corrupt, got {other:?}"),
    }
}
