//! Durable persistence for wire-session authentication material.
//!
//! The credential payload is an opaque blob owned by the transport; this
//! crate only guarantees its lifecycle: created on first pairing, replaced
//! on every credential update, deleted when the remote side invalidates the
//! session.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use rho_core::{current_unix_timestamp_ms, write_text_atomic};

const SESSION_CREDENTIALS_SCHEMA_VERSION: u32 = 1;
const CREDENTIALS_FILE_NAME: &str = "creds.json";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
/// Authentication material required to resume a session without re-pairing.
pub struct SessionCredentials {
    pub schema_version: u32,
    /// Own identity on the wire, known once the first handshake completes.
    #[serde(default)]
    pub identity_id: Option<String>,
    #[serde(default)]
    pub registered: bool,
    #[serde(default)]
    pub issued_unix_ms: u64,
    /// Opaque transport blob plus key material; never interpreted here.
    #[serde(default)]
    pub payload: Value,
}

impl SessionCredentials {
    /// Fresh, unpaired credentials; the transport fills the payload during
    /// its pairing/login flow and reports it back as a credential update.
    pub fn generate() -> Self {
        Self {
            schema_version: SESSION_CREDENTIALS_SCHEMA_VERSION,
            identity_id: None,
            registered: false,
            issued_unix_ms: current_unix_timestamp_ms(),
            payload: Value::Null,
        }
    }
}

/// Enumerates supported `SessionStoreError` values.
#[derive(Debug, Error)]
pub enum SessionStoreError {
    #[error("no persisted session under {dir}")]
    NotFound { dir: String },
    #[error("session file {path} is not usable: {reason}")]
    Corrupt { path: String, reason: String },
    #[error("session store io failure at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("session store write failure at {path}: {reason}")]
    Write { path: String, reason: String },
}

#[derive(Debug, Clone)]
/// File-backed store for [`SessionCredentials`] under one directory.
pub struct SessionStore {
    dir: PathBuf,
}

impl SessionStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn credentials_path(&self) -> PathBuf {
        self.dir.join(CREDENTIALS_FILE_NAME)
    }

    /// Loads persisted credentials. `NotFound` means no prior session exists
    /// and the caller proceeds to a fresh pairing.
    pub fn load(&self) -> Result<SessionCredentials, SessionStoreError> {
        let path = self.credentials_path();
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                return Err(SessionStoreError::NotFound {
                    dir: self.dir.display().to_string(),
                });
            }
            Err(error) => {
                return Err(SessionStoreError::Io {
                    path: path.display().to_string(),
                    source: error,
                });
            }
        };

        let credentials = serde_json::from_str::<SessionCredentials>(&raw).map_err(|error| {
            SessionStoreError::Corrupt {
                path: path.display().to_string(),
                reason: error.to_string(),
            }
        })?;
        if credentials.schema_version != SESSION_CREDENTIALS_SCHEMA_VERSION {
            return Err(SessionStoreError::Corrupt {
                path: path.display().to_string(),
                reason: format!(
                    "unsupported schema version {}",
                    credentials.schema_version
                ),
            });
        }
        Ok(credentials)
    }

    /// Durable idempotent overwrite; a concurrent `load` observes either the
    /// previous credentials or the new ones, never a torn file.
    pub fn save(&self, credentials: &SessionCredentials) -> Result<(), SessionStoreError> {
        let path = self.credentials_path();
        let payload = serde_json::to_string_pretty(credentials).map_err(|error| {
            SessionStoreError::Write {
                path: path.display().to_string(),
                reason: error.to_string(),
            }
        })?;
        write_text_atomic(&path, &payload).map_err(|error| SessionStoreError::Write {
            path: path.display().to_string(),
            reason: error.to_string(),
        })
    }

    /// Idempotent deletion of the whole session directory; safe to call when
    /// nothing exists.
    pub fn clear(&self) -> Result<(), SessionStoreError> {
        match std::fs::remove_dir_all(&self.dir) {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(error) => Err(SessionStoreError::Io {
                path: self.dir.display().to_string(),
                source: error,
            }),
        }
    }
}

#[cfg(test)]
mod tests;
