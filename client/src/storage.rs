use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    #[error("credential storage io: {0}")]
    Io(String),
    #[error("credential storage format: {0}")]
    Format(String),
}

/// The bearer credential pair issued at sign-in. Holding both halves in one
/// value keeps the "both present or both absent" invariant out of reach of
/// callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredCredential {
    pub token: String,
    pub session_id: String,
}

/// Durable home of the credential pair. Single writer: only the session
/// manager calls `save`/`clear`.
pub trait CredentialStore: Send + Sync {
    /// `Ok(None)` means logged out. Partial or unreadable stored state also
    /// loads as `None`; the caller clears it defensively.
    fn load(&self) -> Result<Option<StoredCredential>, StorageError>;
    fn save(&self, credential: &StoredCredential) -> Result<(), StorageError>;
    fn clear(&self) -> Result<(), StorageError>;
}

/// Store backed by a small JSON document with the wire keys `token` and
/// `sessionId`.
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[derive(Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawCredential {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    session_id: Option<String>,
}

impl CredentialStore for FileCredentialStore {
    fn load(&self) -> Result<Option<StoredCredential>, StorageError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(error) => return Err(StorageError::Io(error.to_string())),
        };
        let raw: RawCredential = match serde_json::from_str(&raw) {
            Ok(raw) => raw,
            Err(error) => {
                log::warn!("stored credential is unreadable, treating as logged out: {error}");
                return Ok(None);
            }
        };
        match (raw.token, raw.session_id) {
            (Some(token), Some(session_id)) if !token.is_empty() && !session_id.is_empty() => {
                Ok(Some(StoredCredential { token, session_id }))
            }
            (None, None) => Ok(None),
            _ => {
                log::warn!("stored credential held one half of the pair, treating as logged out");
                Ok(None)
            }
        }
    }

    fn save(&self, credential: &StoredCredential) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|error| StorageError::Io(error.to_string()))?;
            }
        }
        let body = serde_json::to_string_pretty(credential)
            .map_err(|error| StorageError::Format(error.to_string()))?;
        fs::write(&self.path, body).map_err(|error| StorageError::Io(error.to_string()))
    }

    fn clear(&self) -> Result<(), StorageError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(error) => Err(StorageError::Io(error.to_string())),
        }
    }
}

/// In-memory store for hosts without durable storage and for tests.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    slot: Mutex<Option<StoredCredential>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn load(&self) -> Result<Option<StoredCredential>, StorageError> {
        Ok(self.slot.lock().expect("lock poisoned").clone())
    }

    fn save(&self, credential: &StoredCredential) -> Result<(), StorageError> {
        *self.slot.lock().expect("lock poisoned") = Some(credential.clone());
        Ok(())
    }

    fn clear(&self) -> Result<(), StorageError> {
        *self.slot.lock().expect("lock poisoned") = None;
        Ok(())
    }
}
