use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::api::{ErrorKind, UserProfile};
use crate::storage::{StorageError, StoredCredential};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionStatus {
    #[default]
    Unauthenticated,
    Authenticating,
    Authenticated,
    ForceAuthenticating,
    LoggingOut,
    /// A credential could not be persisted after a successful
    /// authentication; the session was cleared to keep memory and storage
    /// in agreement.
    Error,
}

/// Why a session ended without an explicit logout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpiryReason {
    /// No activity signal for the whole inactivity window.
    Inactivity,
    /// Backgrounded past the dormancy window.
    Dormancy,
    /// The server stopped honoring the credential, typically because the
    /// account signed in elsewhere.
    Invalidated,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SessionError {
    #[error(transparent)]
    Gateway(#[from] ErrorKind),
    #[error("credential store failed: {0}")]
    Storage(#[from] StorageError),
}

/// Snapshot of the client's authentication state. The credential pair is a
/// single optional value, so a token can never be observed without its
/// session id or vice versa.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Session {
    pub status: SessionStatus,
    pub(crate) credential: Option<StoredCredential>,
    pub user: Option<UserProfile>,
    pub last_activity_at: Option<DateTime<Utc>>,
    pub error: Option<SessionError>,
}

impl Session {
    pub fn token(&self) -> Option<&str> {
        self.credential
            .as_ref()
            .map(|credential| credential.token.as_str())
    }

    pub fn session_id(&self) -> Option<&str> {
        self.credential
            .as_ref()
            .map(|credential| credential.session_id.as_str())
    }

    pub fn credential(&self) -> Option<&StoredCredential> {
        self.credential.as_ref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.status == SessionStatus::Authenticated
    }

    pub(crate) fn clear(&mut self) {
        *self = Session::default();
    }
}
