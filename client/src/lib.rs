//! Session lifecycle core for the MedMarket web client: bearer-token
//! sessions with inactivity and dormancy expiry, cross-device conflict
//! resolution, silent restore with bounded retry, and a durable credential
//! store, all behind one small state machine.

pub mod api;
pub mod config;
pub mod notify;
pub mod observe;
pub mod session;
pub mod storage;

pub use api::{AuthGateway, ConflictDetails, ErrorKind, HttpAuthGateway, UserProfile};
pub use config::SessionConfig;
pub use notify::{LogNotificationSink, NotificationKind, NotificationSink};
pub use observe::{ActivityObserver, ForegroundObserver, SignalRelay, Subscription, Visibility};
pub use session::{ExpiryReason, Session, SessionError, SessionManager, SessionStatus};
pub use storage::{
    CredentialStore, FileCredentialStore, MemoryCredentialStore, StorageError, StoredCredential,
};

#[cfg(test)]
pub(crate) mod test_support;
