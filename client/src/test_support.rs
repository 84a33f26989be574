//! Shared doubles for the lifecycle tests: a scripted gateway, recording
//! sink and store wrappers, and a preassembled manager harness.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::api::{
    AuthGateway, ErrorKind, MessageResponse, SigninRequest, SigninResponse, SignupRequest,
    SignupResponse, UserProfile,
};
use crate::config::SessionConfig;
use crate::notify::{NotificationKind, NotificationSink};
use crate::session::{SessionManager, SessionStatus};
use crate::storage::{CredentialStore, MemoryCredentialStore, StorageError, StoredCredential};

pub fn test_user() -> UserProfile {
    UserProfile {
        id: "u-1".into(),
        email: "pat@example.com".into(),
        first_name: "Pat".into(),
        last_name: "Rahman".into(),
        role: "customer".into(),
    }
}

pub fn signin_ok(token: &str, session_id: &str) -> SigninResponse {
    SigninResponse {
        token: token.into(),
        session_id: session_id.into(),
        user: test_user(),
        was_logged_in_elsewhere: false,
    }
}

/// Production defaults shrunk so clock-driven scenarios stay fast under the
/// paused test clock.
pub fn fast_config() -> SessionConfig {
    SessionConfig {
        inactivity_timeout: Duration::from_millis(1000),
        dormancy_timeout: Duration::from_millis(300),
        retry_delay: Duration::from_millis(50),
        activity_throttle: Duration::from_millis(100),
        ..SessionConfig::default()
    }
}

type Script<T> = Mutex<VecDeque<Result<T, ErrorKind>>>;

/// Gateway double driven by per-operation result scripts. An exhausted
/// script falls back to a default success, so tests only push the results
/// they care about.
#[derive(Default)]
pub struct FakeGateway {
    login_results: Script<SigninResponse>,
    force_login_results: Script<SigninResponse>,
    signup_results: Script<SignupResponse>,
    fetch_results: Script<UserProfile>,
    check_results: Script<()>,
    pub login_calls: AtomicU32,
    pub force_login_calls: AtomicU32,
    pub fetch_calls: AtomicU32,
    pub check_calls: AtomicU32,
    pub logout_calls: AtomicU32,
    pub logout_requests: Mutex<Vec<(String, String)>>,
    login_delay: Mutex<Option<Duration>>,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_login(&self, result: Result<SigninResponse, ErrorKind>) {
        self.login_results.lock().unwrap().push_back(result);
    }

    pub fn push_force_login(&self, result: Result<SigninResponse, ErrorKind>) {
        self.force_login_results.lock().unwrap().push_back(result);
    }

    pub fn push_signup(&self, result: Result<SignupResponse, ErrorKind>) {
        self.signup_results.lock().unwrap().push_back(result);
    }

    pub fn push_fetch(&self, result: Result<UserProfile, ErrorKind>) {
        self.fetch_results.lock().unwrap().push_back(result);
    }

    pub fn push_check(&self, result: Result<(), ErrorKind>) {
        self.check_results.lock().unwrap().push_back(result);
    }

    /// Adds artificial latency to login/force-login, opening a window for
    /// concurrency tests under the paused clock.
    pub fn set_login_delay(&self, delay: Duration) {
        *self.login_delay.lock().unwrap() = Some(delay);
    }

    fn next<T>(script: &Script<T>, fallback: T) -> Result<T, ErrorKind> {
        script.lock().unwrap().pop_front().unwrap_or(Ok(fallback))
    }
}

#[async_trait]
impl AuthGateway for FakeGateway {
    async fn login(&self, _request: &SigninRequest) -> Result<SigninResponse, ErrorKind> {
        self.login_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.login_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Self::next(&self.login_results, signin_ok("tok-default", "sess-default"))
    }

    async fn force_login(&self, _request: &SigninRequest) -> Result<SigninResponse, ErrorKind> {
        self.force_login_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.login_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Self::next(&self.force_login_results, signin_ok("tok-forced", "sess-forced"))
    }

    async fn signup(&self, _request: &SignupRequest) -> Result<SignupResponse, ErrorKind> {
        Self::next(
            &self.signup_results,
            SignupResponse {
                requires_verification: true,
                message: None,
            },
        )
    }

    async fn fetch_current_session(&self, _token: &str) -> Result<UserProfile, ErrorKind> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        Self::next(&self.fetch_results, test_user())
    }

    async fn check_session(&self, _token: &str) -> Result<(), ErrorKind> {
        self.check_calls.fetch_add(1, Ordering::SeqCst);
        Self::next(&self.check_results, ())
    }

    async fn logout(&self, token: &str, session_id: &str) -> Result<(), ErrorKind> {
        self.logout_calls.fetch_add(1, Ordering::SeqCst);
        self.logout_requests
            .lock()
            .unwrap()
            .push((token.to_string(), session_id.to_string()));
        Ok(())
    }

    async fn request_password_reset(&self, _email: &str) -> Result<MessageResponse, ErrorKind> {
        Ok(MessageResponse {
            message: "Password reset email sent".into(),
        })
    }

    async fn reset_password(
        &self,
        _token: &str,
        _new_password: &str,
    ) -> Result<MessageResponse, ErrorKind> {
        Ok(MessageResponse {
            message: "Password updated".into(),
        })
    }

    async fn verify_email(&self, _email: &str, _code: &str) -> Result<MessageResponse, ErrorKind> {
        Ok(MessageResponse {
            message: "Email verified".into(),
        })
    }
}

/// Sink that records every notification.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<(NotificationKind, String)>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<(NotificationKind, String)> {
        self.events.lock().unwrap().clone()
    }

    pub fn messages(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(|(_, message)| message.clone())
            .collect()
    }

    pub fn contains(&self, message: &str) -> bool {
        self.events
            .lock()
            .unwrap()
            .iter()
            .any(|(_, recorded)| recorded == message)
    }

    pub fn count(&self) -> usize {
        self.events.lock().unwrap().len()
    }
}

impl NotificationSink for RecordingSink {
    fn notify(&self, kind: NotificationKind, message: &str, _duration: Duration) {
        self.events.lock().unwrap().push((kind, message.to_string()));
    }
}

/// Store wrapper that records the order of operations performed on it.
#[derive(Default)]
pub struct RecordingStore {
    inner: MemoryCredentialStore,
    log: Mutex<Vec<String>>,
}

impl RecordingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn recorded(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    pub fn clear_count(&self) -> usize {
        self.log
            .lock()
            .unwrap()
            .iter()
            .filter(|op| op.as_str() == "clear")
            .count()
    }
}

impl CredentialStore for RecordingStore {
    fn load(&self) -> Result<Option<StoredCredential>, StorageError> {
        self.log.lock().unwrap().push("load".into());
        self.inner.load()
    }

    fn save(&self, credential: &StoredCredential) -> Result<(), StorageError> {
        self.log
            .lock()
            .unwrap()
            .push(format!("save:{}", credential.token));
        self.inner.save(credential)
    }

    fn clear(&self) -> Result<(), StorageError> {
        self.log.lock().unwrap().push("clear".into());
        self.inner.clear()
    }
}

/// Store whose writes always fail, for the persist-failure path.
pub struct FailingStore;

impl CredentialStore for FailingStore {
    fn load(&self) -> Result<Option<StoredCredential>, StorageError> {
        Ok(None)
    }

    fn save(&self, _credential: &StoredCredential) -> Result<(), StorageError> {
        Err(StorageError::Io("disk full".into()))
    }

    fn clear(&self) -> Result<(), StorageError> {
        Ok(())
    }
}

pub struct Harness {
    pub manager: SessionManager,
    pub gateway: Arc<FakeGateway>,
    pub store: Arc<MemoryCredentialStore>,
    pub sink: Arc<RecordingSink>,
}

pub fn harness() -> Harness {
    harness_with_config(fast_config())
}

pub fn harness_with_config(config: SessionConfig) -> Harness {
    let gateway = Arc::new(FakeGateway::new());
    let store = Arc::new(MemoryCredentialStore::new());
    let sink = Arc::new(RecordingSink::new());
    let manager = SessionManager::new(
        config,
        gateway.clone(),
        store.clone(),
        sink.clone(),
    );
    Harness {
        manager,
        gateway,
        store,
        sink,
    }
}

/// Spins (yielding, no sleeps) until the manager reaches `status`; the
/// expiry pipeline is a timer task plus a listener task, so a transition
/// needs a few scheduler turns to land.
pub async fn wait_for_status(manager: &SessionManager, status: SessionStatus) {
    for _ in 0..200 {
        if manager.status() == status {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!(
        "manager never reached {status:?}, still {:?}",
        manager.status()
    );
}
