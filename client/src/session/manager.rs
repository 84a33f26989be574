use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::api::{
    AuthGateway, ErrorKind, MessageResponse, SigninRequest, SigninResponse, SignupRequest,
    SignupResponse, UserProfile,
};
use crate::config::SessionConfig;
use crate::notify::{messages, NotificationKind, NotificationSink};
use crate::observe::{ActivityObserver, ForegroundObserver, Subscription, Visibility};
use crate::storage::{CredentialStore, StoredCredential};

use super::scheduler::{TimeoutEvent, TimeoutScheduler};
use super::state::{ExpiryReason, Session, SessionError, SessionStatus};

/// Root of the session lifecycle: owns the state machine, drives the
/// gateway and the credential store, arms the expiry timers, and reports
/// every transition to the notification sink.
///
/// Clones are cheap and share one session. Create and use it from inside a
/// Tokio runtime; the timers and the fire-and-forget logout are spawned
/// tasks.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<ManagerInner>,
}

struct ManagerInner {
    config: SessionConfig,
    gateway: Arc<dyn AuthGateway>,
    store: Arc<dyn CredentialStore>,
    sink: Arc<dyn NotificationSink>,
    scheduler: TimeoutScheduler,
    state: Mutex<ManagerState>,
    tasks: Mutex<ManagerTasks>,
}

struct ManagerState {
    session: Session,
    /// Bumped on every terminal transition. Async completions and timer
    /// firings scheduled under an older epoch are discarded instead of
    /// resurrecting cleared state.
    epoch: u64,
}

#[derive(Default)]
struct ManagerTasks {
    expiry_listener: Option<JoinHandle<()>>,
    restore_cancel: Option<oneshot::Sender<()>>,
    subscriptions: Vec<Subscription>,
}

enum Notice {
    Login { migrated: bool },
    ForceLogin,
    Restored,
}

enum FetchOutcome {
    Fetched(UserProfile),
    Failed(ErrorKind),
    Cancelled,
}

impl SessionManager {
    pub fn new(
        config: SessionConfig,
        gateway: Arc<dyn AuthGateway>,
        store: Arc<dyn CredentialStore>,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        let (events, receiver) = mpsc::unbounded_channel();
        let inner = Arc::new(ManagerInner {
            scheduler: TimeoutScheduler::new(&config, events),
            config,
            gateway,
            store,
            sink,
            state: Mutex::new(ManagerState {
                session: Session::default(),
                epoch: 0,
            }),
            tasks: Mutex::new(ManagerTasks::default()),
        });
        let listener = spawn_expiry_listener(&inner, receiver);
        inner.tasks.lock().expect("lock poisoned").expiry_listener = Some(listener);
        Self { inner }
    }

    /// Snapshot of the current session.
    pub fn session(&self) -> Session {
        self.inner.state().session.clone()
    }

    pub fn status(&self) -> SessionStatus {
        self.inner.state().session.status
    }

    /// Silently reauthenticates from the durable credential store, retrying
    /// transient failures up to the configured cap. Finding no stored
    /// credential is a quiet no-op.
    pub async fn restore(&self) -> Result<(), SessionError> {
        let loaded = {
            let mut state = self.inner.state();
            match state.session.status {
                SessionStatus::Authenticating
                | SessionStatus::ForceAuthenticating
                | SessionStatus::LoggingOut => return Err(ErrorKind::Busy.into()),
                SessionStatus::Authenticated => return Ok(()),
                SessionStatus::Unauthenticated | SessionStatus::Error => {}
            }
            match self.inner.store.load() {
                Ok(Some(credential)) => {
                    state.session.status = SessionStatus::Authenticating;
                    state.session.error = None;
                    Ok(Some((credential, state.epoch)))
                }
                Ok(None) => Ok(None),
                Err(error) => {
                    state.session.error = Some(SessionError::Storage(error.clone()));
                    Err(error)
                }
            }
        };
        let (credential, epoch) = match loaded {
            Ok(Some(pair)) => pair,
            Ok(None) => {
                // Clears any half-written pair left behind in storage.
                if let Err(error) = self.inner.store.clear() {
                    log::warn!("failed to clear credential store: {error}");
                }
                return Ok(());
            }
            Err(error) => {
                log::warn!("credential store unreadable: {error}");
                self.inner
                    .notify(NotificationKind::Error, messages::RESTORE_FAILED);
                return Err(error.into());
            }
        };
        log::info!("restoring session from stored credential");

        let mut cancel = self.register_restore_cancel();
        let outcome = self.fetch_with_retry(&credential.token, &mut cancel).await;
        self.clear_restore_cancel();

        match outcome {
            // A logout raced the restore and already produced the desired
            // terminal state.
            FetchOutcome::Cancelled => Ok(()),
            FetchOutcome::Fetched(user) => {
                self.inner
                    .commit_authenticated(epoch, credential, user, Notice::Restored)
            }
            FetchOutcome::Failed(kind) => {
                let applied = {
                    let mut state = self.inner.state();
                    if state.epoch == epoch
                        && state.session.status == SessionStatus::Authenticating
                    {
                        state.session.clear();
                        state.session.error = Some(SessionError::Gateway(kind.clone()));
                        if let Err(error) = self.inner.store.clear() {
                            log::warn!("failed to clear credential store: {error}");
                        }
                        true
                    } else {
                        false
                    }
                };
                log::warn!("session restore failed: {kind}");
                // A restore superseded by logout stays silent; the user asked
                // to be logged out and got exactly that.
                if applied {
                    self.inner
                        .notify(NotificationKind::Error, messages::RESTORE_FAILED);
                }
                Err(kind.into())
            }
        }
    }

    /// Single-attempt credential sign-in. Rejected with
    /// [`ErrorKind::Busy`] while another auth operation is in flight or a
    /// session is already established.
    pub async fn login(&self, email: &str, password: &str) -> Result<(), SessionError> {
        let epoch = {
            let mut state = self.inner.state();
            match state.session.status {
                SessionStatus::Unauthenticated | SessionStatus::Error => {}
                SessionStatus::Authenticated => {
                    log::warn!("login requested while a session is active");
                    return Err(ErrorKind::Busy.into());
                }
                _ => return Err(ErrorKind::Busy.into()),
            }
            state.session.status = SessionStatus::Authenticating;
            state.session.error = None;
            state.epoch
        };
        let request = SigninRequest {
            email: email.to_string(),
            password: password.to_string(),
        };
        match self.inner.gateway.login(&request).await {
            Ok(response) => {
                let SigninResponse {
                    token,
                    session_id,
                    user,
                    was_logged_in_elsewhere,
                } = response;
                self.inner.commit_authenticated(
                    epoch,
                    StoredCredential { token, session_id },
                    user,
                    Notice::Login {
                        migrated: was_logged_in_elsewhere,
                    },
                )
            }
            Err(kind) => {
                self.inner
                    .fail_authentication(epoch, SessionStatus::Authenticating, kind)
            }
        }
    }

    /// Signs in displacing any other active session for the account. The
    /// local credential is cleared before the network call, so a failed
    /// attempt never leaves the displaced credential behind.
    pub async fn force_login(&self, email: &str, password: &str) -> Result<(), SessionError> {
        let epoch = {
            let mut state = self.inner.state();
            match state.session.status {
                SessionStatus::Authenticating
                | SessionStatus::ForceAuthenticating
                | SessionStatus::LoggingOut => return Err(ErrorKind::Busy.into()),
                _ => {}
            }
            state.epoch += 1;
            state.session.clear();
            state.session.status = SessionStatus::ForceAuthenticating;
            self.inner.scheduler.disarm();
            if let Err(error) = self.inner.store.clear() {
                log::warn!("failed to clear credential store: {error}");
            }
            state.epoch
        };
        let request = SigninRequest {
            email: email.to_string(),
            password: password.to_string(),
        };
        match self.inner.gateway.force_login(&request).await {
            Ok(response) => {
                let SigninResponse {
                    token,
                    session_id,
                    user,
                    ..
                } = response;
                self.inner.commit_authenticated(
                    epoch,
                    StoredCredential { token, session_id },
                    user,
                    Notice::ForceLogin,
                )
            }
            Err(kind) => {
                self.inner
                    .fail_authentication(epoch, SessionStatus::ForceAuthenticating, kind)
            }
        }
    }

    /// Ends the session immediately. The server-side logout is fire and
    /// forget; local state never waits on the network. Calling this on an
    /// already logged-out manager does nothing.
    pub fn logout(&self) {
        let credential = {
            let mut state = self.inner.state();
            if state.session.status == SessionStatus::Unauthenticated
                && state.session.credential.is_none()
            {
                return;
            }
            state.epoch += 1;
            state.session.status = SessionStatus::LoggingOut;
            let credential = state.session.credential.take();
            self.inner.scheduler.disarm();
            if let Err(error) = self.inner.store.clear() {
                log::warn!("failed to clear credential store: {error}");
            }
            state.session.clear();
            credential
        };
        if let Some(sender) = self
            .inner
            .tasks
            .lock()
            .expect("lock poisoned")
            .restore_cancel
            .take()
        {
            let _ = sender.send(());
        }
        if let Some(credential) = credential {
            let gateway = Arc::clone(&self.inner.gateway);
            tokio::spawn(async move {
                if let Err(error) = gateway
                    .logout(&credential.token, &credential.session_id)
                    .await
                {
                    log::debug!("server logout failed (ignored): {error}");
                }
            });
        }
        log::info!("session logged out");
        self.inner
            .notify(NotificationKind::Success, messages::LOGGED_OUT);
    }

    /// Stateless registration pass-through; session state is untouched.
    pub async fn signup(&self, request: &SignupRequest) -> Result<SignupResponse, SessionError> {
        match self.inner.gateway.signup(request).await {
            Ok(response) => {
                let message = if response.requires_verification {
                    messages::SIGNUP_VERIFY
                } else {
                    messages::SIGNUP_COMPLETE
                };
                self.inner.notify(NotificationKind::Success, message);
                Ok(response)
            }
            Err(kind) => {
                self.inner
                    .notify(NotificationKind::Error, &user_message(&kind));
                Err(kind.into())
            }
        }
    }

    /// On-demand authenticated probe. `Ok(false)` means there is no session
    /// the server still honors; if the server rejected the credential the
    /// session has already been ended locally. Network problems surface as
    /// errors without logging anyone out.
    pub async fn check_session(&self) -> Result<bool, SessionError> {
        let (token, epoch) = {
            let state = self.inner.state();
            match (&state.session.credential, state.session.is_authenticated()) {
                (Some(credential), true) => (credential.token.clone(), state.epoch),
                _ => return Ok(false),
            }
        };
        match self.inner.gateway.check_session(&token).await {
            Ok(()) => Ok(true),
            Err(ErrorKind::Unauthorized(_)) => {
                self.inner.expire(ExpiryReason::Invalidated, epoch);
                Ok(false)
            }
            Err(kind) => {
                log::debug!("session check inconclusive: {kind}");
                Err(kind.into())
            }
        }
    }

    /// For the host's own data layer: report a 401 observed on any
    /// authenticated call. Runs the same auto-logout path as a timer
    /// expiry.
    pub fn on_unauthorized(&self) {
        let epoch = {
            let state = self.inner.state();
            if !state.session.is_authenticated() {
                return;
            }
            state.epoch
        };
        self.inner.expire(ExpiryReason::Invalidated, epoch);
    }

    pub async fn request_password_reset(&self, email: &str) -> Result<MessageResponse, SessionError> {
        self.inner
            .gateway
            .request_password_reset(email)
            .await
            .map_err(Into::into)
    }

    pub async fn reset_password(
        &self,
        token: &str,
        new_password: &str,
    ) -> Result<MessageResponse, SessionError> {
        self.inner
            .gateway
            .reset_password(token, new_password)
            .await
            .map_err(Into::into)
    }

    pub async fn verify_email(&self, email: &str, code: &str) -> Result<MessageResponse, SessionError> {
        self.inner
            .gateway
            .verify_email(email, code)
            .await
            .map_err(Into::into)
    }

    /// Reports a user-input signal. Reschedules the inactivity timer
    /// (throttled) and stamps `last_activity_at`.
    pub fn on_activity(&self) {
        self.inner.on_activity();
    }

    /// Reports the application moving to the background.
    pub fn on_background(&self) {
        self.inner.on_background();
    }

    /// Reports the application returning to the foreground.
    pub fn on_foreground(&self) {
        self.inner.on_foreground();
    }

    /// Wires platform observers into the signal entry points. The
    /// subscriptions live until [`dispose`](Self::dispose) or the last
    /// manager handle is dropped.
    pub fn attach_observers(
        &self,
        activity: &dyn ActivityObserver,
        foreground: &dyn ForegroundObserver,
    ) {
        let weak = Arc::downgrade(&self.inner);
        let activity_subscription = activity.subscribe(Arc::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.on_activity();
            }
        }));
        let weak = Arc::downgrade(&self.inner);
        let foreground_subscription = foreground.subscribe(Arc::new(move |visibility| {
            let Some(inner) = weak.upgrade() else { return };
            match visibility {
                Visibility::Foreground => inner.on_foreground(),
                Visibility::Background => inner.on_background(),
            }
        }));
        let mut tasks = self.inner.tasks.lock().expect("lock poisoned");
        tasks.subscriptions.push(activity_subscription);
        tasks.subscriptions.push(foreground_subscription);
    }

    /// Releases background resources: timers, observer subscriptions, the
    /// expiry listener, and any in-flight restore. The session snapshot
    /// stays readable afterwards.
    pub fn dispose(&self) {
        self.inner.shutdown();
    }

    fn register_restore_cancel(&self) -> oneshot::Receiver<()> {
        let (sender, receiver) = oneshot::channel();
        self.inner
            .tasks
            .lock()
            .expect("lock poisoned")
            .restore_cancel = Some(sender);
        receiver
    }

    fn clear_restore_cancel(&self) {
        self.inner
            .tasks
            .lock()
            .expect("lock poisoned")
            .restore_cancel = None;
    }

    async fn fetch_with_retry(
        &self,
        token: &str,
        cancel: &mut oneshot::Receiver<()>,
    ) -> FetchOutcome {
        let mut attempt: u32 = 0;
        loop {
            let result = tokio::select! {
                result = self.inner.gateway.fetch_current_session(token) => result,
                _ = &mut *cancel => return FetchOutcome::Cancelled,
            };
            match result {
                Ok(user) => return FetchOutcome::Fetched(user),
                Err(kind) if kind.is_retryable() && attempt < self.inner.config.max_retries => {
                    attempt += 1;
                    log::warn!(
                        "session restore attempt {attempt} failed ({kind}); retrying in {:?}",
                        self.inner.config.retry_delay
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(self.inner.config.retry_delay) => {}
                        _ = &mut *cancel => return FetchOutcome::Cancelled,
                    }
                }
                Err(kind) => return FetchOutcome::Failed(kind),
            }
        }
    }
}

impl ManagerInner {
    fn state(&self) -> MutexGuard<'_, ManagerState> {
        self.state.lock().expect("lock poisoned")
    }

    fn notify(&self, kind: NotificationKind, message: &str) {
        self.sink
            .notify(kind, message, self.config.notification_duration);
    }

    /// Commits a successful authentication under the state lock, persisting
    /// the credential first so memory and storage cannot disagree.
    fn commit_authenticated(
        &self,
        epoch: u64,
        credential: StoredCredential,
        user: UserProfile,
        notice: Notice,
    ) -> Result<(), SessionError> {
        let committed = {
            let mut state = self.state();
            if state.epoch != epoch {
                log::warn!("discarding authentication result from a superseded attempt");
                return Err(ErrorKind::Busy.into());
            }
            match self.store.save(&credential) {
                Ok(()) => {
                    state.session.status = SessionStatus::Authenticated;
                    state.session.credential = Some(credential);
                    state.session.user = Some(user);
                    state.session.last_activity_at = Some(Utc::now());
                    state.session.error = None;
                    self.scheduler.arm(state.epoch);
                    Ok(())
                }
                Err(error) => {
                    // The server-side session exists but the pair cannot be
                    // made durable; clearing both sides keeps them in
                    // agreement.
                    state.epoch += 1;
                    state.session.clear();
                    state.session.status = SessionStatus::Error;
                    state.session.error = Some(SessionError::Storage(error.clone()));
                    self.scheduler.disarm();
                    if let Err(clear_error) = self.store.clear() {
                        log::warn!("failed to clear credential store: {clear_error}");
                    }
                    Err(SessionError::Storage(error))
                }
            }
        };
        match &committed {
            Ok(()) => {
                log::info!("session authenticated");
                let (kind, message) = match notice {
                    Notice::Login { migrated: true } => {
                        (NotificationKind::Info, messages::LOGIN_MIGRATED)
                    }
                    Notice::Login { migrated: false } => {
                        (NotificationKind::Success, messages::LOGIN_SUCCESS)
                    }
                    Notice::ForceLogin => (NotificationKind::Success, messages::FORCE_LOGIN_SUCCESS),
                    Notice::Restored => (NotificationKind::Info, messages::SESSION_RESTORED),
                };
                self.notify(kind, message);
            }
            Err(SessionError::Storage(_)) => {
                self.notify(NotificationKind::Error, messages::PERSIST_FAILED);
            }
            Err(_) => {}
        }
        committed
    }

    /// Records a failed login/force-login attempt: back to unauthenticated
    /// with `error` set, unless a concurrent transition got there first.
    fn fail_authentication(
        &self,
        epoch: u64,
        expected: SessionStatus,
        kind: ErrorKind,
    ) -> Result<(), SessionError> {
        {
            let mut state = self.state();
            if state.epoch == epoch && state.session.status == expected {
                state.session.status = SessionStatus::Unauthenticated;
                state.session.error = Some(SessionError::Gateway(kind.clone()));
            }
        }
        log::warn!("authentication failed: {kind}");
        let notification = match &kind {
            ErrorKind::SessionConflict(_) => NotificationKind::Warning,
            _ => NotificationKind::Error,
        };
        self.notify(notification, &user_message(&kind));
        Err(kind.into())
    }

    /// Terminal expiry, shared by the timers and the invalidated-session
    /// path. Stale epochs and non-authenticated states are no-ops.
    fn expire(&self, reason: ExpiryReason, epoch: u64) {
        {
            let mut state = self.state();
            if state.epoch != epoch || !state.session.is_authenticated() {
                return;
            }
            state.epoch += 1;
            state.session.clear();
            self.scheduler.disarm();
            if let Err(error) = self.store.clear() {
                log::warn!("failed to clear credential store: {error}");
            }
        }
        log::info!("session expired ({reason:?})");
        let (kind, message) = expiry_notice(reason);
        self.notify(kind, message);
    }

    fn on_activity(&self) {
        let epoch = {
            let mut state = self.state();
            if !state.session.is_authenticated() {
                return;
            }
            state.session.last_activity_at = Some(Utc::now());
            state.epoch
        };
        self.scheduler.on_activity(epoch);
    }

    fn on_background(&self) {
        let epoch = {
            let state = self.state();
            if !state.session.is_authenticated() {
                return;
            }
            state.epoch
        };
        log::debug!("backgrounded; dormancy timer armed");
        self.scheduler.on_background(epoch);
    }

    fn on_foreground(&self) {
        let epoch = {
            let mut state = self.state();
            if !state.session.is_authenticated() {
                return;
            }
            state.session.last_activity_at = Some(Utc::now());
            state.epoch
        };
        log::debug!("foregrounded; inactivity timer restarted");
        self.scheduler.on_foreground(epoch);
    }

    fn shutdown(&self) {
        self.scheduler.disarm();
        if let Ok(mut tasks) = self.tasks.lock() {
            if let Some(sender) = tasks.restore_cancel.take() {
                let _ = sender.send(());
            }
            tasks.subscriptions.clear();
            if let Some(listener) = tasks.expiry_listener.take() {
                listener.abort();
            }
        }
    }
}

impl Drop for ManagerInner {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn spawn_expiry_listener(
    inner: &Arc<ManagerInner>,
    mut events: mpsc::UnboundedReceiver<TimeoutEvent>,
) -> JoinHandle<()> {
    let weak = Arc::downgrade(inner);
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            let Some(inner) = weak.upgrade() else { break };
            inner.expire(event.reason, event.epoch);
        }
    })
}

fn expiry_notice(reason: ExpiryReason) -> (NotificationKind, &'static str) {
    match reason {
        ExpiryReason::Inactivity => (NotificationKind::Warning, messages::EXPIRED_INACTIVITY),
        ExpiryReason::Dormancy => (NotificationKind::Info, messages::EXPIRED_DORMANCY),
        ExpiryReason::Invalidated => (NotificationKind::Warning, messages::SESSION_INVALIDATED),
    }
}

fn user_message(kind: &ErrorKind) -> String {
    match kind {
        ErrorKind::Network(_) => messages::NETWORK_ERROR.to_string(),
        ErrorKind::Unauthorized(message)
        | ErrorKind::Validation(message)
        | ErrorKind::ServerError { message, .. } => message.clone(),
        ErrorKind::SessionConflict(_) => messages::SESSION_CONFLICT.to_string(),
        ErrorKind::Busy => "Another request is already in progress.".to_string(),
    }
}
