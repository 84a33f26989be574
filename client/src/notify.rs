use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    Success,
    Error,
    Warning,
    Info,
}

/// Receives lifecycle events for display. Rendering is the host's concern;
/// the manager only emits typed events and never waits on the sink, so
/// implementations must be quick and non-blocking.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, kind: NotificationKind, message: &str, duration: Duration);
}

/// Default sink forwarding notifications to the `log` facade, for headless
/// hosts and examples.
pub struct LogNotificationSink;

impl NotificationSink for LogNotificationSink {
    fn notify(&self, kind: NotificationKind, message: &str, _duration: Duration) {
        match kind {
            NotificationKind::Success | NotificationKind::Info => log::info!("{message}"),
            NotificationKind::Warning => log::warn!("{message}"),
            NotificationKind::Error => log::error!("{message}"),
        }
    }
}

/// User-facing texts for every lifecycle transition that notifies.
pub(crate) mod messages {
    pub const LOGIN_SUCCESS: &str = "Welcome back! Login successful.";
    pub const LOGIN_MIGRATED: &str =
        "You have been logged out from your previous device and logged in here.";
    pub const FORCE_LOGIN_SUCCESS: &str =
        "Login successful. Your previous session was terminated.";
    pub const SESSION_RESTORED: &str = "Session restored. Welcome back.";
    pub const RESTORE_FAILED: &str = "Failed to authenticate. Please login again.";
    pub const LOGGED_OUT: &str = "You have been successfully logged out.";
    pub const EXPIRED_INACTIVITY: &str = "Session expired due to inactivity. Please login again.";
    pub const EXPIRED_DORMANCY: &str =
        "Session ended for security (screen off or app in background).";
    pub const SESSION_INVALIDATED: &str =
        "Your session was terminated (logged in from another device).";
    pub const SESSION_CONFLICT: &str =
        "Another session is active for this account. Confirm to log it out.";
    pub const SIGNUP_VERIFY: &str =
        "Registration successful! Please check your email for verification.";
    pub const SIGNUP_COMPLETE: &str = "Signup successful! Please log in.";
    pub const NETWORK_ERROR: &str = "Network error. Please check your connection and try again.";
    pub const PERSIST_FAILED: &str =
        "Could not save your session on this device. Please login again.";
}
