use std::time::Duration;

/// How long a foregrounded session may sit without user activity.
pub const INACTIVITY_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// How long a backgrounded session survives before it is ended.
pub const DORMANCY_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Pause between attempts when session restore hits a transient failure.
pub const AUTH_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Extra attempts after the first one fails (three calls in total).
pub const MAX_AUTH_RETRIES: u32 = 2;

/// Activity signals closer together than this collapse into one reschedule.
pub const ACTIVITY_THROTTLE: Duration = Duration::from_secs(1);

pub const NOTIFICATION_DURATION: Duration = Duration::from_millis(4000);

/// Tunable knobs for [`crate::session::SessionManager`].
///
/// `Default` carries the production values; tests swap in short windows.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub inactivity_timeout: Duration,
    pub dormancy_timeout: Duration,
    pub retry_delay: Duration,
    pub max_retries: u32,
    pub activity_throttle: Duration,
    pub notification_duration: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            inactivity_timeout: INACTIVITY_TIMEOUT,
            dormancy_timeout: DORMANCY_TIMEOUT,
            retry_delay: AUTH_RETRY_DELAY,
            max_retries: MAX_AUTH_RETRIES,
            activity_throttle: ACTIVITY_THROTTLE,
            notification_duration: NOTIFICATION_DURATION,
        }
    }
}
