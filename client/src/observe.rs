use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

pub type ActivityHandler = Arc<dyn Fn() + Send + Sync>;
pub type VisibilityHandler = Arc<dyn Fn(Visibility) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Foreground,
    Background,
}

/// Source of user-input signals (pointer, keyboard, scroll, touch —
/// whatever the platform has). Implementations may pre-coalesce bursts;
/// the session manager throttles again on its side.
pub trait ActivityObserver: Send + Sync {
    fn subscribe(&self, handler: ActivityHandler) -> Subscription;
}

/// Source of foreground/background transitions (tab visibility, app
/// lifecycle, screen off).
pub trait ForegroundObserver: Send + Sync {
    fn subscribe(&self, handler: VisibilityHandler) -> Subscription;
}

/// Live registration with an observer. Cancelling (or dropping) it
/// unsubscribes; no handler invocation starts after `cancel` returns.
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    pub fn cancel(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

static NEXT_SUBSCRIPTION_ID: AtomicU64 = AtomicU64::new(1);

type Registry<H> = Arc<Mutex<Vec<(u64, H)>>>;

/// Thread-safe fan-out implementing both observer traits. Platform adapters
/// translate their native input and visibility events into `emit_activity`
/// and `emit_visibility` calls.
///
/// Handlers run under the registry lock: keep them quick and do not call
/// back into the relay from inside one.
#[derive(Default)]
pub struct SignalRelay {
    activity: Registry<ActivityHandler>,
    visibility: Registry<VisibilityHandler>,
}

impl SignalRelay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emit_activity(&self) {
        for (_, handler) in self.activity.lock().expect("lock poisoned").iter() {
            handler();
        }
    }

    pub fn emit_visibility(&self, visibility: Visibility) {
        for (_, handler) in self.visibility.lock().expect("lock poisoned").iter() {
            handler(visibility);
        }
    }
}

fn register<H: Send + 'static>(registry: &Registry<H>, handler: H) -> Subscription {
    let id = NEXT_SUBSCRIPTION_ID.fetch_add(1, Ordering::Relaxed);
    registry.lock().expect("lock poisoned").push((id, handler));
    let registry = Arc::clone(registry);
    Subscription::new(move || {
        registry
            .lock()
            .expect("lock poisoned")
            .retain(|(entry, _)| *entry != id);
    })
}

impl ActivityObserver for SignalRelay {
    fn subscribe(&self, handler: ActivityHandler) -> Subscription {
        register(&self.activity, handler)
    }
}

impl ForegroundObserver for SignalRelay {
    fn subscribe(&self, handler: VisibilityHandler) -> Subscription {
        register(&self.visibility, handler)
    }
}
