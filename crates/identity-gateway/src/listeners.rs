//! Session-change listener registry and subscription disposers.

use crate::Identity;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::debug;

/// Callback type for session change notifications.
pub type SessionListener = Arc<dyn Fn(Option<Identity>) + Send + Sync>;

type ListenerMap = Mutex<BTreeMap<u64, SessionListener>>;

/// Disposer returned by `subscribe_session_changes`.
///
/// The listener stays registered until `unsubscribe` is called or the
/// subscription is dropped.
pub struct Subscription {
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    /// Wrap an arbitrary release action.
    pub fn new(release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            release: Some(Box::new(release)),
        }
    }

    /// Release the listener now.
    pub fn unsubscribe(mut self) {
        self.release_now();
    }

    fn release_now(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release_now();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.release.is_some())
            .finish()
    }
}

/// Ordered fan-out of session changes to registered listeners.
#[derive(Default)]
pub struct ListenerRegistry {
    next_id: AtomicU64,
    listeners: Arc<ListenerMap>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener and return its disposer.
    pub fn subscribe(&self, listener: SessionListener) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.listeners.lock().insert(id, listener);
        debug!(listener_id = id, "Session listener registered");

        let listeners: Weak<ListenerMap> = Arc::downgrade(&self.listeners);
        Subscription::new(move || {
            if let Some(listeners) = listeners.upgrade() {
                listeners.lock().remove(&id);
                debug!(listener_id = id, "Session listener released");
            }
        })
    }

    /// Deliver a session change to every listener, in registration order.
    ///
    /// Listeners are invoked outside the registry lock.
    pub fn emit(&self, identity: Option<Identity>) {
        let listeners: Vec<SessionListener> = self.listeners.lock().values().cloned().collect();
        for listener in listeners {
            listener(identity.clone());
        }
    }

    /// Number of live listeners.
    pub fn len(&self) -> usize {
        self.listeners.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counting_listener(counter: Arc<AtomicUsize>) -> SessionListener {
        Arc::new(move |_: Option<Identity>| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_emit_reaches_all_listeners() {
        let registry = ListenerRegistry::new();
        let count = Arc::new(AtomicUsize::new(0));
        let _a = registry.subscribe(counting_listener(count.clone()));
        let _b = registry.subscribe(counting_listener(count.clone()));

        registry.emit(None);
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let registry = ListenerRegistry::new();
        let count = Arc::new(AtomicUsize::new(0));
        let sub = registry.subscribe(counting_listener(count.clone()));

        sub.unsubscribe();
        registry.emit(Some(Identity::new("u1")));

        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_drop_releases_listener() {
        let registry = ListenerRegistry::new();
        {
            let _sub = registry.subscribe(Arc::new(|_: Option<Identity>| {}));
            assert_eq!(registry.len(), 1);
        }
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn test_subscription_outliving_registry_is_harmless() {
        let registry = ListenerRegistry::new();
        let sub = registry.subscribe(Arc::new(|_: Option<Identity>| {}));
        drop(registry);
        sub.unsubscribe();
    }
}
