//! Session store: single source of truth for who is signed in.

use identity_gateway::Identity;
use serde::Serialize;
use tokio::sync::watch;

/// Current identity paired with the readiness flag.
///
/// `settled == false` means "unknown", not "signed out".
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Session {
    pub identity: Option<Identity>,
    pub settled: bool,
}

impl Session {
    pub fn is_authenticated(&self) -> bool {
        self.identity.is_some()
    }

    pub fn uid(&self) -> Option<&str> {
        self.identity.as_ref().map(|identity| identity.uid.as_str())
    }
}

/// Owner of the session value.
///
/// Writes are crate-private so only the controller mutates the session.
/// Everything else reads through [`SessionReader`].
#[derive(Debug)]
pub struct SessionStore {
    tx: watch::Sender<Session>,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    /// Create a store holding an unsettled, signed-out session.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(Session::default());
        Self { tx }
    }

    pub fn reader(&self) -> SessionReader {
        SessionReader {
            rx: self.tx.subscribe(),
        }
    }

    pub fn snapshot(&self) -> Session {
        self.tx.borrow().clone()
    }

    /// Apply `modify`, notifying readers only when it returns true.
    pub(crate) fn update(&self, modify: impl FnOnce(&mut Session) -> bool) -> bool {
        self.tx.send_if_modified(modify)
    }

    /// Overwrite the identity and mark the session settled.
    pub(crate) fn settle_with(&self, identity: Option<Identity>) -> bool {
        self.update(|session| {
            if session.settled && session.identity == identity {
                return false;
            }
            session.identity = identity;
            session.settled = true;
            true
        })
    }

    /// Mark the session settled without touching the identity.
    pub(crate) fn mark_settled(&self) -> bool {
        self.update(|session| !std::mem::replace(&mut session.settled, true))
    }

    /// Overwrite the identity, leaving readiness as it is.
    pub(crate) fn set_identity(&self, identity: Option<Identity>) -> bool {
        self.update(|session| {
            if session.identity == identity {
                return false;
            }
            session.identity = identity;
            true
        })
    }
}

/// Read-only handle on the session.
#[derive(Debug, Clone)]
pub struct SessionReader {
    rx: watch::Receiver<Session>,
}

impl SessionReader {
    pub fn snapshot(&self) -> Session {
        self.rx.borrow().clone()
    }

    pub fn identity(&self) -> Option<Identity> {
        self.rx.borrow().identity.clone()
    }

    pub fn settled(&self) -> bool {
        self.rx.borrow().settled
    }

    pub fn is_authenticated(&self) -> bool {
        self.rx.borrow().is_authenticated()
    }

    /// Wait for the next change. Returns `None` once the store is gone.
    pub async fn changed(&mut self) -> Option<Session> {
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().clone())
    }

    /// Wait until the session is settled and return it.
    ///
    /// If the store is dropped first, the last value is returned as is.
    pub async fn wait_until_settled(&self) -> Session {
        let mut rx = self.rx.clone();
        let settled = rx.wait_for(|session| session.settled).await.map(|s| s.clone());
        match settled {
            Ok(session) => session,
            Err(_) => rx.borrow().clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_session_is_unsettled_and_signed_out() {
        let store = SessionStore::new();
        let session = store.snapshot();
        assert!(!session.settled);
        assert!(!session.is_authenticated());
    }

    #[test]
    fn test_unchanged_values_do_not_notify() {
        let store = SessionStore::new();
        assert!(store.settle_with(Some(Identity::new("u1"))));
        assert!(!store.settle_with(Some(Identity::new("u1"))));
        assert!(!store.set_identity(Some(Identity::new("u1"))));
        assert!(store.set_identity(None));
    }

    #[test]
    fn test_set_identity_keeps_readiness() {
        let store = SessionStore::new();
        store.set_identity(Some(Identity::new("u1")));
        let session = store.snapshot();
        assert_eq!(session.uid(), Some("u1"));
        assert!(!session.settled);
    }

    #[tokio::test]
    async fn test_reader_sees_changes() {
        let store = SessionStore::new();
        let mut reader = store.reader();

        store.settle_with(None);
        let session = reader.changed().await.unwrap();
        assert!(session.settled);
        assert!(!session.is_authenticated());
    }

    #[tokio::test]
    async fn test_wait_until_settled() {
        let store = SessionStore::new();
        let reader = store.reader();

        let waiter = tokio::spawn(async move { reader.wait_until_settled().await });
        tokio::task::yield_now().await;
        store.settle_with(Some(Identity::new("u1")));

        let session = waiter.await.unwrap();
        assert_eq!(session.uid(), Some("u1"));
    }

    #[tokio::test]
    async fn test_changed_ends_when_store_dropped() {
        let store = SessionStore::new();
        let mut reader = store.reader();
        drop(store);
        assert!(reader.changed().await.is_none());
    }
}
