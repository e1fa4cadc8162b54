//! On-disk persistence for the REST gateway's session and redirect state.

use crate::{GatewayError, GatewayResult, Identity};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Provider session persisted between runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredSession {
    pub identity: Identity,
    pub id_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
}

impl StoredSession {
    /// True when the ID token is expired or expires within `skew`.
    pub fn is_expired(&self, skew: chrono::Duration) -> bool {
        Utc::now() + skew >= self.expires_at
    }
}

/// Result of a redirect sign-in that completed while the caller was away.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PendingRedirect {
    Success { identity: Identity },
    Failure { code: String, message: String },
}

impl PendingRedirect {
    pub fn into_result(self) -> GatewayResult<Identity> {
        match self {
            PendingRedirect::Success { identity } => Ok(identity),
            PendingRedirect::Failure { code, message } => {
                Err(GatewayError::from_code(&code, message))
            }
        }
    }
}

/// JSON files backing the REST gateway.
#[derive(Debug, Clone)]
pub struct SessionPersistence {
    session_path: PathBuf,
    redirect_path: PathBuf,
}

impl SessionPersistence {
    pub fn new(session_path: impl Into<PathBuf>, redirect_path: impl Into<PathBuf>) -> Self {
        Self {
            session_path: session_path.into(),
            redirect_path: redirect_path.into(),
        }
    }

    pub fn load_session(&self) -> GatewayResult<Option<StoredSession>> {
        read_json(&self.session_path)
    }

    pub fn save_session(&self, session: &StoredSession) -> GatewayResult<()> {
        write_json(&self.session_path, session)
    }

    pub fn clear_session(&self) -> GatewayResult<()> {
        remove_if_exists(&self.session_path)
    }

    pub fn store_pending_redirect(&self, pending: &PendingRedirect) -> GatewayResult<()> {
        write_json(&self.redirect_path, pending)
    }

    /// Read and delete the pending redirect record.
    pub fn take_pending_redirect(&self) -> GatewayResult<Option<PendingRedirect>> {
        let pending = read_json(&self.redirect_path)?;
        if pending.is_some() {
            remove_if_exists(&self.redirect_path)?;
        }
        Ok(pending)
    }
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> GatewayResult<Option<T>> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(GatewayError::Io(e)),
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> GatewayResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = serde_json::to_string_pretty(value)?;
    std::fs::write(path, content)?;
    debug!(path = %path.display(), "Persisted gateway state");
    Ok(())
}

fn remove_if_exists(path: &Path) -> GatewayResult<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(GatewayError::Io(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn persistence(dir: &Path) -> SessionPersistence {
        SessionPersistence::new(dir.join("session.json"), dir.join("pending-redirect.json"))
    }

    #[test]
    fn test_missing_files_read_as_none() {
        let dir = tempdir().unwrap();
        let store = persistence(dir.path());
        assert!(store.load_session().unwrap().is_none());
        assert!(store.take_pending_redirect().unwrap().is_none());
    }

    #[test]
    fn test_clear_session_removes_file() {
        let dir = tempdir().unwrap();
        let store = persistence(dir.path());
        store
            .save_session(&StoredSession {
                identity: Identity::new("u1"),
                id_token: "id".into(),
                refresh_token: "refresh".into(),
                expires_at: Utc::now() + chrono::Duration::hours(1),
            })
            .unwrap();
        assert!(store.load_session().unwrap().is_some());

        store.clear_session().unwrap();
        assert!(store.load_session().unwrap().is_none());
        store.clear_session().unwrap();
    }

    #[test]
    fn test_pending_redirect_is_taken_once() {
        let dir = tempdir().unwrap();
        let store = persistence(dir.path());
        store
            .store_pending_redirect(&PendingRedirect::Success {
                identity: Identity::new("u2"),
            })
            .unwrap();

        let first = store.take_pending_redirect().unwrap().unwrap();
        assert_eq!(first.into_result().unwrap().uid, "u2");
        assert!(store.take_pending_redirect().unwrap().is_none());
    }

    #[test]
    fn test_pending_failure_maps_code() {
        let failure = PendingRedirect::Failure {
            code: "auth/popup-closed-by-user".into(),
            message: String::new(),
        };
        assert!(matches!(
            failure.into_result(),
            Err(GatewayError::PopupCancelled)
        ));
    }

    #[test]
    fn test_expiry_with_skew() {
        let session = StoredSession {
            identity: Identity::new("u1"),
            id_token: "id".into(),
            refresh_token: "refresh".into(),
            expires_at: Utc::now() + chrono::Duration::seconds(30),
        };
        assert!(!session.is_expired(chrono::Duration::zero()));
        assert!(session.is_expired(chrono::Duration::minutes(1)));
    }
}
