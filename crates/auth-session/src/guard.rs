//! Route guard for protected views.

use crate::{Session, SessionReader};
use serde::Serialize;

/// Path unauthenticated visitors are sent to.
pub const DEFAULT_LOGIN_PATH: &str = "/login";

/// What to do with a request for a protected view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum GuardDecision {
    /// Session not resolved yet; show a neutral loading state.
    Loading,
    /// Signed in; render the protected content.
    Render,
    /// Signed out; replace the current location with the login page.
    RedirectToLogin {
        to: String,
        replace: bool,
        return_to: String,
    },
}

/// Three-way guard decision for `requested_path`.
///
/// An unsettled session always yields `Loading`, whatever its identity.
pub fn decide(session: &Session, login_path: &str, requested_path: &str) -> GuardDecision {
    if !session.settled {
        GuardDecision::Loading
    } else if session.is_authenticated() {
        GuardDecision::Render
    } else {
        GuardDecision::RedirectToLogin {
            to: login_path.to_string(),
            replace: true,
            return_to: requested_path.to_string(),
        }
    }
}

/// Guard bound to a session reader and a login path.
#[derive(Debug, Clone)]
pub struct RouteGuard {
    reader: SessionReader,
    login_path: String,
}

impl RouteGuard {
    pub fn new(reader: SessionReader) -> Self {
        Self::with_login_path(reader, DEFAULT_LOGIN_PATH)
    }

    pub fn with_login_path(reader: SessionReader, login_path: impl Into<String>) -> Self {
        Self {
            reader,
            login_path: login_path.into(),
        }
    }

    pub fn login_path(&self) -> &str {
        &self.login_path
    }

    /// Decide from the current session, which may still be loading.
    pub fn check(&self, requested_path: &str) -> GuardDecision {
        decide(&self.reader.snapshot(), &self.login_path, requested_path)
    }

    /// Wait for the session to settle, then decide. Never returns `Loading`.
    pub async fn resolve(&self, requested_path: &str) -> GuardDecision {
        let session = self.reader.wait_until_settled().await;
        decide(&session, &self.login_path, requested_path)
    }
}
