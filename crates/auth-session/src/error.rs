//! Authentication error taxonomy exposed to views.

use identity_gateway::GatewayError;
use serde::Serialize;
use thiserror::Error;

/// Classified failure of an auth operation.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum AuthError {
    /// Wrong email/password or rejected credential
    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),

    /// Email already registered
    #[error("Account exists: {0}")]
    AccountExists(String),

    /// Provider unreachable (transient, can retry)
    #[error("Network unavailable: {0}")]
    NetworkUnavailable(String),

    /// User closed the Google popup. Never surfaced.
    #[error("Popup closed by user")]
    PopupCancelled,

    /// Operation requires a signed-in identity
    #[error("Not authenticated")]
    NotAuthenticated,

    /// Anything else the provider reported, message passed through
    #[error("{0}")]
    UnknownGatewayError(String),
}

impl AuthError {
    /// Returns true if this failure must not be shown to the user.
    pub fn is_silent(&self) -> bool {
        matches!(self, AuthError::PopupCancelled)
    }

    /// Message a view should display, or `None` for silent failures.
    ///
    /// Empty provider messages come back as `Some("")`; callers substitute an
    /// operation-specific fallback.
    pub fn user_message(&self) -> Option<String> {
        match self {
            AuthError::InvalidCredentials(message)
            | AuthError::AccountExists(message)
            | AuthError::NetworkUnavailable(message)
            | AuthError::UnknownGatewayError(message) => Some(message.clone()),
            AuthError::PopupCancelled => None,
            AuthError::NotAuthenticated => Some("NotAuthenticated".to_string()),
        }
    }
}

impl From<GatewayError> for AuthError {
    fn from(err: GatewayError) -> Self {
        if err.is_network() {
            return AuthError::NetworkUnavailable(match err {
                GatewayError::NetworkUnavailable(message) => message,
                other => other.to_string(),
            });
        }

        match err {
            GatewayError::InvalidCredentials(message) => AuthError::InvalidCredentials(message),
            GatewayError::AccountExists(message) => AuthError::AccountExists(message),
            GatewayError::PopupCancelled => AuthError::PopupCancelled,
            GatewayError::NoCurrentUser => AuthError::NotAuthenticated,
            other => AuthError::UnknownGatewayError(other.to_string()),
        }
    }
}

/// Result type alias using AuthError.
pub type AuthResult<T> = Result<T, AuthError>;
