//! Gateway error types.

use thiserror::Error;

/// Error raised by an identity provider gateway.
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Wrong email/password pair, unknown account, or rejected federated token.
    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),

    /// An account with this email already exists.
    #[error("Account exists: {0}")]
    AccountExists(String),

    /// The provider could not be reached.
    #[error("Network unavailable: {0}")]
    NetworkUnavailable(String),

    /// The user closed the sign-in popup before completing it.
    #[error("Popup closed by user")]
    PopupCancelled,

    /// The runtime environment cannot perform this flow (e.g. redirects).
    #[error("Operation not supported in this environment: {0}")]
    OperationNotSupported(String),

    /// The operation needs a signed-in user and there is none.
    #[error("No user signed in")]
    NoCurrentUser,

    /// Any other provider-reported failure.
    #[error("{message}")]
    Provider { code: String, message: String },

    /// HTTP request error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Timeout error
    #[error("Operation timed out")]
    Timeout,
}

impl GatewayError {
    /// Provider-style error code (`auth/...`), as the hosted SDK reports it.
    pub fn code(&self) -> &str {
        match self {
            GatewayError::InvalidCredentials(_) => "auth/invalid-credential",
            GatewayError::AccountExists(_) => "auth/email-already-in-use",
            GatewayError::NetworkUnavailable(_) => "auth/network-request-failed",
            GatewayError::PopupCancelled => "auth/popup-closed-by-user",
            GatewayError::OperationNotSupported(_) => {
                "auth/operation-not-supported-in-this-environment"
            }
            GatewayError::NoCurrentUser => "auth/no-current-user",
            GatewayError::Provider { code, .. } => code,
            GatewayError::Http(_) => "auth/network-request-failed",
            GatewayError::Json(_) => "auth/invalid-response",
            GatewayError::Io(_) => "auth/internal-error",
            GatewayError::Timeout => "auth/timeout",
        }
    }

    /// Returns true if the failure came from the transport, not the provider.
    pub fn is_network(&self) -> bool {
        match self {
            GatewayError::NetworkUnavailable(_) | GatewayError::Timeout => true,
            GatewayError::Http(e) => e.is_connect() || e.is_timeout(),
            _ => false,
        }
    }

    /// Build a gateway error from a provider-side code such as
    /// `auth/popup-closed-by-user`.
    pub fn from_code(code: &str, message: impl Into<String>) -> Self {
        let message = message.into();
        match code {
            "auth/popup-closed-by-user" | "auth/cancelled-popup-request" => {
                GatewayError::PopupCancelled
            }
            "auth/operation-not-supported-in-this-environment" => {
                GatewayError::OperationNotSupported(message)
            }
            "auth/network-request-failed" => GatewayError::NetworkUnavailable(message),
            "auth/email-already-in-use" => GatewayError::AccountExists(message),
            "auth/invalid-credential" | "auth/wrong-password" | "auth/user-not-found" => {
                GatewayError::InvalidCredentials(message)
            }
            other => GatewayError::Provider {
                code: other.to_string(),
                message,
            },
        }
    }
}

/// Result type alias using GatewayError.
pub type GatewayResult<T> = Result<T, GatewayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_popup_codes_map_to_cancelled() {
        assert!(matches!(
            GatewayError::from_code("auth/popup-closed-by-user", ""),
            GatewayError::PopupCancelled
        ));
        assert!(matches!(
            GatewayError::from_code("auth/cancelled-popup-request", ""),
            GatewayError::PopupCancelled
        ));
    }

    #[test]
    fn test_unknown_code_is_provider_error() {
        let err = GatewayError::from_code("auth/user-disabled", "The user account has been disabled");
        assert_eq!(err.code(), "auth/user-disabled");
        assert_eq!(err.to_string(), "The user account has been disabled");
    }

    #[test]
    fn test_is_network() {
        assert!(GatewayError::Timeout.is_network());
        assert!(GatewayError::NetworkUnavailable("offline".into()).is_network());
        assert!(!GatewayError::PopupCancelled.is_network());
        assert!(!GatewayError::InvalidCredentials("bad".into()).is_network());
    }
}
