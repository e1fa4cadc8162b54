//! Uniform result shape of every auth operation.

use crate::AuthError;
use identity_gateway::Identity;
use serde::Serialize;

/// Result of a controller operation.
///
/// Either `success` is true or `error_message` is present. A cancelled popup
/// is the one exception: it fails with no message so views stay quiet.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperationOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity: Option<Identity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<AuthError>,
    /// Completion happens later, through the redirect check.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub deferred: bool,
}

impl OperationOutcome {
    /// Successful outcome, optionally carrying the resulting identity.
    pub fn succeeded(identity: Option<Identity>) -> Self {
        Self {
            success: true,
            identity,
            error_message: None,
            error: None,
            deferred: false,
        }
    }

    /// Successful start of a flow that completes after navigation.
    pub fn deferred() -> Self {
        Self {
            deferred: true,
            ..Self::succeeded(None)
        }
    }

    /// Failed outcome. Empty messages fall back to `fallback`.
    pub fn failed(error: AuthError, fallback: &str) -> Self {
        let error_message = error.user_message().map(|message| {
            if message.trim().is_empty() {
                fallback.to_string()
            } else {
                message
            }
        });

        Self {
            success: false,
            identity: None,
            error_message,
            error: Some(error),
            deferred: false,
        }
    }

    /// True for failures that must not be surfaced (cancelled popup).
    pub fn is_silent_failure(&self) -> bool {
        !self.success && self.error_message.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_message_uses_fallback() {
        let outcome = OperationOutcome::failed(
            AuthError::UnknownGatewayError(String::new()),
            "Login failed",
        );
        assert!(!outcome.success);
        assert_eq!(outcome.error_message.as_deref(), Some("Login failed"));
    }

    #[test]
    fn test_cancelled_popup_is_silent() {
        let outcome = OperationOutcome::failed(AuthError::PopupCancelled, "Google sign-in failed");
        assert!(outcome.is_silent_failure());
        assert_eq!(outcome.error, Some(AuthError::PopupCancelled));
    }

    #[test]
    fn test_serialized_shape() {
        let json = serde_json::to_value(OperationOutcome::deferred()).unwrap();
        assert_eq!(json, serde_json::json!({ "success": true, "deferred": true }));

        let json = serde_json::to_value(OperationOutcome::failed(
            AuthError::NotAuthenticated,
            "Update failed",
        ))
        .unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "success": false,
                "error_message": "NotAuthenticated",
                "error": { "kind": "not_authenticated" }
            })
        );
    }
}
