//! Identity Toolkit REST payloads and error mapping.

use crate::{GatewayError, Identity};
use serde::{Deserialize, Serialize};

/// Identity Toolkit v1 base URL.
pub const IDENTITY_TOOLKIT_URL: &str = "https://identitytoolkit.googleapis.com/v1";

/// Secure Token service base URL (ID token refresh).
pub const SECURE_TOKEN_URL: &str = "https://securetoken.googleapis.com/v1";

/// Request body for `accounts:signUp` and `accounts:signInWithPassword`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PasswordRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
    pub return_secure_token: bool,
}

/// Request body for `accounts:sendOobCode`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct OobCodeRequest<'a> {
    pub request_type: &'static str,
    pub email: &'a str,
}

/// Request body for `accounts:update`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct UpdateRequest<'a> {
    pub id_token: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<&'a str>,
    pub return_secure_token: bool,
}

/// Request body for `accounts:signInWithIdp`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct IdpRequest<'a> {
    /// Form-encoded provider credential, e.g. `id_token=...&providerId=google.com`.
    pub post_body: &'a str,
    pub request_uri: &'a str,
    pub return_secure_token: bool,
    pub return_idp_credential: bool,
}

/// Form body for the Google authorization code exchange.
#[derive(Debug, Serialize)]
pub(crate) struct GoogleTokenRequest<'a> {
    pub code: &'a str,
    pub client_id: &'a str,
    #[serde(skip_serializing_if = "str::is_empty")]
    pub client_secret: &'a str,
    pub redirect_uri: &'a str,
    pub code_verifier: &'a str,
    pub grant_type: &'static str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GoogleTokenResponse {
    pub id_token: String,
}

#[derive(Debug, Deserialize)]
struct GoogleTokenError {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// Map a failed Google token exchange.
///
/// `invalid_grant` (expired or reused code) is a rejected credential.
pub fn map_google_token_error(status: u16, body: &str) -> GatewayError {
    match serde_json::from_str::<GoogleTokenError>(body) {
        Ok(err) => {
            let message = err.error_description.unwrap_or_else(|| err.error.clone());
            match err.error.as_str() {
                "invalid_grant" => GatewayError::InvalidCredentials(message),
                other => GatewayError::Provider {
                    code: format!("auth/{}", other.replace('_', "-")),
                    message,
                },
            }
        }
        Err(_) => GatewayError::Provider {
            code: "auth/internal-error".to_string(),
            message: format!("Google token endpoint returned HTTP {}", status),
        },
    }
}

/// Response of `accounts:signInWithIdp`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct IdpResponse {
    #[serde(default)]
    pub local_id: Option<String>,
    #[serde(default)]
    pub id_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub photo_url: Option<String>,
    #[serde(default)]
    pub provider_id: Option<String>,
    #[serde(default)]
    pub is_new_user: Option<bool>,
    #[serde(default)]
    pub need_confirmation: Option<bool>,
    #[serde(default)]
    pub error_message: Option<String>,
}

/// Firebase session minted by a federated sign-in.
#[derive(Debug)]
pub(crate) struct IdpSession {
    pub identity: Identity,
    pub id_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
}

impl IdpResponse {
    /// Validate the response and split it into identity and tokens.
    ///
    /// The endpoint reports some failures with HTTP 200 and an
    /// `errorMessage`.
    pub fn into_session(self) -> Result<IdpSession, GatewayError> {
        if let Some(message) = self.error_message.as_deref() {
            return Err(map_error_message(200, message));
        }
        if self.need_confirmation == Some(true) {
            return Err(GatewayError::Provider {
                code: "auth/account-exists-with-different-credential".to_string(),
                message: "An account already exists with the same email address but different sign-in credentials."
                    .to_string(),
            });
        }

        let (Some(uid), Some(id_token), Some(refresh_token)) =
            (self.local_id, self.id_token, self.refresh_token)
        else {
            return Err(GatewayError::Provider {
                code: "auth/invalid-response".to_string(),
                message: "Identity provider returned no session".to_string(),
            });
        };

        Ok(IdpSession {
            identity: Identity {
                uid,
                display_name: self.display_name.filter(|n| !n.is_empty()),
                email: self.email,
                photo_url: self.photo_url.filter(|p| !p.is_empty()),
                provider_id: Some(self.provider_id.unwrap_or_else(|| "google.com".to_string())),
                metadata: match self.is_new_user {
                    Some(is_new_user) => serde_json::json!({ "is_new_user": is_new_user }),
                    None => serde_json::Value::Null,
                },
            },
            id_token,
            refresh_token,
            expires_in: self.expires_in.as_deref().map(parse_expires_in).unwrap_or(3600),
        })
    }
}

/// Response of the password sign-up / sign-in endpoints.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AuthResponse {
    pub local_id: String,
    pub id_token: String,
    pub refresh_token: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub photo_url: Option<String>,
    /// Seconds, sent as a decimal string.
    pub expires_in: String,
    #[serde(default)]
    pub registered: Option<bool>,
}

impl AuthResponse {
    pub fn identity(&self) -> Identity {
        Identity {
            uid: self.local_id.clone(),
            display_name: self.display_name.clone().filter(|n| !n.is_empty()),
            email: self.email.clone(),
            photo_url: self.photo_url.clone().filter(|p| !p.is_empty()),
            provider_id: Some("password".to_string()),
            metadata: match self.registered {
                Some(registered) => serde_json::json!({ "registered": registered }),
                None => serde_json::Value::Null,
            },
        }
    }

    pub fn expires_in_secs(&self) -> i64 {
        parse_expires_in(&self.expires_in)
    }
}

/// Response of `accounts:update`. Tokens are only present when rotated.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct UpdateResponse {
    #[serde(default)]
    pub id_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<String>,
}

/// Response of the Secure Token refresh endpoint.
#[derive(Debug, Deserialize)]
pub(crate) struct RefreshResponse {
    pub id_token: String,
    pub refresh_token: String,
    pub expires_in: String,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
}

/// Parse Firebase's string-encoded `expiresIn`, defaulting to one hour.
pub(crate) fn parse_expires_in(raw: &str) -> i64 {
    raw.trim().parse().unwrap_or(3600)
}

/// Map a non-success Identity Toolkit response to a gateway error.
///
/// Bodies look like `{"error":{"code":400,"message":"WEAK_PASSWORD : Password should be at least 6 characters"}}`.
pub fn map_error_body(status: u16, body: &str) -> GatewayError {
    let raw = serde_json::from_str::<ErrorEnvelope>(body)
        .map(|envelope| envelope.error.message)
        .unwrap_or_default();
    map_error_message(status, &raw)
}

/// Map an Identity Toolkit error message such as `EMAIL_EXISTS`.
fn map_error_message(status: u16, raw: &str) -> GatewayError {
    let (reason, detail) = match raw.split_once(" : ") {
        Some((reason, detail)) => (reason.trim(), Some(detail.trim())),
        None => (raw.trim(), None),
    };

    match reason {
        "EMAIL_EXISTS" => GatewayError::AccountExists(
            "The email address is already in use by another account.".to_string(),
        ),
        "EMAIL_NOT_FOUND" | "INVALID_PASSWORD" | "INVALID_LOGIN_CREDENTIALS"
        | "INVALID_IDP_RESPONSE" => GatewayError::InvalidCredentials(
            "The supplied auth credential is incorrect.".to_string(),
        ),
        "OPERATION_NOT_ALLOWED" => GatewayError::OperationNotSupported(
            "This sign-in method is disabled for the project.".to_string(),
        ),
        "" => GatewayError::Provider {
            code: "auth/internal-error".to_string(),
            message: format!("Identity provider returned HTTP {}", status),
        },
        other => {
            let message = detail
                .map(str::to_string)
                .unwrap_or_else(|| human_message(other));
            GatewayError::Provider {
                code: auth_code(other),
                message,
            }
        }
    }
}

/// `TOO_MANY_ATTEMPTS_TRY_LATER` -> `auth/too-many-attempts-try-later`.
fn auth_code(reason: &str) -> String {
    match reason {
        "USER_DISABLED" => "auth/user-disabled".to_string(),
        "WEAK_PASSWORD" => "auth/weak-password".to_string(),
        "INVALID_EMAIL" => "auth/invalid-email".to_string(),
        "TOKEN_EXPIRED" | "INVALID_ID_TOKEN" | "CREDENTIAL_TOO_OLD_LOGIN_AGAIN" => {
            "auth/requires-recent-login".to_string()
        }
        other => format!("auth/{}", other.to_ascii_lowercase().replace('_', "-")),
    }
}

fn human_message(reason: &str) -> String {
    match reason {
        "USER_DISABLED" => "The user account has been disabled by an administrator.".to_string(),
        "TOO_MANY_ATTEMPTS_TRY_LATER" => {
            "Access to this account has been temporarily disabled due to many failed login attempts."
                .to_string()
        }
        "INVALID_EMAIL" => "The email address is badly formatted.".to_string(),
        "TOKEN_EXPIRED" | "INVALID_ID_TOKEN" | "CREDENTIAL_TOO_OLD_LOGIN_AGAIN" => {
            "This operation requires a recent sign-in. Sign in again and retry.".to_string()
        }
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(message: &str) -> String {
        serde_json::json!({ "error": { "code": 400, "message": message } }).to_string()
    }

    #[test]
    fn test_email_exists_maps_to_account_exists() {
        let err = map_error_body(400, &body("EMAIL_EXISTS"));
        assert!(matches!(err, GatewayError::AccountExists(_)));
    }

    #[test]
    fn test_login_failures_map_to_invalid_credentials() {
        for reason in ["EMAIL_NOT_FOUND", "INVALID_PASSWORD", "INVALID_LOGIN_CREDENTIALS"] {
            let err = map_error_body(400, &body(reason));
            assert!(matches!(err, GatewayError::InvalidCredentials(_)), "{reason}");
        }
    }

    #[test]
    fn test_detail_suffix_becomes_message() {
        let err = map_error_body(
            400,
            &body("WEAK_PASSWORD : Password should be at least 6 characters"),
        );
        assert_eq!(err.code(), "auth/weak-password");
        assert_eq!(err.to_string(), "Password should be at least 6 characters");
    }

    #[test]
    fn test_unknown_reason_gets_kebab_code() {
        let err = map_error_body(400, &body("TOO_MANY_ATTEMPTS_TRY_LATER"));
        assert_eq!(err.code(), "auth/too-many-attempts-try-later");
    }

    #[test]
    fn test_unparseable_body() {
        let err = map_error_body(503, "<html>unavailable</html>");
        assert_eq!(err.code(), "auth/internal-error");
        assert!(err.to_string().contains("503"));
    }

    #[test]
    fn test_google_invalid_grant_is_rejected_credential() {
        let err = map_google_token_error(
            400,
            r#"{"error":"invalid_grant","error_description":"Bad Request"}"#,
        );
        assert!(matches!(err, GatewayError::InvalidCredentials(ref m) if m == "Bad Request"));
    }

    #[test]
    fn test_idp_error_message_in_200_response() {
        let response: IdpResponse = serde_json::from_value(serde_json::json!({
            "errorMessage": "INVALID_IDP_RESPONSE : bad token"
        }))
        .unwrap();
        assert!(matches!(
            response.into_session(),
            Err(GatewayError::InvalidCredentials(_))
        ));
    }

    #[test]
    fn test_idp_need_confirmation() {
        let response: IdpResponse = serde_json::from_value(serde_json::json!({
            "localId": "abc",
            "needConfirmation": true
        }))
        .unwrap();
        let err = response.into_session().unwrap_err();
        assert_eq!(err.code(), "auth/account-exists-with-different-credential");
    }

    #[test]
    fn test_auth_response_identity() {
        let response: AuthResponse = serde_json::from_value(serde_json::json!({
            "localId": "abc",
            "idToken": "id",
            "refreshToken": "refresh",
            "email": "a@example.com",
            "displayName": "",
            "expiresIn": "3600",
            "registered": true
        }))
        .unwrap();

        let identity = response.identity();
        assert_eq!(identity.uid, "abc");
        assert!(identity.display_name.is_none());
        assert_eq!(response.expires_in_secs(), 3600);
    }
}
