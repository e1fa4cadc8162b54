//! Loopback Google OAuth for Firebase sign-in.
//!
//! The browser is sent to Google's consent page with a PKCE challenge and a
//! `redirect_uri` of `http://127.0.0.1:<port>/callback`. Google redirects
//! back with an authorization `code` (or an `error`), which the gateway
//! exchanges for a Google ID token and then for a Firebase session through
//! `accounts:signInWithIdp`.

use crate::{GatewayError, GatewayResult};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing::{debug, error, info};
use url::Url;

/// Google OAuth 2.0 authorization endpoint.
pub const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";

/// Google OAuth 2.0 token endpoint.
pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

const GOOGLE_SCOPES: &str = "openid email profile";

/// PKCE verifier and its S256 challenge.
#[derive(Debug, Clone)]
pub struct PkceChallenge {
    pub verifier: String,
    pub challenge: String,
}

impl PkceChallenge {
    pub fn generate() -> Self {
        Self::from_verifier(random_token())
    }

    pub fn from_verifier(verifier: String) -> Self {
        let challenge = URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()));
        Self {
            verifier,
            challenge,
        }
    }
}

/// 32 random bytes, base64url encoded.
pub fn random_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Outcome of one callback request.
#[derive(Debug, Clone, PartialEq)]
pub enum CallbackOutcome {
    Code(String),
    Failure { code: String, message: String },
}

impl CallbackOutcome {
    pub fn into_result(self) -> GatewayResult<String> {
        match self {
            CallbackOutcome::Code(code) => Ok(code),
            CallbackOutcome::Failure { code, message } => {
                Err(GatewayError::from_code(&code, message))
            }
        }
    }
}

/// One-shot HTTP listener that waits for the OAuth redirect.
#[derive(Debug, Clone)]
pub struct CallbackServer {
    port: u16,
    timeout_secs: u64,
}

impl CallbackServer {
    pub fn new(port: u16, timeout_secs: u64) -> Self {
        Self { port, timeout_secs }
    }

    /// Loopback redirect URI registered with Google.
    pub fn callback_url(&self) -> String {
        format!("http://127.0.0.1:{}/callback", self.port)
    }

    /// Google consent page URL for this callback.
    pub fn authorization_url(
        &self,
        auth_endpoint: &str,
        client_id: &str,
        pkce: &PkceChallenge,
        state: &str,
    ) -> GatewayResult<String> {
        let url = Url::parse_with_params(
            auth_endpoint,
            &[
                ("client_id", client_id),
                ("redirect_uri", self.callback_url().as_str()),
                ("response_type", "code"),
                ("scope", GOOGLE_SCOPES),
                ("state", state),
                ("code_challenge", pkce.challenge.as_str()),
                ("code_challenge_method", "S256"),
                ("prompt", "select_account"),
            ],
        )
        .map_err(|e| GatewayError::Provider {
            code: "auth/invalid-oauth-endpoint".to_string(),
            message: format!("Invalid OAuth endpoint {}: {}", auth_endpoint, e),
        })?;
        Ok(url.to_string())
    }

    /// Bind the port and wait for a single callback carrying `state`, or time
    /// out.
    ///
    /// The caller is responsible for opening the browser to the consent page.
    pub async fn wait_for_callback(&self, state: &str) -> GatewayResult<CallbackOutcome> {
        let addr = format!("127.0.0.1:{}", self.port);
        let listener = TcpListener::bind(&addr).await?;

        info!(port = self.port, "Sign-in callback server listening");

        let (tx, rx) = oneshot::channel::<CallbackOutcome>();
        let tx = Arc::new(tokio::sync::Mutex::new(Some(tx)));
        let state: Arc<str> = Arc::from(state);

        let server_handle = tokio::spawn({
            let tx = tx.clone();
            async move {
                loop {
                    match listener.accept().await {
                        Ok((mut socket, _)) => {
                            let tx = tx.clone();
                            let state = state.clone();
                            tokio::spawn(async move {
                                if let Err(e) = handle_connection(&mut socket, &state, tx).await {
                                    error!("Error handling callback connection: {}", e);
                                }
                            });
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                            break;
                        }
                    }
                }
            }
        });

        let timeout = tokio::time::Duration::from_secs(self.timeout_secs);
        let result = tokio::time::timeout(timeout, rx).await;
        server_handle.abort();

        match result {
            Ok(Ok(outcome)) => Ok(outcome),
            Ok(Err(_)) => Err(GatewayError::Provider {
                code: "auth/internal-error".to_string(),
                message: "Callback channel closed".to_string(),
            }),
            Err(_) => Err(GatewayError::Timeout),
        }
    }
}

async fn handle_connection(
    socket: &mut tokio::net::TcpStream,
    expected_state: &str,
    tx: Arc<tokio::sync::Mutex<Option<oneshot::Sender<CallbackOutcome>>>>,
) -> GatewayResult<()> {
    let (reader, mut writer) = socket.split();
    let mut reader = BufReader::new(reader);
    let mut request_line = String::new();
    reader.read_line(&mut request_line).await?;

    debug!(request = %request_line.trim(), "Received callback request");

    // GET /callback?... HTTP/1.1
    let Some(rest) = request_line.strip_prefix("GET ") else {
        send_response(&mut writer, 405, "Method Not Allowed", "Method Not Allowed").await?;
        return Ok(());
    };
    let path = rest.split(" HTTP/").next().unwrap_or(rest);

    if !path.starts_with("/callback") {
        send_response(&mut writer, 404, "Not Found", "Not Found").await?;
        return Ok(());
    }

    let query = path.split_once('?').map(|(_, q)| q).unwrap_or("");
    let outcome = parse_callback_query(query, expected_state);

    let page = match &outcome {
        CallbackOutcome::Code(_) => result_page("Signed in", "You can close this window."),
        CallbackOutcome::Failure { message, .. } => result_page("Sign-in failed", message),
    };
    send_response(&mut writer, 200, "OK", &page).await?;

    if let Some(tx) = tx.lock().await.take() {
        let _ = tx.send(outcome);
    }

    Ok(())
}

/// Interpret the query string of an OAuth redirect.
///
/// `access_denied` means the user backed out of the consent page and maps
/// to a cancelled popup.
pub fn parse_callback_query(query: &str, expected_state: &str) -> CallbackOutcome {
    let params: HashMap<String, String> = url::form_urlencoded::parse(query.as_bytes())
        .into_owned()
        .collect();

    if params.get("state").map(String::as_str) != Some(expected_state) {
        return CallbackOutcome::Failure {
            code: "auth/invalid-callback".to_string(),
            message: "Sign-in state did not match".to_string(),
        };
    }

    if let Some(error) = params.get("error") {
        let message = params
            .get("error_description")
            .cloned()
            .unwrap_or_else(|| error.clone());
        let code = match error.as_str() {
            "access_denied" => "auth/popup-closed-by-user".to_string(),
            other => format!("auth/{}", other.replace('_', "-")),
        };
        return CallbackOutcome::Failure { code, message };
    }

    match params.get("code") {
        Some(code) if !code.is_empty() => CallbackOutcome::Code(code.clone()),
        _ => CallbackOutcome::Failure {
            code: "auth/invalid-callback".to_string(),
            message: "Missing authorization code".to_string(),
        },
    }
}

async fn send_response(
    writer: &mut tokio::net::tcp::WriteHalf<'_>,
    status_code: u16,
    status_text: &str,
    body: &str,
) -> GatewayResult<()> {
    let response = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: text/html\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status_code,
        status_text,
        body.len(),
        body
    );
    writer.write_all(response.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

fn result_page(title: &str, detail: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head><title>Hireboard - {title}</title></head>
<body style="font-family: system-ui; text-align: center; padding: 50px;">
<h1>{title}</h1>
<p>{detail}</p>
</body>
</html>"#
    )
}
