//! Firebase Auth gateway over the Identity Toolkit REST API.
//!
//! Email/password flows, password reset and profile updates call the REST
//! endpoints directly. Google sign-in runs a loopback OAuth flow against
//! Google and trades the resulting Google ID token for a Firebase session
//! with `accounts:signInWithIdp`. The provider session is persisted on disk
//! so that the first session-change event after startup reflects the
//! previous run, the way the browser SDK restores its persisted user.

use crate::federated::{
    random_token, CallbackServer, PkceChallenge, GOOGLE_AUTH_URL, GOOGLE_TOKEN_URL,
};
use crate::firebase_api::{
    map_error_body, map_google_token_error, parse_expires_in, AuthResponse, GoogleTokenRequest,
    GoogleTokenResponse, IdpRequest, IdpResponse, OobCodeRequest, PasswordRequest,
    RefreshResponse, UpdateRequest, UpdateResponse, IDENTITY_TOOLKIT_URL, SECURE_TOKEN_URL,
};
use crate::persistence::{PendingRedirect, SessionPersistence, StoredSession};
use crate::{
    GatewayError, GatewayResult, Identity, IdentityGateway, ListenerRegistry, ProfilePatch,
    SessionListener, Subscription,
};
use chrono::Utc;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Provider id used for Google sign-in.
const GOOGLE_PROVIDER_ID: &str = "google.com";

/// Refresh ID tokens this long before they expire.
const TOKEN_EXPIRY_SKEW_SECS: i64 = 60;

/// Invoked with the consent page URL when a Google sign-in starts.
pub type BrowserLauncher = Arc<dyn Fn(&str) + Send + Sync>;

/// Firebase project settings needed by the gateway.
#[derive(Debug, Clone)]
pub struct FirebaseConfig {
    /// Web API key (public).
    pub api_key: String,
    /// OAuth client id of the project's desktop Google client.
    pub google_client_id: String,
    /// Secret of the desktop client. Google does not treat it as
    /// confidential for installed apps.
    pub google_client_secret: String,
    /// Local port for the sign-in callback server.
    pub callback_port: u16,
    /// How long a Google sign-in may take.
    pub callback_timeout_secs: u64,
}

/// A Google sign-in waiting for its callback.
struct GoogleSignIn {
    server: CallbackServer,
    pkce: PkceChallenge,
    state: String,
    url: String,
}

/// Identity gateway backed by Firebase Auth.
#[derive(Clone)]
pub struct FirebaseRestGateway {
    http_client: reqwest::Client,
    config: FirebaseConfig,
    identity_toolkit_url: String,
    secure_token_url: String,
    google_auth_url: String,
    google_token_url: String,
    persistence: SessionPersistence,
    session: Arc<Mutex<Option<StoredSession>>>,
    listeners: Arc<ListenerRegistry>,
    redirect_results: Arc<watch::Sender<u64>>,
    launcher: BrowserLauncher,
}

impl FirebaseRestGateway {
    /// Create a gateway, restoring any persisted provider session.
    pub fn new(config: FirebaseConfig, persistence: SessionPersistence) -> GatewayResult<Self> {
        let restored = persistence.load_session()?;
        if let Some(session) = &restored {
            debug!(uid = %session.identity.uid, "Restored persisted provider session");
        }

        let (redirect_results, _) = watch::channel(0);
        Ok(Self {
            http_client: reqwest::Client::new(),
            config,
            identity_toolkit_url: IDENTITY_TOOLKIT_URL.to_string(),
            secure_token_url: SECURE_TOKEN_URL.to_string(),
            google_auth_url: GOOGLE_AUTH_URL.to_string(),
            google_token_url: GOOGLE_TOKEN_URL.to_string(),
            persistence,
            session: Arc::new(Mutex::new(restored)),
            listeners: Arc::new(ListenerRegistry::new()),
            redirect_results: Arc::new(redirect_results),
            launcher: Arc::new(|url: &str| {
                info!(url = %url, "Open this URL in a browser to continue sign-in");
            }),
        })
    }

    /// Point the gateway at other endpoints, such as the Auth emulator
    /// (`http://localhost:9099/identitytoolkit.googleapis.com/v1`).
    pub fn with_endpoints(
        mut self,
        identity_toolkit_url: impl Into<String>,
        secure_token_url: impl Into<String>,
    ) -> Self {
        self.identity_toolkit_url = identity_toolkit_url.into();
        self.secure_token_url = secure_token_url.into();
        self
    }

    /// Point Google OAuth at other authorization and token endpoints.
    pub fn with_google_endpoints(
        mut self,
        auth_url: impl Into<String>,
        token_url: impl Into<String>,
    ) -> Self {
        self.google_auth_url = auth_url.into();
        self.google_token_url = token_url.into();
        self
    }

    /// Replace how the consent page is opened.
    pub fn with_browser_launcher(mut self, launcher: BrowserLauncher) -> Self {
        self.launcher = launcher;
        self
    }

    /// Identity of the persisted provider session, if any.
    pub fn current_identity(&self) -> Option<Identity> {
        self.session.lock().as_ref().map(|s| s.identity.clone())
    }

    /// Ticks each time a redirect sign-in records its result, success or
    /// failure.
    pub fn redirect_results(&self) -> watch::Receiver<u64> {
        self.redirect_results.subscribe()
    }

    fn toolkit_url(&self, method: &str) -> String {
        format!(
            "{}/accounts:{}?key={}",
            self.identity_toolkit_url, method, self.config.api_key
        )
    }

    async fn post_json<B: Serialize + ?Sized, R: DeserializeOwned>(
        &self,
        url: &str,
        body: &B,
    ) -> GatewayResult<R> {
        let response = self
            .http_client
            .post(url)
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!(status = %status, "Identity provider rejected request");
            return Err(map_error_body(status.as_u16(), &body));
        }

        Ok(response.json().await?)
    }

    /// Persist a new provider session and announce it.
    fn establish(
        &self,
        identity: Identity,
        id_token: String,
        refresh_token: String,
        expires_in: i64,
    ) -> GatewayResult<()> {
        let session = StoredSession {
            identity: identity.clone(),
            id_token,
            refresh_token,
            expires_at: Utc::now() + chrono::Duration::seconds(expires_in),
        };
        self.persistence.save_session(&session)?;
        *self.session.lock() = Some(session);

        info!(uid = %identity.uid, "Provider session established");
        self.listeners.emit(Some(identity));
        Ok(())
    }

    /// Current ID token, refreshed first when it is about to expire.
    async fn valid_id_token(&self) -> GatewayResult<String> {
        let session = self.session.lock().clone().ok_or(GatewayError::NoCurrentUser)?;

        if !session.is_expired(chrono::Duration::seconds(TOKEN_EXPIRY_SKEW_SECS)) {
            return Ok(session.id_token);
        }

        debug!(uid = %session.identity.uid, "ID token expired, refreshing");
        let url = format!("{}/token?key={}", self.secure_token_url, self.config.api_key);
        let refreshed: RefreshResponse = self
            .post_json(
                &url,
                &serde_json::json!({
                    "grant_type": "refresh_token",
                    "refresh_token": session.refresh_token,
                }),
            )
            .await?;

        let updated = StoredSession {
            identity: session.identity,
            id_token: refreshed.id_token.clone(),
            refresh_token: refreshed.refresh_token,
            expires_at: Utc::now()
                + chrono::Duration::seconds(parse_expires_in(&refreshed.expires_in)),
        };
        self.persistence.save_session(&updated)?;
        *self.session.lock() = Some(updated);

        Ok(refreshed.id_token)
    }

    async fn password_flow(
        &self,
        method: &str,
        email: &str,
        password: &str,
    ) -> GatewayResult<Identity> {
        let response: AuthResponse = self
            .post_json(
                &self.toolkit_url(method),
                &PasswordRequest {
                    email,
                    password,
                    return_secure_token: true,
                },
            )
            .await?;

        let identity = response.identity();
        let expires_in = response.expires_in_secs();
        self.establish(
            identity.clone(),
            response.id_token,
            response.refresh_token,
            expires_in,
        )?;
        Ok(identity)
    }

    fn begin_google_sign_in(&self) -> GatewayResult<GoogleSignIn> {
        if self.config.google_client_id.trim().is_empty() {
            return Err(GatewayError::OperationNotSupported(
                "Google sign-in needs a Google OAuth client id".to_string(),
            ));
        }

        let server = CallbackServer::new(self.config.callback_port, self.config.callback_timeout_secs);
        let pkce = PkceChallenge::generate();
        let state = random_token();
        let url = server.authorization_url(
            &self.google_auth_url,
            &self.config.google_client_id,
            &pkce,
            &state,
        )?;

        Ok(GoogleSignIn {
            server,
            pkce,
            state,
            url,
        })
    }

    async fn finish_google_sign_in(&self, flow: GoogleSignIn) -> GatewayResult<Identity> {
        let code = flow
            .server
            .wait_for_callback(&flow.state)
            .await?
            .into_result()?;
        self.complete_google_sign_in(&code, &flow.server.callback_url(), &flow.pkce.verifier)
            .await
    }

    /// Redeem an authorization code and sign in to Firebase with the result.
    async fn complete_google_sign_in(
        &self,
        code: &str,
        redirect_uri: &str,
        code_verifier: &str,
    ) -> GatewayResult<Identity> {
        let response = self
            .http_client
            .post(&self.google_token_url)
            .form(&GoogleTokenRequest {
                code,
                client_id: &self.config.google_client_id,
                client_secret: &self.config.google_client_secret,
                redirect_uri,
                code_verifier,
                grant_type: "authorization_code",
            })
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!(status = %status, "Google rejected authorization code");
            return Err(map_google_token_error(status.as_u16(), &body));
        }
        let google: GoogleTokenResponse = response.json().await?;

        self.sign_in_with_google_id_token(&google.id_token, redirect_uri)
            .await
    }

    async fn sign_in_with_google_id_token(
        &self,
        google_id_token: &str,
        request_uri: &str,
    ) -> GatewayResult<Identity> {
        let post_body = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("id_token", google_id_token)
            .append_pair("providerId", GOOGLE_PROVIDER_ID)
            .finish();

        let response: IdpResponse = self
            .post_json(
                &self.toolkit_url("signInWithIdp"),
                &IdpRequest {
                    post_body: &post_body,
                    request_uri,
                    return_secure_token: true,
                    return_idp_credential: true,
                },
            )
            .await?;

        let session = response.into_session()?;
        let identity = session.identity.clone();
        self.establish(
            session.identity,
            session.id_token,
            session.refresh_token,
            session.expires_in,
        )?;
        Ok(identity)
    }
}

fn transport_error(e: reqwest::Error) -> GatewayError {
    if e.is_connect() || e.is_timeout() {
        GatewayError::NetworkUnavailable(e.to_string())
    } else {
        GatewayError::Http(e)
    }
}

impl IdentityGateway for FirebaseRestGateway {
    async fn create_account(&self, email: &str, password: &str) -> GatewayResult<Identity> {
        self.password_flow("signUp", email, password).await
    }

    async fn sign_in(&self, email: &str, password: &str) -> GatewayResult<Identity> {
        self.password_flow("signInWithPassword", email, password).await
    }

    async fn sign_in_with_popup(&self) -> GatewayResult<Identity> {
        let flow = self.begin_google_sign_in()?;
        (self.launcher)(&flow.url);
        self.finish_google_sign_in(flow).await
    }

    async fn sign_in_with_redirect(&self) -> GatewayResult<()> {
        let flow = self.begin_google_sign_in()?;
        let url = flow.url.clone();

        let gateway = self.clone();
        tokio::spawn(async move {
            let pending = match gateway.finish_google_sign_in(flow).await {
                Ok(identity) => PendingRedirect::Success { identity },
                Err(e) => PendingRedirect::Failure {
                    code: e.code().to_string(),
                    message: e.to_string(),
                },
            };

            if let Err(e) = gateway.persistence.store_pending_redirect(&pending) {
                warn!(error = %e, "Failed to record redirect sign-in result");
            }
            gateway.redirect_results.send_modify(|count| *count += 1);
        });

        (self.launcher)(&url);
        Ok(())
    }

    async fn pending_redirect_result(&self) -> GatewayResult<Option<Identity>> {
        match self.persistence.take_pending_redirect()? {
            Some(pending) => pending.into_result().map(Some),
            None => Ok(None),
        }
    }

    async fn sign_out(&self) -> GatewayResult<()> {
        self.persistence.clear_session()?;
        *self.session.lock() = None;

        info!("Provider session cleared");
        self.listeners.emit(None);
        Ok(())
    }

    async fn send_password_reset(&self, email: &str) -> GatewayResult<()> {
        let _: serde_json::Value = self
            .post_json(
                &self.toolkit_url("sendOobCode"),
                &OobCodeRequest {
                    request_type: "PASSWORD_RESET",
                    email,
                },
            )
            .await?;
        Ok(())
    }

    async fn update_identity(&self, patch: &ProfilePatch) -> GatewayResult<()> {
        let id_token = self.valid_id_token().await?;

        let response: UpdateResponse = self
            .post_json(
                &self.toolkit_url("update"),
                &UpdateRequest {
                    id_token: &id_token,
                    display_name: patch.display_name.as_deref(),
                    photo_url: patch.photo_url.as_deref(),
                    return_secure_token: true,
                },
            )
            .await?;

        let updated = {
            let mut guard = self.session.lock();
            let session = guard.as_mut().ok_or(GatewayError::NoCurrentUser)?;
            session.identity = session.identity.merged(patch);
            if let (Some(id_token), Some(refresh_token)) = (response.id_token, response.refresh_token)
            {
                session.id_token = id_token;
                session.refresh_token = refresh_token;
                let expires_in = response
                    .expires_in
                    .as_deref()
                    .map(parse_expires_in)
                    .unwrap_or(3600);
                session.expires_at = Utc::now() + chrono::Duration::seconds(expires_in);
            }
            session.clone()
        };
        self.persistence.save_session(&updated)?;

        debug!(uid = %updated.identity.uid, "Profile updated");
        Ok(())
    }

    fn subscribe_session_changes(&self, listener: SessionListener) -> Subscription {
        let subscription = self.listeners.subscribe(listener.clone());
        // The restored session (or its absence) is the first event.
        listener(self.current_identity());
        subscription
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;
    use wiremock::matchers::{body_partial_json, body_string_contains, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config() -> FirebaseConfig {
        FirebaseConfig {
            api_key: "test-key".to_string(),
            google_client_id: "client-1.apps.googleusercontent.com".to_string(),
            google_client_secret: "client-secret".to_string(),
            callback_port: 9876,
            callback_timeout_secs: 1,
        }
    }

    fn persistence(dir: &std::path::Path) -> SessionPersistence {
        SessionPersistence::new(dir.join("session.json"), dir.join("pending-redirect.json"))
    }

    fn recorded_uids(gateway: &FirebaseRestGateway) -> (Arc<Mutex<Vec<Option<String>>>>, Subscription) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let subscription =
            gateway.subscribe_session_changes(Arc::new(move |identity: Option<Identity>| {
                sink.lock().push(identity.map(|i| i.uid));
            }));
        (seen, subscription)
    }

    fn mocked_gateway(server: &MockServer, dir: &std::path::Path) -> FirebaseRestGateway {
        FirebaseRestGateway::new(config(), persistence(dir))
            .unwrap()
            .with_endpoints(format!("{}/v1", server.uri()), format!("{}/v1", server.uri()))
            .with_google_endpoints(
                format!("{}/o/oauth2/v2/auth", server.uri()),
                format!("{}/oauth/token", server.uri()),
            )
    }

    #[test]
    fn test_toolkit_url() {
        let dir = tempdir().unwrap();
        let gateway = FirebaseRestGateway::new(config(), persistence(dir.path())).unwrap();
        assert_eq!(
            gateway.toolkit_url("signUp"),
            "https://identitytoolkit.googleapis.com/v1/accounts:signUp?key=test-key"
        );
    }

    #[test]
    fn test_subscribe_delivers_restored_session_first() {
        let dir = tempdir().unwrap();
        let store = persistence(dir.path());
        store
            .save_session(&StoredSession {
                identity: Identity::new("restored"),
                id_token: "id".into(),
                refresh_token: "refresh".into(),
                expires_at: Utc::now() + chrono::Duration::hours(1),
            })
            .unwrap();

        let gateway = FirebaseRestGateway::new(config(), store).unwrap();
        let (seen, _sub) = recorded_uids(&gateway);

        assert_eq!(*seen.lock(), vec![Some("restored".to_string())]);
    }

    #[tokio::test]
    async fn test_sign_up_persists_then_emits() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/accounts:signUp"))
            .and(query_param("key", "test-key"))
            .and(body_partial_json(serde_json::json!({
                "email": "ada@example.com",
                "returnSecureToken": true
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "localId": "uid-ada",
                "email": "ada@example.com",
                "idToken": "id-1",
                "refreshToken": "refresh-1",
                "expiresIn": "3600"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempdir().unwrap();
        let gateway = mocked_gateway(&server, dir.path());
        let (seen, _sub) = recorded_uids(&gateway);

        let identity = gateway
            .create_account("ada@example.com", "secret1")
            .await
            .unwrap();

        assert_eq!(identity.uid, "uid-ada");
        assert_eq!(identity.provider_id.as_deref(), Some("password"));
        assert_eq!(*seen.lock(), vec![None, Some("uid-ada".to_string())]);

        let stored = persistence(dir.path()).load_session().unwrap().unwrap();
        assert_eq!(stored.identity.uid, "uid-ada");
        assert_eq!(stored.id_token, "id-1");
        assert!(dir.path().join("session.json").exists());
    }

    #[tokio::test]
    async fn test_email_exists_response_is_account_exists() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/accounts:signUp"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": { "code": 400, "message": "EMAIL_EXISTS" }
            })))
            .mount(&server)
            .await;

        let dir = tempdir().unwrap();
        let gateway = mocked_gateway(&server, dir.path());
        let (seen, _sub) = recorded_uids(&gateway);

        let err = gateway
            .create_account("taken@example.com", "secret1")
            .await
            .unwrap_err();

        assert!(matches!(err, GatewayError::AccountExists(_)));
        assert_eq!(*seen.lock(), vec![None]);
        assert!(persistence(dir.path()).load_session().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unreachable_provider_is_network_unavailable() {
        let dir = tempdir().unwrap();
        let gateway = FirebaseRestGateway::new(config(), persistence(dir.path()))
            .unwrap()
            .with_endpoints("http://127.0.0.1:9/v1", "http://127.0.0.1:9/v1");

        let err = gateway.sign_in("a@example.com", "pw").await.unwrap_err();
        assert!(err.is_network(), "{err:?}");
    }

    #[tokio::test]
    async fn test_update_refreshes_expired_token_first() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/token"))
            .and(body_partial_json(serde_json::json!({
                "grant_type": "refresh_token",
                "refresh_token": "refresh-old"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id_token": "id-fresh",
                "refresh_token": "refresh-fresh",
                "expires_in": "3600"
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/accounts:update"))
            .and(body_partial_json(serde_json::json!({
                "idToken": "id-fresh",
                "displayName": "Ada"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "localId": "uid-ada",
                "displayName": "Ada",
                "idToken": "id-rotated",
                "refreshToken": "refresh-rotated",
                "expiresIn": "3600"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempdir().unwrap();
        let store = persistence(dir.path());
        store
            .save_session(&StoredSession {
                identity: Identity::new("uid-ada"),
                id_token: "id-old".into(),
                refresh_token: "refresh-old".into(),
                expires_at: Utc::now() - chrono::Duration::minutes(5),
            })
            .unwrap();
        let gateway = mocked_gateway(&server, dir.path());

        gateway
            .update_identity(&ProfilePatch::display_name("Ada"))
            .await
            .unwrap();

        let stored = store.load_session().unwrap().unwrap();
        assert_eq!(stored.identity.display_name.as_deref(), Some("Ada"));
        assert_eq!(stored.id_token, "id-rotated");
        assert_eq!(stored.refresh_token, "refresh-rotated");
        assert!(!stored.is_expired(chrono::Duration::seconds(TOKEN_EXPIRY_SKEW_SECS)));
    }

    #[tokio::test]
    async fn test_google_code_is_exchanged_through_sign_in_with_idp() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .and(body_string_contains("grant_type=authorization_code"))
            .and(body_string_contains("code_verifier=verifier-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "google-access",
                "id_token": "google-id-token",
                "expires_in": 3599,
                "token_type": "Bearer"
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/accounts:signInWithIdp"))
            .and(body_partial_json(serde_json::json!({
                "postBody": "id_token=google-id-token&providerId=google.com",
                "requestUri": "http://127.0.0.1:9876/callback",
                "returnSecureToken": true
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "providerId": "google.com",
                "localId": "uid-g",
                "email": "g@example.com",
                "displayName": "Grace",
                "idToken": "firebase-id",
                "refreshToken": "firebase-refresh",
                "expiresIn": "3600",
                "isNewUser": true
            })))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempdir().unwrap();
        let gateway = mocked_gateway(&server, dir.path());
        let (seen, _sub) = recorded_uids(&gateway);

        let identity = gateway
            .complete_google_sign_in("auth-code", "http://127.0.0.1:9876/callback", "verifier-1")
            .await
            .unwrap();

        assert_eq!(identity.uid, "uid-g");
        assert_eq!(identity.display_name.as_deref(), Some("Grace"));
        assert_eq!(identity.provider_id.as_deref(), Some("google.com"));
        assert_eq!(*seen.lock(), vec![None, Some("uid-g".to_string())]);
    }

    #[tokio::test]
    async fn test_reused_google_code_is_invalid_credentials() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": "invalid_grant",
                "error_description": "Bad Request"
            })))
            .mount(&server)
            .await;

        let dir = tempdir().unwrap();
        let gateway = mocked_gateway(&server, dir.path());

        let err = gateway
            .complete_google_sign_in("used-code", "http://127.0.0.1:9876/callback", "v")
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::InvalidCredentials(_)));
        assert!(gateway.current_identity().is_none());
    }

    #[tokio::test]
    async fn test_google_sign_in_needs_client_id() {
        let dir = tempdir().unwrap();
        let gateway = FirebaseRestGateway::new(
            FirebaseConfig {
                google_client_id: String::new(),
                ..config()
            },
            persistence(dir.path()),
        )
        .unwrap();

        let err = gateway.sign_in_with_popup().await.unwrap_err();
        assert!(matches!(err, GatewayError::OperationNotSupported(_)));
    }

    #[tokio::test]
    async fn test_sign_out_clears_and_emits() {
        let dir = tempdir().unwrap();
        let gateway = FirebaseRestGateway::new(config(), persistence(dir.path())).unwrap();
        let events = Arc::new(AtomicUsize::new(0));
        let counter = events.clone();
        let _sub = gateway.subscribe_session_changes(Arc::new(move |_: Option<Identity>| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        gateway.sign_out().await.unwrap();

        // Initial delivery plus the sign-out event.
        assert_eq!(events.load(Ordering::SeqCst), 2);
        assert!(gateway.current_identity().is_none());
    }

    #[tokio::test]
    async fn test_update_without_session_fails() {
        let dir = tempdir().unwrap();
        let gateway = FirebaseRestGateway::new(config(), persistence(dir.path())).unwrap();
        let err = gateway
            .update_identity(&ProfilePatch::display_name("x"))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::NoCurrentUser));
    }

    #[tokio::test]
    async fn test_pending_redirect_result_reads_record() {
        let dir = tempdir().unwrap();
        let store = persistence(dir.path());
        store
            .store_pending_redirect(&PendingRedirect::Success {
                identity: Identity::new("u2"),
            })
            .unwrap();

        let gateway = FirebaseRestGateway::new(config(), store).unwrap();
        let first = gateway.pending_redirect_result().await.unwrap();
        assert_eq!(first.map(|i| i.uid), Some("u2".to_string()));
        assert!(gateway.pending_redirect_result().await.unwrap().is_none());
    }
}
