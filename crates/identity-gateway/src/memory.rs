//! In-memory identity gateway.
//!
//! Behaves like the hosted SDK from the caller's point of view: sign-in and
//! sign-out emit session changes, profile updates do not, and redirect
//! sign-ins leave a pending result behind. Failures can be scripted per
//! operation, and the startup redirect check or a profile update can be
//! held open to exercise races.

use crate::{
    GatewayError, GatewayResult, Identity, IdentityGateway, ListenerRegistry, ProfilePatch,
    SessionListener, Subscription,
};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::debug;
use uuid::Uuid;

/// Gateway operations that can be scripted to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GatewayOp {
    CreateAccount,
    SignIn,
    Popup,
    Redirect,
    PendingRedirect,
    SignOut,
    PasswordReset,
    UpdateIdentity,
}

/// What a Google popup does when opened.
#[derive(Debug, Clone)]
pub enum PopupBehavior {
    /// Completes as the configured Google identity.
    Complete,
    /// The user closes the popup.
    Cancel,
}

/// Releases a held gateway call.
pub struct CallGate {
    tx: oneshot::Sender<()>,
}

impl CallGate {
    pub fn release(self) {
        let _ = self.tx.send(());
    }
}

struct Account {
    password: String,
    identity: Identity,
}

struct MemoryState {
    accounts: HashMap<String, Account>,
    current: Option<Identity>,
    google_identity: Identity,
    popup: PopupBehavior,
    pending_redirect: Option<Identity>,
    redirect_gate: Option<oneshot::Receiver<()>>,
    update_gate: Option<oneshot::Receiver<()>>,
    failures: HashMap<GatewayOp, VecDeque<GatewayError>>,
    reset_requests: Vec<String>,
}

/// Scriptable in-memory gateway.
#[derive(Clone)]
pub struct MemoryGateway {
    state: Arc<Mutex<MemoryState>>,
    listeners: Arc<ListenerRegistry>,
}

impl Default for MemoryGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MemoryState {
                accounts: HashMap::new(),
                current: None,
                google_identity: Identity::new("google-user")
                    .with_email("google-user@example.com")
                    .with_display_name("Google User")
                    .with_provider("google.com"),
                popup: PopupBehavior::Complete,
                pending_redirect: None,
                redirect_gate: None,
                update_gate: None,
                failures: HashMap::new(),
                reset_requests: Vec::new(),
            })),
            listeners: Arc::new(ListenerRegistry::new()),
        }
    }

    /// Seed an email/password account. Returns the created identity.
    pub fn add_account(&self, email: &str, password: &str) -> Identity {
        let identity = Identity::new(Uuid::new_v4().to_string())
            .with_email(email)
            .with_provider("password");
        self.state.lock().accounts.insert(
            email.to_string(),
            Account {
                password: password.to_string(),
                identity: identity.clone(),
            },
        );
        identity
    }

    /// Identity returned by Google popup/redirect sign-ins.
    pub fn set_google_identity(&self, identity: Identity) {
        self.state.lock().google_identity = identity;
    }

    pub fn set_popup_behavior(&self, behavior: PopupBehavior) {
        self.state.lock().popup = behavior;
    }

    /// Leave a redirect result behind, as if the page just navigated back.
    pub fn set_pending_redirect(&self, identity: Option<Identity>) {
        self.state.lock().pending_redirect = identity;
    }

    /// Hold the next `pending_redirect_result` call until the gate is released.
    pub fn hold_redirect_check(&self) -> CallGate {
        let (tx, rx) = oneshot::channel();
        self.state.lock().redirect_gate = Some(rx);
        CallGate { tx }
    }

    /// Hold the next `update_identity` call until the gate is released.
    pub fn hold_update_identity(&self) -> CallGate {
        let (tx, rx) = oneshot::channel();
        self.state.lock().update_gate = Some(rx);
        CallGate { tx }
    }

    /// Make the next call of `op` fail with `error`.
    pub fn fail_next(&self, op: GatewayOp, error: GatewayError) {
        self.state
            .lock()
            .failures
            .entry(op)
            .or_default()
            .push_back(error);
    }

    /// Deliver a session change to subscribers, as the provider would.
    pub fn emit(&self, identity: Option<Identity>) {
        self.state.lock().current = identity.clone();
        self.listeners.emit(identity);
    }

    /// Identity the provider currently considers signed in.
    pub fn current(&self) -> Option<Identity> {
        self.state.lock().current.clone()
    }

    /// Emails that password resets were sent to.
    pub fn reset_requests(&self) -> Vec<String> {
        self.state.lock().reset_requests.clone()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    fn take_failure(&self, op: GatewayOp) -> GatewayResult<()> {
        let failure = self
            .state
            .lock()
            .failures
            .get_mut(&op)
            .and_then(VecDeque::pop_front);
        match failure {
            Some(error) => {
                debug!(?op, error = %error, "Scripted gateway failure");
                Err(error)
            }
            None => Ok(()),
        }
    }

    fn sign_in_as(&self, identity: Identity) {
        self.emit(Some(identity));
    }
}

impl IdentityGateway for MemoryGateway {
    async fn create_account(&self, email: &str, password: &str) -> GatewayResult<Identity> {
        self.take_failure(GatewayOp::CreateAccount)?;

        let identity = {
            let mut state = self.state.lock();
            if state.accounts.contains_key(email) {
                return Err(GatewayError::AccountExists(
                    "The email address is already in use by another account.".to_string(),
                ));
            }
            let identity = Identity::new(Uuid::new_v4().to_string())
                .with_email(email)
                .with_provider("password");
            state.accounts.insert(
                email.to_string(),
                Account {
                    password: password.to_string(),
                    identity: identity.clone(),
                },
            );
            identity
        };

        self.sign_in_as(identity.clone());
        Ok(identity)
    }

    async fn sign_in(&self, email: &str, password: &str) -> GatewayResult<Identity> {
        self.take_failure(GatewayOp::SignIn)?;

        let identity = {
            let state = self.state.lock();
            match state.accounts.get(email) {
                Some(account) if account.password == password => account.identity.clone(),
                _ => {
                    return Err(GatewayError::InvalidCredentials(
                        "The supplied auth credential is incorrect.".to_string(),
                    ))
                }
            }
        };

        self.sign_in_as(identity.clone());
        Ok(identity)
    }

    async fn sign_in_with_popup(&self) -> GatewayResult<Identity> {
        self.take_failure(GatewayOp::Popup)?;

        let (behavior, identity) = {
            let state = self.state.lock();
            (state.popup.clone(), state.google_identity.clone())
        };
        match behavior {
            PopupBehavior::Cancel => Err(GatewayError::PopupCancelled),
            PopupBehavior::Complete => {
                self.sign_in_as(identity.clone());
                Ok(identity)
            }
        }
    }

    async fn sign_in_with_redirect(&self) -> GatewayResult<()> {
        self.take_failure(GatewayOp::Redirect)?;

        let mut state = self.state.lock();
        state.pending_redirect = Some(state.google_identity.clone());
        Ok(())
    }

    async fn pending_redirect_result(&self) -> GatewayResult<Option<Identity>> {
        let gate = self.state.lock().redirect_gate.take();
        if let Some(gate) = gate {
            let _ = gate.await;
        }

        self.take_failure(GatewayOp::PendingRedirect)?;
        Ok(self.state.lock().pending_redirect.take())
    }

    async fn sign_out(&self) -> GatewayResult<()> {
        self.take_failure(GatewayOp::SignOut)?;
        self.emit(None);
        Ok(())
    }

    async fn send_password_reset(&self, email: &str) -> GatewayResult<()> {
        self.take_failure(GatewayOp::PasswordReset)?;

        let mut state = self.state.lock();
        if !state.accounts.contains_key(email) {
            return Err(GatewayError::Provider {
                code: "auth/user-not-found".to_string(),
                message: "There is no user record corresponding to this identifier.".to_string(),
            });
        }
        state.reset_requests.push(email.to_string());
        Ok(())
    }

    async fn update_identity(&self, patch: &ProfilePatch) -> GatewayResult<()> {
        let gate = self.state.lock().update_gate.take();
        if let Some(gate) = gate {
            let _ = gate.await;
        }

        self.take_failure(GatewayOp::UpdateIdentity)?;

        let mut state = self.state.lock();
        let current = state.current.clone().ok_or(GatewayError::NoCurrentUser)?;
        let updated = current.merged(patch);

        if let Some(email) = &updated.email {
            if let Some(account) = state.accounts.get_mut(email) {
                account.identity = updated.clone();
            }
        }
        state.current = Some(updated);
        Ok(())
    }

    fn subscribe_session_changes(&self, listener: SessionListener) -> Subscription {
        self.listeners.subscribe(listener)
    }
}
