//! Auth session controller.
//!
//! Bridges an [`IdentityGateway`] and the [`SessionStore`]. On start it
//! subscribes to the provider's session-change stream and runs a single
//! pending-redirect check in the background. Every operation returns an
//! [`OperationOutcome`]; gateway errors never reach the caller as `Err`.
//!
//! All session writes go through one publish lock, which also guards the
//! readiness FSM:
//! - stream events overwrite the identity and settle the session
//! - a redirect result only applies while nothing has settled the session
//!   and no identity is present
//! - identities delivered during a named registration are held until the
//!   name has been applied; the event still settles the session and a
//!   sign-out is applied at once
//! - after shutdown nothing is written

use crate::readiness::{Readiness, ReadinessInput, ReadinessMachine};
use crate::{
    AuthError, AuthResult, OperationOutcome, RouteGuard, Session, SessionReader, SessionStore,
};
use identity_gateway::{
    FederatedCompletion, GatewayError, Identity, IdentityGateway, ProfilePatch, Subscription,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const REGISTRATION_FAILED: &str = "Registration failed";
const LOGIN_FAILED: &str = "Login failed";
const GOOGLE_SIGN_IN_FAILED: &str = "Google sign-in failed";
const LOGOUT_FAILED: &str = "Logout failed";
const PASSWORD_RESET_FAILED: &str = "Password reset failed";
const UPDATE_FAILED: &str = "Update failed";

/// How Google sign-in completes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoogleSignInStrategy {
    /// Completes within the call.
    #[default]
    Popup,
    /// Navigates away; completion arrives via the stream or redirect check.
    Redirect,
}

impl GoogleSignInStrategy {
    pub fn from_redirect_flag(use_redirect: bool) -> Self {
        if use_redirect {
            GoogleSignInStrategy::Redirect
        } else {
            GoogleSignInStrategy::Popup
        }
    }
}

/// Progress of the startup redirect check.
#[derive(Debug, Clone, PartialEq)]
pub enum RedirectCheck {
    Pending,
    Completed(OperationOutcome),
    /// The controller shut down before the check finished.
    Cancelled,
}

/// State guarded by the publish lock.
struct Arbiter {
    readiness: ReadinessMachine,
    held_registrations: usize,
    /// Latest identity delivered while a named registration was in flight.
    held_event: Option<Identity>,
}

struct Shared {
    store: SessionStore,
    arbiter: Mutex<Arbiter>,
    active: AtomicBool,
    redirect_check: watch::Sender<RedirectCheck>,
}

impl Shared {
    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    fn on_session_event(&self, identity: Option<Identity>) {
        let mut arbiter = self.arbiter.lock();
        if !self.is_active() {
            debug!("Ignoring session event after shutdown");
            return;
        }

        match identity {
            // The identity may be the new account before its name is applied.
            Some(identity) if arbiter.held_registrations > 0 => {
                debug!(uid = %identity.uid, "Holding identity until registration completes");
                let _ = arbiter.readiness.consume(&ReadinessInput::StreamDelivered);
                self.store.mark_settled();
                arbiter.held_event = Some(identity);
            }
            identity => {
                arbiter.held_event = None;
                self.apply_stream_event(&mut arbiter, identity);
            }
        }
    }

    fn apply_stream_event(&self, arbiter: &mut Arbiter, identity: Option<Identity>) {
        // Accepted in every state.
        let _ = arbiter.readiness.consume(&ReadinessInput::StreamDelivered);

        let uid = identity.as_ref().map(|i| i.uid.clone());
        if self.store.settle_with(identity) {
            debug!(uid = ?uid, "Session updated from provider stream");
        }
    }

    /// Publish an operation result. Readiness is left alone.
    fn publish_identity(&self, identity: Option<Identity>) {
        let _arbiter = self.arbiter.lock();
        if !self.is_active() {
            return;
        }
        self.store.set_identity(identity);
    }

    /// Apply a pending redirect result if the session is still unresolved.
    fn apply_redirect_result(&self, identity: &Identity) -> bool {
        let mut arbiter = self.arbiter.lock();
        if !self.is_active() {
            return false;
        }

        let settled = Readiness::from(arbiter.readiness.state()).is_settled();
        if settled || self.store.snapshot().is_authenticated() {
            debug!(uid = %identity.uid, "Session already resolved, redirect result is informational");
            return false;
        }

        if arbiter
            .readiness
            .consume(&ReadinessInput::RedirectResolved)
            .is_err()
        {
            return false;
        }
        self.store.settle_with(Some(identity.clone()));
        true
    }

    /// Republish the current identity with `patch` applied, if `uid` is
    /// still the one signed in.
    fn publish_profile(&self, uid: &str, patch: &ProfilePatch) {
        let _arbiter = self.arbiter.lock();
        if !self.is_active() {
            return;
        }

        let current = self.store.snapshot().identity;
        match current {
            Some(identity) if identity.uid == uid => {
                self.store.set_identity(Some(identity.merged(patch)));
            }
            _ => debug!(uid = %uid, "Session changed during profile update, not republishing"),
        }
    }

    fn begin_hold(&self) {
        self.arbiter.lock().held_registrations += 1;
    }

    /// End a registration hold. `named` is the identity to publish on success.
    fn end_hold(&self, named: Option<&Identity>) {
        let mut arbiter = self.arbiter.lock();
        arbiter.held_registrations = arbiter.held_registrations.saturating_sub(1);
        if !self.is_active() {
            arbiter.held_event = None;
            return;
        }

        let Some(named) = named else {
            if arbiter.held_registrations == 0 {
                if let Some(held) = arbiter.held_event.take() {
                    self.apply_stream_event(&mut arbiter, Some(held));
                }
            }
            return;
        };

        if arbiter.held_registrations > 0 {
            // Another registration still holds the stream.
            let held_same = matches!(&arbiter.held_event, Some(held) if held.uid == named.uid);
            if held_same {
                arbiter.held_event = Some(named.clone());
            } else {
                self.store.set_identity(Some(named.clone()));
            }
            return;
        }

        match arbiter.held_event.take() {
            // The provider's event for the new account, minus the name.
            Some(held) if held.uid == named.uid => {
                self.apply_stream_event(&mut arbiter, Some(named.clone()));
            }
            Some(other) => {
                self.store.set_identity(Some(named.clone()));
                self.apply_stream_event(&mut arbiter, Some(other));
            }
            None => {
                self.store.set_identity(Some(named.clone()));
            }
        }
    }

    fn finish_redirect_check(&self, outcome: OperationOutcome) {
        self.redirect_check.send_if_modified(|check| {
            if matches!(check, RedirectCheck::Pending) {
                *check = RedirectCheck::Completed(outcome);
                true
            } else {
                false
            }
        });
    }
}

/// Holds stream events for the duration of a named registration.
///
/// Dropping it without `release` (e.g. the caller's future was dropped)
/// ends the hold as a failure.
struct StreamHold<'a> {
    shared: &'a Shared,
    released: bool,
}

impl<'a> StreamHold<'a> {
    fn begin(shared: &'a Shared) -> Self {
        shared.begin_hold();
        Self {
            shared,
            released: false,
        }
    }

    fn release(mut self, named: Option<&Identity>) {
        self.released = true;
        self.shared.end_hold(named);
    }
}

impl Drop for StreamHold<'_> {
    fn drop(&mut self) {
        if !self.released {
            self.shared.end_hold(None);
        }
    }
}

/// Owner of the session and the provider subscription.
pub struct AuthSessionController<G: IdentityGateway + 'static> {
    gateway: Arc<G>,
    shared: Arc<Shared>,
    subscription: Mutex<Option<Subscription>>,
    redirect_task: Mutex<Option<JoinHandle<()>>>,
}

impl<G: IdentityGateway + 'static> AuthSessionController<G> {
    /// Start a controller with a fresh store.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(gateway: Arc<G>) -> Self {
        Self::start_with_store(gateway, SessionStore::new())
    }

    /// Start a controller that takes ownership of `store`.
    pub fn start_with_store(gateway: Arc<G>, store: SessionStore) -> Self {
        let (redirect_check, _) = watch::channel(RedirectCheck::Pending);
        let shared = Arc::new(Shared {
            store,
            arbiter: Mutex::new(Arbiter {
                readiness: ReadinessMachine::new(),
                held_registrations: 0,
                held_event: None,
            }),
            active: AtomicBool::new(true),
            redirect_check,
        });

        let weak: Weak<Shared> = Arc::downgrade(&shared);
        let subscription =
            gateway.subscribe_session_changes(Arc::new(move |identity: Option<Identity>| {
                if let Some(shared) = weak.upgrade() {
                    shared.on_session_event(identity);
                }
            }));
        debug!("Subscribed to provider session changes");

        let redirect_task = tokio::spawn(run_redirect_check(gateway.clone(), shared.clone()));

        Self {
            gateway,
            shared,
            subscription: Mutex::new(Some(subscription)),
            redirect_task: Mutex::new(Some(redirect_task)),
        }
    }

    /// Read handle on the session.
    pub fn session(&self) -> SessionReader {
        self.shared.store.reader()
    }

    pub fn snapshot(&self) -> Session {
        self.shared.store.snapshot()
    }

    pub fn readiness(&self) -> Readiness {
        Readiness::from(self.shared.arbiter.lock().readiness.state())
    }

    /// Route guard reading this controller's session.
    pub fn route_guard(&self, login_path: impl Into<String>) -> RouteGuard {
        RouteGuard::with_login_path(self.session(), login_path)
    }

    pub fn is_active(&self) -> bool {
        self.shared.is_active()
    }

    /// Current state of the startup redirect check.
    pub fn redirect_check(&self) -> RedirectCheck {
        self.shared.redirect_check.borrow().clone()
    }

    /// Wait for the startup redirect check.
    ///
    /// Returns `None` if the controller shut down before it finished.
    pub async fn wait_redirect_check(&self) -> Option<OperationOutcome> {
        let mut rx = self.shared.redirect_check.subscribe();
        let check = rx
            .wait_for(|check| !matches!(check, RedirectCheck::Pending))
            .await
            .map(|check| check.clone());

        match check {
            Ok(RedirectCheck::Completed(outcome)) => Some(outcome),
            _ => None,
        }
    }

    /// Create an email/password account.
    ///
    /// With a non-empty `display_name`, the name is applied before the
    /// identity is published so observers never see the unnamed account.
    pub async fn register(
        &self,
        email: &str,
        password: &str,
        display_name: Option<&str>,
    ) -> OperationOutcome {
        let Some(name) = display_name.filter(|name| !name.is_empty()) else {
            return match self.gateway.create_account(email, password).await {
                Ok(identity) => {
                    info!(uid = %identity.uid, "Account created");
                    self.shared.publish_identity(Some(identity.clone()));
                    OperationOutcome::succeeded(Some(identity))
                }
                Err(e) => failure("register", e, REGISTRATION_FAILED),
            };
        };

        let hold = StreamHold::begin(&self.shared);
        match self.create_named_account(email, password, name).await {
            Ok(identity) => {
                hold.release(Some(&identity));
                info!(uid = %identity.uid, "Account created with display name");
                OperationOutcome::succeeded(Some(identity))
            }
            Err(e) => {
                hold.release(None);
                failure("register", e, REGISTRATION_FAILED)
            }
        }
    }

    async fn create_named_account(
        &self,
        email: &str,
        password: &str,
        name: &str,
    ) -> Result<Identity, GatewayError> {
        let identity = self.gateway.create_account(email, password).await?;
        let patch = ProfilePatch::display_name(name);
        self.gateway.update_identity(&patch).await?;
        Ok(identity.merged(&patch))
    }

    /// Sign in with email and password. A failure leaves the session as is.
    pub async fn login(&self, email: &str, password: &str) -> OperationOutcome {
        match self.gateway.sign_in(email, password).await {
            Ok(identity) => {
                info!(uid = %identity.uid, "Signed in");
                self.shared.publish_identity(Some(identity.clone()));
                OperationOutcome::succeeded(Some(identity))
            }
            Err(e) => failure("login", e, LOGIN_FAILED),
        }
    }

    /// Sign in with Google.
    ///
    /// Popup completes here; a cancelled popup fails silently. Redirect
    /// returns a deferred success and completes through the stream or the
    /// next startup redirect check.
    pub async fn sign_in_with_google(&self, strategy: GoogleSignInStrategy) -> OperationOutcome {
        let completion = match strategy {
            GoogleSignInStrategy::Popup => self
                .gateway
                .sign_in_with_popup()
                .await
                .map(FederatedCompletion::Immediate),
            GoogleSignInStrategy::Redirect => self
                .gateway
                .sign_in_with_redirect()
                .await
                .map(|()| FederatedCompletion::Deferred),
        };

        match completion {
            Ok(FederatedCompletion::Immediate(identity)) => {
                info!(uid = %identity.uid, "Signed in with Google");
                self.shared.publish_identity(Some(identity.clone()));
                OperationOutcome::succeeded(Some(identity))
            }
            Ok(FederatedCompletion::Deferred) => {
                info!("Google redirect sign-in started");
                OperationOutcome::deferred()
            }
            Err(e) => failure("sign_in_with_google", e, GOOGLE_SIGN_IN_FAILED),
        }
    }

    /// Sign out. On failure the session is unchanged.
    pub async fn logout(&self) -> OperationOutcome {
        match self.gateway.sign_out().await {
            Ok(()) => {
                info!("Signed out");
                self.shared.publish_identity(None);
                OperationOutcome::succeeded(None)
            }
            Err(e) => failure("logout", e, LOGOUT_FAILED),
        }
    }

    /// Send a password reset email. Never touches the session.
    pub async fn reset_password(&self, email: &str) -> OperationOutcome {
        match self.gateway.send_password_reset(email).await {
            Ok(()) => {
                info!("Password reset email requested");
                OperationOutcome::succeeded(None)
            }
            Err(e) => failure("reset_password", e, PASSWORD_RESET_FAILED),
        }
    }

    /// Update the signed-in user's profile and republish the merged identity.
    pub async fn update_profile(&self, patch: ProfilePatch) -> OperationOutcome {
        let current = match self.require_identity() {
            Ok(identity) => identity,
            Err(e) => {
                debug!("Profile update without a signed-in identity");
                return OperationOutcome::failed(e, UPDATE_FAILED);
            }
        };

        match self.gateway.update_identity(&patch).await {
            Ok(()) => {
                info!(uid = %current.uid, "Profile updated");
                self.shared.publish_profile(&current.uid, &patch);
                OperationOutcome::succeeded(Some(current.merged(&patch)))
            }
            Err(e) => failure("update_profile", e, UPDATE_FAILED),
        }
    }

    fn require_identity(&self) -> AuthResult<Identity> {
        self.shared
            .store
            .snapshot()
            .identity
            .ok_or(AuthError::NotAuthenticated)
    }

    /// Release the subscription and stop the redirect check.
    ///
    /// Idempotent; also runs on drop. No session write happens afterwards.
    pub fn shutdown(&self) {
        {
            let _arbiter = self.shared.arbiter.lock();
            if !self.shared.active.swap(false, Ordering::SeqCst) {
                return;
            }
        }

        if let Some(subscription) = self.subscription.lock().take() {
            subscription.unsubscribe();
        }
        if let Some(task) = self.redirect_task.lock().take() {
            task.abort();
        }
        self.shared.redirect_check.send_if_modified(|check| {
            if matches!(check, RedirectCheck::Pending) {
                *check = RedirectCheck::Cancelled;
                true
            } else {
                false
            }
        });

        info!("Auth session controller shut down");
    }
}

impl<G: IdentityGateway + 'static> Drop for AuthSessionController<G> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn run_redirect_check<G: IdentityGateway>(gateway: Arc<G>, shared: Arc<Shared>) {
    let outcome = match gateway.pending_redirect_result().await {
        Ok(Some(identity)) => {
            if shared.apply_redirect_result(&identity) {
                info!(uid = %identity.uid, "Applied pending redirect sign-in");
            }
            OperationOutcome::succeeded(Some(identity))
        }
        Ok(None) => {
            debug!("No pending redirect sign-in");
            OperationOutcome::succeeded(None)
        }
        Err(GatewayError::OperationNotSupported(reason)) => {
            debug!(reason = %reason, "Redirect sign-in unavailable in this environment");
            OperationOutcome::succeeded(None)
        }
        Err(e) => failure("redirect_check", e, GOOGLE_SIGN_IN_FAILED),
    };

    shared.finish_redirect_check(outcome);
}

fn failure(operation: &'static str, error: GatewayError, fallback: &str) -> OperationOutcome {
    let error = AuthError::from(error);
    if error.is_silent() {
        debug!(operation, "Auth operation cancelled by user");
    } else {
        warn!(operation, error = %error, "Auth operation failed");
    }
    OperationOutcome::failed(error, fallback)
}

#[cfg(test)]
mod tests {
    use super::*;
    use identity_gateway::{MemoryGateway, PopupBehavior};

    #[test]
    fn test_strategy_from_flag() {
        assert_eq!(
            GoogleSignInStrategy::from_redirect_flag(true),
            GoogleSignInStrategy::Redirect
        );
        assert_eq!(
            GoogleSignInStrategy::from_redirect_flag(false),
            GoogleSignInStrategy::Popup
        );
    }

    #[tokio::test]
    async fn test_first_stream_event_settles() {
        let gateway = Arc::new(MemoryGateway::new());
        let controller = AuthSessionController::start(gateway.clone());
        assert_eq!(controller.readiness(), Readiness::Unsettled);

        gateway.emit(None);

        assert!(controller.snapshot().settled);
        assert_eq!(controller.readiness(), Readiness::Settled);
    }

    #[tokio::test]
    async fn test_login_publishes_identity() {
        let gateway = Arc::new(MemoryGateway::new());
        let account = gateway.add_account("a@example.com", "pw");
        let controller = AuthSessionController::start(gateway.clone());

        let outcome = controller.login("a@example.com", "pw").await;

        assert!(outcome.success);
        assert_eq!(controller.snapshot().uid(), Some(account.uid.as_str()));
    }

    #[tokio::test]
    async fn test_cancelled_popup_is_silent() {
        let gateway = Arc::new(MemoryGateway::new());
        gateway.set_popup_behavior(PopupBehavior::Cancel);
        let controller = AuthSessionController::start(gateway.clone());
        gateway.emit(None);

        let outcome = controller
            .sign_in_with_google(GoogleSignInStrategy::Popup)
            .await;

        assert!(outcome.is_silent_failure());
        assert!(!controller.snapshot().is_authenticated());
    }

    #[tokio::test]
    async fn test_shutdown_is_idempotent() {
        let gateway = Arc::new(MemoryGateway::new());
        let controller = AuthSessionController::start(gateway.clone());
        assert_eq!(gateway.listener_count(), 1);

        controller.shutdown();
        controller.shutdown();

        assert!(!controller.is_active());
        assert_eq!(gateway.listener_count(), 0);
    }
}
