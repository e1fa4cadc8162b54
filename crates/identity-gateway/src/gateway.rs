//! Identity provider gateway trait.

use crate::{GatewayResult, Identity, ProfilePatch, SessionListener, Subscription};
use std::future::Future;

/// Boundary to an external identity provider.
///
/// Implementations own account storage, credential checks and federated
/// sign-in. Callers only see identities and session-change events.
pub trait IdentityGateway: Send + Sync {
    /// Create an email/password account and sign it in.
    fn create_account(
        &self,
        email: &str,
        password: &str,
    ) -> impl Future<Output = GatewayResult<Identity>> + Send;

    /// Sign in with email and password.
    fn sign_in(
        &self,
        email: &str,
        password: &str,
    ) -> impl Future<Output = GatewayResult<Identity>> + Send;

    /// Google sign-in that completes within the call.
    ///
    /// Fails with `GatewayError::PopupCancelled` when the user backs out.
    fn sign_in_with_popup(&self) -> impl Future<Output = GatewayResult<Identity>> + Send;

    /// Google sign-in that navigates away.
    ///
    /// The result is picked up later through `pending_redirect_result` or the
    /// session-change stream.
    fn sign_in_with_redirect(&self) -> impl Future<Output = GatewayResult<()>> + Send;

    /// Consume the result of a redirect sign-in started before the last
    /// navigation, if any.
    fn pending_redirect_result(&self)
        -> impl Future<Output = GatewayResult<Option<Identity>>> + Send;

    /// End the provider session.
    fn sign_out(&self) -> impl Future<Output = GatewayResult<()>> + Send;

    /// Send an out-of-band password reset email.
    fn send_password_reset(&self, email: &str) -> impl Future<Output = GatewayResult<()>> + Send;

    /// Apply profile changes to the currently signed-in user.
    fn update_identity(
        &self,
        patch: &ProfilePatch,
    ) -> impl Future<Output = GatewayResult<()>> + Send;

    /// Register for session changes. Events are delivered in emission order.
    fn subscribe_session_changes(&self, listener: SessionListener) -> Subscription;
}
