//! Identity provider boundary for Hireboard.
//!
//! This crate defines the [`IdentityGateway`] trait the session layer talks
//! to, and ships two implementations:
//! - [`FirebaseRestGateway`]: Firebase Auth over its REST API, with Google
//!   sign-in through a loopback OAuth flow and `accounts:signInWithIdp`
//! - [`MemoryGateway`]: scriptable in-memory double for tests and demos

mod error;
mod federated;
mod firebase;
mod firebase_api;
mod gateway;
mod listeners;
mod memory;
mod persistence;
mod types;

pub use error::{GatewayError, GatewayResult};
pub use federated::{
    parse_callback_query, random_token, CallbackOutcome, CallbackServer, PkceChallenge,
    GOOGLE_AUTH_URL, GOOGLE_TOKEN_URL,
};
pub use firebase::{BrowserLauncher, FirebaseConfig, FirebaseRestGateway};
pub use firebase_api::{map_error_body, map_google_token_error, IDENTITY_TOOLKIT_URL, SECURE_TOKEN_URL};
pub use gateway::IdentityGateway;
pub use listeners::{ListenerRegistry, SessionListener, Subscription};
pub use memory::{CallGate, GatewayOp, MemoryGateway, PopupBehavior};
pub use persistence::{PendingRedirect, SessionPersistence, StoredSession};
pub use types::{FederatedCompletion, Identity, ProfilePatch};
