//! Client-side authentication session for Hireboard.
//!
//! [`AuthSessionController`] is the only writer of the [`SessionStore`].
//! Views read the session through [`SessionReader`] and gate protected pages
//! with [`RouteGuard`], which distinguishes "still loading" from "signed out".

mod controller;
mod error;
mod guard;
mod outcome;
pub mod readiness;
mod store;

pub use controller::{AuthSessionController, GoogleSignInStrategy, RedirectCheck};
pub use error::{AuthError, AuthResult};
pub use guard::{decide, GuardDecision, RouteGuard, DEFAULT_LOGIN_PATH};
pub use outcome::OperationOutcome;
pub use readiness::Readiness;
pub use store::{Session, SessionReader, SessionStore};

pub use identity_gateway::{Identity, ProfilePatch};
