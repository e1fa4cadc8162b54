//! Session readiness state machine using rust-fsm.
//!
//! Tracks whether the initial session resolution has happened. Once settled
//! the session never goes back to unknown.
//!
//! ```text
//! ┌─────────────────┐  StreamDelivered / RedirectResolved  ┌─────────────────┐
//! │    Unsettled    │ ───────────────────────────────────► │     Settled     │
//! └─────────────────┘                                      └────────┬────────┘
//!    (initial)                                                      │ StreamDelivered
//!                                                                   └──► Settled
//! ```
//!
//! `RedirectResolved` is only accepted while unsettled: a redirect result that
//! arrives after the stream has spoken is informational.

use rust_fsm::*;
use serde::Serialize;

state_machine! {
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub readiness_machine(Unsettled)

    Unsettled => {
        StreamDelivered => Settled,
        RedirectResolved => Settled
    },
    Settled => {
        StreamDelivered => Settled
    }
}

pub use readiness_machine::Input as ReadinessInput;
pub use readiness_machine::State as ReadinessMachineState;
pub use readiness_machine::StateMachine as ReadinessMachine;

/// Readiness as reported to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Readiness {
    /// No session event or redirect result has been applied yet.
    Unsettled,
    /// The session value reflects the provider.
    Settled,
}

impl Readiness {
    pub fn is_settled(&self) -> bool {
        matches!(self, Readiness::Settled)
    }
}

impl From<&ReadinessMachineState> for Readiness {
    fn from(state: &ReadinessMachineState) -> Self {
        match state {
            ReadinessMachineState::Unsettled => Readiness::Unsettled,
            ReadinessMachineState::Settled => Readiness::Settled,
        }
    }
}
