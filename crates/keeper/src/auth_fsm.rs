//! Session lifecycle state machine using rust-fsm.
//!
//! ## State Diagram
//!
//! ```text
//! ┌─────────────────┐
//! │   NotLoggedIn   │ (initial)
//! └────────┬────────┘
//!          │ LoginAttempt / ResumeStarted
//!          ▼
//! ┌─────────────────┐     ┌─────────────────┐
//! │   LoggingIn     │     │    Resuming     │
//! └────────┬────────┘     └────────┬────────┘
//!          │ LoginSuccess          │ ResumeSucceeded
//!          ▼                       ▼
//! ┌─────────────────────────────────────────┐
//! │                LoggedIn                 │
//! └────────┬───────────────────────┬────────┘
//!          │ LogoutRequested       │ SessionTerminated
//!          ▼                       ▼
//! ┌─────────────────┐         NotLoggedIn
//! │   LoggingOut    │
//! └────────┬────────┘
//!          │ LogoutComplete
//!          ▼
//!     NotLoggedIn
//! ```
//!
//! `SessionTerminated` covers every end that was not asked for: a refused
//! renewal, idle expiry, or a failed resume. A new login is only accepted
//! once the previous session has ended.

use rust_fsm::*;
use serde::{Deserialize, Serialize};

state_machine! {
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub session_machine(NotLoggedIn)

    NotLoggedIn => {
        ResumeStarted => Resuming,
        LoginAttempt => LoggingIn,
        SessionTerminated => NotLoggedIn
    },
    Resuming => {
        ResumeSucceeded => LoggedIn,
        ResumeFailed => NotLoggedIn,
        SessionTerminated => NotLoggedIn
    },
    LoggingIn => {
        LoginSuccess => LoggedIn,
        LoginFailed => NotLoggedIn,
        SessionTerminated => NotLoggedIn
    },
    LoggedIn => {
        LogoutRequested => LoggingOut,
        SessionTerminated => NotLoggedIn
    },
    LoggingOut => {
        LogoutComplete => NotLoggedIn
    }
}

pub use session_machine::Input as SessionMachineInput;
pub use session_machine::State as SessionMachineState;
pub use session_machine::StateMachine as SessionMachine;

/// Externally visible session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthState {
    NotLoggedIn,
    /// Validating a persisted session at startup.
    Resuming,
    LoggingIn,
    LoggedIn,
    LoggingOut,
}

impl AuthState {
    /// Returns true if the user has a valid session (LoggedIn state only).
    pub fn is_authenticated(&self) -> bool {
        matches!(self, AuthState::LoggedIn)
    }

    /// Returns true if the state is a transient/in-progress state.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AuthState::Resuming | AuthState::LoggingIn | AuthState::LoggingOut
        )
    }
}

impl From<&SessionMachineState> for AuthState {
    fn from(state: &SessionMachineState) -> Self {
        match state {
            SessionMachineState::NotLoggedIn => AuthState::NotLoggedIn,
            SessionMachineState::Resuming => AuthState::Resuming,
            SessionMachineState::LoggingIn => AuthState::LoggingIn,
            SessionMachineState::LoggedIn => AuthState::LoggedIn,
            SessionMachineState::LoggingOut => AuthState::LoggingOut,
        }
    }
}
