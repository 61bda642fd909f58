//! Session lifecycle notifications.

use crate::role::Role;
use serde::Serialize;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::trace;

pub(crate) const EVENT_CAPACITY: usize = 64;

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    /// The user asked to sign out.
    UserLogout,
    /// Credential renewal was refused.
    AuthorizationExpired,
    /// No qualifying activity within the idle timeout.
    IdleExpiry,
    /// The persisted session could not be resumed at startup.
    ResumeFailed,
}

impl TerminationReason {
    /// Whether the session ended because something went wrong, as opposed to
    /// a user decision or the inactivity policy.
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            TerminationReason::AuthorizationExpired | TerminationReason::ResumeFailed
        )
    }

    /// Message shown to the user.
    pub fn notice(&self) -> &'static str {
        match self {
            TerminationReason::UserLogout => "Signed out",
            TerminationReason::AuthorizationExpired => "Your session has expired, sign in again",
            TerminationReason::IdleExpiry => "Signed out after a period of inactivity",
            TerminationReason::ResumeFailed => "Saved session is no longer valid, sign in again",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    SignedIn { role: Role },
    Renewed { role: Role },
    IdleWarning { remaining: Duration },
    ActivityResumed,
    Terminated { reason: TerminationReason },
}

pub(crate) fn channel() -> broadcast::Sender<SessionEvent> {
    broadcast::channel(EVENT_CAPACITY).0
}

pub(crate) fn publish(events: &broadcast::Sender<SessionEvent>, event: SessionEvent) {
    // No receivers is the normal state for a headless caller.
    if let Err(err) = events.send(event) {
        trace!(event = ?err.0, "No session event subscribers");
    }
}
