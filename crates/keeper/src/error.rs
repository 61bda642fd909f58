//! Session error types.

use crate::role::LOGIN_ROUTE;
use thiserror::Error;

/// Error type for every session operation.
#[derive(Error, Debug)]
pub enum AuthError {
    /// Login rejected by the backend (bad username or password, disabled account)
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Credential renewal was rejected; the session has been terminated
    #[error("Session expired, sign in again")]
    AuthorizationExpired,

    /// Request was still rejected after a successful renewal
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Non-success status that is not an authorization failure
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// Renewal failed for a reason unrelated to the refresh cookie
    #[error("Credential renewal unavailable: {0}")]
    RenewalUnavailable(String),

    /// No credential to act with
    #[error("Not logged in")]
    NotLoggedIn,

    /// Operation abandoned because the session ended while it was pending
    #[error("Session ended while the operation was pending")]
    Cancelled,

    /// Backend answered with something that cannot form a session
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Invalid state transition in the session FSM
    #[error("Invalid auth state transition: {0}")]
    InvalidStateTransition(String),

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(#[from] credential_store::StorageError),

    /// HTTP request error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// URL parse error
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Timeout error
    #[error("Operation timed out")]
    Timeout,

    /// Network unavailable (transient error, can retry)
    #[error("Network unavailable")]
    NetworkUnavailable,

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl AuthError {
    /// Returns true if this error is transient and the operation can be retried.
    ///
    /// Transient errors include:
    /// - Network unavailable
    /// - HTTP errors with 5xx status codes
    /// - Connection timeouts
    pub fn is_transient(&self) -> bool {
        match self {
            AuthError::NetworkUnavailable => true,
            AuthError::Timeout => true,
            AuthError::RenewalUnavailable(_) => true,
            AuthError::Status { status, .. } => *status >= 500,
            AuthError::Http(e) => {
                if e.is_connect() || e.is_timeout() {
                    return true;
                }
                if let Some(status) = e.status() {
                    return status.is_server_error();
                }
                false
            }
            _ => false,
        }
    }

    /// Route the caller should navigate to after this error, if any.
    pub fn redirect_target(&self) -> Option<&'static str> {
        match self {
            AuthError::AuthorizationExpired | AuthError::NotLoggedIn => Some(LOGIN_ROUTE),
            _ => None,
        }
    }

    /// HTTP status carried by the error, when the backend produced one.
    pub fn status(&self) -> Option<u16> {
        match self {
            AuthError::Status { status, .. } => Some(*status),
            AuthError::Unauthorized(_) => Some(401),
            AuthError::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

impl From<keeper_config::CoreError> for AuthError {
    fn from(err: keeper_config::CoreError) -> Self {
        AuthError::Config(err.to_string())
    }
}

/// Result type alias using AuthError.
pub type AuthResult<T> = Result<T, AuthError>;
