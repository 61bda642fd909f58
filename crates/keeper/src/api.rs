//! Typed calls to the backend's authentication endpoints.

use crate::error::{AuthError, AuthResult};
use crate::transport::{ApiRequest, ApiResponse, HttpTransport};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

pub const LOGIN_PATH: &str = "/login";
pub const REFRESH_PATH: &str = "/refresh";
pub const ME_PATH: &str = "/me";

const DEFAULT_LOGIN_ERROR: &str = "Invalid username or password";

/// Body returned by `/login` and `/refresh`.
#[derive(Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub role: String,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
}

impl fmt::Debug for TokenResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenResponse")
            .field("access_token", &"[REDACTED]")
            .field("role", &self.role)
            .field("token_type", &self.token_type)
            .field("username", &self.username)
            .finish()
    }
}

/// Identity returned by `/me`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl UserProfile {
    pub fn from_response(response: &ApiResponse) -> AuthResult<Self> {
        response.json().map_err(|e| {
            AuthError::InvalidResponse(format!("malformed {} response: {}", ME_PATH, e))
        })
    }
}

/// Client for `/login`, `/refresh` and `/me`.
#[derive(Clone)]
pub struct AuthApi {
    transport: Arc<dyn HttpTransport>,
}

impl AuthApi {
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self { transport }
    }

    /// Exchange username and password for an access token.
    ///
    /// The backend expects an OAuth2 password form and sets the refresh
    /// cookie on success.
    pub async fn login(&self, username: &str, password: &str) -> AuthResult<TokenResponse> {
        let request = ApiRequest::post(LOGIN_PATH)
            .form([("username", username), ("password", password)]);
        let response = self.transport.execute(request).await?;

        match response.status {
            200..=299 => {
                let tokens = parse_tokens(&response, LOGIN_PATH)?;
                info!(role = %tokens.role, "Login accepted");
                Ok(tokens)
            }
            400 | 401 | 403 | 422 => {
                let detail = response.detail();
                let message = if detail.trim().is_empty() {
                    DEFAULT_LOGIN_ERROR.to_string()
                } else {
                    detail
                };
                Err(AuthError::Authentication(message))
            }
            status => Err(AuthError::Status {
                status,
                body: response.detail(),
            }),
        }
    }

    /// Ask for a new access token using the refresh cookie.
    ///
    /// A 4xx answer means the refresh cookie was refused; 5xx is surfaced as a
    /// transient [`AuthError::Status`].
    pub async fn refresh(&self) -> AuthResult<TokenResponse> {
        let response = self.transport.execute(ApiRequest::post(REFRESH_PATH)).await?;
        debug!(status = response.status, "Refresh answered");
        let response = response.error_for_status()?;
        parse_tokens(&response, REFRESH_PATH)
    }

    /// Request for the current user's identity; sent through the gateway.
    pub fn me_request() -> ApiRequest {
        ApiRequest::get(ME_PATH)
    }
}

fn parse_tokens(response: &ApiResponse, path: &str) -> AuthResult<TokenResponse> {
    let tokens: TokenResponse = response
        .json()
        .map_err(|e| AuthError::InvalidResponse(format!("malformed {} response: {}", path, e)))?;
    if tokens.access_token.is_empty() {
        return Err(AuthError::InvalidResponse(format!(
            "{} returned an empty access token",
            path
        )));
    }
    Ok(tokens)
}
