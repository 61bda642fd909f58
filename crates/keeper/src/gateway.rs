//! Authenticated request dispatch with at-most-one replay.

use crate::error::{AuthError, AuthResult};
use crate::refresh::RefreshCoordinator;
use crate::store::SessionStore;
use crate::transport::{ApiRequest, ApiResponse, HttpTransport};
use std::sync::Arc;
use tracing::{debug, warn};

/// Sends requests on behalf of the current session.
///
/// The bearer token is attached at send time. A 401 answer is handled once:
/// if another caller already renewed the credential, the request is replayed
/// with the newer token; otherwise the caller joins (or starts) a renewal
/// round and replays with its result. A second 401 is returned as
/// [`AuthError::Unauthorized`], never retried again.
#[derive(Clone)]
pub struct RequestGateway {
    transport: Arc<dyn HttpTransport>,
    store: Arc<SessionStore>,
    coordinator: Arc<RefreshCoordinator>,
}

impl RequestGateway {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        store: Arc<SessionStore>,
        coordinator: Arc<RefreshCoordinator>,
    ) -> Self {
        Self {
            transport,
            store,
            coordinator,
        }
    }

    /// Send `request` with the current session's token.
    pub async fn send(&self, request: ApiRequest) -> AuthResult<ApiResponse> {
        let generation = self.store.generation();
        let token = self.store.access_token();
        self.dispatch(request, token, generation).await
    }

    /// Send `request` with an explicit token. Used while resuming a
    /// persisted session, before the store holds a credential.
    pub async fn send_with_token(&self, request: ApiRequest, token: &str) -> AuthResult<ApiResponse> {
        let generation = self.store.generation();
        self.dispatch(request, Some(token.to_string()), generation)
            .await
    }

    async fn dispatch(
        &self,
        request: ApiRequest,
        token: Option<String>,
        generation: u64,
    ) -> AuthResult<ApiResponse> {
        let response = self.execute(&request, token.as_deref()).await?;
        if !response.is_unauthorized() {
            return response.error_for_status();
        }

        // Requests sent without a credential have nothing to renew.
        let Some(sent) = token else {
            return Err(AuthError::NotLoggedIn);
        };

        let replay_token = match self.store.access_token() {
            Some(current) if current != sent && self.store.generation() == generation => {
                debug!(path = %request.path, "Credential already renewed, replaying");
                current
            }
            _ => {
                debug!(path = %request.path, "Access token refused, awaiting renewal");
                self.coordinator.acquire(generation).await?.access_token
            }
        };

        let replay = self.execute(&request, Some(&replay_token)).await?;
        if replay.is_unauthorized() {
            warn!(path = %request.path, "Request refused again after renewal");
            return Err(AuthError::Unauthorized(replay.detail()));
        }
        replay.error_for_status()
    }

    async fn execute(&self, request: &ApiRequest, token: Option<&str>) -> AuthResult<ApiResponse> {
        let request = match token {
            Some(token) => request.with_bearer(token),
            None => request.clone(),
        };
        self.transport.execute(request).await
    }
}
