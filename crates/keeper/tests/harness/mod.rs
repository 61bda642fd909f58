//! Scripted backend for session tests.
//!
//! Mimics the auth endpoints: `/login` issues a token and sets the refresh
//! cookie, `/refresh` trades the cookie for a new token, `/me` and every other
//! path require a currently valid bearer token. `/always-401` refuses every
//! request regardless of credentials.

#![allow(dead_code)]

use async_trait::async_trait;
use credential_store::{CredentialVault, MemoryStorage};
use keeper::{
    ApiRequest, ApiResponse, AuthResult, HttpTransport, IdleConfig, Method, RefreshConfig,
    RequestBody, SessionContext,
};
use parking_lot::Mutex;
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const ALWAYS_UNAUTHORIZED: &str = "/always-401";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshMode {
    /// Trade the refresh cookie for a new token.
    Issue,
    /// Refuse with 401 as if the cookie expired.
    Reject,
    /// Answer 503.
    Unavailable,
}

struct BackendState {
    users: HashMap<String, (String, String)>,
    valid_tokens: HashMap<String, String>,
    cookie_role: Option<String>,
    refresh_mode: RefreshMode,
    next_token: u64,
    requests: Vec<(Method, String)>,
}

pub struct FakeBackend {
    state: Mutex<BackendState>,
    refresh_calls: AtomicUsize,
    refresh_delay: Duration,
}

impl FakeBackend {
    pub fn new() -> Arc<Self> {
        Self::with_refresh_delay(Duration::from_millis(100))
    }

    pub fn with_refresh_delay(refresh_delay: Duration) -> Arc<Self> {
        let mut users = HashMap::new();
        users.insert("ann".to_string(), ("pw".to_string(), "Admin".to_string()));
        users.insert("vic".to_string(), ("pw".to_string(), "user".to_string()));
        users.insert("bo".to_string(), ("pw".to_string(), "buh_user".to_string()));

        Arc::new(Self {
            state: Mutex::new(BackendState {
                users,
                valid_tokens: HashMap::new(),
                cookie_role: None,
                refresh_mode: RefreshMode::Issue,
                next_token: 0,
                requests: Vec::new(),
            }),
            refresh_calls: AtomicUsize::new(0),
            refresh_delay,
        })
    }

    /// Make `token` valid for `role` and give the client a refresh cookie.
    pub fn seed_session(&self, token: &str, role: &str) {
        let mut state = self.state.lock();
        state
            .valid_tokens
            .insert(token.to_string(), role.to_string());
        state.cookie_role = Some(role.to_string());
    }

    /// Give the client a refresh cookie without a valid access token.
    pub fn seed_cookie(&self, role: &str) {
        self.state.lock().cookie_role = Some(role.to_string());
    }

    /// Invalidate every issued access token.
    pub fn expire_tokens(&self) {
        self.state.lock().valid_tokens.clear();
    }

    pub fn set_refresh_mode(&self, mode: RefreshMode) {
        self.state.lock().refresh_mode = mode;
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn requests_to(&self, path: &str) -> usize {
        self.state
            .lock()
            .requests
            .iter()
            .filter(|(_, p)| p == path)
            .count()
    }

    pub fn total_requests(&self) -> usize {
        self.state.lock().requests.len()
    }

    fn issue(state: &mut BackendState, role: &str) -> String {
        state.next_token += 1;
        let token = format!("tok-{}", state.next_token);
        state.valid_tokens.insert(token.clone(), role.to_string());
        token
    }

    fn login(&self, request: &ApiRequest) -> ApiResponse {
        let RequestBody::Form(fields) = &request.body else {
            return ApiResponse::json_body(422, &json!({"detail": [{"msg": "form required"}]}));
        };
        let field = |name: &str| {
            fields
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.clone())
                .unwrap_or_default()
        };
        let (username, password) = (field("username"), field("password"));

        let mut state = self.state.lock();
        let role = match state.users.get(&username) {
            Some((expected, role)) if *expected == password => role.clone(),
            _ => {
                return ApiResponse::json_body(
                    401,
                    &json!({"detail": "Incorrect username or password"}),
                )
            }
        };
        let token = Self::issue(&mut state, &role);
        state.cookie_role = Some(role.clone());
        ApiResponse::json_body(
            200,
            &json!({"access_token": token, "token_type": "bearer", "role": role, "username": username}),
        )
    }

    async fn refresh(&self) -> ApiResponse {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.refresh_delay).await;

        let mut state = self.state.lock();
        match (state.refresh_mode, state.cookie_role.clone()) {
            (RefreshMode::Unavailable, _) => ApiResponse::new(503, "Service Unavailable"),
            (RefreshMode::Issue, Some(role)) => {
                let token = Self::issue(&mut state, &role);
                ApiResponse::json_body(
                    200,
                    &json!({"access_token": token, "token_type": "bearer", "role": role}),
                )
            }
            _ => ApiResponse::json_body(401, &json!({"detail": "Refresh token missing"})),
        }
    }

    fn authorized(&self, request: &ApiRequest) -> ApiResponse {
        let state = self.state.lock();
        let role = request
            .bearer_token()
            .and_then(|token| state.valid_tokens.get(token));
        match (request.path.as_str(), role) {
            (ALWAYS_UNAUTHORIZED, _) | (_, None) => {
                ApiResponse::json_body(401, &json!({"detail": "Could not validate credentials"}))
            }
            ("/me", Some(role)) => ApiResponse::json_body(
                200,
                &json!({"id": 1, "username": "ann", "email": "ann@example.com", "role": role}),
            ),
            (path, Some(_)) => ApiResponse::json_body(200, &json!({"path": path})),
        }
    }
}

#[async_trait]
impl HttpTransport for FakeBackend {
    async fn execute(&self, request: ApiRequest) -> AuthResult<ApiResponse> {
        self.state
            .lock()
            .requests
            .push((request.method, request.path.clone()));

        let response = match (request.method, request.path.as_str()) {
            (Method::Post, "/login") => self.login(&request),
            (Method::Post, "/refresh") => self.refresh().await,
            _ => self.authorized(&request),
        };
        Ok(response)
    }
}

pub fn minute_idle() -> IdleConfig {
    IdleConfig {
        timeout: Duration::from_secs(15 * 60),
        tick: Duration::from_secs(60),
        warning_margin: Duration::from_secs(60),
    }
}

pub fn memory_vault() -> CredentialVault {
    CredentialVault::new(Box::new(MemoryStorage::new()))
}

pub fn context(backend: &Arc<FakeBackend>, vault: CredentialVault) -> SessionContext {
    SessionContext::builder(backend.clone(), vault)
        .idle_config(minute_idle())
        .refresh_config(RefreshConfig::default())
        .build()
}

/// Drain every event currently queued.
pub fn drain<T: Clone>(rx: &mut tokio::sync::broadcast::Receiver<T>) -> Vec<T> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
