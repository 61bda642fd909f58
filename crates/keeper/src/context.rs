//! Session context façade.
//!
//! `SessionContext` owns the store, the renewal coordinator, the request
//! gateway and the idle monitor, and exposes the read-only projections UI or
//! CLI code needs. It is cheap to clone; all clones share one session.

use crate::api::{AuthApi, UserProfile};
use crate::auth_fsm::{AuthState, SessionMachine, SessionMachineInput};
use crate::error::{AuthError, AuthResult};
use crate::events::{self, SessionEvent, TerminationReason};
use crate::gateway::RequestGateway;
use crate::idle::{ActivitySignal, ExpiryHook, IdleConfig, IdleMonitor, IdleMonitorHandle, IdleState};
use crate::refresh::{RefreshConfig, RefreshCoordinator, RenewalFailure, TerminationHook};
use crate::role::{home_route, Role};
use crate::route_guard::{RouteDecision, RouteGuard};
use crate::store::{Credential, SessionStore};
use crate::transport::{ApiRequest, ApiResponse, HttpTransport, ReqwestTransport};
use credential_store::CredentialVault;
use keeper_config::{Config, Paths};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::{Arc, Weak};
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

/// Point-in-time view of the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    pub state: AuthState,
    /// True until the startup resume has settled.
    pub loading: bool,
    pub authenticated: bool,
    pub role: Option<Role>,
    pub home_route: &'static str,
}

pub struct SessionContextBuilder {
    transport: Arc<dyn HttpTransport>,
    vault: CredentialVault,
    idle: IdleConfig,
    refresh: RefreshConfig,
}

impl SessionContextBuilder {
    pub fn idle_config(mut self, config: IdleConfig) -> Self {
        self.idle = config;
        self
    }

    pub fn refresh_config(mut self, config: RefreshConfig) -> Self {
        self.refresh = config;
        self
    }

    pub fn build(self) -> SessionContext {
        let Self {
            transport,
            vault,
            idle,
            refresh,
        } = self;
        let store = Arc::new(SessionStore::new(vault));
        let api = AuthApi::new(transport.clone());
        let events = events::channel();
        let (loading, _) = watch::channel(true);

        let inner = Arc::new_cyclic(|context: &Weak<ContextInner>| {
            let context = context.clone();
            let on_refused: TerminationHook = Arc::new(move || {
                if let Some(inner) = context.upgrade() {
                    inner.renewal_refused();
                }
            });
            let coordinator = RefreshCoordinator::with_termination_hook(
                api.clone(),
                store.clone(),
                events.clone(),
                refresh,
                Some(on_refused),
            );
            let gateway = RequestGateway::new(transport, store.clone(), coordinator.clone());

            ContextInner {
                store,
                api,
                coordinator,
                gateway,
                events,
                idle_config: idle,
                idle: Mutex::new(None),
                machine: Mutex::new(SessionMachine::new()),
                loading,
            }
        });

        SessionContext { inner }
    }
}

#[derive(Clone)]
pub struct SessionContext {
    inner: Arc<ContextInner>,
}

struct ContextInner {
    store: Arc<SessionStore>,
    api: AuthApi,
    coordinator: Arc<RefreshCoordinator>,
    gateway: RequestGateway,
    events: broadcast::Sender<SessionEvent>,
    idle_config: IdleConfig,
    idle: Mutex<Option<IdleMonitorHandle>>,
    machine: Mutex<SessionMachine>,
    loading: watch::Sender<bool>,
}

impl SessionContext {
    pub fn builder(transport: Arc<dyn HttpTransport>, vault: CredentialVault) -> SessionContextBuilder {
        SessionContextBuilder {
            transport,
            vault,
            idle: IdleConfig::default(),
            refresh: RefreshConfig::default(),
        }
    }

    /// Context talking to the configured backend, persisting to the
    /// configured session file.
    pub fn from_config(config: &Config, paths: &Paths) -> AuthResult<Self> {
        let transport = ReqwestTransport::new(&config.api_url()?)?;
        let vault = credential_store::create_file_vault(&config.session_file(paths))?;
        let idle = IdleConfig::from_settings(&config.idle)?;
        Ok(Self::builder(Arc::new(transport), vault)
            .idle_config(idle)
            .build())
    }

    /// Resume the persisted session, if any.
    ///
    /// The persisted token is validated against `/me` (renewing it once if
    /// refused). Any failure clears the stored session. Loading ends in
    /// every case. Returns the resumed role.
    pub async fn initialize(&self) -> AuthResult<Option<Role>> {
        let outcome = self.resume().await;
        self.inner.loading.send_replace(false);
        outcome
    }

    async fn resume(&self) -> AuthResult<Option<Role>> {
        if let Some(role) = self.inner.store.role() {
            return Ok(Some(role));
        }
        let persisted = self.inner.store.persisted()?;
        let Some(token) = persisted.access_token else {
            if persisted.role.is_some() {
                self.inner.store.clear()?;
            }
            debug!("No persisted session");
            return Ok(None);
        };

        self.inner.transition(&SessionMachineInput::ResumeStarted)?;
        let generation = self.inner.store.generation();

        match self.validate_persisted(&token, generation).await {
            Ok(credential) => {
                self.inner.transition(&SessionMachineInput::ResumeSucceeded)?;
                self.start_idle();
                events::publish(
                    &self.inner.events,
                    SessionEvent::SignedIn {
                        role: credential.role.clone(),
                    },
                );
                info!(role = %credential.role, "Resumed persisted session");
                Ok(Some(credential.role))
            }
            Err(AuthError::Cancelled) => {
                debug!("Session changed while resuming");
                Ok(None)
            }
            Err(err) => {
                warn!(error = %err, "Persisted session could not be resumed");
                self.inner.terminate(TerminationReason::ResumeFailed)?;
                Ok(None)
            }
        }
    }

    async fn validate_persisted(&self, token: &str, generation: u64) -> AuthResult<Credential> {
        let response = self
            .inner
            .gateway
            .send_with_token(AuthApi::me_request(), token)
            .await?;
        let profile = UserProfile::from_response(&response)?;
        let role = Role::parse(&profile.role)
            .ok_or_else(|| AuthError::InvalidResponse("profile carried no role".to_string()))?;

        // A renewal during validation already committed a newer token.
        let token = self
            .inner
            .store
            .access_token()
            .unwrap_or_else(|| token.to_string());
        self.inner
            .store
            .set_if_generation(generation, &token, role)?
            .ok_or(AuthError::Cancelled)
    }

    /// Authenticate with username and password and start a new session.
    pub async fn login(&self, username: &str, password: &str) -> AuthResult<Role> {
        self.inner.transition(&SessionMachineInput::LoginAttempt)?;

        match self.establish(username, password).await {
            Ok(credential) => {
                if self
                    .inner
                    .transition(&SessionMachineInput::LoginSuccess)
                    .is_err()
                {
                    // Logged out while the login was in flight.
                    self.inner.store.clear()?;
                    return Err(AuthError::Cancelled);
                }
                self.inner.loading.send_replace(false);
                self.start_idle();
                events::publish(
                    &self.inner.events,
                    SessionEvent::SignedIn {
                        role: credential.role.clone(),
                    },
                );
                info!(role = %credential.role, "Logged in");
                Ok(credential.role)
            }
            Err(err) => {
                let _ = self.inner.transition(&SessionMachineInput::LoginFailed);
                warn!(error = %err, "Login failed");
                Err(err)
            }
        }
    }

    async fn establish(&self, username: &str, password: &str) -> AuthResult<Credential> {
        let tokens = self.inner.api.login(username, password).await?;
        let role = Role::parse(&tokens.role)
            .ok_or_else(|| AuthError::InvalidResponse("login response carried no role".to_string()))?;
        self.inner.coordinator.cancel();
        self.inner.store.set(&tokens.access_token, role)
    }

    /// End the session at the user's request. Idempotent.
    pub async fn logout(&self) -> AuthResult<()> {
        self.inner.terminate(TerminationReason::UserLogout)?;
        Ok(())
    }

    /// End the session for `reason`. Returns whether a session existed; only
    /// then is a [`SessionEvent::Terminated`] published.
    pub fn force_logout(&self, reason: TerminationReason) -> AuthResult<bool> {
        self.inner.terminate(reason)
    }

    /// Send `request` as the current session, renewing once if refused.
    pub async fn authorized_request(&self, request: ApiRequest) -> AuthResult<ApiResponse> {
        self.inner.gateway.send(request).await
    }

    /// Fetch the signed-in user's profile.
    pub async fn current_user(&self) -> AuthResult<UserProfile> {
        if self.inner.store.get().is_none() {
            return Err(AuthError::NotLoggedIn);
        }
        let response = self.inner.gateway.send(AuthApi::me_request()).await?;
        UserProfile::from_response(&response)
    }

    /// Renew the credential on demand (the idle warning's "stay signed in").
    ///
    /// On success the idle counter restarts. Any failure other than a
    /// concurrent logout ends the session.
    pub async fn stay_signed_in(&self) -> AuthResult<()> {
        if self.inner.store.get().is_none() {
            return Err(AuthError::NotLoggedIn);
        }
        let generation = self.inner.store.generation();

        match self.inner.coordinator.acquire(generation).await {
            Ok(_) => {
                if let Some(monitor) = self.inner.idle.lock().as_ref() {
                    monitor.renewed();
                }
                Ok(())
            }
            Err(RenewalFailure::Cancelled) => Err(AuthError::Cancelled),
            Err(failure) => {
                warn!(?failure, "Could not extend session");
                self.inner
                    .terminate(TerminationReason::AuthorizationExpired)?;
                Err(failure.into())
            }
        }
    }

    /// Report user activity to the idle monitor. Returns false when no
    /// session is being monitored.
    pub fn record_activity(&self, signal: ActivitySignal) -> bool {
        self.inner
            .idle
            .lock()
            .as_ref()
            .map(|monitor| monitor.record_activity(signal))
            .unwrap_or(false)
    }

    pub fn idle_state(&self) -> Option<IdleState> {
        self.inner.idle.lock().as_ref().map(|monitor| monitor.state())
    }

    pub fn current_role(&self) -> Option<Role> {
        self.inner.store.role()
    }

    pub fn current_token(&self) -> Option<String> {
        self.inner.store.access_token()
    }

    pub fn is_loading(&self) -> bool {
        *self.inner.loading.borrow()
    }

    /// Wait for the startup resume to settle.
    pub async fn wait_until_ready(&self) {
        let mut loading = self.inner.loading.subscribe();
        let _ = loading.wait_for(|loading| !*loading).await;
    }

    pub fn state(&self) -> AuthState {
        self.inner.state()
    }

    pub fn session(&self) -> SessionSnapshot {
        let state = self.inner.state();
        let credential = self.inner.store.get();
        let role = credential.as_ref().map(|c| c.role.clone());
        SessionSnapshot {
            state,
            loading: self.is_loading(),
            authenticated: credential.is_some(),
            home_route: home_route(role.as_ref()),
            role,
        }
    }

    /// Evaluate a route guard against the current session.
    pub fn guard(&self, guard: &RouteGuard) -> RouteDecision {
        guard.check(&self.session())
    }

    /// Watch credential changes.
    pub fn subscribe(&self) -> watch::Receiver<Option<Credential>> {
        self.inner.store.subscribe()
    }

    pub fn events(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    pub fn gateway(&self) -> &RequestGateway {
        &self.inner.gateway
    }

    fn start_idle(&self) {
        let context = Arc::downgrade(&self.inner);
        let on_expired: ExpiryHook = Arc::new(move || {
            if let Some(inner) = context.upgrade() {
                if let Err(err) = inner.terminate(TerminationReason::IdleExpiry) {
                    warn!(error = %err, "Failed to end idle session");
                }
            }
        });

        let monitor = IdleMonitor::spawn(
            self.inner.idle_config.clone(),
            self.inner.store.subscribe(),
            self.inner.events.clone(),
            on_expired,
        );
        let previous = self.inner.idle.lock().replace(monitor);
        drop(previous);
    }
}

impl ContextInner {
    fn state(&self) -> AuthState {
        AuthState::from(self.machine.lock().state())
    }

    /// The coordinator already cleared the store and published the event.
    fn renewal_refused(&self) {
        let monitor = self.idle.lock().take();
        if let Some(monitor) = monitor {
            monitor.stop();
        }
        if let Err(err) = self.transition(&SessionMachineInput::SessionTerminated) {
            debug!(error = %err, "Session machine already settled");
        }
    }

    fn transition(&self, input: &SessionMachineInput) -> AuthResult<AuthState> {
        let mut machine = self.machine.lock();
        let old_state = AuthState::from(machine.state());

        machine.consume(input).map_err(|_| {
            AuthError::InvalidStateTransition(format!(
                "Cannot apply {:?} in state {:?}",
                input,
                machine.state()
            ))
        })?;

        let new_state = AuthState::from(machine.state());
        drop(machine);

        if old_state != new_state {
            debug!(?old_state, ?new_state, "Session state changed");
        }
        Ok(new_state)
    }

    /// Stop monitoring, abandon pending renewal and clear the store.
    fn terminate(&self, reason: TerminationReason) -> AuthResult<bool> {
        let monitor = self.idle.lock().take();
        if let Some(monitor) = monitor {
            monitor.stop();
        }
        self.coordinator.cancel();
        let cleared = self.store.clear();

        let logged_in = AuthState::from(self.machine.lock().state()) == AuthState::LoggedIn;
        if reason == TerminationReason::UserLogout && logged_in {
            let _ = self.transition(&SessionMachineInput::LogoutRequested);
            let _ = self.transition(&SessionMachineInput::LogoutComplete);
        } else {
            let _ = self.transition(&SessionMachineInput::SessionTerminated);
        }

        let cleared = cleared?;
        if cleared {
            info!(?reason, "Session terminated");
            events::publish(&self.events, SessionEvent::Terminated { reason });
        } else {
            debug!(?reason, "No session to terminate");
        }
        Ok(cleared)
    }
}
