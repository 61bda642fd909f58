//! Single-flight credential renewal.
//!
//! Any number of callers may discover at the same moment that the access token
//! was refused. The first one starts a renewal round; everyone else joins it
//! and receives the same outcome. A round is bound to the store generation
//! that was current when it started, so a logout (or a fresh login) while the
//! round is pending makes its result land nowhere.

use crate::api::AuthApi;
use crate::error::AuthError;
use crate::events::{self, SessionEvent, TerminationReason};
use crate::role::Role;
use crate::store::{Credential, SessionStore};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, oneshot};
use tracing::{debug, info, warn};

/// Configuration for retry behavior during token refresh.
#[derive(Debug, Clone)]
pub struct RefreshConfig {
    /// Maximum number of attempts per renewal round.
    pub max_retries: u32,
    /// Initial delay between retries in milliseconds.
    pub initial_delay_ms: u64,
    /// Maximum delay between retries in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 500,
            max_delay_ms: 5000,
        }
    }
}

impl RefreshConfig {
    /// Calculate the delay for a given attempt number (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay_ms = self
            .initial_delay_ms
            .saturating_mul(2u64.saturating_pow(attempt));
        Duration::from_millis(delay_ms.min(self.max_delay_ms))
    }
}

/// Why a renewal round produced no credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenewalFailure {
    /// The backend refused the refresh cookie; the session was terminated.
    Rejected { status: Option<u16>, detail: String },
    /// Network or server trouble; the session was left in place.
    Transient(String),
    /// The session ended (or was replaced) while the round was pending.
    Cancelled,
}

impl From<RenewalFailure> for AuthError {
    fn from(failure: RenewalFailure) -> Self {
        match failure {
            RenewalFailure::Rejected { .. } => AuthError::AuthorizationExpired,
            RenewalFailure::Transient(reason) => AuthError::RenewalUnavailable(reason),
            RenewalFailure::Cancelled => AuthError::Cancelled,
        }
    }
}

/// Result every waiter of a round receives.
pub type RefreshOutcome = Result<Credential, RenewalFailure>;

/// Called after a refused renewal has cleared the session.
pub type TerminationHook = Arc<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct RoundState {
    round: u64,
    in_flight: bool,
    waiters: Vec<oneshot::Sender<RefreshOutcome>>,
}

pub struct RefreshCoordinator {
    api: AuthApi,
    store: Arc<SessionStore>,
    events: broadcast::Sender<SessionEvent>,
    config: RefreshConfig,
    on_terminated: Option<TerminationHook>,
    state: Mutex<RoundState>,
}

impl RefreshCoordinator {
    pub fn new(
        api: AuthApi,
        store: Arc<SessionStore>,
        events: broadcast::Sender<SessionEvent>,
        config: RefreshConfig,
    ) -> Arc<Self> {
        Self::with_termination_hook(api, store, events, config, None)
    }

    /// Like [`RefreshCoordinator::new`], with `on_terminated` run whenever a
    /// refused renewal ends the session.
    pub fn with_termination_hook(
        api: AuthApi,
        store: Arc<SessionStore>,
        events: broadcast::Sender<SessionEvent>,
        config: RefreshConfig,
        on_terminated: Option<TerminationHook>,
    ) -> Arc<Self> {
        Arc::new(Self {
            api,
            store,
            events,
            config,
            on_terminated,
            state: Mutex::new(RoundState::default()),
        })
    }

    /// Obtain a renewed credential for the session observed at `generation`.
    ///
    /// Joins the pending round if there is one, otherwise starts a new one.
    /// Resolves with [`RenewalFailure::Cancelled`] right away if the session
    /// has already changed since `generation` was read.
    pub async fn acquire(self: &Arc<Self>, generation: u64) -> RefreshOutcome {
        let (tx, rx) = oneshot::channel();

        let started = {
            let mut state = self.state.lock();
            if self.store.generation() != generation {
                debug!(generation, "Renewal requested for a superseded session");
                return Err(RenewalFailure::Cancelled);
            }
            state.waiters.push(tx);
            if state.in_flight {
                debug!(
                    round = state.round,
                    waiters = state.waiters.len(),
                    "Joining pending renewal"
                );
                None
            } else {
                state.in_flight = true;
                state.round += 1;
                Some(state.round)
            }
        };

        if let Some(round) = started {
            info!(round, "Starting credential renewal");
            let coordinator = Arc::clone(self);
            tokio::spawn(async move {
                coordinator.run_round(round, generation).await;
            });
        }

        rx.await.unwrap_or(Err(RenewalFailure::Cancelled))
    }

    pub fn is_in_flight(&self) -> bool {
        self.state.lock().in_flight
    }

    /// Number of callers waiting on the pending round.
    pub fn waiting(&self) -> usize {
        self.state.lock().waiters.len()
    }

    /// Abandon the pending round. Every waiter resolves with
    /// [`RenewalFailure::Cancelled`]; the round's own result is discarded.
    ///
    /// Returns the number of waiters released.
    pub fn cancel(&self) -> usize {
        let waiters = {
            let mut state = self.state.lock();
            if !state.in_flight {
                return 0;
            }
            state.in_flight = false;
            state.round += 1;
            std::mem::take(&mut state.waiters)
        };

        let released = waiters.len();
        for waiter in waiters {
            let _ = waiter.send(Err(RenewalFailure::Cancelled));
        }
        if released > 0 {
            info!(released, "Cancelled pending renewal");
        }
        released
    }

    async fn run_round(self: Arc<Self>, round: u64, generation: u64) {
        let outcome = self.renew(generation).await;

        let waiters = {
            let mut state = self.state.lock();
            if state.round != round {
                debug!(round, "Renewal round finished after cancellation");
                return;
            }
            state.in_flight = false;
            std::mem::take(&mut state.waiters)
        };

        match &outcome {
            Ok(credential) => {
                info!(round, waiters = waiters.len(), role = %credential.role, "Credential renewed")
            }
            Err(failure) => {
                warn!(round, waiters = waiters.len(), ?failure, "Credential renewal failed")
            }
        }
        for waiter in waiters {
            let _ = waiter.send(outcome.clone());
        }
    }

    async fn renew(&self, generation: u64) -> RefreshOutcome {
        let tokens = match self.refresh_with_backoff().await {
            Ok(tokens) => tokens,
            Err(err) if err.is_transient() => return Err(RenewalFailure::Transient(err.to_string())),
            Err(err) => {
                let failure = RenewalFailure::Rejected {
                    status: err.status(),
                    detail: err.to_string(),
                };
                self.terminate(generation);
                return Err(failure);
            }
        };

        let Some(role) = Role::parse(&tokens.role) else {
            self.terminate(generation);
            return Err(RenewalFailure::Rejected {
                status: None,
                detail: "renewal response carried no role".to_string(),
            });
        };

        match self
            .store
            .set_if_generation(generation, &tokens.access_token, role)
        {
            Ok(Some(credential)) => {
                events::publish(
                    &self.events,
                    SessionEvent::Renewed {
                        role: credential.role.clone(),
                    },
                );
                Ok(credential)
            }
            Ok(None) => Err(RenewalFailure::Cancelled),
            Err(err) => Err(RenewalFailure::Transient(err.to_string())),
        }
    }

    /// Clear the session the round belonged to; only the first clear of a
    /// generation emits the termination event.
    fn terminate(&self, generation: u64) {
        match self.store.clear_if_generation(generation) {
            Ok(true) => {
                info!("Session terminated after renewal was refused");
                if let Some(hook) = &self.on_terminated {
                    hook();
                }
                events::publish(
                    &self.events,
                    SessionEvent::Terminated {
                        reason: TerminationReason::AuthorizationExpired,
                    },
                );
            }
            Ok(false) => {}
            Err(err) => warn!(error = %err, "Failed to clear refused session"),
        }
    }

    async fn refresh_with_backoff(&self) -> Result<crate::api::TokenResponse, AuthError> {
        let attempts = self.config.max_retries.max(1);
        let mut attempt = 0;
        loop {
            match self.api.refresh().await {
                Ok(tokens) => return Ok(tokens),
                Err(err) if err.is_transient() && attempt + 1 < attempts => {
                    let delay = self.config.delay_for_attempt(attempt);
                    warn!(
                        attempt = attempt + 1,
                        max_attempts = attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Renewal failed with transient error, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
