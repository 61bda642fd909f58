//! Inactivity policy.
//!
//! ## Phases
//!
//! ```text
//!            WarningReached             TimeoutReached
//!   Active ─────────────────► Warned ─────────────────► Expired
//!     ▲  ▲                      │                          │
//!     │  └── Activity/Renewal ──┘                          │
//!     └──────────────────────── Reset ─────────────────────┘
//! ```
//!
//! The counter advances one unit per tick and returns to zero on any
//! qualifying activity or a successful renewal. Expiry terminates the
//! session through the [`ExpiryHook`] and stops the monitor.

use crate::error::AuthResult;
use crate::events::{self, SessionEvent};
use crate::store::Credential;
use keeper_config::IdleSettings;
use rust_fsm::*;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};
use tracing::{debug, info, trace};

const COMMAND_CAPACITY: usize = 64;
const MIN_TICK: Duration = Duration::from_millis(1);

state_machine! {
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub idle_machine(Active)

    Active => {
        Activity => Active,
        Renewal => Active,
        WarningReached => Warned,
        TimeoutReached => Expired
    },
    Warned => {
        Activity => Active,
        Renewal => Active,
        TimeoutReached => Expired
    },
    Expired => {
        Reset => Active
    }
}

use idle_machine::Input as IdleInput;
use idle_machine::State as IdleMachineState;
use idle_machine::StateMachine as IdleMachine;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IdlePhase {
    Active,
    Warned,
    Expired,
}

impl From<&IdleMachineState> for IdlePhase {
    fn from(state: &IdleMachineState) -> Self {
        match state {
            IdleMachineState::Active => IdlePhase::Active,
            IdleMachineState::Warned => IdlePhase::Warned,
            IdleMachineState::Expired => IdlePhase::Expired,
        }
    }
}

/// Observable idle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IdleState {
    /// Ticks since the last qualifying activity.
    pub elapsed_units: u64,
    pub phase: IdlePhase,
}

/// Interactions that count as activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivitySignal {
    PointerMove,
    KeyPress,
    Click,
    Scroll,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdleConfig {
    /// Inactivity after which the session ends.
    pub timeout: Duration,
    /// Counter granularity. A zero tick is run as one millisecond.
    pub tick: Duration,
    /// How long before expiry the warning is raised.
    pub warning_margin: Duration,
}

impl Default for IdleConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(15 * 60),
            tick: Duration::from_secs(1),
            warning_margin: Duration::from_secs(60),
        }
    }
}

impl IdleConfig {
    pub fn from_settings(settings: &IdleSettings) -> AuthResult<Self> {
        settings.validate()?;
        Ok(Self {
            timeout: settings.timeout()?,
            tick: settings.tick(),
            warning_margin: settings.warning_margin()?,
        })
    }

    /// Tick period actually used by the monitor; never zero.
    pub fn period(&self) -> Duration {
        self.tick.max(MIN_TICK)
    }

    /// Wall-clock span covered by `units` ticks.
    pub fn span(&self, units: u64) -> Duration {
        self.period()
            .saturating_mul(u32::try_from(units).unwrap_or(u32::MAX))
    }

    fn units(&self, span: Duration) -> u64 {
        let tick = self.period().as_nanos();
        u64::try_from(span.as_nanos().div_ceil(tick)).unwrap_or(u64::MAX)
    }

    /// Tick count at which the session expires.
    pub fn expire_at(&self) -> u64 {
        self.units(self.timeout).max(1)
    }

    /// Tick count at which the warning is raised.
    pub fn warn_at(&self) -> u64 {
        self.units(self.timeout.saturating_sub(self.warning_margin))
    }
}

/// Pure idle counter driven by ticks and activity.
pub struct IdleTracker {
    machine: IdleMachine,
    elapsed_units: u64,
    warn_at: u64,
    expire_at: u64,
}

impl IdleTracker {
    pub fn new(config: &IdleConfig) -> Self {
        Self {
            machine: IdleMachine::new(),
            elapsed_units: 0,
            warn_at: config.warn_at(),
            expire_at: config.expire_at(),
        }
    }

    pub fn phase(&self) -> IdlePhase {
        IdlePhase::from(self.machine.state())
    }

    pub fn elapsed_units(&self) -> u64 {
        self.elapsed_units
    }

    pub fn state(&self) -> IdleState {
        IdleState {
            elapsed_units: self.elapsed_units,
            phase: self.phase(),
        }
    }

    /// Ticks left before expiry.
    pub fn remaining_units(&self) -> u64 {
        self.expire_at.saturating_sub(self.elapsed_units)
    }

    /// Advance one unit. Returns the phase entered, if the tick caused a
    /// transition.
    pub fn tick(&mut self) -> Option<IdlePhase> {
        if self.phase() == IdlePhase::Expired {
            return None;
        }
        self.elapsed_units += 1;
        if self.elapsed_units >= self.expire_at {
            self.apply(&IdleInput::TimeoutReached);
            return Some(IdlePhase::Expired);
        }
        if self.elapsed_units >= self.warn_at && self.phase() == IdlePhase::Active {
            self.apply(&IdleInput::WarningReached);
            return Some(IdlePhase::Warned);
        }
        None
    }

    /// Register qualifying activity. Returns false once expired.
    pub fn record_activity(&mut self) -> bool {
        self.restart(&IdleInput::Activity)
    }

    /// Register a successful renewal. Returns false once expired.
    pub fn renew(&mut self) -> bool {
        self.restart(&IdleInput::Renewal)
    }

    /// Start a fresh cycle, including after expiry.
    pub fn reset(&mut self) {
        if self.phase() == IdlePhase::Expired {
            self.apply(&IdleInput::Reset);
        }
        self.elapsed_units = 0;
    }

    fn restart(&mut self, input: &IdleInput) -> bool {
        if self.phase() == IdlePhase::Expired {
            return false;
        }
        self.apply(input);
        self.elapsed_units = 0;
        true
    }

    fn apply(&mut self, input: &IdleInput) {
        if self.machine.consume(input).is_err() {
            trace!(?input, state = ?self.machine.state(), "Ignored idle input");
        }
    }
}

/// Invoked once when the idle timeout is reached.
pub type ExpiryHook = Arc<dyn Fn() + Send + Sync>;

enum IdleCommand {
    Activity(ActivitySignal),
    Renewed,
}

pub struct IdleMonitor;

impl IdleMonitor {
    /// Start monitoring the session published on `session`.
    ///
    /// The monitor stops on its own when the session ends (the watched value
    /// becomes `None`) or after it fires `on_expired`.
    pub fn spawn(
        config: IdleConfig,
        mut session: watch::Receiver<Option<Credential>>,
        events: broadcast::Sender<SessionEvent>,
        on_expired: ExpiryHook,
    ) -> IdleMonitorHandle {
        let (commands, mut receiver) = mpsc::channel(COMMAND_CAPACITY);
        let mut tracker = IdleTracker::new(&config);
        let (state_tx, state_rx) = watch::channel(tracker.state());
        let tick = config.period();
        let mut ticker = interval_at(Instant::now() + tick, tick);

        let task = tokio::spawn(async move {
            if session.borrow_and_update().is_none() {
                debug!("No session to monitor");
                return;
            }
            debug!(
                timeout_secs = config.timeout.as_secs(),
                tick_ms = tick.as_millis() as u64,
                "Idle monitor started"
            );

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let entered = tracker.tick();
                        state_tx.send_replace(tracker.state());
                        match entered {
                            Some(IdlePhase::Warned) => {
                                let remaining = config.span(tracker.remaining_units());
                                info!(remaining_secs = remaining.as_secs(), "Idle warning");
                                events::publish(&events, SessionEvent::IdleWarning { remaining });
                            }
                            Some(IdlePhase::Expired) => {
                                info!(elapsed_units = tracker.elapsed_units(), "Idle timeout reached");
                                on_expired();
                                break;
                            }
                            _ => {}
                        }
                    }
                    command = receiver.recv() => {
                        let Some(command) = command else { break };
                        let was_warned = tracker.phase() == IdlePhase::Warned;
                        let accepted = match command {
                            IdleCommand::Activity(signal) => {
                                trace!(?signal, "Activity");
                                tracker.record_activity()
                            }
                            IdleCommand::Renewed => tracker.renew(),
                        };
                        if accepted {
                            state_tx.send_replace(tracker.state());
                            if was_warned {
                                events::publish(&events, SessionEvent::ActivityResumed);
                            }
                        }
                    }
                    changed = session.changed() => {
                        if changed.is_err() || session.borrow_and_update().is_none() {
                            debug!("Session ended, idle monitor stopping");
                            break;
                        }
                    }
                }
            }
        });

        IdleMonitorHandle {
            commands,
            state: state_rx,
            task,
        }
    }
}

/// Handle to a running idle monitor. Dropping it stops the monitor.
pub struct IdleMonitorHandle {
    commands: mpsc::Sender<IdleCommand>,
    state: watch::Receiver<IdleState>,
    task: JoinHandle<()>,
}

impl IdleMonitorHandle {
    /// Report qualifying activity. Returns false if the monitor is gone or
    /// saturated, which only happens when activity is already queued.
    pub fn record_activity(&self, signal: ActivitySignal) -> bool {
        self.send(IdleCommand::Activity(signal))
    }

    /// Report a successful renewal.
    pub fn renewed(&self) -> bool {
        self.send(IdleCommand::Renewed)
    }

    pub fn state(&self) -> IdleState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<IdleState> {
        self.state.clone()
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    pub fn stop(&self) {
        self.task.abort();
    }

    fn send(&self, command: IdleCommand) -> bool {
        match self.commands.try_send(command) {
            Ok(()) => true,
            Err(err) => {
                trace!(error = %err, "Idle command dropped");
                false
            }
        }
    }
}

impl Drop for IdleMonitorHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}
