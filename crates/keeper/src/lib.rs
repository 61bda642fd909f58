//! Session lifecycle management for a role-gated REST client.
//!
//! This crate provides:
//! - A session store that persists the access token and role as one unit
//! - Single-flight credential renewal shared by every outgoing request
//! - A request gateway that attaches the bearer token and replays once after renewal
//! - An idle monitor that warns before terminating an inactive session
//! - The `SessionContext` façade tying them together, plus route guarding by role

mod api;
mod auth_fsm;
mod context;
mod error;
mod events;
mod gateway;
mod idle;
mod refresh;
mod role;
mod route_guard;
mod store;
mod transport;

pub use api::{AuthApi, TokenResponse, UserProfile, LOGIN_PATH, ME_PATH, REFRESH_PATH};
pub use auth_fsm::session_machine;
pub use auth_fsm::{AuthState, SessionMachine, SessionMachineInput, SessionMachineState};
pub use context::{SessionContext, SessionContextBuilder, SessionSnapshot};
pub use error::{AuthError, AuthResult};
pub use events::{SessionEvent, TerminationReason};
pub use gateway::RequestGateway;
pub use idle::{
    idle_machine, ActivitySignal, ExpiryHook, IdleConfig, IdleMonitor, IdleMonitorHandle,
    IdlePhase, IdleState, IdleTracker,
};
pub use refresh::{
    RefreshConfig, RefreshCoordinator, RefreshOutcome, RenewalFailure, TerminationHook,
};
pub use role::{home_route, normalize_role, Role, LOGIN_ROUTE};
pub use route_guard::{landing, RouteDecision, RouteGuard};
pub use store::{Credential, SessionStore};
pub use transport::{ApiRequest, ApiResponse, HttpTransport, Method, RequestBody, ReqwestTransport};
