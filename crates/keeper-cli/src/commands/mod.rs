//! CLI command implementations.

mod auth;
mod request;
mod watch;

pub use auth::{login, logout, status, whoami};
pub use request::request;
pub use watch::watch;
