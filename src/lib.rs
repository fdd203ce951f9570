//! MyTunnel Session - poll-group session manager
//!
//! Turns a multiplexed message transport into an event-driven peer
//! connection layer: lifecycle hooks for connecting, connected and
//! disconnected peers, and a per-tick receive loop that drains a poll group
//! while returning every message buffer to the transport.

pub mod config;
pub mod connection;
pub mod error;
pub mod metrics;
pub mod persona;
pub mod pool;
pub mod session;
pub mod transport;
pub mod util;

pub use config::Config;
pub use error::{SessionError, TransportError};
pub use session::{SessionHandler, SessionManager, SharedSessionManager};

/// Crate version for display
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
