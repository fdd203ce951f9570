//! Session management
//!
//! Connection lifecycle state machine, poll group receive loop and the
//! handler hooks embedders override.

mod context;
mod handler;
mod manager;
mod message;
mod receive;
mod shared;

pub use context::{SessionContext, END_APP_GENERIC};
pub use handler::{dispatch_connection_change, AcceptAll, SessionHandler};
pub use manager::SessionManager;
pub use message::{Message, MessageGuard};
pub use receive::ReceiveStats;
pub use shared::SharedSessionManager;
