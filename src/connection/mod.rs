//! Connection tracking
//!
//! Connection handles, transport-reported state snapshots and the
//! Connecting/Connected membership registry.

mod registry;
mod state;

pub use registry::ConnectionRegistry;
pub use state::{
    Connection, ConnectionInfo, ConnectionPhase, ConnectionRecord, ConnectionSnapshot,
    ConnectionState, NetIdentity,
};
