//! Error types
//!
//! Library-level errors for the session layer and the transport boundary.

use thiserror::Error;

use crate::connection::Connection;

/// Errors reported by a transport implementation
#[derive(Debug, Error)]
pub enum TransportError {
    /// The transport session is gone (shut down or never started)
    #[error("transport session is not valid")]
    InvalidSession,
    /// A poll group handle the transport does not know about
    #[error("invalid poll group handle {0}")]
    InvalidPollGroup(u32),
    /// A connection handle the transport does not know about
    #[error("invalid connection handle {0}")]
    InvalidConnection(u32),
    /// Transport-specific result code
    #[error("transport failure (code {0})")]
    Code(i32),
}

/// Errors surfaced by the session manager
#[derive(Debug, Error)]
pub enum SessionError {
    /// `receive` was called before `initialize` (or after `close`)
    #[error("session manager has no poll group; call initialize first")]
    NotInitialized,
    /// The transport refused to create a poll group
    #[error("transport could not create a poll group")]
    PollGroupUnavailable,
    /// A receive buffer capacity of zero can never drain
    #[error("receive buffer capacity must be > 0")]
    InvalidCapacity,
    /// Scratch buffer allocation failed; retry on the next tick
    #[error("could not allocate a receive buffer for {capacity} message handles")]
    BufferExhausted { capacity: usize },
    /// The transport reported an error instead of a message count
    #[error("transport error while receiving")]
    Transport(#[from] TransportError),
    /// An `on_message` handler failed
    #[error("message handler failed for connection {connection}")]
    Handler {
        connection: Connection,
        #[source]
        source: anyhow::Error,
    },
}

impl SessionError {
    /// Whether the caller should simply try again next tick
    pub fn is_transient(&self) -> bool {
        matches!(self, SessionError::BufferExhausted { .. })
    }
}

/// Result alias for session operations
pub type Result<T, E = SessionError> = std::result::Result<T, E>;
