//! Transport boundary
//!
//! The session layer does not establish, encrypt or route connections. It
//! drives an external transport through the [`Transport`] trait and consumes
//! the messages it hands out through [`NetMessage`].

mod loopback;

pub use loopback::{LoopbackMessage, LoopbackTransport, ReleaseCounter};

use std::fmt;

use crate::connection::{Connection, NetIdentity};
use crate::error::TransportError;

/// Transport-side poll group handle (0 = no group)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PollGroupHandle(pub u32);

impl PollGroupHandle {
    /// The "unassigned" value
    pub const NONE: PollGroupHandle = PollGroupHandle(0);

    pub fn is_none(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for PollGroupHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Transport-side listen socket handle (0 = none)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SocketHandle(pub u32);

impl SocketHandle {
    pub const NONE: SocketHandle = SocketHandle(0);

    pub fn is_none(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for SocketHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A received message owned by the transport until released
///
/// Implementations must make `release` return the transport-side resource.
/// The session layer calls it exactly once per message.
pub trait NetMessage {
    /// Connection the message arrived on
    fn connection(&self) -> Connection;
    /// Remote identity of the sender
    fn identity(&self) -> &NetIdentity;
    /// Message payload, valid until `release`
    fn payload(&self) -> &[u8];
    /// Transport receive timestamp in microseconds
    fn receive_time(&self) -> i64;
    /// Per-connection, monotonically increasing sequence number
    fn message_number(&self) -> i64;
    /// Logical channel (lane)
    fn channel(&self) -> i32;
    /// Give the message back to the transport
    fn release(self);
}

/// Operations the session layer needs from the transport
pub trait Transport {
    /// Message handle type handed out by `receive_messages_on_poll_group`
    type Message: NetMessage;

    /// Whether the transport session is still alive
    fn is_valid(&self) -> bool;

    /// Create a poll group; `PollGroupHandle::NONE` on failure
    fn create_poll_group(&self) -> PollGroupHandle;

    fn destroy_poll_group(&self, group: PollGroupHandle) -> bool;

    /// Assign a connection to a poll group (`NONE` clears the assignment)
    fn set_connection_poll_group(&self, connection: Connection, group: PollGroupHandle) -> bool;

    /// Move up to `max` pending messages for the group into `out`
    ///
    /// Returns the number of messages appended.
    fn receive_messages_on_poll_group(
        &self,
        group: PollGroupHandle,
        out: &mut Vec<Self::Message>,
        max: usize,
    ) -> Result<usize, TransportError>;

    /// Accept an incoming connection that is in the Connecting state
    fn accept_connection(&self, connection: Connection) -> Result<(), TransportError>;

    /// Close a connection, optionally lingering to flush queued reliable data
    fn close_connection(
        &self,
        connection: Connection,
        reason: i32,
        end_debug: &str,
        linger: bool,
    ) -> bool;

    fn close_listen_socket(&self, socket: SocketHandle) -> bool;
}
