//! Received messages
//!
//! [`MessageGuard`] owns one transport message for the duration of its
//! dispatch and releases it exactly once when dropped, on every exit path.
//! Handlers only ever see a [`Message`] borrowed from the guard, so a payload
//! cannot be touched after the transport has taken it back.

use crate::connection::{Connection, NetIdentity};
use crate::metrics::METRICS;
use crate::transport::NetMessage;

/// Borrowed view of a received message
#[derive(Debug, Clone, Copy)]
pub struct Message<'a> {
    /// Connection the message arrived on
    pub connection: Connection,
    /// Remote identity of the sender
    pub identity: &'a NetIdentity,
    /// Payload bytes, owned by the transport
    pub payload: &'a [u8],
    /// Per-connection sequence number
    pub message_number: i64,
    /// Transport receive timestamp (microseconds)
    pub receive_time: i64,
    /// Logical channel
    pub channel: i32,
}

impl Message<'_> {
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

/// Scoped ownership of one transport message
pub struct MessageGuard<M: NetMessage> {
    message: Option<M>,
}

impl<M: NetMessage> MessageGuard<M> {
    pub fn new(message: M) -> Self {
        Self {
            message: Some(message),
        }
    }

    /// Borrow the message fields
    pub fn message(&self) -> Option<Message<'_>> {
        let raw = self.message.as_ref()?;
        Some(Message {
            connection: raw.connection(),
            identity: raw.identity(),
            payload: raw.payload(),
            message_number: raw.message_number(),
            receive_time: raw.receive_time(),
            channel: raw.channel(),
        })
    }

    /// Release now instead of at end of scope
    pub fn release(mut self) {
        self.release_inner();
    }

    fn release_inner(&mut self) {
        if let Some(message) = self.message.take() {
            message.release();
            METRICS.message_released();
        }
    }
}

impl<M: NetMessage> Drop for MessageGuard<M> {
    fn drop(&mut self) {
        self.release_inner();
    }
}
