//! Session manager
//!
//! Owns a poll group on the transport, turns raw state-change notifications
//! into lifecycle hooks and drains received messages once per tick.

use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

use super::context::SessionContext;
use super::handler::SessionHandler;
use crate::config::SessionConfig;
use crate::connection::{Connection, ConnectionInfo, ConnectionRegistry};
use crate::error::{Result, SessionError};
use crate::pool::HandleBufferPool;
use crate::transport::{PollGroupHandle, SocketHandle, Transport};

/// Connection-group session manager
///
/// Single-threaded: both entry points (`on_connection_changed` and
/// `receive`) must be called from one logical thread. Wrap it in a
/// [`SharedSessionManager`](super::SharedSessionManager) otherwise.
pub struct SessionManager<T: Transport, H: SessionHandler<T>> {
    pub(crate) context: SessionContext<T>,
    pub(crate) handler: H,
    pub(crate) pool: HandleBufferPool<T::Message>,
}

impl<T: Transport, H: SessionHandler<T>> SessionManager<T, H> {
    /// Create a manager for the listen socket `socket`
    ///
    /// Call [`initialize`](Self::initialize) before use.
    pub fn new(transport: T, socket: SocketHandle, handler: H, config: SessionConfig) -> Self {
        let pool = HandleBufferPool::new(config.scratch_buffers, config.receive_capacity);
        Self {
            context: SessionContext::new(transport, socket, config),
            handler,
            pool,
        }
    }

    /// Create the poll group
    ///
    /// Calling it again while a poll group exists does nothing.
    pub fn initialize(&mut self) -> Result<()> {
        if !self.context.poll_group.is_none() {
            debug!(group = %self.context.poll_group, "Session manager already initialized");
            return Ok(());
        }

        let group = self.context.transport.create_poll_group();
        if group.is_none() {
            return Err(SessionError::PollGroupUnavailable);
        }

        self.context.poll_group = group;
        info!(group = %group, socket = %self.context.socket, "Session manager initialized");
        Ok(())
    }

    /// Destroy the poll group and close the listen socket
    ///
    /// Transport calls are skipped when the transport session is gone or the
    /// handle is already empty. Local handles are always reset, so closing
    /// twice is harmless. Always returns true.
    pub fn close(&mut self) -> bool {
        let transport = &self.context.transport;
        if transport.is_valid() {
            if !self.context.poll_group.is_none() {
                transport.destroy_poll_group(self.context.poll_group);
            }
            if !self.context.socket.is_none() {
                transport.close_listen_socket(self.context.socket);
            }
            info!(
                group = %self.context.poll_group,
                socket = %self.context.socket,
                tracked = self.context.registry.len(),
                "Session manager closed"
            );
        } else {
            debug!("Transport already gone; clearing session handles");
        }

        self.context.poll_group = PollGroupHandle::NONE;
        self.context.socket = SocketHandle::NONE;
        true
    }

    /// Transport state-change notification entry point
    pub fn on_connection_changed(&mut self, connection: Connection, info: &ConnectionInfo) {
        debug!(conn = %connection, state = ?info.state, "Connection state changed");
        self.handler
            .on_connection_changed(&mut self.context, connection, info);
    }

    /// Members of the Connecting set
    pub fn connecting(&self) -> Vec<Connection> {
        self.context.registry.connecting()
    }

    /// Members of the Connected set
    pub fn connected(&self) -> Vec<Connection> {
        self.context.registry.connected()
    }

    /// Membership registry, shareable with inspectors
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.context.registry
    }

    pub fn poll_group(&self) -> PollGroupHandle {
        self.context.poll_group
    }

    pub fn socket(&self) -> SocketHandle {
        self.context.socket
    }

    pub fn transport(&self) -> &T {
        &self.context.transport
    }

    pub fn context(&self) -> &SessionContext<T> {
        &self.context
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }
}

impl<T: Transport, H: SessionHandler<T>> fmt::Display for SessionManager<T, H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.context.socket)
    }
}

impl<T: Transport, H: SessionHandler<T>> Drop for SessionManager<T, H> {
    fn drop(&mut self) {
        if !self.context.poll_group.is_none() || !self.context.socket.is_none() {
            self.close();
        }
    }
}
