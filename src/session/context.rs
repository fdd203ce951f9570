//! Session state shared with handlers
//!
//! Holds the transport, the poll group and the membership registry. The
//! default lifecycle behaviour lives here so overriding handlers can still
//! call it.

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::connection::{Connection, ConnectionInfo, ConnectionRegistry};
use crate::metrics::METRICS;
use crate::transport::{PollGroupHandle, SocketHandle, Transport};

/// End reason for connections closed by the application
pub const END_APP_GENERIC: i32 = 1000;

/// Transport, handles and membership for one session manager
pub struct SessionContext<T: Transport> {
    pub(crate) transport: T,
    pub(crate) registry: Arc<ConnectionRegistry>,
    pub(crate) poll_group: PollGroupHandle,
    pub(crate) socket: SocketHandle,
    pub(crate) config: SessionConfig,
}

impl<T: Transport> SessionContext<T> {
    pub(crate) fn new(transport: T, socket: SocketHandle, config: SessionConfig) -> Self {
        Self {
            transport,
            registry: ConnectionRegistry::new(),
            poll_group: PollGroupHandle::NONE,
            socket,
            config,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    pub fn poll_group(&self) -> PollGroupHandle {
        self.poll_group
    }

    pub fn socket(&self) -> SocketHandle {
        self.socket
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Default Connecting behaviour: accept and track
    ///
    /// Connections over the configured limit are closed and left untracked,
    /// as are connections the transport refuses to accept.
    pub fn accept_connecting(&mut self, connection: Connection, info: &ConnectionInfo) {
        if self.registry.is_tracked(connection) {
            debug!(conn = %connection, "Connecting report for tracked connection");
            return;
        }

        let limit = self.config.max_connections;
        if limit > 0 && self.registry.len() >= limit {
            warn!(
                conn = %connection,
                identity = %info.identity,
                limit,
                "Connection rejected: at capacity"
            );
            self.reject(connection, "server at capacity");
            return;
        }

        if let Err(e) = self.transport.accept_connection(connection) {
            warn!(
                conn = %connection,
                identity = %info.identity,
                error = %e,
                "Failed to accept connection"
            );
            METRICS.connection_rejected();
            return;
        }

        self.registry.track_connecting(connection, info.identity.clone());
        info!(conn = %connection, identity = %info.identity, "Connection accepted");
    }

    /// Default Connected behaviour: Connecting -> Connected, join the poll group
    pub fn promote_connected(&mut self, connection: Connection, info: &ConnectionInfo) {
        self.registry.mark_connected(connection, info.identity.clone());

        if self.poll_group.is_none() {
            warn!(conn = %connection, "Connected before initialize; messages will not be polled");
        } else if !self
            .transport
            .set_connection_poll_group(connection, self.poll_group)
        {
            warn!(conn = %connection, group = %self.poll_group, "Failed to assign poll group");
        }

        info!(conn = %connection, identity = %info.identity, "Connection established");
    }

    /// Default disconnect behaviour: leave the poll group, close, forget
    pub fn drop_connection(&mut self, connection: Connection, info: &ConnectionInfo) {
        self.transport
            .set_connection_poll_group(connection, PollGroupHandle::NONE);
        self.transport.close_connection(
            connection,
            0,
            "Closing Connection",
            self.config.linger_on_close,
        );

        if let Some(record) = self.registry.forget(connection) {
            info!(
                conn = %connection,
                identity = %record.identity,
                state = ?info.state,
                end_reason = info.end_reason,
                end_debug = %info.end_debug,
                duration_secs = record.tracked_at.elapsed().as_secs_f64(),
                messages_rx = record.messages_rx,
                bytes_rx = record.bytes_rx,
                "Connection ended"
            );
        }
    }

    /// Close a connection that is not going to be tracked
    pub fn reject(&mut self, connection: Connection, reason: &str) {
        self.transport
            .close_connection(connection, END_APP_GENERIC, reason, false);
        METRICS.connection_rejected();
    }
}
