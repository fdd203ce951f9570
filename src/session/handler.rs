//! Session event hooks
//!
//! Every hook has a default. Implementors override only what they need; the
//! defaults turn the session manager into an always-accept listener.

use anyhow::Result;
use tracing::trace;

use super::context::SessionContext;
use super::message::Message;
use crate::connection::{Connection, ConnectionInfo, ConnectionState};
use crate::transport::Transport;

/// Hooks driven by [`SessionManager`](super::SessionManager)
pub trait SessionHandler<T: Transport> {
    /// Entry point for every transport state-change notification
    ///
    /// Rarely overridden; the default routes to the three lifecycle hooks
    /// via [`dispatch_connection_change`].
    fn on_connection_changed(
        &mut self,
        session: &mut SessionContext<T>,
        connection: Connection,
        info: &ConnectionInfo,
    ) {
        dispatch_connection_change(self, session, connection, info);
    }

    /// A connection not yet in the Connecting set reports Connecting
    ///
    /// Default: accept it and add it to the Connecting set. Override to
    /// reject or defer; an untracked connection is eventually reported closed
    /// by the transport.
    fn on_connecting(
        &mut self,
        session: &mut SessionContext<T>,
        connection: Connection,
        info: &ConnectionInfo,
    ) {
        session.accept_connecting(connection, info);
    }

    /// A connection not yet in the Connected set reports Connected
    ///
    /// Default: move it to the Connected set and into the poll group.
    fn on_connected(
        &mut self,
        session: &mut SessionContext<T>,
        connection: Connection,
        info: &ConnectionInfo,
    ) {
        session.promote_connected(connection, info);
    }

    /// A tracked connection was closed by the peer or failed locally
    ///
    /// Default: leave the poll group, close the connection and forget it.
    fn on_disconnected(
        &mut self,
        session: &mut SessionContext<T>,
        connection: Connection,
        info: &ConnectionInfo,
    ) {
        session.drop_connection(connection, info);
    }

    /// One received message
    ///
    /// The message is released after this returns, whether it succeeded or not.
    fn on_message(&mut self, _session: &SessionContext<T>, _message: &Message<'_>) -> Result<()> {
        Ok(())
    }
}

/// Route a state change to the matching lifecycle hook
///
/// Set membership decides whether a transition was already handled, so
/// repeated reports of the same state fire nothing.
pub fn dispatch_connection_change<T, H>(
    handler: &mut H,
    session: &mut SessionContext<T>,
    connection: Connection,
    info: &ConnectionInfo,
) where
    T: Transport,
    H: SessionHandler<T> + ?Sized,
{
    let registry = session.registry().clone();
    match info.state {
        ConnectionState::Connecting => {
            if !registry.is_connecting(connection) {
                handler.on_connecting(session, connection, info);
            }
        }
        ConnectionState::Connected => {
            if !registry.is_connected(connection) {
                handler.on_connected(session, connection, info);
            }
        }
        state if state.is_terminal() => {
            if registry.is_tracked(connection) {
                handler.on_disconnected(session, connection, info);
            }
        }
        other => {
            trace!(conn = %connection, state = ?other, "Ignoring intermediate state");
        }
    }
}

/// Handler that keeps every default
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl<T: Transport> SessionHandler<T> for AcceptAll {}
