//! Thread-safe wrapper
//!
//! Puts both entry points of a [`SessionManager`] behind one lock so a
//! multi-threaded embedding can drive it from any thread. Membership stays
//! readable through the registry without taking the lock.

use parking_lot::{Mutex, MutexGuard};
use std::sync::Arc;

use super::handler::SessionHandler;
use super::manager::SessionManager;
use super::receive::ReceiveStats;
use crate::connection::{Connection, ConnectionInfo, ConnectionRegistry};
use crate::error::Result;
use crate::transport::Transport;

/// Single-writer handle to a session manager
pub struct SharedSessionManager<T: Transport, H: SessionHandler<T>> {
    inner: Arc<Mutex<SessionManager<T, H>>>,
    registry: Arc<ConnectionRegistry>,
}

impl<T: Transport, H: SessionHandler<T>> Clone for SharedSessionManager<T, H> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            registry: self.registry.clone(),
        }
    }
}

impl<T: Transport, H: SessionHandler<T>> SharedSessionManager<T, H> {
    pub fn new(manager: SessionManager<T, H>) -> Self {
        let registry = manager.registry().clone();
        Self {
            inner: Arc::new(Mutex::new(manager)),
            registry,
        }
    }

    pub fn initialize(&self) -> Result<()> {
        self.inner.lock().initialize()
    }

    pub fn close(&self) -> bool {
        self.inner.lock().close()
    }

    pub fn on_connection_changed(&self, connection: Connection, info: &ConnectionInfo) {
        self.inner.lock().on_connection_changed(connection, info);
    }

    pub fn receive(&self) -> Result<ReceiveStats> {
        self.inner.lock().receive()
    }

    pub fn receive_with_capacity(&self, capacity: usize) -> Result<ReceiveStats> {
        self.inner.lock().receive_with_capacity(capacity)
    }

    /// Lock-free view of Connecting/Connected membership
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Exclusive access for anything else
    pub fn lock(&self) -> MutexGuard<'_, SessionManager<T, H>> {
        self.inner.lock()
    }
}
