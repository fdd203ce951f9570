//! Connection registry
//!
//! Connecting/Connected membership for one session manager. Every tracked
//! connection has exactly one record carrying exactly one phase, so the two
//! sets can never intersect.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;

use super::state::{Connection, ConnectionPhase, ConnectionRecord, ConnectionSnapshot, NetIdentity};
use crate::metrics::METRICS;

/// Membership table shared between the session manager and inspectors
pub struct ConnectionRegistry {
    records: DashMap<Connection, ConnectionRecord>,
}

impl ConnectionRegistry {
    /// Create an empty registry
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            records: DashMap::new(),
        })
    }

    /// Add an untracked connection to the Connecting set
    ///
    /// Returns false (and changes nothing) if the connection is already tracked.
    pub fn track_connecting(&self, connection: Connection, identity: NetIdentity) -> bool {
        match self.records.entry(connection) {
            Entry::Occupied(entry) => {
                debug!(
                    conn = %connection,
                    phase = ?entry.get().phase,
                    "Connection already tracked"
                );
                false
            }
            Entry::Vacant(entry) => {
                entry.insert(ConnectionRecord::new(
                    connection,
                    identity,
                    ConnectionPhase::Connecting,
                ));
                METRICS.connection_tracked();
                METRICS.connecting_added();
                true
            }
        }
    }

    /// Move a connection into the Connected set
    ///
    /// Leaves the Connecting set if it was there; creates the record if the
    /// connection was never seen connecting. Returns false if it was already
    /// connected.
    pub fn mark_connected(&self, connection: Connection, identity: NetIdentity) -> bool {
        match self.records.entry(connection) {
            Entry::Occupied(mut entry) => {
                let record = entry.get_mut();
                if record.phase == ConnectionPhase::Connected {
                    return false;
                }
                record.phase = ConnectionPhase::Connected;
                if identity.is_valid() {
                    record.identity = identity;
                }
                record.touch();
                METRICS.connecting_removed();
                METRICS.connected_added();
                true
            }
            Entry::Vacant(entry) => {
                entry.insert(ConnectionRecord::new(
                    connection,
                    identity,
                    ConnectionPhase::Connected,
                ));
                METRICS.connection_tracked();
                METRICS.connected_added();
                true
            }
        }
    }

    /// Remove a connection from both sets
    pub fn forget(&self, connection: Connection) -> Option<ConnectionRecord> {
        let (_, record) = self.records.remove(&connection)?;
        match record.phase {
            ConnectionPhase::Connecting => METRICS.connecting_removed(),
            ConnectionPhase::Connected => METRICS.connected_removed(),
        }
        METRICS.connection_closed();
        Some(record)
    }

    /// Current phase of a connection, `None` if untracked
    pub fn phase(&self, connection: Connection) -> Option<ConnectionPhase> {
        self.records.get(&connection).map(|record| record.phase)
    }

    pub fn is_connecting(&self, connection: Connection) -> bool {
        self.phase(connection) == Some(ConnectionPhase::Connecting)
    }

    pub fn is_connected(&self, connection: Connection) -> bool {
        self.phase(connection) == Some(ConnectionPhase::Connected)
    }

    pub fn is_tracked(&self, connection: Connection) -> bool {
        self.records.contains_key(&connection)
    }

    /// Account a received message against its connection
    pub fn record_message(&self, connection: Connection, bytes: usize) {
        if let Some(mut record) = self.records.get_mut(&connection) {
            record.record_message(bytes);
        }
    }

    /// Members of the Connecting set, ordered by handle
    pub fn connecting(&self) -> Vec<Connection> {
        self.members(ConnectionPhase::Connecting)
    }

    /// Members of the Connected set, ordered by handle
    pub fn connected(&self) -> Vec<Connection> {
        self.members(ConnectionPhase::Connected)
    }

    fn members(&self, phase: ConnectionPhase) -> Vec<Connection> {
        let mut members: Vec<Connection> = self
            .records
            .iter()
            .filter(|entry| entry.value().phase == phase)
            .map(|entry| *entry.key())
            .collect();
        members.sort_unstable();
        members
    }

    /// Number of tracked connections in either set
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Serializable snapshots of every tracked connection
    pub fn snapshots(&self) -> Vec<ConnectionSnapshot> {
        let mut snapshots: Vec<ConnectionSnapshot> = self
            .records
            .iter()
            .map(|entry| entry.value().to_snapshot())
            .collect();
        snapshots.sort_unstable_by_key(|snapshot| snapshot.connection);
        snapshots
    }
}
