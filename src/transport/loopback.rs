//! In-memory loopback transport
//!
//! A synthetic transport that keeps connections, poll groups and queued
//! messages in process memory. State changes are queued and delivered by
//! [`LoopbackTransport::run_callbacks`], the way a real transport pumps its
//! callbacks once per tick. Used by the demo binary, tests and benchmarks.

use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, trace};

use super::{NetMessage, PollGroupHandle, SocketHandle, Transport};
use crate::connection::{Connection, ConnectionInfo, ConnectionState, NetIdentity};
use crate::error::TransportError;

/// Counts messages handed out and given back
#[derive(Debug, Default)]
pub struct ReleaseCounter {
    delivered: AtomicUsize,
    released: AtomicUsize,
}

impl ReleaseCounter {
    pub fn delivered(&self) -> usize {
        self.delivered.load(Ordering::Relaxed)
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::Relaxed)
    }

    /// Messages handed out and not yet released
    pub fn outstanding(&self) -> usize {
        self.delivered().saturating_sub(self.released())
    }
}

/// A message handed out by the loopback transport
#[derive(Debug)]
pub struct LoopbackMessage {
    connection: Connection,
    identity: NetIdentity,
    payload: Bytes,
    receive_time: i64,
    message_number: i64,
    channel: i32,
    counter: Arc<ReleaseCounter>,
}

impl NetMessage for LoopbackMessage {
    fn connection(&self) -> Connection {
        self.connection
    }

    fn identity(&self) -> &NetIdentity {
        &self.identity
    }

    fn payload(&self) -> &[u8] {
        &self.payload
    }

    fn receive_time(&self) -> i64 {
        self.receive_time
    }

    fn message_number(&self) -> i64 {
        self.message_number
    }

    fn channel(&self) -> i32 {
        self.channel
    }

    fn release(self) {
        self.counter.released.fetch_add(1, Ordering::Relaxed);
    }
}

struct PendingMessage {
    connection: Connection,
    payload: Bytes,
    receive_time: i64,
    message_number: i64,
    channel: i32,
}

struct LoopbackConnection {
    identity: NetIdentity,
    state: ConnectionState,
    accepted: bool,
    poll_group: PollGroupHandle,
    next_message_number: i64,
}

#[derive(Default)]
struct LoopbackState {
    connections: HashMap<Connection, LoopbackConnection>,
    poll_groups: HashSet<PollGroupHandle>,
    sockets: HashSet<SocketHandle>,
    pending: VecDeque<PendingMessage>,
    events: VecDeque<(Connection, ConnectionInfo)>,
    closed: Vec<Connection>,
    group_at_close: HashMap<Connection, PollGroupHandle>,
    assignments: Vec<(Connection, PollGroupHandle)>,
    fail_next_receive: Option<TransportError>,
    destroy_calls: usize,
    socket_close_calls: usize,
}

struct LoopbackInner {
    state: Mutex<LoopbackState>,
    valid: std::sync::atomic::AtomicBool,
    next_handle: AtomicU32,
    epoch: Instant,
    counter: Arc<ReleaseCounter>,
}

/// In-memory transport; clones share the same state
#[derive(Clone)]
pub struct LoopbackTransport {
    inner: Arc<LoopbackInner>,
}

impl Default for LoopbackTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopbackTransport {
    /// Create a fresh, valid transport session
    pub fn new() -> Self {
        Self {
            inner: Arc::new(LoopbackInner {
                state: Mutex::new(LoopbackState::default()),
                valid: std::sync::atomic::AtomicBool::new(true),
                next_handle: AtomicU32::new(1),
                epoch: Instant::now(),
                counter: Arc::new(ReleaseCounter::default()),
            }),
        }
    }

    fn next_handle(&self) -> u32 {
        self.inner.next_handle.fetch_add(1, Ordering::Relaxed)
    }

    fn now_micros(&self) -> i64 {
        self.inner.epoch.elapsed().as_micros() as i64
    }

    /// Open a listen socket
    pub fn listen(&self) -> SocketHandle {
        let socket = SocketHandle(self.next_handle());
        self.inner.state.lock().sockets.insert(socket);
        socket
    }

    /// Simulate an incoming connection; queues a Connecting notification
    pub fn connect(&self, identity: NetIdentity) -> Connection {
        let connection = Connection(self.next_handle());
        let mut state = self.inner.state.lock();
        state.connections.insert(
            connection,
            LoopbackConnection {
                identity: identity.clone(),
                state: ConnectionState::Connecting,
                accepted: false,
                poll_group: PollGroupHandle::NONE,
                next_message_number: 1,
            },
        );
        state.events.push_back((
            connection,
            ConnectionInfo::new(identity, ConnectionState::Connecting),
        ));
        debug!(conn = %connection, "Loopback peer connecting");
        connection
    }

    /// Simulate the peer closing the connection
    pub fn close_by_peer(&self, connection: Connection, reason: i32, end_debug: &str) {
        let mut state = self.inner.state.lock();
        if let Some(conn) = state.connections.get_mut(&connection) {
            conn.state = ConnectionState::ClosedByPeer;
            let info = ConnectionInfo::new(conn.identity.clone(), ConnectionState::ClosedByPeer)
                .with_end_reason(reason, end_debug);
            state.events.push_back((connection, info));
        }
    }

    /// Queue an arbitrary state-change notification
    pub fn report(&self, connection: Connection, info: ConnectionInfo) {
        self.inner.state.lock().events.push_back((connection, info));
    }

    /// Queue a message from the peer on `connection`
    ///
    /// Returns the assigned message number, or `None` for unknown connections.
    pub fn send_from_peer(
        &self,
        connection: Connection,
        channel: i32,
        payload: impl Into<Bytes>,
    ) -> Option<i64> {
        let receive_time = self.now_micros();
        let mut state = self.inner.state.lock();
        let conn = state.connections.get_mut(&connection)?;
        let message_number = conn.next_message_number;
        conn.next_message_number += 1;
        state.pending.push_back(PendingMessage {
            connection,
            payload: payload.into(),
            receive_time,
            message_number,
            channel,
        });
        Some(message_number)
    }

    /// Deliver queued state-change notifications
    ///
    /// Notifications raised while the callback runs (for example the
    /// Connected report following an accept) are delivered on the next call.
    pub fn run_callbacks<F>(&self, mut callback: F) -> usize
    where
        F: FnMut(Connection, &ConnectionInfo),
    {
        let events: Vec<_> = self.inner.state.lock().events.drain(..).collect();
        for (connection, info) in &events {
            callback(*connection, info);
        }
        events.len()
    }

    /// Make the next receive call fail with `error`
    pub fn fail_next_receive(&self, error: TransportError) {
        self.inner.state.lock().fail_next_receive = Some(error);
    }

    /// Invalidate the transport session
    pub fn shutdown(&self) {
        self.inner.valid.store(false, Ordering::Relaxed);
    }

    pub fn release_counter(&self) -> Arc<ReleaseCounter> {
        self.inner.counter.clone()
    }

    /// Messages still queued in the transport
    pub fn pending_messages(&self) -> usize {
        self.inner.state.lock().pending.len()
    }

    pub fn poll_group_of(&self, connection: Connection) -> Option<PollGroupHandle> {
        self.inner
            .state
            .lock()
            .connections
            .get(&connection)
            .map(|conn| conn.poll_group)
    }

    /// Poll group a connection was still assigned to when it was closed
    pub fn poll_group_at_close(&self, connection: Connection) -> Option<PollGroupHandle> {
        self.inner.state.lock().group_at_close.get(&connection).copied()
    }

    /// Every successful poll group assignment made for `connection`, in order
    pub fn poll_group_assignments(&self, connection: Connection) -> Vec<PollGroupHandle> {
        self.inner
            .state
            .lock()
            .assignments
            .iter()
            .filter(|(conn, _)| *conn == connection)
            .map(|(_, group)| *group)
            .collect()
    }

    pub fn is_accepted(&self, connection: Connection) -> bool {
        self.inner
            .state
            .lock()
            .connections
            .get(&connection)
            .map(|conn| conn.accepted)
            .unwrap_or(false)
    }

    /// Connections closed locally through `close_connection`
    pub fn closed_connections(&self) -> Vec<Connection> {
        self.inner.state.lock().closed.clone()
    }

    pub fn poll_group_count(&self) -> usize {
        self.inner.state.lock().poll_groups.len()
    }

    pub fn destroy_calls(&self) -> usize {
        self.inner.state.lock().destroy_calls
    }

    pub fn socket_close_calls(&self) -> usize {
        self.inner.state.lock().socket_close_calls
    }
}

impl Transport for LoopbackTransport {
    type Message = LoopbackMessage;

    fn is_valid(&self) -> bool {
        self.inner.valid.load(Ordering::Relaxed)
    }

    fn create_poll_group(&self) -> PollGroupHandle {
        if !self.is_valid() {
            return PollGroupHandle::NONE;
        }
        let group = PollGroupHandle(self.next_handle());
        self.inner.state.lock().poll_groups.insert(group);
        group
    }

    fn destroy_poll_group(&self, group: PollGroupHandle) -> bool {
        let mut state = self.inner.state.lock();
        state.destroy_calls += 1;
        if !state.poll_groups.remove(&group) {
            return false;
        }
        for conn in state.connections.values_mut() {
            if conn.poll_group == group {
                conn.poll_group = PollGroupHandle::NONE;
            }
        }
        true
    }

    fn set_connection_poll_group(&self, connection: Connection, group: PollGroupHandle) -> bool {
        let mut state = self.inner.state.lock();
        if !group.is_none() && !state.poll_groups.contains(&group) {
            return false;
        }
        match state.connections.get_mut(&connection) {
            Some(conn) => {
                conn.poll_group = group;
                state.assignments.push((connection, group));
                true
            }
            None => false,
        }
    }

    fn receive_messages_on_poll_group(
        &self,
        group: PollGroupHandle,
        out: &mut Vec<LoopbackMessage>,
        max: usize,
    ) -> Result<usize, TransportError> {
        let mut state = self.inner.state.lock();
        if let Some(error) = state.fail_next_receive.take() {
            return Err(error);
        }
        if !self.is_valid() {
            return Err(TransportError::InvalidSession);
        }
        if !state.poll_groups.contains(&group) {
            return Err(TransportError::InvalidPollGroup(group.0));
        }

        let LoopbackState {
            connections,
            pending,
            ..
        } = &mut *state;

        let mut received = 0;
        let mut index = 0;
        while received < max && index < pending.len() {
            let assigned = connections
                .get(&pending[index].connection)
                .map(|conn| conn.poll_group == group)
                .unwrap_or(false);
            if !assigned {
                index += 1;
                continue;
            }
            if let Some(message) = pending.remove(index) {
                let identity = connections
                    .get(&message.connection)
                    .map(|conn| conn.identity.clone())
                    .unwrap_or_default();
                out.push(LoopbackMessage {
                    connection: message.connection,
                    identity,
                    payload: message.payload,
                    receive_time: message.receive_time,
                    message_number: message.message_number,
                    channel: message.channel,
                    counter: self.inner.counter.clone(),
                });
                received += 1;
            }
        }

        self.inner.counter.delivered.fetch_add(received, Ordering::Relaxed);
        trace!(group = %group, received, max, "Loopback receive");
        Ok(received)
    }

    fn accept_connection(&self, connection: Connection) -> Result<(), TransportError> {
        let mut state = self.inner.state.lock();
        let conn = state
            .connections
            .get_mut(&connection)
            .ok_or(TransportError::InvalidConnection(connection.0))?;
        if conn.state != ConnectionState::Connecting {
            return Err(TransportError::InvalidConnection(connection.0));
        }
        conn.accepted = true;
        conn.state = ConnectionState::Connected;
        let info = ConnectionInfo::new(conn.identity.clone(), ConnectionState::Connected);
        state.events.push_back((connection, info));
        Ok(())
    }

    fn close_connection(
        &self,
        connection: Connection,
        reason: i32,
        end_debug: &str,
        _linger: bool,
    ) -> bool {
        let mut state = self.inner.state.lock();
        let Some(conn) = state.connections.remove(&connection) else {
            return false;
        };
        state.pending.retain(|message| message.connection != connection);
        state.closed.push(connection);
        state.group_at_close.insert(connection, conn.poll_group);
        debug!(conn = %connection, reason, end_debug, "Loopback connection closed");
        true
    }

    fn close_listen_socket(&self, socket: SocketHandle) -> bool {
        let mut state = self.inner.state.lock();
        state.socket_close_calls += 1;
        state.sockets.remove(&socket)
    }
}
