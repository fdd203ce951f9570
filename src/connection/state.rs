//! Connection handles, transport-reported state and per-connection records

use serde::Serialize;
use std::fmt;
use std::net::SocketAddr;
use std::time::Instant;

/// Opaque transport connection handle
///
/// Stable for the lifetime of the transport-side connection. Zero is never
/// a live connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Connection(pub u32);

impl Connection {
    /// Create from raw handle value
    pub fn from_raw(id: u32) -> Self {
        Self(id)
    }

    /// Get raw value
    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Identity of the remote end of a connection
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum NetIdentity {
    /// Not known (yet)
    #[default]
    Invalid,
    /// Platform account id
    Id(u64),
    /// Raw address identity
    Address(SocketAddr),
    /// Application-defined string identity
    Name(String),
}

impl NetIdentity {
    pub fn is_valid(&self) -> bool {
        !matches!(self, NetIdentity::Invalid)
    }
}

impl fmt::Display for NetIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetIdentity::Invalid => f.write_str("invalid"),
            NetIdentity::Id(id) => write!(f, "id:{}", id),
            NetIdentity::Address(addr) => write!(f, "ip:{}", addr),
            NetIdentity::Name(name) => write!(f, "str:{}", name),
        }
    }
}

/// Connection state as reported by the transport
///
/// Discriminants match the transport's wire-level codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ConnectionState {
    None = 0,
    Connecting = 1,
    FindingRoute = 2,
    Connected = 3,
    ClosedByPeer = 4,
    ProblemDetectedLocally = 5,
    FinWait = -1,
    Linger = -2,
    Dead = -3,
}

impl ConnectionState {
    /// States that end a tracked connection
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ConnectionState::ClosedByPeer
                | ConnectionState::ProblemDetectedLocally
                | ConnectionState::None
        )
    }
}

impl TryFrom<i32> for ConnectionState {
    type Error = i32;

    fn try_from(raw: i32) -> Result<Self, Self::Error> {
        Ok(match raw {
            0 => ConnectionState::None,
            1 => ConnectionState::Connecting,
            2 => ConnectionState::FindingRoute,
            3 => ConnectionState::Connected,
            4 => ConnectionState::ClosedByPeer,
            5 => ConnectionState::ProblemDetectedLocally,
            -1 => ConnectionState::FinWait,
            -2 => ConnectionState::Linger,
            -3 => ConnectionState::Dead,
            other => return Err(other),
        })
    }
}

/// Immutable snapshot handed over with a state-change notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
    /// Remote identity
    pub identity: NetIdentity,
    /// Reported state
    pub state: ConnectionState,
    /// Transport end reason code (0 while the connection is alive)
    pub end_reason: i32,
    /// Human-readable end reason
    pub end_debug: String,
}

impl ConnectionInfo {
    pub fn new(identity: NetIdentity, state: ConnectionState) -> Self {
        Self {
            identity,
            state,
            end_reason: 0,
            end_debug: String::new(),
        }
    }

    /// Attach end-of-connection metadata
    pub fn with_end_reason(mut self, reason: i32, end_debug: impl Into<String>) -> Self {
        self.end_reason = reason;
        self.end_debug = end_debug.into();
        self
    }
}

/// Which tracked set a connection belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConnectionPhase {
    /// Accepted, handshake not finished
    Connecting,
    /// Established and assigned to the poll group
    Connected,
}

/// Bookkeeping entry for one tracked connection
#[derive(Debug)]
pub struct ConnectionRecord {
    pub connection: Connection,
    pub identity: NetIdentity,
    pub phase: ConnectionPhase,
    /// When the connection was first tracked
    pub tracked_at: Instant,
    /// Last message or transition
    pub last_active: Instant,
    pub messages_rx: u64,
    pub bytes_rx: u64,
}

impl ConnectionRecord {
    pub fn new(connection: Connection, identity: NetIdentity, phase: ConnectionPhase) -> Self {
        let now = Instant::now();
        Self {
            connection,
            identity,
            phase,
            tracked_at: now,
            last_active: now,
            messages_rx: 0,
            bytes_rx: 0,
        }
    }

    pub fn touch(&mut self) {
        self.last_active = Instant::now();
    }

    /// Record one received message
    pub fn record_message(&mut self, bytes: usize) {
        self.messages_rx = self.messages_rx.saturating_add(1);
        self.bytes_rx = self.bytes_rx.saturating_add(bytes as u64);
        self.touch();
    }

    pub fn to_snapshot(&self) -> ConnectionSnapshot {
        ConnectionSnapshot {
            connection: self.connection.as_u32(),
            identity: self.identity.to_string(),
            phase: self.phase,
            tracked_secs: self.tracked_at.elapsed().as_secs_f64(),
            idle_secs: self.last_active.elapsed().as_secs_f64(),
            messages_rx: self.messages_rx,
            bytes_rx: self.bytes_rx,
        }
    }
}

/// Serializable view of a tracked connection for inspection
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionSnapshot {
    pub connection: u32,
    pub identity: String,
    pub phase: ConnectionPhase,
    pub tracked_secs: f64,
    pub idle_secs: f64,
    pub messages_rx: u64,
    pub bytes_rx: u64,
}
