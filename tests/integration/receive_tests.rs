//! Poll group receive loop tests

use anyhow::bail;
use tokio_test::{assert_err, assert_ok};

use mytunnel_session::config::{HandlerErrorPolicy, SessionConfig};
use mytunnel_session::connection::{Connection, NetIdentity};
use mytunnel_session::session::{AcceptAll, Message, SessionContext, SessionHandler, SessionManager};
use mytunnel_session::transport::{LoopbackTransport, Transport};
use mytunnel_session::{SessionError, TransportError};

use crate::common::{connected_peer, manager};

#[derive(Debug, Clone, PartialEq, Eq)]
struct Seen {
    connection: Connection,
    message_number: i64,
    channel: i32,
    payload: Vec<u8>,
}

/// Collects messages; optionally fails or panics on the n-th one (1-based)
#[derive(Default)]
struct Collector {
    seen: Vec<Seen>,
    fail_at: Option<usize>,
    panic_at: Option<usize>,
}

impl<T: Transport> SessionHandler<T> for Collector {
    fn on_message(
        &mut self,
        _session: &SessionContext<T>,
        message: &Message<'_>,
    ) -> anyhow::Result<()> {
        self.seen.push(Seen {
            connection: message.connection,
            message_number: message.message_number,
            channel: message.channel,
            payload: message.payload.to_vec(),
        });
        let n = self.seen.len();
        if self.panic_at == Some(n) {
            panic!("handler panicked on message {}", n);
        }
        if self.fail_at == Some(n) {
            bail!("handler failed on message {}", n);
        }
        Ok(())
    }
}

fn queue(transport: &LoopbackTransport, conn: Connection, count: usize) {
    for i in 0..count {
        transport.send_from_peer(conn, 0, format!("m{}", i).into_bytes());
    }
}

fn setup(
    handler: Collector,
    config: SessionConfig,
) -> (LoopbackTransport, SessionManager<LoopbackTransport, Collector>, Connection) {
    let transport = LoopbackTransport::new();
    let mut manager = manager(&transport, handler, config);
    let conn = connected_peer(&transport, &mut manager, 1);
    (transport, manager, conn)
}

#[test]
fn test_drain_75_with_capacity_32() {
    let (transport, mut manager, conn) = setup(Collector::default(), SessionConfig::default());
    queue(&transport, conn, 75);

    let stats = assert_ok!(manager.receive_with_capacity(32));

    assert_eq!(stats.rounds, 3);
    assert_eq!(stats.dispatched, 75);
    assert!(!stats.truncated);
    assert_eq!(manager.handler().seen.len(), 75);

    let counter = transport.release_counter();
    assert_eq!(counter.delivered(), 75);
    assert_eq!(counter.released(), 75);
    assert_eq!(transport.pending_messages(), 0);
}

#[test]
fn test_exact_multiple_needs_one_empty_round() {
    let (transport, mut manager, conn) = setup(Collector::default(), SessionConfig::default());
    queue(&transport, conn, 64);

    let stats = assert_ok!(manager.receive_with_capacity(32));
    assert_eq!(stats.rounds, 3);
    assert_eq!(stats.dispatched, 64);
}

#[test]
fn test_nothing_pending() {
    let (_transport, mut manager, _conn) = setup(Collector::default(), SessionConfig::default());

    let stats = assert_ok!(manager.receive());
    assert_eq!(stats.rounds, 1);
    assert_eq!(stats.dispatched, 0);
}

#[test]
fn test_fields_and_order_preserved() {
    let transport = LoopbackTransport::new();
    let mut manager = manager(&transport, Collector::default(), SessionConfig::default());
    let a = connected_peer(&transport, &mut manager, 1);
    let b = connected_peer(&transport, &mut manager, 2);

    for i in 0..5 {
        transport.send_from_peer(a, 1, vec![b'a', i]);
        transport.send_from_peer(b, 2, vec![b'b', i]);
    }
    assert_ok!(manager.receive_with_capacity(3));

    let seen = &manager.handler().seen;
    assert_eq!(seen.len(), 10);
    for conn in [a, b] {
        let numbers: Vec<i64> = seen
            .iter()
            .filter(|s| s.connection == conn)
            .map(|s| s.message_number)
            .collect();
        assert_eq!(numbers, vec![1, 2, 3, 4, 5]);
    }
    let first_b = seen.iter().find(|s| s.connection == b).unwrap();
    assert_eq!(first_b.channel, 2);
    assert_eq!(first_b.payload, vec![b'b', 0]);
}

#[test]
fn test_handler_failure_stops_and_releases_batch() {
    let handler = Collector {
        fail_at: Some(5),
        ..Collector::default()
    };
    let (transport, mut manager, conn) = setup(handler, SessionConfig::default());
    queue(&transport, conn, 10);

    let err = assert_err!(manager.receive_with_capacity(32));
    match err {
        SessionError::Handler { connection, .. } => assert_eq!(connection, conn),
        other => panic!("unexpected error: {other}"),
    }

    // Messages 6..10 were never dispatched but were all released
    assert_eq!(manager.handler().seen.len(), 5);
    let counter = transport.release_counter();
    assert_eq!(counter.delivered(), 10);
    assert_eq!(counter.released(), 10);
    assert_eq!(counter.outstanding(), 0);
}

#[test]
fn test_failure_leaves_unfetched_messages_queued() {
    let handler = Collector {
        fail_at: Some(5),
        ..Collector::default()
    };
    let (transport, mut manager, conn) = setup(handler, SessionConfig::default());
    queue(&transport, conn, 40);

    assert_err!(manager.receive_with_capacity(16));
    assert_eq!(transport.release_counter().released(), 16);
    assert_eq!(transport.pending_messages(), 24);

    let stats = assert_ok!(manager.receive_with_capacity(16));
    assert_eq!(stats.dispatched, 24);
    assert_eq!(transport.release_counter().outstanding(), 0);
}

#[test]
fn test_continue_policy_dispatches_everything() {
    let handler = Collector {
        fail_at: Some(5),
        ..Collector::default()
    };
    let config = SessionConfig {
        on_handler_error: HandlerErrorPolicy::Continue,
        ..SessionConfig::default()
    };
    let (transport, mut manager, conn) = setup(handler, config);
    queue(&transport, conn, 10);

    let stats = assert_ok!(manager.receive_with_capacity(4));
    assert_eq!(stats.dispatched, 10);
    assert_eq!(stats.failed, 1);
    assert_eq!(transport.release_counter().released(), 10);
}

#[test]
fn test_panicking_handler_still_releases() {
    let handler = Collector {
        panic_at: Some(3),
        ..Collector::default()
    };
    let (transport, mut manager, conn) = setup(handler, SessionConfig::default());
    queue(&transport, conn, 8);

    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        manager.receive_with_capacity(32)
    }));

    assert!(result.is_err());
    assert_eq!(transport.release_counter().released(), 8);
}

#[test]
fn test_transport_error_is_distinct_from_empty() {
    let (transport, mut manager, _conn) = setup(Collector::default(), SessionConfig::default());
    transport.fail_next_receive(TransportError::Code(-1));

    let err = assert_err!(manager.receive());
    assert!(matches!(err, SessionError::Transport(TransportError::Code(-1))));
    assert!(!err.is_transient());

    let stats = assert_ok!(manager.receive());
    assert_eq!(stats.dispatched, 0);
}

#[test]
fn test_buffer_exhaustion_is_transient() {
    let (transport, mut manager, conn) = setup(Collector::default(), SessionConfig::default());
    queue(&transport, conn, 3);

    let err = assert_err!(manager.receive_with_capacity(usize::MAX));
    assert!(matches!(err, SessionError::BufferExhausted { .. }));
    assert!(err.is_transient());
    assert_eq!(transport.pending_messages(), 3);

    let stats = assert_ok!(manager.receive());
    assert_eq!(stats.dispatched, 3);
}

#[test]
fn test_zero_capacity_rejected() {
    let (_transport, mut manager, _conn) = setup(Collector::default(), SessionConfig::default());
    assert!(matches!(
        manager.receive_with_capacity(0),
        Err(SessionError::InvalidCapacity)
    ));
}

#[test]
fn test_receive_requires_poll_group() {
    let transport = LoopbackTransport::new();
    let socket = transport.listen();
    let mut manager =
        SessionManager::new(transport.clone(), socket, AcceptAll, SessionConfig::default());
    assert!(matches!(manager.receive(), Err(SessionError::NotInitialized)));

    manager.initialize().unwrap();
    assert_ok!(manager.receive());

    manager.close();
    assert!(matches!(manager.receive(), Err(SessionError::NotInitialized)));
}

#[test]
fn test_round_limit_drains_over_ticks() {
    let config = SessionConfig {
        max_drain_rounds: 1,
        ..SessionConfig::default()
    };
    let (transport, mut manager, conn) = setup(Collector::default(), config);
    queue(&transport, conn, 75);

    let mut calls = 0;
    while transport.pending_messages() > 0 {
        let stats = assert_ok!(manager.receive_with_capacity(32));
        calls += 1;
        assert_eq!(stats.rounds, 1);
    }

    assert_eq!(calls, 3);
    assert_eq!(manager.handler().seen.len(), 75);
    assert_eq!(transport.release_counter().outstanding(), 0);
}

#[test]
fn test_only_connected_peers_are_polled() {
    let transport = LoopbackTransport::new();
    let mut manager = manager(&transport, Collector::default(), SessionConfig::default());
    let connected = connected_peer(&transport, &mut manager, 1);
    let pending = transport.connect(NetIdentity::Id(2));

    queue(&transport, connected, 2);
    queue(&transport, pending, 2);

    let stats = assert_ok!(manager.receive());
    assert_eq!(stats.dispatched, 2);
    assert!(manager.handler().seen.iter().all(|s| s.connection == connected));
    assert_eq!(transport.pending_messages(), 2);
}

#[test]
fn test_registry_accounts_messages() {
    let (transport, mut manager, conn) = setup(Collector::default(), SessionConfig::default());
    queue(&transport, conn, 4);
    assert_ok!(manager.receive());

    let snapshot = manager
        .registry()
        .snapshots()
        .into_iter()
        .find(|s| s.connection == conn.as_u32())
        .unwrap();
    assert_eq!(snapshot.messages_rx, 4);
    assert_eq!(snapshot.bytes_rx, 8);
}
