//! Connection lifecycle tests

use mytunnel_session::config::SessionConfig;
use mytunnel_session::connection::{Connection, ConnectionInfo, ConnectionState, NetIdentity};
use mytunnel_session::session::{AcceptAll, SessionContext, SessionHandler};
use mytunnel_session::transport::{LoopbackTransport, PollGroupHandle};

use crate::common::{connected_peer, manager, pump};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Event {
    Connecting(Connection),
    Connected(Connection),
    Disconnected(Connection),
}

/// Records every lifecycle hook, then runs the default behaviour
#[derive(Default)]
struct Recorder {
    events: Vec<Event>,
}

impl SessionHandler<LoopbackTransport> for Recorder {
    fn on_connecting(
        &mut self,
        session: &mut SessionContext<LoopbackTransport>,
        connection: Connection,
        info: &ConnectionInfo,
    ) {
        self.events.push(Event::Connecting(connection));
        session.accept_connecting(connection, info);
    }

    fn on_connected(
        &mut self,
        session: &mut SessionContext<LoopbackTransport>,
        connection: Connection,
        info: &ConnectionInfo,
    ) {
        self.events.push(Event::Connected(connection));
        session.promote_connected(connection, info);
    }

    fn on_disconnected(
        &mut self,
        session: &mut SessionContext<LoopbackTransport>,
        connection: Connection,
        info: &ConnectionInfo,
    ) {
        self.events.push(Event::Disconnected(connection));
        session.drop_connection(connection, info);
    }
}

/// Admission control: never accepts
struct RejectAll;

impl SessionHandler<LoopbackTransport> for RejectAll {
    fn on_connecting(
        &mut self,
        session: &mut SessionContext<LoopbackTransport>,
        connection: Connection,
        _info: &ConnectionInfo,
    ) {
        session.reject(connection, "not admitting");
    }
}

fn info(state: ConnectionState) -> ConnectionInfo {
    ConnectionInfo::new(NetIdentity::Id(42), state)
}

#[test]
fn test_connect_then_peer_close() {
    let transport = LoopbackTransport::new();
    let mut manager = manager(&transport, Recorder::default(), SessionConfig::default());

    let conn = transport.connect(NetIdentity::Id(42));
    transport.run_callbacks(|c, i| manager.on_connection_changed(c, i));
    assert_eq!(manager.handler().events, vec![Event::Connecting(conn)]);
    assert_eq!(manager.connecting(), vec![conn]);
    assert!(manager.connected().is_empty());

    transport.run_callbacks(|c, i| manager.on_connection_changed(c, i));
    assert_eq!(
        manager.handler().events,
        vec![Event::Connecting(conn), Event::Connected(conn)]
    );
    assert!(manager.connecting().is_empty());
    assert_eq!(manager.connected(), vec![conn]);
    assert_eq!(transport.poll_group_of(conn), Some(manager.poll_group()));

    transport.close_by_peer(conn, 1000, "bye");
    pump(&transport, &mut manager);
    assert_eq!(
        manager.handler().events,
        vec![
            Event::Connecting(conn),
            Event::Connected(conn),
            Event::Disconnected(conn)
        ]
    );
    assert!(manager.connected().is_empty());
    assert!(manager.connecting().is_empty());
    assert_eq!(transport.closed_connections(), vec![conn]);
    assert_eq!(transport.poll_group_at_close(conn), Some(PollGroupHandle::NONE));
}

#[test]
fn test_repeated_reports_fire_once() {
    let transport = LoopbackTransport::new();
    let mut manager = manager(&transport, Recorder::default(), SessionConfig::default());
    let conn = transport.connect(NetIdentity::Id(42));

    manager.on_connection_changed(conn, &info(ConnectionState::Connecting));
    manager.on_connection_changed(conn, &info(ConnectionState::Connecting));
    manager.on_connection_changed(conn, &info(ConnectionState::Connected));
    manager.on_connection_changed(conn, &info(ConnectionState::Connected));
    manager.on_connection_changed(conn, &info(ConnectionState::ProblemDetectedLocally));
    manager.on_connection_changed(conn, &info(ConnectionState::ClosedByPeer));
    manager.on_connection_changed(conn, &info(ConnectionState::None));

    assert_eq!(
        manager.handler().events,
        vec![
            Event::Connecting(conn),
            Event::Connected(conn),
            Event::Disconnected(conn)
        ]
    );
}

#[test]
fn test_intermediate_states_ignored() {
    let transport = LoopbackTransport::new();
    let mut manager = manager(&transport, Recorder::default(), SessionConfig::default());
    let conn = transport.connect(NetIdentity::Id(42));

    for state in [
        ConnectionState::FindingRoute,
        ConnectionState::FinWait,
        ConnectionState::Linger,
        ConnectionState::Dead,
    ] {
        manager.on_connection_changed(conn, &info(state));
    }

    assert!(manager.handler().events.is_empty());
    assert!(manager.registry().is_empty());
}

#[test]
fn test_close_of_unknown_connection_ignored() {
    let transport = LoopbackTransport::new();
    let mut manager = manager(&transport, Recorder::default(), SessionConfig::default());

    manager.on_connection_changed(Connection(999), &info(ConnectionState::ClosedByPeer));
    assert!(manager.handler().events.is_empty());
    assert!(transport.closed_connections().is_empty());
}

#[test]
fn test_disconnect_while_connecting() {
    let transport = LoopbackTransport::new();
    let mut manager = manager(&transport, Recorder::default(), SessionConfig::default());
    let conn = transport.connect(NetIdentity::Id(42));

    manager.on_connection_changed(conn, &info(ConnectionState::Connecting));
    manager.on_connection_changed(conn, &info(ConnectionState::ProblemDetectedLocally));

    assert_eq!(
        manager.handler().events,
        vec![Event::Connecting(conn), Event::Disconnected(conn)]
    );
    assert!(manager.registry().is_empty());
}

#[test]
fn test_sets_never_intersect() {
    let transport = LoopbackTransport::new();
    let mut manager = manager(&transport, AcceptAll, SessionConfig::default());

    let conns: Vec<Connection> = (0..6).map(|i| transport.connect(NetIdentity::Id(i))).collect();
    let check = |manager: &mytunnel_session::SessionManager<LoopbackTransport, AcceptAll>| {
        let connecting = manager.connecting();
        assert!(manager.connected().iter().all(|c| !connecting.contains(c)));
    };

    transport.run_callbacks(|c, i| manager.on_connection_changed(c, i));
    check(&manager);
    assert_eq!(manager.connecting().len(), 6);

    // A stray Connecting report for a connected peer must not demote it
    transport.run_callbacks(|c, i| manager.on_connection_changed(c, i));
    manager.on_connection_changed(conns[0], &info(ConnectionState::Connecting));
    check(&manager);
    assert_eq!(manager.connected().len(), 6);

    transport.close_by_peer(conns[1], 0, "");
    pump(&transport, &mut manager);
    check(&manager);
    assert_eq!(manager.connected().len(), 5);
}

#[test]
fn test_rejecting_handler_leaves_connection_untracked() {
    let transport = LoopbackTransport::new();
    let mut manager = manager(&transport, RejectAll, SessionConfig::default());

    let conn = transport.connect(NetIdentity::Id(1));
    pump(&transport, &mut manager);

    assert!(manager.registry().is_empty());
    assert!(!transport.is_accepted(conn));
    assert_eq!(transport.closed_connections(), vec![conn]);
}

#[test]
fn test_connection_limit() {
    let transport = LoopbackTransport::new();
    let config = SessionConfig {
        max_connections: 2,
        ..SessionConfig::default()
    };
    let mut manager = manager(&transport, AcceptAll, config);

    let first = connected_peer(&transport, &mut manager, 1);
    let second = connected_peer(&transport, &mut manager, 2);
    let third = connected_peer(&transport, &mut manager, 3);

    assert_eq!(manager.connected(), vec![first, second]);
    assert_eq!(transport.closed_connections(), vec![third]);

    transport.close_by_peer(first, 0, "");
    pump(&transport, &mut manager);
    let fourth = connected_peer(&transport, &mut manager, 4);
    assert_eq!(manager.connected(), vec![second, fourth]);
}

#[test]
fn test_disconnect_clears_poll_group() {
    let transport = LoopbackTransport::new();
    let mut manager = manager(&transport, AcceptAll, SessionConfig::default());
    let conn = connected_peer(&transport, &mut manager, 7);
    let group = manager.poll_group();
    assert_eq!(transport.poll_group_of(conn), Some(group));

    transport.report(conn, info(ConnectionState::ProblemDetectedLocally));
    pump(&transport, &mut manager);

    // Unassigned first, then closed
    assert_eq!(
        transport.poll_group_assignments(conn),
        vec![group, PollGroupHandle::NONE]
    );
    assert_eq!(transport.poll_group_at_close(conn), Some(PollGroupHandle::NONE));
    assert_eq!(transport.closed_connections(), vec![conn]);
    assert!(!manager.registry().is_tracked(conn));
}

#[test]
fn test_identity_recorded() {
    let transport = LoopbackTransport::new();
    let mut manager = manager(&transport, AcceptAll, SessionConfig::default());
    connected_peer(&transport, &mut manager, 55);

    let snapshots = manager.registry().snapshots();
    assert_eq!(snapshots.len(), 1);
    assert_eq!(snapshots[0].identity, "id:55");
}

#[test]
fn test_close_is_idempotent() {
    let transport = LoopbackTransport::new();
    let mut manager = manager(&transport, AcceptAll, SessionConfig::default());

    assert!(manager.close());
    assert!(manager.close());
    assert!(manager.poll_group().is_none());
    assert!(manager.socket().is_none());
    assert_eq!(transport.destroy_calls(), 1);
    assert_eq!(transport.poll_group_count(), 0);
}
