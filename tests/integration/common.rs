//! Shared fixtures

use mytunnel_session::config::SessionConfig;
use mytunnel_session::connection::{Connection, NetIdentity};
use mytunnel_session::session::{SessionHandler, SessionManager};
use mytunnel_session::transport::LoopbackTransport;

/// Manager over a fresh listen socket, already initialized
pub fn manager<H>(
    transport: &LoopbackTransport,
    handler: H,
    config: SessionConfig,
) -> SessionManager<LoopbackTransport, H>
where
    H: SessionHandler<LoopbackTransport>,
{
    let socket = transport.listen();
    let mut manager = SessionManager::new(transport.clone(), socket, handler, config);
    manager.initialize().unwrap();
    manager
}

/// Deliver queued notifications until the transport has none left
pub fn pump<H>(transport: &LoopbackTransport, manager: &mut SessionManager<LoopbackTransport, H>)
where
    H: SessionHandler<LoopbackTransport>,
{
    while transport.run_callbacks(|conn, info| manager.on_connection_changed(conn, info)) > 0 {}
}

/// Connect a peer and drive it all the way to Connected
pub fn connected_peer<H>(
    transport: &LoopbackTransport,
    manager: &mut SessionManager<LoopbackTransport, H>,
    id: u64,
) -> Connection
where
    H: SessionHandler<LoopbackTransport>,
{
    let conn = transport.connect(NetIdentity::Id(id));
    pump(transport, manager);
    conn
}
