//! MyTunnel Session - Demo entry point
//!
//! Runs a session manager over the in-memory loopback transport with a set
//! of simulated peers, ticking the receive loop at a fixed interval.

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::time::Duration;
use tokio::signal;
use tracing::{debug, error, info, trace, warn};

use mytunnel_session::connection::{Connection, ConnectionInfo, NetIdentity};
use mytunnel_session::persona::PERSONA_REQUESTS;
use mytunnel_session::session::{Message, SessionContext, SessionHandler, SessionManager};
use mytunnel_session::transport::{LoopbackTransport, Transport};
use mytunnel_session::{Config, VERSION};

/// First account id handed to simulated peers
const PEER_ID_BASE: u64 = 76_561_198_000_000_000;

/// Counts traffic and resolves peer names once connected
#[derive(Default)]
struct DemoHandler {
    messages: u64,
    bytes: u64,
}

impl<T: Transport> SessionHandler<T> for DemoHandler {
    fn on_connected(
        &mut self,
        session: &mut SessionContext<T>,
        connection: Connection,
        info: &ConnectionInfo,
    ) {
        session.promote_connected(connection, info);

        PERSONA_REQUESTS.request(info.identity.clone(), None, move |name| {
            info!(conn = %connection, name, "Peer name resolved");
        });
    }

    fn on_message(&mut self, _session: &SessionContext<T>, message: &Message<'_>) -> Result<()> {
        self.messages += 1;
        self.bytes += message.len() as u64;
        trace!(
            conn = %message.connection,
            seq = message.message_number,
            channel = message.channel,
            len = message.len(),
            "Message"
        );
        Ok(())
    }
}

/// Application entry point
#[tokio::main]
async fn main() -> Result<()> {
    // Optional config path; defaults apply without one
    let config = match std::env::args().nth(1).map(PathBuf::from) {
        Some(path) => Config::load(&path)
            .with_context(|| format!("Failed to load config from {:?}", path))?,
        None => Config::default(),
    };

    mytunnel_session::util::init_tracing(&config.logging)?;

    info!(
        version = VERSION,
        peers = config.loopback.peers,
        receive_capacity = config.session.receive_capacity,
        "Starting MyTunnel Session demo"
    );

    if config.metrics.enabled {
        mytunnel_session::metrics::init_metrics(&config.metrics)?;
        info!(bind_addr = %config.metrics.bind_addr, "Metrics endpoint started");
    }

    let transport = LoopbackTransport::new();
    let socket = transport.listen();
    let mut manager = SessionManager::new(
        transport.clone(),
        socket,
        DemoHandler::default(),
        config.session.clone(),
    );
    manager.initialize()?;

    if let Some(addr) = config.metrics.api_addr {
        mytunnel_session::metrics::start_api_server(addr, manager.registry().clone());
    }

    let peers: Vec<(Connection, NetIdentity)> = (0..config.loopback.peers as u64)
        .map(|i| {
            let identity = NetIdentity::Id(PEER_ID_BASE + i);
            (transport.connect(identity.clone()), identity)
        })
        .collect();

    let mut interval = tokio::time::interval(Duration::from_millis(config.loopback.tick_ms));
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);
    let mut tick: u64 = 0;

    loop {
        tokio::select! {
            _ = interval.tick() => {
                tick += 1;
                run_tick(&transport, &mut manager, &peers, &config, tick);
                if config.loopback.ticks > 0 && tick >= config.loopback.ticks {
                    info!(tick, "Configured tick count reached");
                    break;
                }
            }
            _ = &mut shutdown => {
                info!("Shutdown signal received, closing peers...");
                break;
            }
        }
    }

    for (connection, _) in &peers {
        transport.close_by_peer(*connection, 0, "demo finished");
    }
    transport.run_callbacks(|connection, info| manager.on_connection_changed(connection, info));

    let handler = manager.handler();
    info!(
        ticks = tick,
        messages = handler.messages,
        bytes = handler.bytes,
        "Demo finished"
    );
    manager.close();
    Ok(())
}

/// One application tick: peer traffic, state changes, drain
fn run_tick(
    transport: &LoopbackTransport,
    manager: &mut SessionManager<LoopbackTransport, DemoHandler>,
    peers: &[(Connection, NetIdentity)],
    config: &Config,
    tick: u64,
) {
    for (index, (connection, identity)) in peers.iter().enumerate() {
        for n in 0..config.loopback.messages_per_tick {
            let payload = format!("tick {} message {}", tick, n);
            transport.send_from_peer(*connection, (n % 2) as i32, payload.into_bytes());
        }
        PERSONA_REQUESTS.dispatch(identity, &format!("peer-{}", index));
    }

    transport.run_callbacks(|connection, info| manager.on_connection_changed(connection, info));

    match manager.receive() {
        Ok(stats) => debug!(
            tick,
            rounds = stats.rounds,
            dispatched = stats.dispatched,
            bytes = stats.bytes,
            "Tick drained"
        ),
        Err(e) if e.is_transient() => warn!(tick, error = %e, "Receive deferred to next tick"),
        Err(e) => error!(tick, error = %e, "Receive failed"),
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
