//! HTTP API for connection inspection
//!
//! Provides read-only JSON endpoints over the Connecting/Connected sets and
//! the session counters.

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use super::counters::METRICS;
use crate::connection::{Connection, ConnectionRegistry, ConnectionSnapshot};

/// API response for /connections endpoint
#[derive(Serialize)]
struct ConnectionsResponse {
    connecting: Vec<u32>,
    connected: Vec<u32>,
    connections: Vec<ConnectionSnapshot>,
}

/// Start the inspection API server on a background thread
///
/// This runs a simple HTTP server that responds to:
/// - GET /connections - Connecting/Connected membership and per-connection records
/// - GET /stats - Session counters
pub fn start_api_server(addr: SocketAddr, registry: Arc<ConnectionRegistry>) {
    thread::spawn(move || {
        if let Err(e) = run_api_server(addr, registry) {
            error!(error = %e, "API server error");
        }
    });
    info!(%addr, "Inspection API server started");
}

fn run_api_server(addr: SocketAddr, registry: Arc<ConnectionRegistry>) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr)?;

    for stream in listener.incoming() {
        match stream {
            Ok(stream) => {
                let registry = registry.clone();
                thread::spawn(move || {
                    if let Err(e) = handle_request(stream, &registry) {
                        debug!(error = %e, "Request handling error");
                    }
                });
            }
            Err(e) => {
                warn!(error = %e, "Failed to accept connection");
            }
        }
    }

    Ok(())
}

/// Build the status line and JSON body for a request path
fn route(path: &str, registry: &ConnectionRegistry) -> (&'static str, String) {
    match path {
        "/connections" => {
            let response = ConnectionsResponse {
                connecting: registry.connecting().iter().map(Connection::as_u32).collect(),
                connected: registry.connected().iter().map(Connection::as_u32).collect(),
                connections: registry.snapshots(),
            };
            ("200 OK", serde_json::to_string_pretty(&response).unwrap_or_default())
        }
        "/stats" => (
            "200 OK",
            serde_json::to_string_pretty(&METRICS.snapshot()).unwrap_or_default(),
        ),
        "/" => {
            let help = r#"{
  "endpoints": {
    "/connections": "Connecting/Connected membership",
    "/stats": "Session counters"
  }
}"#;
            ("200 OK", help.to_string())
        }
        _ => ("404 Not Found", r#"{"error": "Not found"}"#.to_string()),
    }
}

fn handle_request(mut stream: TcpStream, registry: &ConnectionRegistry) -> std::io::Result<()> {
    let mut buffer = [0u8; 1024];
    let n = stream.read(&mut buffer)?;

    if n == 0 {
        return Ok(());
    }

    let request = String::from_utf8_lossy(&buffer[..n]);
    let first_line = request.lines().next().unwrap_or("");

    // Parse request path
    let path = first_line.split_whitespace().nth(1).unwrap_or("/");

    let (status, body) = route(path, registry);

    let response = format!(
        "HTTP/1.1 {}\r\n\
         Content-Type: application/json\r\n\
         Content-Length: {}\r\n\
         Access-Control-Allow-Origin: *\r\n\
         Connection: close\r\n\
         \r\n\
         {}",
        status,
        body.len(),
        body
    );

    stream.write_all(response.as_bytes())?;
    stream.flush()?;

    Ok(())
}
