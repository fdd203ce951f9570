//! Configuration management
//!
//! Handles loading and validating session configuration from TOML files.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::Path;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub loopback: LoopbackConfig,
}

/// What the receive loop does when a message handler fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum HandlerErrorPolicy {
    /// Release the rest of the buffer without dispatch and return the error
    #[default]
    Stop,
    /// Log, count and keep dispatching
    Continue,
}

/// Session manager configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Message-handle slots per receive round
    #[serde(default = "default_receive_capacity")]
    pub receive_capacity: usize,
    /// Idle scratch buffers kept for reuse
    #[serde(default = "default_scratch_buffers")]
    pub scratch_buffers: usize,
    /// Receive rounds per tick (0 = drain until empty)
    #[serde(default)]
    pub max_drain_rounds: usize,
    /// Tracked connections admitted by the default policy (0 = unlimited)
    #[serde(default)]
    pub max_connections: usize,
    /// Behaviour on message handler failure
    #[serde(default)]
    pub on_handler_error: HandlerErrorPolicy,
    /// Linger on locally closed connections to flush reliable data
    #[serde(default)]
    pub linger_on_close: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            receive_capacity: default_receive_capacity(),
            scratch_buffers: default_scratch_buffers(),
            max_drain_rounds: 0,
            max_connections: 0,
            on_handler_error: HandlerErrorPolicy::default(),
            linger_on_close: false,
        }
    }
}

/// Metrics configuration
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    /// Enable metrics endpoint
    #[serde(default)]
    pub enabled: bool,
    /// Metrics server bind address
    #[serde(default = "default_metrics_addr")]
    pub bind_addr: SocketAddr,
    /// Inspection API bind address (disabled when absent)
    #[serde(default)]
    pub api_addr: Option<SocketAddr>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bind_addr: default_metrics_addr(),
            api_addr: None,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Output format: "json" or "pretty"
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// Demo loop over the in-memory transport
#[derive(Debug, Clone, Deserialize)]
pub struct LoopbackConfig {
    /// Simulated peers
    #[serde(default = "default_peers")]
    pub peers: usize,
    /// Messages each peer sends per tick
    #[serde(default = "default_messages_per_tick")]
    pub messages_per_tick: usize,
    /// Tick interval in milliseconds
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
    /// Stop after this many ticks (0 = run until Ctrl+C)
    #[serde(default)]
    pub ticks: u64,
}

impl Default for LoopbackConfig {
    fn default() -> Self {
        Self {
            peers: default_peers(),
            messages_per_tick: default_messages_per_tick(),
            tick_ms: default_tick_ms(),
            ticks: 0,
        }
    }
}

// Default value functions
fn default_receive_capacity() -> usize { 32 }
fn default_scratch_buffers() -> usize { 2 }
fn default_metrics_addr() -> SocketAddr { SocketAddr::from(([127, 0, 0, 1], 9090)) }
fn default_log_level() -> String { "info".to_string() }
fn default_log_format() -> String { "pretty".to_string() }
fn default_peers() -> usize { 4 }
fn default_messages_per_tick() -> usize { 10 }
fn default_tick_ms() -> u64 { 50 }

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        Self::from_toml(&contents)
    }

    /// Parse and validate configuration text
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)
            .with_context(|| "Failed to parse config file")?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    fn validate(&self) -> Result<()> {
        if self.session.receive_capacity == 0 {
            anyhow::bail!("receive_capacity must be > 0");
        }
        if self.session.scratch_buffers == 0 {
            anyhow::bail!("scratch_buffers must be > 0");
        }
        if self.loopback.tick_ms == 0 {
            anyhow::bail!("tick_ms must be > 0");
        }
        Ok(())
    }
}
