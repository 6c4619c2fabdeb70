//! Configuration structs with sensible defaults and RON persistence.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Top-level client configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Server endpoint and protocol timing.
    pub network: NetworkConfig,
    /// Client loop behaviour.
    pub client: ClientConfig,
    /// Debug/development settings.
    pub debug: DebugConfig,
}

/// Network configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NetworkConfig {
    /// Server IP address.
    pub server_address: String,
    /// Server UDP port.
    pub server_port: u16,
    /// Seconds to wait for the server to accept a join.
    pub connect_timeout_secs: f64,
    /// Seconds between keep-alive pings while connected.
    pub heartbeat_interval_secs: f64,
    /// Receive buffer size in bytes; longer datagrams are truncated.
    pub recv_buffer_size: usize,
}

/// Client loop configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClientConfig {
    /// Ticks per second of the dispatch loop.
    pub tick_rate_hz: u32,
    /// Request a full snapshot right after joining.
    pub request_sync_on_connect: bool,
    /// Retry with backoff when the server does not answer a join.
    pub retry_on_timeout: bool,
}

/// Debug/development configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebugConfig {
    /// Log level override (e.g., "debug", "info", "warn").
    pub log_level: String,
    /// Log every datagram sent and received.
    pub trace_datagrams: bool,
}

// --- Default implementations ---

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            server_address: "127.0.0.1".to_string(),
            server_port: 5556,
            connect_timeout_secs: 5.0,
            heartbeat_interval_secs: 2.0,
            recv_buffer_size: 65_507,
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            tick_rate_hz: 60,
            request_sync_on_connect: true,
            retry_on_timeout: false,
        }
    }
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            trace_datagrams: false,
        }
    }
}

impl NetworkConfig {
    /// Join timeout as a duration. Invalid values fall back to the default.
    pub fn connect_timeout(&self) -> Duration {
        secs_or(self.connect_timeout_secs, 5.0)
    }

    /// Heartbeat interval as a duration. Invalid values fall back to the default.
    pub fn heartbeat_interval(&self) -> Duration {
        secs_or(self.heartbeat_interval_secs, 2.0)
    }
}

fn secs_or(secs: f64, fallback: f64) -> Duration {
    match Duration::try_from_secs_f64(secs) {
        Ok(duration) if !duration.is_zero() => duration,
        _ => {
            log::warn!("Invalid duration {secs}s in config, using {fallback}s");
            Duration::from_secs_f64(fallback)
        }
    }
}

// --- Load / Save / Reload ---

impl Config {
    /// Load config from the given directory, or create a default config file.
    pub fn load_or_create(config_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = config_dir.join("config.ron");

        if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path).map_err(ConfigError::ReadError)?;
            let config: Config = ron::from_str(&contents).map_err(ConfigError::ParseError)?;
            log::info!("Loaded config from {}", config_path.display());
            Ok(config)
        } else {
            let config = Config::default();
            config.save(config_dir)?;
            log::info!("Created default config at {}", config_path.display());
            Ok(config)
        }
    }

    /// Save config to the given directory as `config.ron`.
    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        std::fs::create_dir_all(config_dir).map_err(ConfigError::WriteError)?;

        let config_path = config_dir.join("config.ron");
        let pretty = ron::ser::PrettyConfig::new()
            .depth_limit(3)
            .separate_tuple_members(true)
            .enumerate_arrays(false);

        let serialized =
            ron::ser::to_string_pretty(self, pretty).map_err(ConfigError::SerializeError)?;

        std::fs::write(&config_path, serialized).map_err(ConfigError::WriteError)?;
        Ok(())
    }
}
