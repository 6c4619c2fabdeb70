//! Command-line argument parsing for the session sync client.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

use crate::Config;
use crate::server::parse_endpoint;

/// Session sync client command-line arguments.
///
/// CLI values override settings loaded from `config.ron`.
#[derive(Parser, Debug, Default)]
#[command(name = "sessync", about = "Session data sync client")]
pub struct CliArgs {
    /// Server IP address.
    #[arg(long)]
    pub server: Option<String>,

    /// Server port.
    #[arg(long)]
    pub port: Option<u16>,

    /// Server endpoint as `address:port`; saved as the preferred server.
    #[arg(long, value_parser = parse_endpoint)]
    pub endpoint: Option<SocketAddr>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Path to config directory (overrides default location).
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Log every datagram sent and received.
    #[arg(long)]
    pub trace_datagrams: bool,

    /// Exit after this many seconds instead of running until interrupted.
    #[arg(long)]
    pub run_for: Option<f64>,
}

impl Config {
    /// Apply CLI overrides to a loaded config.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(ref addr) = args.server {
            self.network.server_address = addr.clone();
        }
        if let Some(port) = args.port {
            self.network.server_port = port;
        }
        if let Some(endpoint) = args.endpoint {
            self.network.server_address = endpoint.ip().to_string();
            self.network.server_port = endpoint.port();
        }
        if let Some(ref level) = args.log_level {
            self.debug.log_level = level.clone();
        }
        if args.trace_datagrams {
            self.debug.trace_datagrams = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_override() {
        let mut config = Config::default();
        let args = CliArgs {
            server: Some("192.168.1.1".to_string()),
            log_level: Some("debug".to_string()),
            ..CliArgs::default()
        };
        config.apply_cli_overrides(&args);
        assert_eq!(config.network.server_address, "192.168.1.1");
        assert_eq!(config.debug.log_level, "debug");
        // Non-overridden fields retain defaults
        assert_eq!(config.network.server_port, 5556);
        assert!(!config.debug.trace_datagrams);
    }

    #[test]
    fn test_cli_no_override() {
        let original = Config::default();
        let mut config = Config::default();
        config.apply_cli_overrides(&CliArgs::default());
        assert_eq!(config, original);
    }

    #[test]
    fn test_endpoint_flag_parsed_and_applied() {
        let args = CliArgs::try_parse_from(["sessync", "--endpoint", "10.0.0.9:7000"]).unwrap();
        let mut config = Config::default();
        config.apply_cli_overrides(&args);
        assert_eq!(config.network.server_address, "10.0.0.9");
        assert_eq!(config.network.server_port, 7000);
    }

    #[test]
    fn test_invalid_endpoint_rejected_at_parse() {
        assert!(CliArgs::try_parse_from(["sessync", "--endpoint", "10.0.0.9"]).is_err());
        assert!(CliArgs::try_parse_from(["sessync", "--endpoint", "10.0.0.9:0"]).is_err());
    }

    #[test]
    fn test_flags() {
        let args =
            CliArgs::try_parse_from(["sessync", "--trace-datagrams", "--run-for", "2.5"]).unwrap();
        assert!(args.trace_datagrams);
        assert_eq!(args.run_for, Some(2.5));
    }
}
