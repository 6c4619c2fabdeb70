//! Configuration for the session sync client.
//!
//! Runtime settings persist to disk as RON and can be overridden from the
//! command line. The remote server endpoint lives separately in a small
//! preference store so an operator's choice survives restarts.

mod cli;
mod config;
mod error;
mod prefs;
mod server;

pub use cli::CliArgs;
pub use config::{ClientConfig, Config, DebugConfig, NetworkConfig};
pub use error::ConfigError;
pub use prefs::Preferences;
pub use server::{ServerAddressError, ServerSettings, parse_endpoint};
