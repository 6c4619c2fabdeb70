//! The remote server endpoint an operator picked, and validation of
//! `address:port` input.

use std::fmt;
use std::net::{IpAddr, SocketAddr};

use crate::error::ConfigError;
use crate::prefs::Preferences;

const PREFS_KEY_ADDRESS: &str = "server_address";
const PREFS_KEY_PORT: &str = "server_port";

/// Rejected `address:port` input.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ServerAddressError {
    /// No `:` separating a port.
    #[error("server address needs a port number")]
    MissingPort,

    /// More than one `:`.
    #[error("invalid ip address format")]
    InvalidFormat,

    /// The host part is not an IP address.
    #[error("invalid ip address '{0}'")]
    InvalidAddress(String),

    /// The port is not a number in 1..=65535.
    #[error("invalid ip address port '{0}'")]
    InvalidPort(String),
}

/// Parse operator input of the form `a.b.c.d:port`.
pub fn parse_endpoint(input: &str) -> Result<SocketAddr, ServerAddressError> {
    let input = input.trim();
    if !input.contains(':') {
        return Err(ServerAddressError::MissingPort);
    }

    let parts: Vec<&str> = input.split(':').collect();
    let [host, port] = parts.as_slice() else {
        return Err(ServerAddressError::InvalidFormat);
    };

    let ip: IpAddr = host
        .parse()
        .map_err(|_| ServerAddressError::InvalidAddress((*host).to_owned()))?;
    let port = port
        .parse::<i32>()
        .ok()
        .filter(|p| is_valid_port(*p))
        .and_then(|p| u16::try_from(p).ok())
        .ok_or_else(|| ServerAddressError::InvalidPort((*port).to_owned()))?;

    Ok(SocketAddr::new(ip, port))
}

fn is_valid_port(port: i32) -> bool {
    (1..=65535).contains(&port)
}

/// Server endpoint persisted in [`Preferences`].
#[derive(Default)]
pub struct ServerSettings {
    address: Option<IpAddr>,
    port: Option<i32>,
    on_set: Option<Box<dyn FnMut(SocketAddr)>>,
}

impl ServerSettings {
    /// Settings loaded from `prefs`.
    pub fn from_prefs(prefs: &Preferences) -> Self {
        let mut settings = Self::default();
        settings.load(prefs);
        settings
    }

    /// Reload from `prefs`. Returns whether both address and port were found.
    pub fn load(&mut self, prefs: &Preferences) -> bool {
        self.address = prefs
            .get_string(PREFS_KEY_ADDRESS)
            .and_then(|s| s.parse().ok());
        if self.address.is_none() {
            self.port = None;
            return false;
        }
        self.port = prefs.get_int(PREFS_KEY_PORT);
        self.port.is_some()
    }

    /// Store `endpoint`, save `prefs` and notify the on-set callback.
    pub fn set_and_save(
        &mut self,
        prefs: &mut Preferences,
        endpoint: SocketAddr,
    ) -> Result<(), ConfigError> {
        self.address = Some(endpoint.ip());
        self.port = Some(i32::from(endpoint.port()));

        prefs.set_string(PREFS_KEY_ADDRESS, endpoint.ip().to_string());
        prefs.set_int(PREFS_KEY_PORT, i32::from(endpoint.port()));
        prefs.save()?;
        log::info!("Server endpoint set to {endpoint}");

        if let Some(on_set) = &mut self.on_set {
            on_set(endpoint);
        }
        Ok(())
    }

    /// Call `callback` after every [`set_and_save`](Self::set_and_save).
    pub fn on_set(&mut self, callback: impl FnMut(SocketAddr) + 'static) {
        self.on_set = Some(Box::new(callback));
    }

    /// Whether an address is present and the port is in 1..=65535.
    pub fn is_configured(&self) -> bool {
        self.address.is_some() && self.port.is_some_and(is_valid_port)
    }

    /// The configured endpoint.
    pub fn endpoint(&self) -> Option<SocketAddr> {
        let ip = self.address?;
        let port = self.port.filter(|p| is_valid_port(*p))?;
        Some(SocketAddr::new(ip, u16::try_from(port).ok()?))
    }
}

impl fmt::Debug for ServerSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerSettings")
            .field("address", &self.address)
            .field("port", &self.port)
            .finish()
    }
}
