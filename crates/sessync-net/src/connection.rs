//! Connection state machine and join handshake.
//!
//! ```text
//! Disconnected --connect--> Connecting --JRES--> Connected
//!      ^                        |                    |
//!      +------- timeout --------+                    |
//!      +------------ disconnect / peer QUIT ---------+
//! ```
//!
//! The handshake timeout is not a background timer. Real elapsed time is fed
//! in through [`Connection::advance`] from the owning thread's tick, and the
//! teardown happens there. State changes are mirrored into a [`watch`]
//! channel so other threads can observe them without polling.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::codec::{self, Packet};
use crate::event_queue::EventQueue;
use crate::store::Uplink;
use crate::transport::{Transport, TransportError};

/// Default time allowed for the server to answer `JOIN`.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// `JOIN` sent, waiting for `JRES`.
    Connecting,
    /// Handshake complete.
    Connected,
    /// No active connection.
    Disconnected,
}

/// Observable connection state backed by a [`watch`] channel.
///
/// Multiple subscribers can observe state transitions without polling.
pub struct ConnectionStateWatch {
    tx: watch::Sender<ConnectionState>,
    rx: watch::Receiver<ConnectionState>,
}

impl Default for ConnectionStateWatch {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionStateWatch {
    /// Create a new watch initialized to [`ConnectionState::Disconnected`].
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(ConnectionState::Disconnected);
        Self { tx, rx }
    }

    /// Set the current connection state, notifying all subscribers.
    pub fn set(&self, state: ConnectionState) {
        self.tx.send_if_modified(|current| {
            let changed = *current != state;
            *current = state;
            changed
        });
    }

    /// Return a new subscriber receiver.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.rx.clone()
    }

    /// Return the current state without blocking.
    pub fn current(&self) -> ConnectionState {
        *self.rx.borrow()
    }
}

/// Connection settings.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// How long to wait for `JRES`. Default: 5 s.
    pub connect_timeout: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

/// Errors returned by [`Connection::connect`].
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// A connection is already running; its state was left untouched.
    #[error("a connection is already running")]
    AlreadyRunning,

    /// The transport could not be opened.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// The single logical connection to the server.
pub struct Connection {
    transport: Box<dyn Transport>,
    state: Arc<ConnectionStateWatch>,
    remote: Option<SocketAddr>,
    connect_timeout: Duration,
    /// Time left before the handshake gives up; `None` when not armed.
    timeout_remaining: Option<Duration>,
}

impl Connection {
    /// Wrap `transport`. Nothing is opened until [`connect`](Self::connect).
    pub fn new(transport: Box<dyn Transport>, config: ConnectionConfig) -> Self {
        Self {
            transport,
            state: Arc::new(ConnectionStateWatch::new()),
            remote: None,
            connect_timeout: config.connect_timeout,
            timeout_remaining: None,
        }
    }

    /// Open the transport towards `remote`, send `JOIN` and start the
    /// handshake timeout.
    ///
    /// Returns immediately; the outcome arrives later as a `JRES` event or a
    /// timeout reported by [`advance`](Self::advance).
    pub fn connect(
        &mut self,
        remote: SocketAddr,
        inbound: EventQueue,
    ) -> Result<(), ConnectionError> {
        if self.is_running() {
            tracing::warn!("Client is already running");
            return Err(ConnectionError::AlreadyRunning);
        }

        self.transport.open(remote, inbound)?;
        self.remote = Some(remote);
        tracing::info!("Connecting to {remote}");

        self.send(&Packet::Join);
        self.timeout_remaining = Some(self.connect_timeout);
        self.state.set(ConnectionState::Connecting);
        Ok(())
    }

    /// Send `QUIT` if open, close the transport and go to Disconnected.
    ///
    /// Safe from any state, including when never connected.
    pub fn disconnect(&mut self) {
        if self.is_running() {
            self.send(&Packet::Quit);
            tracing::info!("Disconnected from {}", self.remote_label());
        }
        self.teardown();
    }

    /// Handle `JRES`. Returns `true` if it completed the handshake.
    pub fn on_join_accepted(&mut self) -> bool {
        if self.state.current() != ConnectionState::Connecting {
            tracing::debug!("Ignoring JRES while {:?}", self.state.current());
            return false;
        }
        self.timeout_remaining = None;
        self.state.set(ConnectionState::Connected);
        tracing::info!("Connected to {}", self.remote_label());
        true
    }

    /// Handle a `QUIT` from the server. Returns `true` if it ended the
    /// connection. The client does not answer with its own `QUIT`.
    pub fn on_peer_quit(&mut self) -> bool {
        if self.state.current() == ConnectionState::Disconnected {
            return false;
        }
        tracing::info!("Server {} closed the connection", self.remote_label());
        self.teardown();
        true
    }

    /// Handle a receive fault. Returns `true` if it ended the connection.
    ///
    /// The transport is closed without sending `QUIT`, so a fresh
    /// [`connect`](Self::connect) can start over.
    pub fn on_transport_fault(&mut self) -> bool {
        if !self.is_running() {
            return false;
        }
        tracing::warn!("Connection to {} lost to a transport fault", self.remote_label());
        self.teardown();
        true
    }

    /// Add `dt` of real time to the handshake timeout.
    ///
    /// Returns `true` exactly once when the timeout fires; the connection has
    /// then already been torn down.
    pub fn advance(&mut self, dt: Duration) -> bool {
        let Some(remaining) = self.timeout_remaining else {
            return false;
        };

        let remaining = remaining.saturating_sub(dt);
        if !remaining.is_zero() {
            self.timeout_remaining = Some(remaining);
            return false;
        }

        tracing::warn!(
            "No answer from {} within {:?}",
            self.remote_label(),
            self.connect_timeout
        );
        if self.is_running() {
            self.send(&Packet::Quit);
        }
        self.teardown();
        true
    }

    /// Encode and send `packet`. Dropped when the transport is closed.
    pub fn send(&self, packet: &Packet) {
        match codec::encode(packet) {
            Ok(datagram) => self.transport.send(&datagram),
            Err(e) => tracing::error!("Failed to encode {:?}: {e}", packet.tag()),
        }
    }

    /// Current state.
    pub fn state(&self) -> ConnectionState {
        self.state.current()
    }

    /// Shared watch mirroring the state.
    pub fn state_watch(&self) -> &Arc<ConnectionStateWatch> {
        &self.state
    }

    /// Whether the transport is open (Connecting or Connected).
    pub fn is_running(&self) -> bool {
        self.transport.is_open()
    }

    /// Whether the handshake has completed.
    pub fn is_connected(&self) -> bool {
        self.state.current() == ConnectionState::Connected
    }

    /// Whether the handshake timeout is armed.
    pub fn is_awaiting_join(&self) -> bool {
        self.timeout_remaining.is_some()
    }

    /// Local endpoint as `ip:port`, while open.
    pub fn local_address(&self) -> Option<String> {
        self.transport.local_addr().map(|addr| addr.to_string())
    }

    /// Remote endpoint of the last `connect`.
    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote
    }

    fn teardown(&mut self) {
        self.transport.close();
        self.timeout_remaining = None;
        self.state.set(ConnectionState::Disconnected);
    }

    fn remote_label(&self) -> String {
        self.remote
            .map_or_else(|| "<none>".to_string(), |addr| addr.to_string())
    }
}

impl Uplink for Connection {
    fn is_running(&self) -> bool {
        Connection::is_running(self)
    }

    fn sender_ip(&self) -> String {
        self.local_address().unwrap_or_default()
    }

    fn send_packet(&mut self, packet: &Packet) {
        self.send(packet);
    }
}
