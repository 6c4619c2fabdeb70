//! The session client: one explicitly constructed context that owns the
//! connection, heartbeat, event queue and session data store.
//!
//! Everything here runs on the owning thread. The only cross-thread traffic
//! is the transport's receive loop pushing onto the [`EventQueue`]; the owner
//! calls [`SessionClient::tick`] periodically to drain it, advance the timers
//! and publish local record changes.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use crate::codec::{Packet, UpdateEnvelope};
use crate::connection::{
    Connection, ConnectionConfig, ConnectionError, ConnectionState, ConnectionStateWatch,
    DEFAULT_CONNECT_TIMEOUT,
};
use crate::event_queue::{EventQueue, InboundEvent};
use crate::heartbeat::{self, Heartbeat};
use crate::observers::Observers;
use crate::record::RecordHandle;
use crate::store::{ChangeSink, Origin, SessionStore, StoreError};
use crate::transport::{Transport, TransportError};

/// Client settings.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// How long to wait for `JRES`. Default: 5 s.
    pub connect_timeout: Duration,
    /// Interval between `KEEP` pings while connected. Default: 2 s.
    pub heartbeat_interval: Duration,
    /// Log every store mutation at debug level. Default: false.
    pub trace_datagrams: bool,
    /// Send `RDAT` right after the handshake completes. Default: false.
    pub request_sync_on_connect: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            heartbeat_interval: heartbeat::DEFAULT_INTERVAL,
            trace_datagrams: false,
            request_sync_on_connect: false,
        }
    }
}

/// Notification registries. Callbacks run during [`SessionClient::tick`].
#[derive(Debug, Default)]
pub struct ClientObservers {
    /// Handshake completed.
    pub connected: Observers<()>,
    /// Left the session, locally or because the server sent `QUIT`.
    pub disconnected: Observers<()>,
    /// No `JRES` within the connect timeout.
    pub connect_timeout: Observers<()>,
    /// `EVNT` payload.
    pub event_received: Observers<str>,
    /// The socket reported a receive error; the connection is already down.
    pub transport_fault: Observers<TransportError>,
    /// A full sync replaced the store; carries the record count.
    pub store_loaded: Observers<usize>,
    /// A remote record update was applied.
    pub update_received: Observers<UpdateEnvelope>,
}

/// Client side of the session sync protocol.
pub struct SessionClient {
    connection: Connection,
    heartbeat: Heartbeat,
    store: SessionStore,
    inbound: EventQueue,
    observers: ClientObservers,
    request_sync_on_connect: bool,
}

impl SessionClient {
    /// Create a disconnected client on top of `transport`.
    pub fn new(transport: Box<dyn Transport>, config: ClientConfig) -> Self {
        tracing::info!("Session sync client v{}", env!("CARGO_PKG_VERSION"));

        let mut store = SessionStore::new();
        store.set_trace(config.trace_datagrams);

        Self {
            connection: Connection::new(
                transport,
                ConnectionConfig {
                    connect_timeout: config.connect_timeout,
                },
            ),
            heartbeat: Heartbeat::new(config.heartbeat_interval),
            store,
            inbound: EventQueue::new(),
            observers: ClientObservers::default(),
            request_sync_on_connect: config.request_sync_on_connect,
        }
    }

    /// Start the handshake with the server at `remote`.
    ///
    /// Returns immediately. Connected or connect-timeout is reported through
    /// the observers on a later tick.
    pub fn connect(&mut self, remote: SocketAddr) -> Result<(), ConnectionError> {
        if self.connection.is_running() {
            tracing::warn!("Client is already running");
            return Err(ConnectionError::AlreadyRunning);
        }
        self.inbound.clear();
        self.heartbeat.stop();
        self.connection.connect(remote, self.inbound.clone())
    }

    /// Leave the session and notify the disconnected observers.
    ///
    /// Safe to call in any state.
    pub fn disconnect(&mut self) {
        self.heartbeat.stop();
        self.connection.disconnect();
        self.observers.disconnected.notify(&());
    }

    /// Run one tick with `dt` of real time elapsed since the previous one.
    ///
    /// Dispatches every queued inbound event, advances the handshake timeout
    /// and the heartbeat, then publishes pending local record changes.
    pub fn tick(&mut self, dt: Duration) {
        self.dispatch_pending();

        if self.connection.advance(dt) {
            self.heartbeat.stop();
            self.observers.connect_timeout.notify(&());
        }

        if self.heartbeat.advance(dt) && self.connection.is_connected() {
            self.connection.send(&Packet::KeepAlive);
        }

        self.store.flush_local(&mut self.connection);
    }

    /// Dispatch the events queued so far. Returns how many were handled.
    ///
    /// Events queued while dispatching wait for the next call.
    pub fn dispatch_pending(&mut self) -> usize {
        let events = self.inbound.drain();
        let count = events.len();
        for event in events {
            self.handle_event(event);
        }
        count
    }

    /// Ask the server for a full snapshot (`RDAT`).
    pub fn request_full_sync(&self) {
        self.connection.send(&Packet::RequestSync);
    }

    /// Send an `EVNT` with an opaque payload.
    pub fn send_event(&self, payload: impl Into<String>) {
        self.connection.send(&Packet::Event(payload.into()));
    }

    /// Store a locally produced value and send it if the transport is open.
    pub fn update_record(&mut self, id: &str, json: impl Into<String>) {
        self.store
            .apply_update(id, json, Origin::Local, &mut self.connection);
    }

    /// Capture `handler`'s current value and publish it.
    pub fn save_record(&mut self, handler: &RecordHandle) -> bool {
        self.store.save_local(handler, &mut self.connection)
    }

    /// Bind `handler`, delivering the stored value for its id if there is one.
    pub fn attach(&mut self, handler: &RecordHandle) -> Result<(), StoreError> {
        self.store.attach(handler)
    }

    /// Release `handler`'s binding. The stored value stays.
    pub fn detach(&mut self, handler: &RecordHandle) -> bool {
        self.store.detach(handler)
    }

    /// Sink for handlers to submit local changes into.
    pub fn change_sink(&self) -> ChangeSink {
        self.store.change_sink()
    }

    /// Read access to the store.
    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// Direct access to the store, for removals and bindings.
    pub fn store_mut(&mut self) -> &mut SessionStore {
        &mut self.store
    }

    /// Notification registries.
    pub fn observers(&self) -> &ClientObservers {
        &self.observers
    }

    /// Mutable notification registries, for adding and removing callbacks.
    pub fn observers_mut(&mut self) -> &mut ClientObservers {
        &mut self.observers
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    /// Watch channel mirroring the connection state, for other threads.
    pub fn state_watch(&self) -> Arc<ConnectionStateWatch> {
        Arc::clone(self.connection.state_watch())
    }

    /// Whether the handshake has completed.
    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    /// Whether the transport is open.
    pub fn is_running(&self) -> bool {
        self.connection.is_running()
    }

    /// Local endpoint as `ip:port`, used as `senderIp`.
    pub fn local_address(&self) -> Option<String> {
        self.connection.local_address()
    }

    /// Remote endpoint of the last connect.
    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.connection.remote_addr()
    }

    /// The heartbeat scheduler.
    pub fn heartbeat(&self) -> &Heartbeat {
        &self.heartbeat
    }

    fn handle_event(&mut self, event: InboundEvent) {
        match event {
            InboundEvent::Event(payload) => {
                self.observers.event_received.notify(&payload);
            }
            InboundEvent::Update(envelope) => {
                self.store.apply_update(
                    &envelope.session_data_id,
                    envelope.session_data_json.clone(),
                    Origin::Remote,
                    &mut self.connection,
                );
                self.observers.update_received.notify(&envelope);
            }
            InboundEvent::FullSync(snapshot) => {
                let count = self.store.load(snapshot);
                self.observers.store_loaded.notify(&count);
            }
            InboundEvent::JoinAccepted => {
                if self.connection.on_join_accepted() {
                    self.heartbeat.start();
                    self.observers.connected.notify(&());
                    if self.request_sync_on_connect {
                        self.request_full_sync();
                    }
                }
            }
            InboundEvent::Quit => {
                if self.connection.on_peer_quit() {
                    self.heartbeat.stop();
                    self.observers.disconnected.notify(&());
                }
            }
            InboundEvent::TransportFault(error) => {
                tracing::warn!("Transport fault: {error}");
                if self.connection.on_transport_fault() {
                    self.heartbeat.stop();
                    self.observers.transport_fault.notify(&error);
                }
            }
        }
    }
}

impl Drop for SessionClient {
    fn drop(&mut self) {
        if self.connection.is_running() {
            self.connection.disconnect();
        }
    }
}
