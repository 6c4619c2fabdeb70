//! Session data sync over UDP: transport endpoint, tag-plus-payload codec,
//! event queue, connection state machine, heartbeat, and the session data
//! store that keeps named records consistent with the server.

pub mod client;
pub mod codec;
pub mod connection;
pub mod event_queue;
pub mod heartbeat;
pub mod observers;
pub mod reconnection;
pub mod record;
pub mod store;
pub mod transport;

pub use client::{ClientConfig, ClientObservers, SessionClient};
pub use codec::{CodecError, Packet, Snapshot, Tag, UpdateEnvelope, decode, encode};
pub use connection::{
    Connection, ConnectionConfig, ConnectionError, ConnectionState, ConnectionStateWatch,
};
pub use event_queue::{EventQueue, InboundEvent};
pub use heartbeat::Heartbeat;
pub use observers::{ObserverId, Observers};
pub use reconnection::{ReconnectConfig, ReconnectState};
pub use record::{
    RecordError, RecordHandle, RecordHandler, RecordPermissions, SliderRecord, SliderValue,
    ToggleRecord, ToggleValue, ValueRecord,
};
pub use store::{ChangeSink, Origin, SessionStore, StoreError, Uplink};
pub use transport::{MemoryTransport, Transport, TransportError, UdpConfig, UdpTransport};
