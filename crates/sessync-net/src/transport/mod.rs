//! Datagram transport endpoints.
//!
//! A [`Transport`] owns the socket for a single remote peer. While open it
//! keeps one receive outstanding, decodes each datagram and pushes the result
//! onto the [`EventQueue`] it was opened with. Nothing else happens on the
//! receive side.

pub mod memory;
pub mod udp;

use std::net::SocketAddr;

use crate::codec::{self, CodecError};
use crate::event_queue::{EventQueue, InboundEvent};

pub use memory::MemoryTransport;
pub use udp::{UdpConfig, UdpTransport};

/// Errors raised by a transport endpoint.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// `open` was called on an endpoint that is already open.
    #[error("transport is already open")]
    AlreadyOpen,

    /// The socket could not be created or configured.
    #[error("failed to create socket: {0}")]
    Socket(#[source] std::io::Error),

    /// The socket could not be associated with the remote endpoint.
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        /// Remote endpoint.
        addr: SocketAddr,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// A receive completed with an error.
    #[error("receive failed: {0}")]
    Receive(#[source] std::io::Error),

    /// No tokio runtime was available to run the receive loop.
    #[error("no tokio runtime available for the receive loop")]
    NoRuntime,
}

/// A connectionless endpoint bound to exactly one remote peer.
pub trait Transport {
    /// Open the endpoint towards `remote` and start receiving into `inbound`.
    ///
    /// Fails with [`TransportError::AlreadyOpen`] if already open.
    fn open(&mut self, remote: SocketAddr, inbound: EventQueue) -> Result<(), TransportError>;

    /// Fire-and-forget send. Silently dropped when not open.
    fn send(&self, datagram: &[u8]);

    /// Release the endpoint. Idempotent.
    fn close(&mut self);

    /// Whether the endpoint is open.
    fn is_open(&self) -> bool;

    /// Local address of the open endpoint.
    fn local_addr(&self) -> Option<SocketAddr>;
}

/// Decode one received datagram and queue the resulting event.
///
/// Protocol faults are logged and the datagram dropped.
pub(crate) fn route_datagram(inbound: &EventQueue, datagram: &[u8], trace: bool) {
    if trace {
        tracing::debug!(
            "Received datagram: {}",
            String::from_utf8_lossy(datagram)
        );
    }

    match codec::decode(datagram) {
        Ok(packet) => {
            let tag = packet.tag();
            match InboundEvent::from_packet(packet) {
                Some(event) => inbound.push(event),
                None => tracing::warn!("Dropping unexpected {tag:?} datagram from server"),
            }
        }
        Err(CodecError::UnknownTag(tag)) => {
            tracing::warn!(
                "Received unknown message {tag:?}: {}",
                String::from_utf8_lossy(datagram)
            );
        }
        Err(e) => tracing::warn!("Dropping malformed datagram: {e}"),
    }
}
