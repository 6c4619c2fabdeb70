//! In-process transport for tests and demos.
//!
//! Outbound datagrams are recorded instead of sent, and inbound datagrams are
//! injected by hand. Injected bytes go through the same decode-and-queue path
//! as the UDP endpoint, so protocol faults behave identically.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::{Transport, TransportError, route_datagram};
use crate::codec::{Tag, TAG_LEN};
use crate::event_queue::EventQueue;

/// Local address reported while a [`MemoryTransport`] is open.
pub const MEMORY_LOCAL_ADDR: SocketAddr =
    SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 40_000);

#[derive(Default)]
struct MemoryState {
    remote: Option<SocketAddr>,
    inbound: Option<EventQueue>,
    sent: Vec<Vec<u8>>,
    opened: u32,
}

/// Transport that records sends and accepts injected datagrams.
///
/// Clones share state, so a test can keep one handle while the client owns
/// another.
#[derive(Clone, Default)]
pub struct MemoryTransport {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryTransport {
    /// Create a closed transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver `datagram` as if it arrived from the remote peer.
    ///
    /// Returns `false` (and drops the datagram) when the transport is closed.
    pub fn inject(&self, datagram: &[u8]) -> bool {
        let inbound = self.lock().inbound.clone();
        match inbound {
            Some(queue) => {
                route_datagram(&queue, datagram, false);
                true
            }
            None => false,
        }
    }

    /// Remove and return every datagram sent so far.
    pub fn take_sent(&self) -> Vec<Vec<u8>> {
        std::mem::take(&mut self.lock().sent)
    }

    /// Remove every datagram sent so far and return their tags.
    pub fn take_sent_tags(&self) -> Vec<Tag> {
        self.take_sent()
            .iter()
            .filter_map(|d| d.get(..TAG_LEN).and_then(Tag::from_bytes))
            .collect()
    }

    /// Remote address given to the last `open`.
    pub fn remote(&self) -> Option<SocketAddr> {
        self.lock().remote
    }

    /// How many times the transport has been opened.
    pub fn open_count(&self) -> u32 {
        self.lock().opened
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Transport for MemoryTransport {
    fn open(&mut self, remote: SocketAddr, inbound: EventQueue) -> Result<(), TransportError> {
        let mut state = self.lock();
        if state.inbound.is_some() {
            return Err(TransportError::AlreadyOpen);
        }
        state.remote = Some(remote);
        state.inbound = Some(inbound);
        state.opened += 1;
        Ok(())
    }

    fn send(&self, datagram: &[u8]) {
        let mut state = self.lock();
        if state.inbound.is_some() {
            state.sent.push(datagram.to_vec());
        }
    }

    fn close(&mut self) {
        self.lock().inbound = None;
    }

    fn is_open(&self) -> bool {
        self.lock().inbound.is_some()
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        self.is_open().then_some(MEMORY_LOCAL_ADDR)
    }
}
