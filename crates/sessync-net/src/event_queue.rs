//! Hand-off from the receive path to the owning thread.
//!
//! The transport's receive loop runs on a runtime worker and pushes decoded
//! [`InboundEvent`]s into an [`EventQueue`]. The owning thread drains the
//! queue once per tick and dispatches every event it took. Events pushed while
//! a drain is being dispatched wait for the next tick.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::codec::{Packet, Snapshot, UpdateEnvelope};
use crate::transport::TransportError;

/// An event produced by the receive path, consumed exactly once by a drain.
#[derive(Debug)]
pub enum InboundEvent {
    /// `EVNT`: opaque application event.
    Event(String),
    /// `UDAT`: remote record update.
    Update(UpdateEnvelope),
    /// `GDAT`: full snapshot of the server's records.
    FullSync(Snapshot),
    /// `JRES`: the server accepted our join.
    JoinAccepted,
    /// `QUIT`: the server ended the session.
    Quit,
    /// The socket reported an error while receiving.
    TransportFault(TransportError),
}

impl InboundEvent {
    /// Map a decoded packet to an event.
    ///
    /// Returns `None` for packets only a server should receive (`JOIN`,
    /// `KEEP`, `RDAT`).
    pub fn from_packet(packet: Packet) -> Option<Self> {
        match packet {
            Packet::Event(text) => Some(Self::Event(text)),
            Packet::Update(envelope) => Some(Self::Update(envelope)),
            Packet::FullSync(snapshot) => Some(Self::FullSync(snapshot)),
            Packet::JoinAccepted => Some(Self::JoinAccepted),
            Packet::Quit => Some(Self::Quit),
            Packet::Join | Packet::KeepAlive | Packet::RequestSync => None,
        }
    }
}

/// Thread-safe FIFO of [`InboundEvent`]s shared by producer and consumer.
///
/// Cloning yields another handle to the same queue.
#[derive(Debug, Clone, Default)]
pub struct EventQueue {
    inner: Arc<Mutex<VecDeque<InboundEvent>>>,
}

impl EventQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event. Callable from any thread.
    pub fn push(&self, event: InboundEvent) {
        self.lock().push_back(event);
    }

    /// Take every queued event in arrival order, leaving the queue empty.
    pub fn drain(&self) -> VecDeque<InboundEvent> {
        std::mem::take(&mut *self.lock())
    }

    /// Discard every queued event.
    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Number of events waiting.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether no events are waiting.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    // A panic while holding the lock cannot leave the deque half-modified.
    fn lock(&self) -> MutexGuard<'_, VecDeque<InboundEvent>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
