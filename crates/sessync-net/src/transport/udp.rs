//! UDP endpoint backed by a tokio socket.
//!
//! The socket is created through `socket2` so address reuse and broadcast can
//! be set before binding, then connected to the single remote peer. A spawned
//! task keeps exactly one `recv` outstanding on the tokio side until the
//! endpoint is closed. Sends go through a cloned non-blocking std handle, which
//! is writable as soon as it exists and never waits on reactor readiness.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tokio::runtime::Handle;
use tokio::sync::watch;

use super::{Transport, TransportError, route_datagram};
use crate::event_queue::{EventQueue, InboundEvent};

/// Pause after a failed receive so a broken socket cannot flood the queue.
const FAULT_BACKOFF: Duration = Duration::from_millis(50);

/// Socket options for [`UdpTransport`].
#[derive(Debug, Clone)]
pub struct UdpConfig {
    /// Receive buffer size; datagrams longer than this are truncated. Default: 65507.
    pub recv_buffer_size: usize,
    /// Set `SO_REUSEADDR` before binding. Default: true.
    pub reuse_addr: bool,
    /// Allow broadcast on IPv4 sockets. Default: true.
    pub broadcast: bool,
    /// Log every datagram body at debug level. Default: false.
    pub trace_datagrams: bool,
}

impl Default for UdpConfig {
    fn default() -> Self {
        Self {
            recv_buffer_size: 65_507,
            reuse_addr: true,
            broadcast: true,
            trace_datagrams: false,
        }
    }
}

/// UDP [`Transport`] whose receive loop runs on a tokio runtime.
pub struct UdpTransport {
    config: UdpConfig,
    runtime: Option<Handle>,
    /// Send half: a clone of the receive loop's socket.
    sender: Option<std::net::UdpSocket>,
    /// Sending `true` (or dropping) stops the receive loop.
    shutdown_tx: Option<watch::Sender<bool>>,
}

impl UdpTransport {
    /// Create a closed endpoint that spawns onto the runtime current at `open`.
    pub fn new(config: UdpConfig) -> Self {
        Self {
            config,
            runtime: None,
            sender: None,
            shutdown_tx: None,
        }
    }

    /// Create a closed endpoint that spawns its receive loop onto `runtime`.
    ///
    /// Use this when the owning thread is not itself inside a runtime.
    pub fn with_runtime(config: UdpConfig, runtime: Handle) -> Self {
        Self {
            config,
            runtime: Some(runtime),
            sender: None,
            shutdown_tx: None,
        }
    }
}

impl Transport for UdpTransport {
    fn open(&mut self, remote: SocketAddr, inbound: EventQueue) -> Result<(), TransportError> {
        if self.sender.is_some() {
            return Err(TransportError::AlreadyOpen);
        }

        let runtime = self
            .runtime
            .clone()
            .or_else(|| Handle::try_current().ok())
            .ok_or(TransportError::NoRuntime)?;

        let std_socket = create_socket(remote, &self.config).map_err(TransportError::Socket)?;
        std_socket
            .connect(remote)
            .map_err(|source| TransportError::Connect {
                addr: remote,
                source,
            })?;
        let sender = std_socket.try_clone().map_err(TransportError::Socket)?;

        let socket = {
            let _guard = runtime.enter();
            UdpSocket::from_std(std_socket).map_err(TransportError::Socket)?
        };

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        runtime.spawn(receive_loop(
            socket,
            inbound,
            shutdown_rx,
            self.config.recv_buffer_size,
            self.config.trace_datagrams,
        ));

        tracing::debug!(
            "UDP endpoint {:?} open towards {remote}",
            sender.local_addr().ok()
        );
        self.sender = Some(sender);
        self.shutdown_tx = Some(shutdown_tx);
        Ok(())
    }

    fn send(&self, datagram: &[u8]) {
        let Some(sender) = &self.sender else {
            return;
        };

        if self.config.trace_datagrams {
            tracing::debug!("Sending datagram: {}", String::from_utf8_lossy(datagram));
        }

        if let Err(e) = sender.send(datagram) {
            tracing::warn!("Dropping outbound datagram: {e}");
        }
    }

    fn close(&mut self) {
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(true);
        }
        if self.sender.take().is_some() {
            tracing::debug!("UDP endpoint closed");
        }
    }

    fn is_open(&self) -> bool {
        self.sender.is_some()
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        self.sender.as_ref().and_then(|s| s.local_addr().ok())
    }
}

impl Drop for UdpTransport {
    fn drop(&mut self) {
        self.close();
    }
}

/// Create a non-blocking UDP socket bound to an ephemeral local port of the
/// same family as `remote`.
fn create_socket(remote: SocketAddr, config: &UdpConfig) -> std::io::Result<std::net::UdpSocket> {
    let (domain, bind_ip) = if remote.is_ipv6() {
        (Domain::IPV6, IpAddr::V6(Ipv6Addr::UNSPECIFIED))
    } else {
        (Domain::IPV4, IpAddr::V4(Ipv4Addr::UNSPECIFIED))
    };

    let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))?;
    if config.reuse_addr {
        socket.set_reuse_address(true)?;
    }
    if config.broadcast && remote.is_ipv4() {
        socket.set_broadcast(true)?;
    }
    socket.set_nonblocking(true)?;
    socket.bind(&SocketAddr::new(bind_ip, 0).into())?;

    Ok(socket.into())
}

/// Receive datagrams until shutdown is signalled.
async fn receive_loop(
    socket: UdpSocket,
    inbound: EventQueue,
    mut shutdown_rx: watch::Receiver<bool>,
    buffer_size: usize,
    trace: bool,
) {
    let mut buf = vec![0u8; buffer_size];
    loop {
        tokio::select! {
            result = socket.recv(&mut buf) => {
                match result {
                    Ok(n) => route_datagram(&inbound, &buf[..n], trace),
                    Err(e) => {
                        tracing::warn!("UDP receive failed: {e}");
                        inbound.push(InboundEvent::TransportFault(TransportError::Receive(e)));
                        tokio::time::sleep(FAULT_BACKOFF).await;
                    }
                }
            }
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    /// Poll the queue until it holds at least `count` events or a second passes.
    async fn wait_for_events(queue: &EventQueue, count: usize) {
        let deadline = Instant::now() + Duration::from_secs(1);
        while queue.len() < count && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    async fn peer() -> (UdpSocket, SocketAddr) {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();
        (socket, addr)
    }

    #[tokio::test]
    async fn test_send_reaches_remote() {
        let (server, server_addr) = peer().await;
        let mut transport = UdpTransport::new(UdpConfig::default());
        transport.open(server_addr, EventQueue::new()).unwrap();

        transport.send(b"JOIN");
        let mut buf = [0u8; 64];
        let (n, from) = tokio::time::timeout(Duration::from_secs(1), server.recv_from(&mut buf))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(&buf[..n], b"JOIN");
        assert_eq!(Some(from), transport.local_addr());
    }

    #[tokio::test]
    async fn test_burst_right_after_open_is_delivered() {
        let (server, server_addr) = peer().await;
        let mut transport = UdpTransport::new(UdpConfig::default());
        transport.open(server_addr, EventQueue::new()).unwrap();

        for datagram in [&b"JOIN"[..], b"RDAT", b"KEEP"] {
            transport.send(datagram);
        }
        let mut buf = [0u8; 64];
        for expected in [&b"JOIN"[..], b"RDAT", b"KEEP"] {
            let n = tokio::time::timeout(Duration::from_secs(1), server.recv(&mut buf))
                .await
                .unwrap()
                .unwrap();
            assert_eq!(&buf[..n], expected);
        }
    }

    #[tokio::test]
    async fn test_received_datagrams_are_queued_in_order() {
        let (server, server_addr) = peer().await;
        let queue = EventQueue::new();
        let mut transport = UdpTransport::new(UdpConfig::default());
        transport.open(server_addr, queue.clone()).unwrap();
        let client_addr = transport.local_addr().unwrap();

        server.send_to(b"JRES", client_addr).await.unwrap();
        server.send_to(b"EVNTcue", client_addr).await.unwrap();
        wait_for_events(&queue, 2).await;

        let mut events = queue.drain();
        assert!(matches!(events.pop_front(), Some(InboundEvent::JoinAccepted)));
        assert!(matches!(
            events.pop_front(),
            Some(InboundEvent::Event(text)) if text == "cue"
        ));
    }

    #[tokio::test]
    async fn test_receive_loop_survives_protocol_faults() {
        let (server, server_addr) = peer().await;
        let queue = EventQueue::new();
        let mut transport = UdpTransport::new(UdpConfig::default());
        transport.open(server_addr, queue.clone()).unwrap();
        let client_addr = transport.local_addr().unwrap();

        server.send_to(b"WHAT", client_addr).await.unwrap();
        server.send_to(b"UDAT{oops", client_addr).await.unwrap();
        server.send_to(b"QUIT", client_addr).await.unwrap();
        wait_for_events(&queue, 1).await;

        let events = queue.drain();
        assert_eq!(events.len(), 1);
        assert!(matches!(events.front(), Some(InboundEvent::Quit)));
    }

    #[tokio::test]
    async fn test_open_twice_rejected() {
        let (_server, server_addr) = peer().await;
        let mut transport = UdpTransport::new(UdpConfig::default());
        transport.open(server_addr, EventQueue::new()).unwrap();
        let result = transport.open(server_addr, EventQueue::new());
        assert!(matches!(result, Err(TransportError::AlreadyOpen)));
        assert!(transport.is_open());
    }

    #[tokio::test]
    async fn test_close_is_idempotent_and_send_after_close_is_dropped() {
        let (_server, server_addr) = peer().await;
        let mut transport = UdpTransport::new(UdpConfig::default());
        transport.open(server_addr, EventQueue::new()).unwrap();

        transport.close();
        transport.close();
        assert!(!transport.is_open());
        assert_eq!(transport.local_addr(), None);
        transport.send(b"KEEP");
    }

    #[tokio::test]
    async fn test_closed_endpoint_stops_queueing() {
        let (server, server_addr) = peer().await;
        let queue = EventQueue::new();
        let mut transport = UdpTransport::new(UdpConfig::default());
        transport.open(server_addr, queue.clone()).unwrap();
        let client_addr = transport.local_addr().unwrap();

        transport.close();
        tokio::time::sleep(Duration::from_millis(20)).await;
        let _ = server.send_to(b"JRES", client_addr).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(queue.is_empty());
    }

    #[test]
    fn test_open_without_runtime_fails() {
        let mut transport = UdpTransport::new(UdpConfig::default());
        let result = transport.open("127.0.0.1:5556".parse().unwrap(), EventQueue::new());
        assert!(matches!(result, Err(TransportError::NoRuntime)));
        assert!(!transport.is_open());
    }

    #[test]
    fn test_explicit_runtime_handle() {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .unwrap();
        let server = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
        server
            .set_read_timeout(Some(Duration::from_secs(1)))
            .unwrap();

        let mut transport =
            UdpTransport::with_runtime(UdpConfig::default(), runtime.handle().clone());
        transport
            .open(server.local_addr().unwrap(), EventQueue::new())
            .unwrap();
        transport.send(b"KEEP");

        let mut buf = [0u8; 16];
        let (n, _) = server.recv_from(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"KEEP");
    }
}
