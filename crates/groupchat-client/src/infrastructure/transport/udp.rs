//! UDP multicast transport.
//!
//! # Sockets
//!
//! | socket      | bound to                 | used for                          |
//! |-------------|--------------------------|-----------------------------------|
//! | multicast   | `0.0.0.0:<mcast_port>`   | receiving group traffic           |
//! | unicast     | `<local ip>:<bind_port>` | sending, receiving direct replies |
//! | diagnostics | `0.0.0.0:<diag_port>`    | answering probe requests          |
//!
//! The multicast and diagnostics sockets set `SO_REUSEADDR` before binding
//! so several members can run on one host.  Both join their group on the
//! interface that owns the resolved local address, and the unicast socket
//! sends multicast out of that same interface.  That binding to one address
//! is why the transport must be rebuilt when the address changes.
//!
//! # Receiver threads
//!
//! One named thread per socket, each running the same loop: `recv_from` with
//! a short read timeout, check the run flag on every timeout, hand datagrams
//! to the up handler and send any reply back to the datagram's source from
//! the unicast socket.  `stop_threads` clears the flag and waits a bounded
//! time for every thread to report that it has exited.  Threads that miss
//! the deadline stay tracked: `destroy_sockets` refuses with
//! [`TransportError::ThreadsRunning`] and the next `stop_threads` waits for
//! them again, so a new socket set is never bound beside a live old one.

use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use groupchat_core::protocol::messages::MAX_FRAME_SIZE;
use groupchat_core::{AddressCache, Transport, TransportError, UpHandler};
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use tracing::{debug, error, info, warn};

use crate::application::channel_manager::TransportFactory;
use crate::infrastructure::diagnostics::{
    answer_request, DEFAULT_DIAGNOSTICS_GROUP, DEFAULT_DIAGNOSTICS_PORT,
};
use crate::infrastructure::transport::address::LocalAddressResolver;

/// Default multicast group.
pub const DEFAULT_MCAST_GROUP: Ipv4Addr = Ipv4Addr::new(228, 8, 8, 8);

/// Default multicast port.
pub const DEFAULT_MCAST_PORT: u16 = 45588;

/// Settings for a [`UdpTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UdpTransportConfig {
    pub mcast_group: Ipv4Addr,
    pub mcast_port: u16,
    /// Port for the unicast socket; 0 picks an ephemeral port.
    pub bind_port: u16,
    pub ttl: u32,
    /// Receive our own multicast traffic (needed for same-host members).
    pub loopback: bool,
    /// Read timeout of each receiver thread; bounds how long a stop waits
    /// for the thread to notice.
    pub recv_timeout: Duration,
    /// Upper bound on waiting for a receiver thread to exit.
    pub stop_timeout: Duration,
    pub enable_diagnostics: bool,
    pub diagnostics_group: Ipv4Addr,
    pub diagnostics_port: u16,
    /// Advertise and implement the one-call `reconnect`.
    pub native_reconnect: bool,
}

impl Default for UdpTransportConfig {
    fn default() -> Self {
        Self {
            mcast_group: DEFAULT_MCAST_GROUP,
            mcast_port: DEFAULT_MCAST_PORT,
            bind_port: 0,
            ttl: 8,
            loopback: true,
            recv_timeout: Duration::from_millis(500),
            stop_timeout: Duration::from_secs(2),
            enable_diagnostics: true,
            diagnostics_group: DEFAULT_DIAGNOSTICS_GROUP,
            diagnostics_port: DEFAULT_DIAGNOSTICS_PORT,
            native_reconnect: true,
        }
    }
}

impl UdpTransportConfig {
    fn group_addr(&self) -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(self.mcast_group, self.mcast_port))
    }
}

fn io_err(operation: &'static str) -> impl FnOnce(io::Error) -> TransportError {
    move |source| TransportError::Io { operation, source }
}

/// The bound sockets of one transport generation.
struct BoundSockets {
    local: Ipv4Addr,
    mcast: Arc<UdpSocket>,
    ucast: Arc<UdpSocket>,
    diagnostics: Option<Arc<UdpSocket>>,
}

/// What a receiver thread does with a datagram.
#[derive(Clone, Copy)]
enum Role {
    Group,
    Diagnostics,
}

struct ReceiverThread {
    name: String,
    handle: JoinHandle<()>,
    /// Disconnects when the thread exits.
    done: mpsc::Receiver<()>,
}

/// [`Transport`] over UDP multicast.
pub struct UdpTransport {
    config: UdpTransportConfig,
    resolver: Arc<LocalAddressResolver>,
    handler: Option<Arc<dyn UpHandler>>,
    sockets: Option<BoundSockets>,
    running: Arc<AtomicBool>,
    threads: Vec<ReceiverThread>,
}

impl UdpTransport {
    pub fn new(config: UdpTransportConfig, resolver: Arc<LocalAddressResolver>) -> Self {
        Self {
            config,
            resolver,
            handler: None,
            sockets: None,
            running: Arc::new(AtomicBool::new(false)),
            threads: Vec::new(),
        }
    }

    /// Whether receiver threads are running.
    pub fn is_running(&self) -> bool {
        !self.threads.is_empty()
    }

    /// Whether sockets are bound.
    pub fn is_bound(&self) -> bool {
        self.sockets.is_some()
    }

    fn bind_multicast(
        &self,
        port: u16,
        group: Ipv4Addr,
        local: Ipv4Addr,
    ) -> Result<UdpSocket, TransportError> {
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))
            .map_err(io_err("create multicast socket"))?;
        socket
            .set_reuse_address(true)
            .map_err(io_err("set SO_REUSEADDR"))?;
        socket
            .bind(&SockAddr::from(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port)))
            .map_err(io_err("bind multicast socket"))?;
        socket
            .join_multicast_v4(&group, &local)
            .map_err(io_err("join multicast group"))?;
        socket
            .set_read_timeout(Some(self.config.recv_timeout))
            .map_err(io_err("set read timeout"))?;
        Ok(socket.into())
    }

    fn bind_unicast(&self, local: Ipv4Addr) -> Result<UdpSocket, TransportError> {
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))
            .map_err(io_err("create unicast socket"))?;
        socket
            .bind(&SockAddr::from(SocketAddrV4::new(local, self.config.bind_port)))
            .map_err(io_err("bind unicast socket"))?;
        socket
            .set_multicast_if_v4(&local)
            .map_err(io_err("set multicast interface"))?;
        socket
            .set_multicast_ttl_v4(self.config.ttl)
            .map_err(io_err("set multicast ttl"))?;
        socket
            .set_multicast_loop_v4(self.config.loopback)
            .map_err(io_err("set multicast loopback"))?;
        socket
            .set_read_timeout(Some(self.config.recv_timeout))
            .map_err(io_err("set read timeout"))?;
        Ok(socket.into())
    }

    fn spawn_receiver(
        &self,
        name: String,
        role: Role,
        socket: Arc<UdpSocket>,
        reply: Arc<UdpSocket>,
        handler: Arc<dyn UpHandler>,
    ) -> Result<ReceiverThread, TransportError> {
        let (done_tx, done) = mpsc::channel::<()>();
        let running = Arc::clone(&self.running);
        let thread_name = name.clone();
        let handle = std::thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                receive_loop(&thread_name, role, &socket, &reply, handler.as_ref(), &running);
                drop(done_tx);
            })
            .map_err(io_err("spawn receiver thread"))?;
        Ok(ReceiverThread { name, handle, done })
    }
}

impl Transport for UdpTransport {
    fn set_up_handler(&mut self, handler: Arc<dyn UpHandler>) {
        self.handler = Some(handler);
    }

    fn create_sockets(&mut self) -> Result<(), TransportError> {
        if self.sockets.is_some() {
            return Err(TransportError::AlreadyBound);
        }
        let local = self.resolver.resolve()?;
        let mcast = self.bind_multicast(self.config.mcast_port, self.config.mcast_group, local)?;
        let ucast = self.bind_unicast(local)?;
        let diagnostics = if self.config.enable_diagnostics {
            match self.bind_multicast(
                self.config.diagnostics_port,
                self.config.diagnostics_group,
                local,
            ) {
                Ok(socket) => Some(Arc::new(socket)),
                Err(e) => {
                    // Diagnostics are optional; chat works without them.
                    warn!("diagnostics socket unavailable: {e}");
                    None
                }
            }
        } else {
            None
        };

        let sockets = BoundSockets {
            local,
            mcast: Arc::new(mcast),
            ucast: Arc::new(ucast),
            diagnostics,
        };
        info!(
            "sockets bound: local={local}, unicast={:?}, group={}",
            sockets.ucast.local_addr().ok(),
            self.config.group_addr()
        );
        self.sockets = Some(sockets);
        Ok(())
    }

    fn destroy_sockets(&mut self) -> Result<(), TransportError> {
        if !self.threads.is_empty() {
            return Err(TransportError::ThreadsRunning);
        }
        let Some(sockets) = self.sockets.take() else {
            return Ok(());
        };
        // The interface may already be gone; closing the socket drops the
        // membership regardless.
        if let Err(e) = sockets
            .mcast
            .leave_multicast_v4(&self.config.mcast_group, &sockets.local)
        {
            debug!("leave multicast group: {e}");
        }
        if let Some(diag) = &sockets.diagnostics {
            if let Err(e) =
                diag.leave_multicast_v4(&self.config.diagnostics_group, &sockets.local)
            {
                debug!("leave diagnostics group: {e}");
            }
        }
        debug!("sockets on {} destroyed", sockets.local);
        Ok(())
    }

    fn start_threads(&mut self) -> Result<(), TransportError> {
        if !self.threads.is_empty() {
            return Err(TransportError::AlreadyRunning);
        }
        let handler = self.handler.clone().ok_or(TransportError::NoHandler)?;
        let (mcast, ucast, diagnostics) = match &self.sockets {
            Some(s) => (
                Arc::clone(&s.mcast),
                Arc::clone(&s.ucast),
                s.diagnostics.clone(),
            ),
            None => return Err(TransportError::NotBound),
        };

        // A fresh flag per generation: a thread that outlived a timed-out
        // stop keeps seeing `false`.
        self.running = Arc::new(AtomicBool::new(true));

        let mut receivers = vec![
            ("groupchat-mcast", Role::Group, mcast),
            ("groupchat-ucast", Role::Group, Arc::clone(&ucast)),
        ];
        if let Some(diag) = diagnostics {
            receivers.push(("groupchat-diag", Role::Diagnostics, diag));
        }

        for (name, role, socket) in receivers {
            let reply = match role {
                Role::Group => Arc::clone(&ucast),
                Role::Diagnostics => Arc::clone(&socket),
            };
            match self.spawn_receiver(name.to_string(), role, socket, reply, Arc::clone(&handler)) {
                Ok(thread) => self.threads.push(thread),
                Err(e) => {
                    error!("failed to start {name}: {e}");
                    if let Err(stop) = self.stop_threads() {
                        warn!("stopping partially started receivers: {stop}");
                    }
                    return Err(e);
                }
            }
        }
        debug!("{} receiver threads started", self.threads.len());
        Ok(())
    }

    fn stop_threads(&mut self) -> Result<(), TransportError> {
        if self.threads.is_empty() {
            return Ok(());
        }
        self.running.store(false, Ordering::Relaxed);

        let deadline = Instant::now() + self.config.stop_timeout;
        let mut still_running = Vec::new();
        for thread in std::mem::take(&mut self.threads) {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match thread.done.recv_timeout(remaining) {
                Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                    if thread.handle.join().is_err() {
                        error!("receiver thread {} panicked", thread.name);
                    }
                }
                Err(RecvTimeoutError::Timeout) => {
                    // Kept so the sockets stay bound until the thread is gone.
                    warn!("receiver thread {} did not stop in time", thread.name);
                    still_running.push(thread);
                }
            }
        }
        if !still_running.is_empty() {
            self.threads = still_running;
            return Err(TransportError::Timeout {
                operation: "stop receiver threads",
                timeout: self.config.stop_timeout,
            });
        }
        debug!("receiver threads stopped");
        Ok(())
    }

    fn send(&self, frame: &[u8]) -> Result<(), TransportError> {
        let sockets = self.sockets.as_ref().ok_or(TransportError::NotBound)?;
        sockets
            .ucast
            .send_to(frame, self.config.group_addr())
            .map_err(io_err("multicast send"))?;
        Ok(())
    }

    fn local_address(&self) -> Option<SocketAddr> {
        self.sockets.as_ref()?.ucast.local_addr().ok()
    }

    fn supports_reconnect(&self) -> bool {
        self.config.native_reconnect
    }

    /// Stops, rebinds to the current address and restarts in one call.
    fn reconnect(&mut self) -> Result<(), TransportError> {
        if !self.config.native_reconnect {
            return Err(TransportError::Unsupported("reconnect"));
        }
        self.stop_threads()?;
        self.destroy_sockets()?;
        self.resolver.reset();
        self.create_sockets()?;
        self.start_threads()?;
        info!("transport reconnected on {:?}", self.local_address());
        Ok(())
    }
}

impl Drop for UdpTransport {
    fn drop(&mut self) {
        if let Err(e) = self.stop_threads() {
            warn!("stopping receivers on drop: {e}");
        }
        self.sockets = None;
    }
}

/// The receive loop executed on every receiver thread.
fn receive_loop(
    name: &str,
    role: Role,
    socket: &UdpSocket,
    reply: &UdpSocket,
    handler: &dyn UpHandler,
    running: &AtomicBool,
) {
    let mut buf = vec![0u8; MAX_FRAME_SIZE];
    let local = reply.local_addr().ok();

    while running.load(Ordering::Relaxed) {
        let (len, src) = match socket.recv_from(&mut buf) {
            Ok(pair) => pair,
            Err(e) if is_timeout_error(&e) => continue,
            Err(e) => {
                if running.load(Ordering::Relaxed) {
                    error!("{name} recv error: {e}");
                    // Avoid spinning on a persistent error (e.g. interface gone).
                    std::thread::sleep(Duration::from_millis(50));
                }
                continue;
            }
        };

        let datagram = &buf[..len];
        let response = match role {
            Role::Group => handler.deliver(datagram),
            Role::Diagnostics => answer_request(datagram, handler, local),
        };
        if let Some(response) = response {
            if let Err(e) = reply.send_to(&response, src) {
                warn!("{name}: reply to {src} failed: {e}");
            }
        }
    }

    debug!("{name} stopped");
}

/// Returns `true` for OS timeout / would-block errors that should be retried.
fn is_timeout_error(e: &io::Error) -> bool {
    matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut)
}

/// Builds [`UdpTransport`]s that share one address resolver.
pub struct UdpTransportFactory {
    config: UdpTransportConfig,
    resolver: Arc<LocalAddressResolver>,
}

impl UdpTransportFactory {
    pub fn new(config: UdpTransportConfig, resolver: Arc<LocalAddressResolver>) -> Self {
        Self { config, resolver }
    }
}

impl TransportFactory for UdpTransportFactory {
    fn create(&self) -> Result<Box<dyn Transport>, TransportError> {
        Ok(Box::new(UdpTransport::new(
            self.config.clone(),
            Arc::clone(&self.resolver),
        )))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Silent;

    impl UpHandler for Silent {
        fn deliver(&self, _datagram: &[u8]) -> Option<Vec<u8>> {
            None
        }
    }

    fn loopback_transport() -> UdpTransport {
        let config = UdpTransportConfig {
            recv_timeout: Duration::from_millis(50),
            enable_diagnostics: false,
            ..UdpTransportConfig::default()
        };
        let resolver = Arc::new(LocalAddressResolver::new(
            SocketAddrV4::new(config.mcast_group, config.mcast_port),
            Some(Ipv4Addr::LOCALHOST),
        ));
        UdpTransport::new(config, resolver)
    }

    #[test]
    fn test_is_timeout_error_recognises_timed_out() {
        let e = io::Error::new(io::ErrorKind::TimedOut, "timed out");
        assert!(is_timeout_error(&e));
    }

    #[test]
    fn test_is_timeout_error_returns_false_for_other_errors() {
        let e = io::Error::new(io::ErrorKind::ConnectionRefused, "refused");
        assert!(!is_timeout_error(&e));
    }

    #[test]
    fn test_default_config_matches_well_known_ports() {
        let cfg = UdpTransportConfig::default();
        assert_eq!(cfg.group_addr().to_string(), "228.8.8.8:45588");
        assert_eq!(cfg.ttl, 8);
        assert_eq!(cfg.diagnostics_port, 7500);
    }

    #[test]
    fn test_start_without_sockets_is_not_bound() {
        let mut transport = loopback_transport();
        transport.set_up_handler(Arc::new(Silent));
        assert!(matches!(transport.start_threads(), Err(TransportError::NotBound)));
    }

    #[test]
    fn test_send_without_sockets_is_not_bound() {
        let transport = loopback_transport();
        assert!(matches!(transport.send(b"x"), Err(TransportError::NotBound)));
    }

    #[test]
    fn test_stop_and_destroy_are_noops_when_idle() {
        let mut transport = loopback_transport();
        transport.stop_threads().unwrap();
        transport.destroy_sockets().unwrap();
    }

    #[test]
    fn test_reconnect_disabled_is_unsupported() {
        let mut transport = UdpTransport::new(
            UdpTransportConfig {
                native_reconnect: false,
                ..UdpTransportConfig::default()
            },
            Arc::new(LocalAddressResolver::new(
                SocketAddrV4::new(DEFAULT_MCAST_GROUP, DEFAULT_MCAST_PORT),
                None,
            )),
        );
        assert!(!transport.supports_reconnect());
        assert!(matches!(
            transport.reconnect(),
            Err(TransportError::Unsupported(_))
        ));
    }

    /// Transport on the interface that routes to the group, or `None` when
    /// the host has no usable route (the test is then skipped).
    fn routed_transport(mcast_port: u16, stop_timeout: Duration) -> Option<UdpTransport> {
        let config = UdpTransportConfig {
            mcast_group: Ipv4Addr::new(228, 8, 8, 9),
            mcast_port,
            recv_timeout: Duration::from_millis(50),
            stop_timeout,
            enable_diagnostics: false,
            ..UdpTransportConfig::default()
        };
        let resolver = Arc::new(LocalAddressResolver::new(
            SocketAddrV4::new(config.mcast_group, config.mcast_port),
            None,
        ));
        if let Err(e) = resolver.resolve() {
            eprintln!("skipping: no routed IPv4 address ({e})");
            return None;
        }
        Some(UdpTransport::new(config, resolver))
    }

    /// Blocks in `deliver` until the gate sender is dropped.
    struct Gated {
        entered: Mutex<std::sync::mpsc::Sender<()>>,
        gate: Mutex<std::sync::mpsc::Receiver<()>>,
    }

    impl UpHandler for Gated {
        fn deliver(&self, _datagram: &[u8]) -> Option<Vec<u8>> {
            let _ = self.entered.lock().unwrap().send(());
            let _ = self.gate.lock().unwrap().recv();
            None
        }
    }

    #[test]
    fn test_lifecycle_on_routed_interface() {
        // Arrange
        let Some(mut transport) = routed_transport(46311, Duration::from_secs(2)) else {
            return;
        };
        transport.set_up_handler(Arc::new(Silent));

        // Act / Assert
        transport.create_sockets().unwrap();
        assert!(matches!(transport.create_sockets(), Err(TransportError::AlreadyBound)));
        transport.start_threads().unwrap();
        assert!(matches!(transport.destroy_sockets(), Err(TransportError::ThreadsRunning)));
        transport.send(b"hello").unwrap();
        transport.reconnect().unwrap();
        assert!(transport.is_running());
        transport.stop_threads().unwrap();
        transport.destroy_sockets().unwrap();
        assert!(!transport.is_bound());
    }

    #[test]
    fn test_stop_times_out_while_handler_blocks_and_keeps_the_thread() {
        // Arrange – a handler stuck in deliver on the multicast thread
        let Some(mut transport) = routed_transport(46312, Duration::from_millis(300)) else {
            return;
        };
        let (entered_tx, entered_rx) = std::sync::mpsc::channel();
        let (gate_tx, gate_rx) = std::sync::mpsc::channel::<()>();
        transport.set_up_handler(Arc::new(Gated {
            entered: Mutex::new(entered_tx),
            gate: Mutex::new(gate_rx),
        }));
        transport.create_sockets().unwrap();
        transport.start_threads().unwrap();
        transport.send(b"block").unwrap();
        entered_rx
            .recv_timeout(Duration::from_secs(5))
            .expect("multicast datagram reached the handler");

        // Act
        let stop = transport.stop_threads();

        // Assert – the stuck thread is still tracked, so its sockets stay put
        assert!(matches!(stop, Err(TransportError::Timeout { .. })), "got {stop:?}");
        assert!(transport.is_running());
        assert!(matches!(transport.destroy_sockets(), Err(TransportError::ThreadsRunning)));
        assert!(transport.is_bound());

        // Act – unblock; a retried stop now completes
        drop(gate_tx);
        transport.stop_threads().unwrap();
        transport.destroy_sockets().unwrap();

        // Assert
        assert!(!transport.is_running());
        assert!(!transport.is_bound());
    }
}
