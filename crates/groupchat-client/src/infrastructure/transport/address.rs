//! Local IPv4 address resolution with a resettable cache.
//!
//! The transport binds its sending socket to "the local address", i.e. the
//! source address the OS would pick for traffic to the multicast group.
//! Finding it takes a route probe: bind an unconnected UDP socket, `connect`
//! it to the group address (no packet is sent) and read back the local
//! address the kernel chose.
//!
//! The result is cached until [`AddressCache::reset`] is called.  A hot-swap
//! resets it between teardown and rebuild; that is the whole point of the
//! swap.

use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddrV4, UdpSocket};
use std::sync::{Mutex, MutexGuard, PoisonError};

use groupchat_core::{first_usable_ipv4, AddressCache, NetworkSnapshot, TransportError};
use tracing::debug;

/// Asks the routing table which local IPv4 address reaches `target`.
///
/// # Errors
///
/// Returns the OS error when no route exists (typically
/// `ENETUNREACH` with no network), or `AddrNotAvailable` if the kernel
/// picked a non-IPv4 source.
pub fn probe_route(target: SocketAddrV4) -> io::Result<Ipv4Addr> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?;
    socket.connect(target)?;
    match socket.local_addr()?.ip() {
        IpAddr::V4(v4) if !v4.is_unspecified() => Ok(v4),
        other => Err(io::Error::new(
            io::ErrorKind::AddrNotAvailable,
            format!("route probe returned {other}"),
        )),
    }
}

/// Resolves and caches the local IPv4 address the transport binds to.
#[derive(Debug)]
pub struct LocalAddressResolver {
    probe_target: SocketAddrV4,
    bind_override: Option<Ipv4Addr>,
    cached: Mutex<Option<Ipv4Addr>>,
}

impl LocalAddressResolver {
    /// Resolves through a route probe towards `probe_target`, unless
    /// `bind_override` pins the address.
    pub fn new(probe_target: SocketAddrV4, bind_override: Option<Ipv4Addr>) -> Self {
        Self {
            probe_target,
            bind_override,
            cached: Mutex::new(None),
        }
    }

    fn cache(&self) -> MutexGuard<'_, Option<Ipv4Addr>> {
        self.cached.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The cached address, if any.
    pub fn cached(&self) -> Option<Ipv4Addr> {
        *self.cache()
    }

    /// Returns the cached address or resolves a new one.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::NoLocalAddress`] when the probe fails or
    /// yields only a loopback/link-local address.
    pub fn resolve(&self) -> Result<Ipv4Addr, TransportError> {
        let mut cached = self.cache();
        if let Some(addr) = *cached {
            return Ok(addr);
        }

        let addr = match self.bind_override {
            Some(addr) => addr,
            None => {
                let probed = probe_route(self.probe_target).map_err(|e| {
                    TransportError::NoLocalAddress(format!(
                        "route probe to {}: {e}",
                        self.probe_target
                    ))
                })?;
                let snapshot = NetworkSnapshot::from_ips("route", &[IpAddr::V4(probed)]);
                first_usable_ipv4(Some(&snapshot)).ok_or_else(|| {
                    TransportError::NoLocalAddress(format!("only {probed} is reachable"))
                })?
            }
        };

        debug!("resolved local address {addr}");
        *cached = Some(addr);
        Ok(addr)
    }
}

impl AddressCache for LocalAddressResolver {
    fn reset(&self) {
        if let Some(previous) = self.cache().take() {
            debug!("forgetting cached local address {previous}");
        }
    }
}
