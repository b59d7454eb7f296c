//! Link-change notifications from polling the routing table.
//!
//! There is no portable push API for "the local address changed", so the
//! monitor polls: every interval it runs a route probe towards the multicast
//! group and emits a snapshot on the notification stream whenever the
//! result differs from the previous poll.  Losing the route is reported once
//! as an error.
//!
//! The poller runs on a dedicated thread (the probe is blocking socket I/O)
//! and stops when the run flag is cleared or the receiver is dropped.

use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddrV4};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use groupchat_core::NetworkSnapshot;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::application::network_watcher::{SnapshotSource, WatchError};
use crate::infrastructure::transport::address::probe_route;

/// Label used as the interface name of route-probe snapshots.
pub const ROUTE_INTERFACE: &str = "route";

fn snapshot_of(addr: Ipv4Addr) -> NetworkSnapshot {
    NetworkSnapshot::from_ips(ROUTE_INTERFACE, &[IpAddr::V4(addr)])
}

/// [`SnapshotSource`] backed by a route probe.
#[derive(Debug, Clone)]
pub struct RouteProbeSource {
    target: SocketAddrV4,
}

impl RouteProbeSource {
    pub fn new(target: SocketAddrV4) -> Self {
        Self { target }
    }
}

impl SnapshotSource for RouteProbeSource {
    /// Only [`ROUTE_INTERFACE`] is known; the poller labels every snapshot
    /// with it.
    fn current(&self, interface: &str) -> Option<NetworkSnapshot> {
        if interface != ROUTE_INTERFACE {
            debug!("route probe cannot inspect interface {interface:?}");
            return None;
        }
        match probe_route(self.target) {
            Ok(addr) => Some(snapshot_of(addr)),
            Err(e) => {
                debug!("route probe to {}: {e}", self.target);
                None
            }
        }
    }
}

/// Starts polling `target`'s route every `interval`.
///
/// Returns the notification stream the network watcher consumes.
///
/// # Errors
///
/// Returns an error if the poller thread cannot be spawned.
pub fn spawn_link_poller(
    target: SocketAddrV4,
    interval: Duration,
    running: Arc<AtomicBool>,
) -> io::Result<mpsc::Receiver<Result<NetworkSnapshot, WatchError>>> {
    spawn_poller_with(move || probe_route(target), interval, running)
}

fn spawn_poller_with<P>(
    probe: P,
    interval: Duration,
    running: Arc<AtomicBool>,
) -> io::Result<mpsc::Receiver<Result<NetworkSnapshot, WatchError>>>
where
    P: Fn() -> io::Result<Ipv4Addr> + Send + 'static,
{
    let (tx, rx) = mpsc::channel(16);
    std::thread::Builder::new()
        .name("groupchat-link".to_string())
        .spawn(move || poll_loop(probe, interval, &tx, &running))?;
    info!("link monitor polling every {interval:?}");
    Ok(rx)
}

fn poll_loop<P>(
    probe: P,
    interval: Duration,
    tx: &mpsc::Sender<Result<NetworkSnapshot, WatchError>>,
    running: &AtomicBool,
) where
    P: Fn() -> io::Result<Ipv4Addr>,
{
    // `Some(None)` after the route was lost, so the loss is reported once.
    let mut last: Option<Option<Ipv4Addr>> = None;

    while running.load(Ordering::Relaxed) {
        let notification = match probe() {
            Ok(addr) if last != Some(Some(addr)) => {
                debug!("route now via {addr}");
                last = Some(Some(addr));
                Some(Ok(snapshot_of(addr)))
            }
            Ok(_) => None,
            Err(e) if last != Some(None) => {
                warn!("no route to the group: {e}");
                last = Some(None);
                Some(Err(WatchError::Probe(e)))
            }
            Err(_) => None,
        };

        if let Some(notification) = notification {
            if tx.blocking_send(notification).is_err() {
                // Receiver dropped – watcher is shutting down.
                break;
            }
        }
        std::thread::sleep(interval);
    }

    info!("link monitor stopped");
}
