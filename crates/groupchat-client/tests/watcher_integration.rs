//! End-to-end tests of the network watcher driving the channel manager,
//! on a paused Tokio clock.

use std::net::{IpAddr, Ipv4Addr};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use groupchat_client::application::{
    channel_manager::{ChannelManager, ChannelSettings, ManagerState, RefreshOnTransition},
    events::{event_streams, EventReceivers},
    hot_swap::HotSwap,
    network_watcher::{NetworkWatcher, SnapshotSource},
};
use groupchat_client::infrastructure::transport::mock::{
    RecordingTransportFactory, TransportControl,
};
use groupchat_core::NetworkSnapshot;
use tokio::sync::mpsc;

/// Source whose answer the test can change between steps.
struct SwitchableSource {
    current: Mutex<Option<Ipv4Addr>>,
}

impl SwitchableSource {
    fn new(addr: Option<Ipv4Addr>) -> Arc<Self> {
        Arc::new(Self {
            current: Mutex::new(addr),
        })
    }

    fn set(&self, addr: Option<Ipv4Addr>) {
        *self.current.lock().unwrap() = addr;
    }
}

impl SnapshotSource for SwitchableSource {
    fn current(&self, interface: &str) -> Option<NetworkSnapshot> {
        assert_eq!(interface, "wlan0");
        let addr = (*self.current.lock().unwrap())?;
        Some(snapshot(addr))
    }
}

fn snapshot(addr: Ipv4Addr) -> NetworkSnapshot {
    NetworkSnapshot::from_ips("wlan0", &[IpAddr::V4(addr)])
}

struct Rig {
    control: TransportControl,
    manager: Arc<ChannelManager>,
    watcher: NetworkWatcher,
    source: Arc<SwitchableSource>,
    streams: EventReceivers,
}

fn rig(initial: Option<Ipv4Addr>) -> Rig {
    let control = TransportControl::new();
    let manager = Arc::new(ChannelManager::new(
        ChannelSettings::default(),
        Arc::new(RecordingTransportFactory::new(control.clone())),
        HotSwap::new(Arc::new(control.clone())),
    ));
    let (events, streams) = event_streams(16);
    let source = SwitchableSource::new(initial);
    let watcher = NetworkWatcher::new(
        Duration::from_millis(1000),
        source.clone(),
        Arc::new(RefreshOnTransition::new(Arc::clone(&manager), "ANDROID", events)),
    );
    Rig {
        control,
        manager,
        watcher,
        source,
        streams,
    }
}

const HOME: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 50);
const OFFICE: Ipv4Addr = Ipv4Addr::new(10, 20, 0, 4);

#[tokio::test(start_paused = true)]
async fn test_first_usable_network_connects_exactly_once() {
    // Arrange
    let mut rig = rig(Some(HOME));

    // Act
    rig.watcher.on_link_changed(Some(&snapshot(HOME)));
    let status = rig.streams.status.recv().await.expect("status after settle");

    // Assert
    assert!(status.starts_with("Connected: "), "got {status}");
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert!(rig.streams.status.try_recv().is_err());
    assert_eq!(rig.control.transports_created(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_link_local_address_does_not_connect() {
    let mut rig = rig(Some(Ipv4Addr::new(169, 254, 3, 4)));

    rig.watcher.on_link_changed(Some(&snapshot(Ipv4Addr::new(169, 254, 3, 4))));
    tokio::time::sleep(Duration::from_secs(5)).await;

    assert!(rig.streams.status.try_recv().is_err());
    assert_eq!(rig.manager.state(), ManagerState::NoChannel);
}

#[tokio::test(start_paused = true)]
async fn test_network_change_after_connect_hot_swaps() {
    // Arrange – connected on the home network
    let mut rig = rig(Some(HOME));
    rig.watcher.on_link_changed(Some(&snapshot(HOME)));
    rig.streams.status.recv().await.unwrap();

    // Act – move to the office network
    rig.source.set(Some(OFFICE));
    rig.watcher.on_link_changed(Some(&snapshot(OFFICE)));
    let status = rig.streams.status.recv().await.unwrap();

    // Assert
    assert!(status.starts_with("Transport Hot-swapped: "), "got {status}");
    assert_eq!(rig.control.transports_created(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_watcher_run_loop_coalesces_a_flapping_link() {
    // Arrange
    let rig = rig(Some(HOME));
    let Rig {
        control,
        watcher,
        mut streams,
        ..
    } = rig;
    let watcher = Arc::new(watcher);
    let (tx, rx) = mpsc::channel(16);
    let runner = {
        let watcher = Arc::clone(&watcher);
        tokio::spawn(async move { watcher.run(rx).await })
    };

    // Act – DHCP flaps the address a few times within one settle window
    for addr in [HOME, Ipv4Addr::new(169, 254, 1, 1), HOME, HOME] {
        tx.send(Ok(snapshot(addr))).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    let status = streams.status.recv().await.unwrap();
    tokio::time::sleep(Duration::from_secs(5)).await;

    // Assert
    assert!(status.starts_with("Connected: "));
    assert!(streams.status.try_recv().is_err(), "flapping must yield one refresh");
    assert_eq!(control.transports_created(), 1);

    drop(tx);
    runner.await.unwrap();
}
