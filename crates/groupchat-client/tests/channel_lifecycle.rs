//! Integration tests for the channel manager through the public API, with
//! the recording transport standing in for UDP.

use std::sync::Arc;

use groupchat_client::application::{
    channel_manager::{ChannelManager, ChannelSettings, ManagerState},
    events::{event_streams, EventReceivers},
    hot_swap::HotSwap,
};
use groupchat_client::infrastructure::transport::mock::{
    RecordingTransportFactory, TransportCall, TransportControl,
};
use groupchat_core::{encode_frame, Frame, GroupMessage, MemberId, Payload};

fn setup() -> (TransportControl, ChannelManager) {
    let control = TransportControl::new();
    let manager = ChannelManager::new(
        ChannelSettings::default(),
        Arc::new(RecordingTransportFactory::new(control.clone())),
        HotSwap::new(Arc::new(control.clone())),
    );
    (control, manager)
}

fn data_from(sender: &MemberId, text: &str) -> Vec<u8> {
    encode_frame(&Frame {
        cluster: "chat".to_string(),
        sender: sender.clone(),
        seq: 1,
        message: GroupMessage::Data(Payload::Text(text.to_string())),
    })
    .unwrap()
}

fn drain_status(rx: &mut EventReceivers) -> Vec<String> {
    std::iter::from_fn(|| rx.status.try_recv().ok()).collect()
}

#[test]
fn test_connect_then_refresh_builds_one_channel_and_swaps_its_transport() {
    // Arrange
    let (control, manager) = setup();
    let (tx, mut rx) = event_streams(16);

    // Act
    manager.connect_or_refresh("ANDROID", &tx);
    let view_before = manager.view().unwrap();
    manager.connect_or_refresh("ANDROID", &tx);

    // Assert
    assert_eq!(control.transports_created(), 1);
    let status = drain_status(&mut rx);
    assert_eq!(status.len(), 2);
    assert!(status[0].starts_with("Connected: "));
    assert!(status[1].starts_with("Transport Hot-swapped: "));
    assert_eq!(manager.member_name().as_deref(), Some("ANDROID"));
    assert_eq!(manager.cluster_name(), "chat");
    assert_eq!(manager.view().unwrap().members(), view_before.members());
}

#[test]
fn test_swap_tears_down_before_rebuilding() {
    let (control, manager) = setup();
    let (tx, _rx) = event_streams(16);
    manager.connect_or_refresh("ANDROID", &tx);
    control.clear_calls();

    manager.connect_or_refresh("ANDROID", &tx);

    let calls = control.calls();
    let pos = |call| calls.iter().position(|c| *c == call).unwrap();
    assert!(pos(TransportCall::StopThreads) < pos(TransportCall::DestroySockets));
    assert!(pos(TransportCall::DestroySockets) < pos(TransportCall::ResetAddressCache));
    assert!(pos(TransportCall::ResetAddressCache) < pos(TransportCall::CreateSockets));
    assert!(pos(TransportCall::CreateSockets) < pos(TransportCall::StartThreads));
}

#[test]
fn test_inbound_messages_keep_arrival_order_across_a_swap() {
    // Arrange
    let (control, manager) = setup();
    let (tx, mut rx) = event_streams(16);
    manager.connect_or_refresh("ANDROID", &tx);
    let alice = MemberId::new("alice");
    let bob = MemberId::new("bob");

    // Act
    control.inject(&data_from(&alice, "hi"));
    manager.connect_or_refresh("ANDROID", &tx);
    control.inject(&data_from(&bob, "yo"));

    // Assert
    assert_eq!(rx.messages.try_recv().unwrap().to_string(), "alice: hi");
    assert_eq!(rx.messages.try_recv().unwrap().to_string(), "bob: yo");
}

#[test]
fn test_own_messages_are_not_delivered_back() {
    let (control, manager) = setup();
    let (tx, mut rx) = event_streams(16);
    manager.connect_or_refresh("ANDROID", &tx);
    assert!(manager.send("echo?"));

    // Loop our own data frame back in, as multicast loopback would.
    let own = control.sent_frames().last().cloned().unwrap();
    control.inject(&own);

    assert!(rx.messages.try_recv().is_err());
}

#[test]
fn test_failed_teardown_reports_error_and_a_later_refresh_recovers() {
    // Arrange
    let (control, manager) = setup();
    let (tx, mut rx) = event_streams(16);
    manager.connect_or_refresh("ANDROID", &tx);
    control.fail_on(TransportCall::DestroySockets);

    // Act
    manager.connect_or_refresh("ANDROID", &tx);
    control.clear_failures();
    manager.connect_or_refresh("ANDROID", &tx);

    // Assert
    let status = drain_status(&mut rx);
    assert!(status[1].starts_with("Error: "), "got {:?}", status[1]);
    assert!(status[2].starts_with("Transport Hot-swapped: "));
    assert_eq!(manager.state(), ManagerState::ChannelActive);
}

#[test]
fn test_send_and_close_without_channel_are_harmless() {
    let (control, manager) = setup();

    assert!(!manager.send("nobody home"));
    manager.close();
    manager.close();

    assert_eq!(manager.state(), ManagerState::NoChannel);
    assert!(control.calls().is_empty());
}

#[test]
fn test_close_announces_leave_and_releases_transport() {
    let (control, manager) = setup();
    let (tx, _rx) = event_streams(16);
    manager.connect_or_refresh("ANDROID", &tx);
    control.clear_calls();

    manager.close();

    assert_eq!(
        control.calls(),
        vec![
            TransportCall::Send,
            TransportCall::StopThreads,
            TransportCall::DestroySockets
        ]
    );
    assert_eq!(manager.state(), ManagerState::NoChannel);
}

#[test]
fn test_concurrent_refreshes_are_serialised() {
    // Arrange
    let (control, manager) = setup();
    let manager = Arc::new(manager);
    let (tx, mut rx) = event_streams(64);

    // Act – eight threads race to connect
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let manager = Arc::clone(&manager);
            let tx = tx.clone();
            std::thread::spawn(move || manager.connect_or_refresh("ANDROID", &tx))
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    // Assert – one channel, one connect, seven swaps
    assert_eq!(control.transports_created(), 1);
    let status = drain_status(&mut rx);
    assert_eq!(status.iter().filter(|s| s.starts_with("Connected: ")).count(), 1);
    assert_eq!(
        status.iter().filter(|s| s.starts_with("Transport Hot-swapped: ")).count(),
        7
    );
}

#[test]
fn test_unread_message_stream_does_not_block_delivery_or_a_swap() {
    // Arrange – both streams hold two events; the application never reads
    // messages
    let (control, manager) = setup();
    let (tx, mut rx) = event_streams(2);
    manager.connect_or_refresh("ANDROID", &tx);
    let alice = MemberId::new("alice");

    // Act
    for text in ["one", "two", "three"] {
        control.inject(&data_from(&alice, text));
    }
    manager.connect_or_refresh("ANDROID", &tx);

    // Assert
    let status = drain_status(&mut rx);
    assert!(status[1].starts_with("Transport Hot-swapped: "), "got {status:?}");
    assert_eq!(rx.messages.try_recv().unwrap().text, "one");
    assert_eq!(rx.messages.try_recv().unwrap().text, "two");
    assert!(rx.messages.try_recv().is_err(), "overflow must be dropped");
    assert_eq!(manager.state(), ManagerState::ChannelActive);
}
