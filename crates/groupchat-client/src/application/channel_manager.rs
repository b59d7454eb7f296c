//! The channel manager: owns zero or one group channel and decides, on each
//! network transition, whether to open a new channel or hot-swap the
//! transport of the existing one.
//!
//! # State machine
//!
//! ```text
//!              connect_or_refresh (ok)
//!  NoChannel ──────────────────────────▶ ChannelActive ──┐
//!      ▲     connect_or_refresh (err)        │   ▲       │ connect_or_refresh
//!      └──────────── (stays) ◀───            │   └───────┘ (hot-swap, ok or err)
//!                                            │
//!      ◀──────────────── close ──────────────┘
//! ```
//!
//! # Concurrency
//!
//! Every public operation takes one mutex for its whole duration, so a swap
//! in progress finishes before the next `connect_or_refresh`, `send` or
//! `close` starts.  The operations block on socket I/O: call them from a
//! blocking context (`spawn_blocking` or a plain thread), never directly on
//! an async task.
//!
//! Status events are published after the mutex is released.
//!
//! # Errors
//!
//! Nothing here returns an error to the caller.  Failures are logged and
//! turned into `"Error: …"` status lines.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use groupchat_core::{Channel, ChannelError, MemberView, Payload, Transport, TransportError};
use tracing::{debug, error, info, warn};

use crate::application::events::EventSenders;
use crate::application::hot_swap::HotSwap;
use crate::application::message_bridge::MessageBridge;
use crate::application::network_watcher::TransitionHandler;

/// Builds a fresh, unbound transport for a new channel.
pub trait TransportFactory: Send + Sync {
    /// # Errors
    ///
    /// Returns a [`TransportError`] if the transport cannot be constructed
    /// (for example, invalid configuration).
    fn create(&self) -> Result<Box<dyn Transport>, TransportError>;
}

/// Settings applied to every channel the manager opens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelSettings {
    pub cluster_name: String,
    /// Drop looped-back copies of our own messages.
    pub discard_own_messages: bool,
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self {
            cluster_name: "chat".to_string(),
            discard_own_messages: true,
        }
    }
}

/// Whether the manager currently holds a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagerState {
    NoChannel,
    ChannelActive,
}

struct ManagerInner {
    channel: Option<Channel>,
    /// Status stream of the call that opened the channel; send failures are
    /// reported here.
    events: Option<EventSenders>,
}

/// Owns the active channel and serialises all operations on it.
pub struct ChannelManager {
    settings: ChannelSettings,
    factory: Arc<dyn TransportFactory>,
    hot_swap: HotSwap,
    inner: Mutex<ManagerInner>,
}

impl ChannelManager {
    pub fn new(
        settings: ChannelSettings,
        factory: Arc<dyn TransportFactory>,
        hot_swap: HotSwap,
    ) -> Self {
        Self {
            settings,
            factory,
            hot_swap,
            inner: Mutex::new(ManagerInner {
                channel: None,
                events: None,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ManagerInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Opens a channel for `member_name`, or hot-swaps the transport of the
    /// existing one.
    ///
    /// Publishes `"Connected: <view>"`, `"Transport Hot-swapped: <view>"` or
    /// `"Error: <reason>"` on `events`.  On the hot-swap path the existing
    /// channel keeps its original name and message stream.
    ///
    /// The status is published after the manager lock is released, so a
    /// full status stream never stalls `send` or `close`.  Calls made one
    /// after another publish in call order; two calls racing on different
    /// threads run their transitions in lock order but may publish in either
    /// order (a "Transport Hot-swapped" line can precede the "Connected" line
    /// of the call that opened the channel).
    pub fn connect_or_refresh(&self, member_name: &str, events: &EventSenders) {
        let status = {
            let mut inner = self.lock();
            match inner.channel.as_mut() {
                Some(channel) => match self.hot_swap.swap(channel) {
                    Ok(path) => {
                        debug!(?path, "hot-swap complete");
                        format!("Transport Hot-swapped: {}", channel.view())
                    }
                    Err(e) => {
                        error!("network transition failed: {e}");
                        format!("Error: {e}")
                    }
                },
                None => match self.open(member_name, events) {
                    Ok(channel) => {
                        let status = format!("Connected: {}", channel.view());
                        inner.channel = Some(channel);
                        inner.events = Some(events.clone());
                        status
                    }
                    Err(e) => {
                        error!("network transition failed: {e}");
                        format!("Error: {e}")
                    }
                },
            }
        };
        events.status(status);
    }

    fn open(&self, member_name: &str, events: &EventSenders) -> Result<Channel, ChannelError> {
        let transport = self.factory.create()?;
        let mut channel = Channel::new(member_name, self.settings.cluster_name.clone(), transport)?;
        channel.set_discard_own_messages(self.settings.discard_own_messages);
        channel.set_receiver(Arc::new(MessageBridge::new(events.clone())));
        // A failed connect has already released what it acquired; dropping
        // the channel is all that is left.
        channel.connect()?;
        info!(member = member_name, cluster = %self.settings.cluster_name, "channel opened");
        Ok(channel)
    }

    /// Multicasts `text` to the other members.
    ///
    /// Returns `true` if the message was handed to the transport.  Without a
    /// connected channel this is a silent no-op; a transport failure is
    /// reported as `"Error: Send failed: <reason>"`.
    pub fn send(&self, text: &str) -> bool {
        let failure = {
            let inner = self.lock();
            let Some(channel) = inner.channel.as_ref().filter(|c| c.is_connected()) else {
                debug!("send ignored: no active channel");
                return false;
            };
            match channel.send(Payload::Text(text.to_string())) {
                Ok(()) => return true,
                Err(e) => {
                    warn!("send failed: {e}");
                    (format!("Error: Send failed: {e}"), inner.events.clone())
                }
            }
        };
        if let (status, Some(events)) = failure {
            events.status(status);
        }
        false
    }

    /// Closes the active channel, if any.  Idempotent.
    pub fn close(&self) {
        let mut inner = self.lock();
        inner.events = None;
        if let Some(mut channel) = inner.channel.take() {
            channel.close();
            info!("channel manager closed");
        }
    }

    pub fn state(&self) -> ManagerState {
        if self.lock().channel.is_some() {
            ManagerState::ChannelActive
        } else {
            ManagerState::NoChannel
        }
    }

    /// Name of the active channel's member.
    pub fn member_name(&self) -> Option<String> {
        self.lock().channel.as_ref().map(|c| c.name().to_string())
    }

    pub fn cluster_name(&self) -> &str {
        &self.settings.cluster_name
    }

    /// The active channel's current view.
    pub fn view(&self) -> Option<MemberView> {
        self.lock().channel.as_ref().map(Channel::view)
    }
}

impl Drop for ChannelManager {
    fn drop(&mut self) {
        self.close();
    }
}

/// Watcher callback that runs `connect_or_refresh` for a fixed member name.
pub struct RefreshOnTransition {
    manager: Arc<ChannelManager>,
    member_name: String,
    events: EventSenders,
}

impl RefreshOnTransition {
    pub fn new(
        manager: Arc<ChannelManager>,
        member_name: impl Into<String>,
        events: EventSenders,
    ) -> Self {
        Self {
            manager,
            member_name: member_name.into(),
            events,
        }
    }
}

impl TransitionHandler for RefreshOnTransition {
    fn on_usable_network(&self) {
        self.manager.connect_or_refresh(&self.member_name, &self.events);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::events::{event_streams, EventReceivers};
    use crate::infrastructure::transport::mock::{
        RecordingTransportFactory, TransportCall, TransportControl,
    };

    fn manager(control: &TransportControl) -> ChannelManager {
        ChannelManager::new(
            ChannelSettings::default(),
            Arc::new(RecordingTransportFactory::new(control.clone())),
            HotSwap::new(Arc::new(control.clone())),
        )
    }

    fn next_status(rx: &mut EventReceivers) -> String {
        rx.status.try_recv().expect("a status event")
    }

    #[test]
    fn test_first_call_opens_channel_and_reports_connected() {
        // Arrange
        let control = TransportControl::new();
        let manager = manager(&control);
        let (tx, mut rx) = event_streams(8);

        // Act
        manager.connect_or_refresh("ANDROID", &tx);

        // Assert
        assert_eq!(manager.state(), ManagerState::ChannelActive);
        let status = next_status(&mut rx);
        assert!(status.starts_with("Connected: [ANDROID|"), "got {status}");
        assert_eq!(control.transports_created(), 1);
    }

    #[test]
    fn test_second_call_hot_swaps_instead_of_opening_another_channel() {
        // Arrange
        let control = TransportControl::new();
        let manager = manager(&control);
        let (tx, mut rx) = event_streams(8);
        manager.connect_or_refresh("ANDROID", &tx);
        next_status(&mut rx);
        control.clear_calls();

        // Act
        manager.connect_or_refresh("SOMEONE-ELSE", &tx);

        // Assert
        assert_eq!(control.transports_created(), 1);
        assert!(next_status(&mut rx).starts_with("Transport Hot-swapped: "));
        assert!(control.calls().contains(&TransportCall::ResetAddressCache));
        assert_eq!(manager.member_name().as_deref(), Some("ANDROID"));
    }

    #[test]
    fn test_failed_open_reports_error_and_stays_without_channel() {
        // Arrange
        let control = TransportControl::new();
        control.fail_on(TransportCall::CreateSockets);
        let manager = manager(&control);
        let (tx, mut rx) = event_streams(8);

        // Act
        manager.connect_or_refresh("ANDROID", &tx);

        // Assert
        assert_eq!(manager.state(), ManagerState::NoChannel);
        assert!(next_status(&mut rx).starts_with("Error: "));
        assert!(control.calls().contains(&TransportCall::DestroySockets));
    }

    #[test]
    fn test_failed_factory_reports_error() {
        let control = TransportControl::new();
        control.fail_on(TransportCall::NewTransport);
        let manager = manager(&control);
        let (tx, mut rx) = event_streams(8);

        manager.connect_or_refresh("ANDROID", &tx);

        assert_eq!(manager.state(), ManagerState::NoChannel);
        assert!(next_status(&mut rx).starts_with("Error: "));
    }

    #[test]
    fn test_failed_swap_reports_error_and_keeps_channel() {
        // Arrange
        let control = TransportControl::new();
        let manager = manager(&control);
        let (tx, mut rx) = event_streams(8);
        manager.connect_or_refresh("ANDROID", &tx);
        next_status(&mut rx);
        control.fail_on(TransportCall::StopThreads);

        // Act
        manager.connect_or_refresh("ANDROID", &tx);

        // Assert
        let status = next_status(&mut rx);
        assert!(status.starts_with("Error: "), "got {status}");
        assert!(status.contains("stop threads"));
        assert_eq!(manager.state(), ManagerState::ChannelActive);
    }

    #[test]
    fn test_send_without_channel_is_silent_noop() {
        let control = TransportControl::new();
        let manager = manager(&control);

        assert!(!manager.send("hello"));
        assert!(control.sent_frames().is_empty());
    }

    #[test]
    fn test_send_with_channel_multicasts_text() {
        let control = TransportControl::new();
        let manager = manager(&control);
        let (tx, _rx) = event_streams(8);
        manager.connect_or_refresh("ANDROID", &tx);

        assert!(manager.send("hello"));

        // Join, then the data frame.
        assert_eq!(control.sent_frames().len(), 2);
    }

    #[test]
    fn test_send_failure_is_reported_on_status_stream() {
        // Arrange
        let control = TransportControl::new();
        let manager = manager(&control);
        let (tx, mut rx) = event_streams(8);
        manager.connect_or_refresh("ANDROID", &tx);
        next_status(&mut rx);
        control.fail_on(TransportCall::Send);

        // Act
        let sent = manager.send("hello");

        // Assert
        assert!(!sent);
        assert!(next_status(&mut rx).starts_with("Error: Send failed: "));
    }

    #[test]
    fn test_close_is_idempotent() {
        let control = TransportControl::new();
        let manager = manager(&control);
        let (tx, _rx) = event_streams(8);
        manager.connect_or_refresh("ANDROID", &tx);

        manager.close();
        assert_eq!(manager.state(), ManagerState::NoChannel);
        manager.close();
        assert_eq!(manager.state(), ManagerState::NoChannel);
    }

    #[test]
    fn test_connect_after_close_opens_fresh_channel() {
        let control = TransportControl::new();
        let manager = manager(&control);
        let (tx, mut rx) = event_streams(8);
        manager.connect_or_refresh("ANDROID", &tx);
        manager.close();

        manager.connect_or_refresh("ANDROID", &tx);

        assert_eq!(control.transports_created(), 2);
        next_status(&mut rx);
        assert!(next_status(&mut rx).starts_with("Connected: "));
    }

    #[test]
    fn test_refresh_on_transition_drives_manager() {
        let control = TransportControl::new();
        let manager = Arc::new(manager(&control));
        let (tx, mut rx) = event_streams(8);
        let handler = RefreshOnTransition::new(Arc::clone(&manager), "ANDROID", tx);

        handler.on_usable_network();

        assert_eq!(manager.state(), ManagerState::ChannelActive);
        assert!(next_status(&mut rx).starts_with("Connected: "));
    }
}
