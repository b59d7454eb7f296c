//! The group channel: one membership in a named cluster.
//!
//! A [`Channel`] owns a [`Transport`] exclusively and layers a minimal
//! presence protocol on top of it:
//!
//! - on connect it multicasts `Join`; members that hear it add the joiner to
//!   their view and answer with a unicast `Present`;
//! - on close it multicasts `Leave`;
//! - `Data` frames are handed to the installed [`Receiver`].
//!
//! There is no consensus and no failure detection.  The view is simply the
//! set of members this channel has heard from.
//!
//! # Identity across hot-swaps
//!
//! The member identity (UUID + name), the cluster name, the view and the
//! receiver live in a shared state object that the transport calls into as
//! its [`UpHandler`].  Rebuilding the transport's sockets therefore leaves all
//! of them untouched.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use thiserror::Error;
use tracing::{debug, info, trace, warn};

use crate::domain::view::{MemberId, MemberView};
use crate::group::transport::{Transport, TransportError, UpHandler};
use crate::protocol::{
    decode_frame, encode_frame, Frame, GroupMessage, Payload, ProtocolError, SequenceCounter,
};

/// Errors raised by channel operations.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// The operation needs a connected channel.
    #[error("channel is not connected")]
    NotConnected,

    /// `connect` was called on a connected channel.
    #[error("channel is already connected")]
    AlreadyConnected,

    /// The cluster name is empty.
    #[error("invalid cluster name: {0:?}")]
    InvalidClusterName(String),

    /// The transport failed.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// A frame could not be encoded.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

/// Connection state of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Disconnected,
    Connected,
}

/// An application message received from another member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Member that sent the message.
    pub src: MemberId,
    /// Sender-local sequence number.
    pub seq: u64,
    pub payload: Payload,
}

/// Application callback for inbound messages.
///
/// Invoked on a transport thread, one message at a time, in arrival order.
pub trait Receiver: Send + Sync {
    /// Handles one received message.
    fn receive(&self, msg: Message);

    /// Called after the view changed.
    fn view_accepted(&self, _view: &MemberView) {}
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// State shared between the channel and its transport's receiver threads.
struct ChannelShared {
    local: MemberId,
    cluster: String,
    discard_own_messages: AtomicBool,
    seq: SequenceCounter,
    view: Mutex<MemberView>,
    receiver: RwLock<Option<Arc<dyn Receiver>>>,
}

impl ChannelShared {
    fn encode(&self, message: GroupMessage) -> Result<Vec<u8>, ProtocolError> {
        encode_frame(&Frame {
            cluster: self.cluster.clone(),
            sender: self.local.clone(),
            seq: self.seq.next(),
            message,
        })
    }

    fn receiver(&self) -> Option<Arc<dyn Receiver>> {
        self.receiver
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Adds `member` to the view and notifies the receiver outside the lock.
    fn admit(&self, member: MemberId) {
        let changed = {
            let mut view = lock(&self.view);
            view.add(member).then(|| view.clone())
        };
        if let Some(view) = changed {
            debug!(cluster = %self.cluster, "view changed: {view}");
            if let Some(receiver) = self.receiver() {
                receiver.view_accepted(&view);
            }
        }
    }

    fn evict(&self, member: &MemberId) {
        let changed = {
            let mut view = lock(&self.view);
            view.remove(&member.uuid).then(|| view.clone())
        };
        if let Some(view) = changed {
            debug!(cluster = %self.cluster, "{member} left; view is now {view}");
            if let Some(receiver) = self.receiver() {
                receiver.view_accepted(&view);
            }
        }
    }

    fn reset_view(&self) {
        *lock(&self.view) = MemberView::new(self.local.clone());
    }
}

impl UpHandler for ChannelShared {
    fn deliver(&self, datagram: &[u8]) -> Option<Vec<u8>> {
        let frame = match decode_frame(datagram) {
            Ok(frame) => frame,
            Err(e) => {
                debug!("dropping undecodable datagram ({} bytes): {e}", datagram.len());
                return None;
            }
        };
        if frame.cluster != self.cluster {
            trace!("ignoring frame for cluster {:?}", frame.cluster);
            return None;
        }

        let own = frame.sender.uuid == self.local.uuid;
        trace!(
            seq = frame.seq,
            own,
            "frame {:?} from {}",
            frame.message.message_type(),
            frame.sender
        );

        match frame.message {
            GroupMessage::Join if !own => {
                self.admit(frame.sender);
                match self.encode(GroupMessage::Present) {
                    Ok(reply) => Some(reply),
                    Err(e) => {
                        warn!("failed to encode Present reply: {e}");
                        None
                    }
                }
            }
            GroupMessage::Present if !own => {
                self.admit(frame.sender);
                None
            }
            GroupMessage::Leave if !own => {
                self.evict(&frame.sender);
                None
            }
            GroupMessage::Data(payload) => {
                if own && self.discard_own_messages.load(Ordering::Relaxed) {
                    return None;
                }
                if !own {
                    self.admit(frame.sender.clone());
                }
                if let Some(receiver) = self.receiver() {
                    receiver.receive(Message {
                        src: frame.sender,
                        seq: frame.seq,
                        payload,
                    });
                }
                None
            }
            // Our own presence announcements looped back by the network.
            GroupMessage::Join | GroupMessage::Present | GroupMessage::Leave => None,
        }
    }

    fn probe(&self, key: &str) -> Option<String> {
        match key {
            "member" => Some(self.local.display_name()),
            "uuid" => Some(self.local.uuid.to_string()),
            "cluster" => Some(self.cluster.clone()),
            "view" => Some(lock(&self.view).to_string()),
            _ => None,
        }
    }
}

/// A membership in one cluster.
pub struct Channel {
    shared: Arc<ChannelShared>,
    state: ChannelState,
    transport: Box<dyn Transport>,
}

impl Channel {
    /// Creates a disconnected channel for `member_name` in `cluster`.
    ///
    /// Own messages are discarded by default.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::InvalidClusterName`] if `cluster` is blank.
    pub fn new(
        member_name: impl Into<String>,
        cluster: impl Into<String>,
        transport: Box<dyn Transport>,
    ) -> Result<Self, ChannelError> {
        let cluster = cluster.into();
        if cluster.trim().is_empty() {
            return Err(ChannelError::InvalidClusterName(cluster));
        }
        let local = MemberId::new(member_name);
        Ok(Self {
            shared: Arc::new(ChannelShared {
                view: Mutex::new(MemberView::new(local.clone())),
                local,
                cluster,
                discard_own_messages: AtomicBool::new(true),
                seq: SequenceCounter::new(),
                receiver: RwLock::new(None),
            }),
            state: ChannelState::Disconnected,
            transport,
        })
    }

    /// Installs the application receiver, replacing any previous one.
    pub fn set_receiver(&self, receiver: Arc<dyn Receiver>) {
        *self
            .shared
            .receiver
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(receiver);
    }

    /// Whether messages this channel sent are dropped when looped back.
    pub fn set_discard_own_messages(&self, discard: bool) {
        self.shared
            .discard_own_messages
            .store(discard, Ordering::Relaxed);
    }

    /// Binds the transport and joins the cluster.
    ///
    /// On failure every resource acquired so far is released and the channel
    /// stays disconnected.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::AlreadyConnected`], or the transport/protocol
    /// error that stopped the join.
    pub fn connect(&mut self) -> Result<(), ChannelError> {
        if self.state == ChannelState::Connected {
            return Err(ChannelError::AlreadyConnected);
        }

        self.transport
            .set_up_handler(Arc::clone(&self.shared) as Arc<dyn UpHandler>);

        if let Err(e) = self.join() {
            warn!(cluster = %self.shared.cluster, "join failed, releasing transport: {e}");
            self.release_transport();
            return Err(e);
        }

        self.state = ChannelState::Connected;
        info!(
            member = %self.shared.local,
            cluster = %self.shared.cluster,
            addr = ?self.transport.local_address(),
            "joined cluster"
        );
        Ok(())
    }

    fn join(&mut self) -> Result<(), ChannelError> {
        self.transport.create_sockets()?;
        self.transport.start_threads()?;
        let join = self.shared.encode(GroupMessage::Join)?;
        self.transport.send(&join)?;
        Ok(())
    }

    fn release_transport(&mut self) {
        if let Err(e) = self.transport.stop_threads() {
            warn!("stop_threads during release failed: {e}");
        }
        if let Err(e) = self.transport.destroy_sockets() {
            warn!("destroy_sockets during release failed: {e}");
        }
    }

    /// Multicasts `payload` to the cluster.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::NotConnected`] or the encode/transport error.
    pub fn send(&self, payload: Payload) -> Result<(), ChannelError> {
        if self.state != ChannelState::Connected {
            return Err(ChannelError::NotConnected);
        }
        let frame = self.shared.encode(GroupMessage::Data(payload))?;
        self.transport.send(&frame)?;
        Ok(())
    }

    /// Leaves the cluster and releases the transport.  Idempotent.
    pub fn close(&mut self) {
        if self.state == ChannelState::Disconnected {
            return;
        }
        match self.shared.encode(GroupMessage::Leave) {
            Ok(leave) => {
                if let Err(e) = self.transport.send(&leave) {
                    debug!("could not announce leave: {e}");
                }
            }
            Err(e) => debug!("could not encode leave: {e}"),
        }
        self.release_transport();
        self.shared.reset_view();
        self.state = ChannelState::Disconnected;
        info!(member = %self.shared.local, cluster = %self.shared.cluster, "channel closed");
    }

    pub fn state(&self) -> ChannelState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ChannelState::Connected
    }

    /// This channel's member identity.
    pub fn local_member(&self) -> &MemberId {
        &self.shared.local
    }

    /// The local member name.
    pub fn name(&self) -> &str {
        &self.shared.local.name
    }

    /// The cluster (group) name, fixed for the channel's lifetime.
    pub fn cluster_name(&self) -> &str {
        &self.shared.cluster
    }

    /// A copy of the current view.
    pub fn view(&self) -> MemberView {
        lock(&self.shared.view).clone()
    }

    /// The bottom layer of the channel's stack.
    pub fn transport(&self) -> &dyn Transport {
        self.transport.as_ref()
    }

    /// Mutable access to the transport for in-place rebuilds.
    pub fn transport_mut(&mut self) -> &mut dyn Transport {
        self.transport.as_mut()
    }
}

impl Drop for Channel {
    fn drop(&mut self) {
        self.close();
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
