//! # groupchat-core
//!
//! Shared library for groupchat containing the wire codec, the domain values
//! and the group channel abstraction.
//!
//! This crate does not open sockets or spawn threads itself.  Everything that
//! touches the OS lives in `groupchat-client`.
//!
//! # Architecture overview
//!
//! groupchat keeps a device in a multicast chat group while its network
//! changes underneath it (Wi-Fi to Ethernet, a new DHCP lease, and so on).
//! When the local address changes, the client rebuilds only the sockets of
//! its group channel instead of leaving and rejoining the group.
//!
//! - **`domain`** – network snapshots, the usable-address classifier, member
//!   identities and views.
//!
//! - **`protocol`** – how frames travel over the network: a 16-byte header
//!   followed by the cluster name, the sender identity and the payload.
//!
//! - **`group`** – the [`Channel`] (one membership in a cluster) and the
//!   [`Transport`] trait its socket layer implements.  The transport's
//!   lifecycle is split into stop/destroy/create/start steps so it can be
//!   rebuilt in place.

pub mod domain;
pub mod group;
pub mod protocol;

pub use domain::network::{first_usable_ipv4, is_usable_network, LinkAddress, NetworkSnapshot};
pub use domain::view::{MemberId, MemberView};
pub use group::{
    AddressCache, Channel, ChannelError, ChannelState, Message, Receiver, Transport,
    TransportError, UpHandler,
};
pub use protocol::codec::{decode_frame, encode_frame, ProtocolError};
pub use protocol::messages::{Frame, GroupMessage, Payload};
