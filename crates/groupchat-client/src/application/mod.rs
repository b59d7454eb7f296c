//! Application layer: the channel manager and the pieces it orchestrates.
//!
//! Nothing here opens a socket directly.  Transports come from a
//! [`TransportFactory`](channel_manager::TransportFactory) and network state
//! from a [`SnapshotSource`](network_watcher::SnapshotSource), so every use
//! case runs against test doubles.
//!
//! # Sub-modules
//!
//! - **`channel_manager`** – owns zero or one channel; decides between
//!   opening a new channel and hot-swapping the existing one's transport.
//!
//! - **`hot_swap`** – the in-place transport rebuild (native `reconnect` or
//!   the staged stop/destroy/create/start sequence).
//!
//! - **`network_watcher`** – debounces link notifications and calls the
//!   manager once a usable address has settled.
//!
//! - **`message_bridge`** – forwards text messages from the channel to the
//!   application's message stream.
//!
//! - **`events`** – the two bounded status/message streams.

pub mod channel_manager;
pub mod events;
pub mod hot_swap;
pub mod message_bridge;
pub mod network_watcher;
