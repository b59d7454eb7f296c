//! groupchat-client library entry point.
//!
//! Re-exports all public modules so that integration tests in `tests/`
//! and the binary entry point in `main.rs` share the same module tree.
//!
//! # What does groupchat-client do?
//!
//! It keeps one member in a multicast chat group across network changes:
//!
//! 1. A link monitor polls the route to the multicast group and reports every
//!    change of local address.
//! 2. The network watcher waits for a usable address to settle, then asks the
//!    channel manager to connect.
//! 3. The first time, the manager opens a channel and joins the group.  On
//!    every later transition it rebuilds only the channel's sockets, so the
//!    member never leaves the group.
//! 4. Text messages from other members flow out on the message stream;
//!    connection changes and errors on the status stream.

/// Application layer: channel manager, hot-swap, watcher, event streams.
pub mod application;

/// Infrastructure layer: UDP transport, link monitor, diagnostics, config.
pub mod infrastructure;
