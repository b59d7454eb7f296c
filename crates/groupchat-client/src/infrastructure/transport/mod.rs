//! Transport implementations for the group channel.
//!
//! # Sub-modules
//!
//! - **`udp`** – the production transport: UDP multicast sockets built with
//!   `socket2`, one receiver thread per socket.
//!
//! - **`address`** – resolves the local IPv4 address the sockets bind to,
//!   behind a cache the hot-swap resets.
//!
//! - **`mock`** – a recording transport for tests of the application layer.

pub mod address;
pub mod mock;
pub mod udp;
