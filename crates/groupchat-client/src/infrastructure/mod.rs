//! Infrastructure layer for the chat client.
//!
//! Contains OS-facing adapters: UDP sockets and their receiver threads, the
//! route-probing link monitor, the diagnostics probe, and configuration
//! storage.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `groupchat_core`, but MUST NOT be imported by the `application` layer
//! outside of tests.

pub mod diagnostics;
pub mod link_monitor;
pub mod storage;
pub mod transport;
