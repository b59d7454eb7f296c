//! Domain entities for groupchat.
//!
//! Pure values and functions with no sockets, threads or OS calls, so they can
//! be tested on any machine without network access.
//!
//! - **`network`** – network snapshots and the usable-address classifier that
//!   decides whether a link change is worth reacting to.
//! - **`view`** – member identities and the locally known membership view.

pub mod network;
pub mod view;
