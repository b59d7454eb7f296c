//! The transport layer of a group channel.
//!
//! A [`Channel`](super::Channel) is a small pipeline: the membership/presence
//! logic on top, and a [`Transport`] at the bottom that owns the sockets and
//! receiver threads.  The transport is the only part that touches the network,
//! and it is the part that must be rebuilt when the device's address changes.
//!
//! The lifecycle methods are deliberately split into four steps so a caller
//! can quiesce and rebuild a transport in place:
//!
//! ```text
//! stop_threads → destroy_sockets → (reset address cache) → create_sockets → start_threads
//! ```
//!
//! Transports that can do this atomically advertise it through
//! [`Transport::supports_reconnect`] and implement [`Transport::reconnect`].

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

/// Errors raised by transport implementations.
#[derive(Debug, Error)]
pub enum TransportError {
    /// A socket call failed.
    #[error("{operation} failed: {source}")]
    Io {
        operation: &'static str,
        #[source]
        source: std::io::Error,
    },

    /// No local IPv4 address could be resolved to bind to.
    #[error("no usable local IPv4 address: {0}")]
    NoLocalAddress(String),

    /// `create_sockets` was called while sockets are still bound.
    #[error("sockets are already bound")]
    AlreadyBound,

    /// An operation needed bound sockets but none exist.
    #[error("sockets are not bound")]
    NotBound,

    /// `start_threads` was called while receiver threads are running.
    #[error("receiver threads are already running")]
    AlreadyRunning,

    /// `destroy_sockets` was called while receiver threads still use them.
    #[error("receiver threads are still running")]
    ThreadsRunning,

    /// No up handler was installed before starting the receiver threads.
    #[error("no up handler installed")]
    NoHandler,

    /// A bounded step did not finish in time.
    #[error("{operation} timed out after {timeout:?}")]
    Timeout {
        operation: &'static str,
        timeout: Duration,
    },

    /// The transport does not implement an optional primitive.
    #[error("{0} is not supported by this transport")]
    Unsupported(&'static str),

    /// Any other transport-specific failure.
    #[error("{0}")]
    Failed(String),
}

/// Receives raw datagrams from a transport's receiver threads.
///
/// Called on a transport thread, once per datagram, in arrival order per
/// socket.  Implementations must not block for long: the receiver thread
/// cannot read the next datagram until `deliver` returns.
pub trait UpHandler: Send + Sync {
    /// Handles one datagram.  A returned frame is sent back to the datagram's
    /// source address (unicast).
    fn deliver(&self, datagram: &[u8]) -> Option<Vec<u8>>;

    /// Answers a diagnostics query key, or `None` if the key is unknown.
    fn probe(&self, _key: &str) -> Option<String> {
        None
    }
}

/// A cache of the resolved local network address.
///
/// The cache is reset between tearing a transport down and rebuilding it so
/// the rebuilt sockets bind to the address that is current *now*.
pub trait AddressCache: Send + Sync {
    /// Forgets any cached local address.
    fn reset(&self);
}

/// The socket/thread layer of a group channel.
pub trait Transport: Send {
    /// Installs the handler that receives inbound datagrams.  Must be called
    /// before [`start_threads`](Self::start_threads).
    fn set_up_handler(&mut self, handler: Arc<dyn UpHandler>);

    /// Resolves the local address and binds the sockets.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::AlreadyBound`] if sockets exist, or an I/O
    /// or address-resolution error.
    fn create_sockets(&mut self) -> Result<(), TransportError>;

    /// Releases the bound sockets.  A no-op when none are bound.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::ThreadsRunning`] if receiver threads are
    /// still reading from the sockets.
    fn destroy_sockets(&mut self) -> Result<(), TransportError>;

    /// Starts the receiver threads.
    ///
    /// # Errors
    ///
    /// Returns an error if sockets are not bound, no handler is installed, or
    /// threads are already running.
    fn start_threads(&mut self) -> Result<(), TransportError>;

    /// Stops the receiver threads and waits for them to exit.  A no-op when
    /// none are running.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Timeout`] if a thread does not exit in time.
    fn stop_threads(&mut self) -> Result<(), TransportError>;

    /// Multicasts one frame to the group.
    fn send(&self, frame: &[u8]) -> Result<(), TransportError>;

    /// Address the sending socket is bound to, if bound.
    fn local_address(&self) -> Option<SocketAddr>;

    /// Whether [`reconnect`](Self::reconnect) is implemented.
    fn supports_reconnect(&self) -> bool {
        false
    }

    /// Rebuilds sockets and threads in place in one call.
    fn reconnect(&mut self) -> Result<(), TransportError> {
        Err(TransportError::Unsupported("reconnect"))
    }
}
