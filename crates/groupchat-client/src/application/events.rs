//! Application-facing event streams.
//!
//! The core reports to the application through two independent, bounded,
//! FIFO streams: one for status text and one for chat messages.  Order is
//! preserved within a stream; nothing orders one stream against the other.
//!
//! Status lines come from manager calls on blocking threads and use
//! `blocking_send`, so a slow reader applies backpressure.  Chat messages
//! come from transport receiver threads, which must keep draining their
//! sockets and stay stoppable: a message that finds its stream full is
//! dropped with a warning.  The application consumes both with
//! `recv().await`.

use std::fmt;

use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

/// A received chat line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    /// Display name of the sending member.
    pub sender: String,
    pub text: String,
}

impl fmt::Display for ChatMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.sender, self.text)
    }
}

/// Sending halves of the two event streams.
#[derive(Debug, Clone)]
pub struct EventSenders {
    status: mpsc::Sender<String>,
    messages: mpsc::Sender<ChatMessage>,
}

/// Receiving halves of the two event streams.
#[derive(Debug)]
pub struct EventReceivers {
    pub status: mpsc::Receiver<String>,
    pub messages: mpsc::Receiver<ChatMessage>,
}

/// Creates both streams, each buffering up to `capacity` events.
pub fn event_streams(capacity: usize) -> (EventSenders, EventReceivers) {
    let capacity = capacity.max(1);
    let (status_tx, status_rx) = mpsc::channel(capacity);
    let (message_tx, message_rx) = mpsc::channel(capacity);
    (
        EventSenders {
            status: status_tx,
            messages: message_tx,
        },
        EventReceivers {
            status: status_rx,
            messages: message_rx,
        },
    )
}

impl EventSenders {
    /// Publishes a status line.  Blocks while the stream is full.
    ///
    /// Must not be called from an async context.
    pub fn status(&self, text: impl Into<String>) {
        if self.status.blocking_send(text.into()).is_err() {
            // Receiver dropped – application is shutting down.
            debug!("status stream closed; dropping status update");
        }
    }

    /// Publishes a chat message without blocking.
    ///
    /// Returns `false` if the message was dropped because the stream is full
    /// or closed.
    pub fn message(&self, message: ChatMessage) -> bool {
        match self.messages.try_send(message) {
            Ok(()) => true,
            Err(TrySendError::Full(dropped)) => {
                warn!("message stream full; dropping message from {}", dropped.sender);
                false
            }
            Err(TrySendError::Closed(_)) => {
                debug!("message stream closed; dropping chat message");
                false
            }
        }
    }
}
