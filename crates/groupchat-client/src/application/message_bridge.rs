//! Adapts the channel's receiver callback into the chat message stream.
//!
//! Only text payloads are forwarded; anything else is dropped so peers
//! running newer clients can send other kinds without breaking this one.

use groupchat_core::{MemberView, Message, Payload, Receiver};
use tracing::{debug, trace};

use crate::application::events::{ChatMessage, EventSenders};

/// [`Receiver`] that forwards text messages to an [`EventSenders`].
pub struct MessageBridge {
    events: EventSenders,
}

impl MessageBridge {
    pub fn new(events: EventSenders) -> Self {
        Self { events }
    }
}

impl Receiver for MessageBridge {
    fn receive(&self, msg: Message) {
        match msg.payload {
            Payload::Text(text) => {
                // Never blocks: this runs on a transport receiver thread.
                self.events.message(ChatMessage {
                    sender: msg.src.display_name(),
                    text,
                });
            }
            Payload::Binary(bytes) => {
                trace!(
                    "dropping {}-byte binary payload from {}",
                    bytes.len(),
                    msg.src
                );
            }
        }
    }

    fn view_accepted(&self, view: &MemberView) {
        debug!("view accepted: {view}");
    }
}
