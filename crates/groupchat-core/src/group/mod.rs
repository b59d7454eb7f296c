//! The group-communication primitive the chat client is built on.
//!
//! - **`transport`** – the socket/thread layer trait and its error type.  The
//!   concrete UDP multicast implementation lives in the client crate; this
//!   crate only defines the seam.
//! - **`channel`** – a membership handle layered on top of a transport:
//!   presence announcements, the member view, and application delivery.

pub mod channel;
pub mod transport;

pub use channel::{Channel, ChannelError, ChannelState, Message, Receiver};
pub use transport::{AddressCache, Transport, TransportError, UpHandler};
