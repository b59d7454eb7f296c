//! Protocol module containing frame types and the binary codec.

pub mod codec;
pub mod messages;
pub mod sequence;

pub use codec::{decode_frame, encode_frame, ProtocolError};
pub use messages::*;
pub use sequence::SequenceCounter;
