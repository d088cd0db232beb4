//! Wire codec for the collage commit protocol
//!
//! Two formats travel over the transport: length-prefixed binary frames from the
//! coordinator to participants, and comma-separated text from participants back to
//! the coordinator. Both are stateless encode/decode pairs.

pub mod error;
pub mod messages;
pub mod responses;

pub use error::ParseError;
pub use messages::{CoordinatorMessage, MessageType};
pub use responses::ParticipantMessage;
