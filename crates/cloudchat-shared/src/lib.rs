// Domain types, message codec and wire frames shared by every cloudchat crate.

pub mod constants;
pub mod error;
pub mod message;
pub mod protocol;
pub mod types;

pub use error::{DecodeError, FrameError};
pub use message::{FileDescriptor, Message, MessageKind};
pub use protocol::{InboundFrame, OutboundFrame};
pub use types::{format_stamp, now_secs, Room, RoomId, Snapshot};
