use thiserror::Error;

use cloudchat_net::NetError;
use cloudchat_shared::{FrameError, RoomId};
use cloudchat_store::StoreError;

#[derive(Error, Debug)]
pub enum ChatError {
    #[error("Message is empty")]
    EmptyMessage,

    #[error("No room is open")]
    NoActiveRoom,

    #[error("Message {0} not found")]
    MessageNotFound(f64),

    #[error("Only the author or an admin may recall a message")]
    NotAuthor,

    #[error("Message is too old to recall")]
    RecallWindowExpired,

    #[error("Room name is empty")]
    EmptyRoomName,

    #[error("Invalid room id: {0:?}")]
    InvalidRoomId(String),

    #[error("Unknown room {0}")]
    UnknownRoom(RoomId),

    #[error("Network error: {0}")]
    Net(#[from] NetError),

    #[error("Storage error: {0}")]
    Persist(#[from] StoreError),

    #[error("Encoding error: {0}")]
    Frame(#[from] FrameError),
}

pub type Result<T> = std::result::Result<T, ChatError>;
