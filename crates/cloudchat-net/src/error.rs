use thiserror::Error;

use cloudchat_shared::FrameError;

/// Failures of the store client.
///
/// `Clone` so a single failure can be handed to every caller waiting on the
/// same connection.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NetError {
    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Connection attempt timed out")]
    ConnectTimeout,

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Connection closed, task cancelled")]
    TaskCancelled,

    #[error("Request timed out")]
    Timeout,

    #[error("Write rejected by server: {0:?}")]
    Rejected(String),

    #[error("Unexpected reply: {0}")]
    UnexpectedReply(String),

    #[error("Refusing to write an empty value")]
    EmptyValue,

    #[error("Refusing to write an empty batch")]
    EmptyBatch,

    #[error("Frame error: {0}")]
    Frame(#[from] FrameError),

    #[error("Store client has shut down")]
    ClientShutdown,
}

impl NetError {
    /// Whether the persistent connection is gone, which cancels queued writes.
    pub fn is_connection_loss(&self) -> bool {
        matches!(
            self,
            NetError::Connect(_) | NetError::ConnectTimeout | NetError::ConnectionClosed
        )
    }
}
