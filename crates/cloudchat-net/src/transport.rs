//! Connection abstraction over the cloud-variable service.
//!
//! A [`Transport`] opens [`Connection`]s.  A connection is a pair of text
//! frame channels: dropping it closes the underlying socket, and the remote
//! side closing is observed as [`Connection::recv`] returning `None`.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use cloudchat_shared::{InboundFrame, OutboundFrame};

use crate::error::NetError;

/// Lifecycle of a single connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    /// Iterating a project's entries.
    Reading,
    /// Awaiting a write acknowledgement.
    Writing,
    Closed,
}

/// Something that can open connections to the cloud-variable service.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn connect(&self) -> Result<Connection, NetError>;
}

/// Client side of an open connection.
pub struct Connection {
    to_remote: mpsc::UnboundedSender<String>,
    from_remote: mpsc::UnboundedReceiver<String>,
    state: ConnectionState,
}

/// Transport side of a connection, driven by the task that talks to the
/// actual service.
pub struct RemoteEnd {
    pub from_client: mpsc::UnboundedReceiver<String>,
    pub to_client: mpsc::UnboundedSender<String>,
}

impl Connection {
    /// Create a connected client/transport channel pair.
    pub fn pair() -> (Connection, RemoteEnd) {
        let (to_remote, from_client) = mpsc::unbounded_channel();
        let (to_client, from_remote) = mpsc::unbounded_channel();
        (
            Connection {
                to_remote,
                from_remote,
                state: ConnectionState::Open,
            },
            RemoteEnd {
                from_client,
                to_client,
            },
        )
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state != ConnectionState::Closed && !self.to_remote.is_closed()
    }

    pub fn set_state(&mut self, next: ConnectionState) {
        if self.state != next && self.state != ConnectionState::Closed {
            debug!(from = ?self.state, to = ?next, "Connection state");
            self.state = next;
        }
    }

    pub fn send(&mut self, frame: &OutboundFrame) -> Result<(), NetError> {
        let text = frame.to_text()?;
        if self.to_remote.send(text).is_err() {
            self.set_state(ConnectionState::Closed);
            return Err(NetError::ConnectionClosed);
        }
        Ok(())
    }

    /// Next well-formed frame, or `None` once the connection is closed.
    /// Malformed frames are logged and skipped.
    pub async fn recv(&mut self) -> Option<InboundFrame> {
        loop {
            let Some(text) = self.from_remote.recv().await else {
                self.set_state(ConnectionState::Closed);
                return None;
            };
            match InboundFrame::parse(&text) {
                Ok(frame) => return Some(frame),
                Err(e) => warn!(error = %e, "Ignoring malformed frame"),
            }
        }
    }
}
