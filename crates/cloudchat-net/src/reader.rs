//! Full-snapshot reads.
//!
//! The service hands out one `(name, value)` pair per handshake and cycles
//! back to the first pair once all have been sent, so a read keeps asking
//! until it sees a name twice.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{sleep_until, Instant};
use tracing::{debug, warn};

use cloudchat_shared::{InboundFrame, OutboundFrame, RoomId, Snapshot};

use crate::transport::{ConnectionState, Transport};

/// Read every pair stored for `room` on a dedicated connection.
///
/// Never fails: a connection error yields an empty snapshot, and a timeout
/// or an early close yields whatever arrived so far.
pub async fn read_snapshot(
    transport: Arc<dyn Transport>,
    user: String,
    room: RoomId,
    timeout: Duration,
) -> Snapshot {
    let mut snapshot = Snapshot::new();
    let deadline = Instant::now() + timeout;

    let mut conn = match tokio::time::timeout_at(deadline, transport.connect()).await {
        Ok(Ok(conn)) => conn,
        Ok(Err(e)) => {
            warn!(room = %room, error = %e, "Snapshot read could not connect");
            return snapshot;
        }
        Err(_) => {
            warn!(room = %room, "Snapshot read timed out while connecting");
            return snapshot;
        }
    };

    let handshake = OutboundFrame::handshake(&user, &room.to_project_id());
    conn.set_state(ConnectionState::Reading);
    if let Err(e) = conn.send(&handshake) {
        warn!(room = %room, error = %e, "Snapshot read failed to send handshake");
        return snapshot;
    }

    loop {
        let frame = tokio::select! {
            frame = conn.recv() => frame,
            _ = sleep_until(deadline) => {
                warn!(room = %room, entries = snapshot.len(), "Snapshot read timed out, returning partial result");
                return snapshot;
            }
        };

        let next = match frame {
            None => {
                debug!(room = %room, entries = snapshot.len(), "Connection closed during snapshot read");
                return snapshot;
            }
            Some(InboundFrame::Ping) => {
                if conn.send(&OutboundFrame::Pong).is_err() {
                    return snapshot;
                }
                continue;
            }
            // A stray acknowledgement; ask again.
            Some(InboundFrame::Ack { .. }) => &handshake,
            Some(InboundFrame::Entry { name, value }) => {
                if snapshot.contains_key(&name) {
                    debug!(room = %room, entries = snapshot.len(), "Snapshot read complete");
                    return snapshot;
                }
                snapshot.insert(name, value);
                &handshake
            }
            Some(InboundFrame::Other(method)) => {
                debug!(room = %room, method = %method, "Ignoring frame during snapshot read");
                continue;
            }
        };

        if conn.send(next).is_err() {
            return snapshot;
        }
    }
}
