use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use cloudchat_shared::{RoomId, Snapshot};

use crate::config::StoreConfig;
use crate::error::NetError;
use crate::reader::read_snapshot;
use crate::registry::SnapshotRegistry;
use crate::transport::Transport;
use crate::websocket::WebSocketTransport;
use crate::writer::{spawn_writer, WriteOutcome, WriteTask, WriterConfig};

/// Factory for per-room [`StoreClient`]s.
///
/// Every client made by one connector shares the same transport and the same
/// [`SnapshotRegistry`], so reads are coalesced across clients.
#[derive(Clone)]
pub struct StoreConnector {
    transport: Arc<dyn Transport>,
    registry: Arc<SnapshotRegistry>,
    config: StoreConfig,
}

impl StoreConnector {
    pub fn new(transport: Arc<dyn Transport>, config: StoreConfig) -> Self {
        Self {
            registry: Arc::new(SnapshotRegistry::new(config.freshness)),
            transport,
            config,
        }
    }

    /// Connector talking WebSocket to `config.endpoint`.
    pub fn websocket(config: StoreConfig) -> Self {
        let transport = Arc::new(WebSocketTransport::new(config.endpoint.clone()));
        Self::new(transport, config)
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<SnapshotRegistry> {
        &self.registry
    }

    /// Client for `room`.  Spawns the room's writer task, so this must be
    /// called from within a tokio runtime.
    pub fn client(&self, room: RoomId) -> StoreClient {
        let writer = spawn_writer(
            Arc::clone(&self.transport),
            WriterConfig {
                room,
                user: self.config.protocol_user.clone(),
                write_timeout: self.config.write_timeout,
                connect_timeout: self.config.connect_timeout,
            },
        );
        StoreClient {
            room,
            transport: Arc::clone(&self.transport),
            registry: Arc::clone(&self.registry),
            config: self.config.clone(),
            writer,
        }
    }
}

/// Reads and writes the pairs of a single room.
pub struct StoreClient {
    room: RoomId,
    transport: Arc<dyn Transport>,
    registry: Arc<SnapshotRegistry>,
    config: StoreConfig,
    writer: mpsc::UnboundedSender<WriteTask>,
}

impl StoreClient {
    pub fn room(&self) -> RoomId {
        self.room
    }

    /// All pairs of the room, coalesced with concurrent and recent reads.
    pub async fn snapshot(&self) -> Snapshot {
        let fetch = read_snapshot(
            Arc::clone(&self.transport),
            self.config.protocol_user.clone(),
            self.room,
            self.config.read_timeout,
        );
        self.registry.snapshot_with(self.room, fetch).await
    }

    /// All pairs of the room, always on a fresh connection.
    pub async fn fetch_once(&self) -> Snapshot {
        read_snapshot(
            Arc::clone(&self.transport),
            self.config.protocol_user.clone(),
            self.room,
            self.config.read_timeout,
        )
        .await
    }

    /// Value stored under `name`, if any.
    pub async fn lookup(&self, name: &str) -> Option<String> {
        self.snapshot().await.get(name).cloned()
    }

    /// Store one pair and wait for the acknowledgement.
    pub async fn write(&self, name: &str, value: &str) -> Result<(), NetError> {
        if value.is_empty() {
            return Err(NetError::EmptyValue);
        }

        self.registry.invalidate(self.room);
        let (reply, result) = oneshot::channel();
        self.writer
            .send(WriteTask::Single {
                name: name.to_string(),
                value: value.to_string(),
                reply,
            })
            .map_err(|_| NetError::ClientShutdown)?;

        let outcome = result.await.map_err(|_| NetError::ClientShutdown)?;
        if outcome.is_ok() {
            self.registry.invalidate(self.room);
        }
        outcome
    }

    /// Store several pairs in order within the batch budget.
    ///
    /// Stops at the first timeout or connection loss; the returned outcomes
    /// cover the attempted entries only.
    pub async fn write_many(
        &self,
        entries: Vec<(String, String)>,
    ) -> Result<Vec<WriteOutcome>, NetError> {
        if entries.is_empty() {
            return Err(NetError::EmptyBatch);
        }
        if entries.iter().any(|(_, value)| value.is_empty()) {
            return Err(NetError::EmptyValue);
        }

        debug!(room = %self.room, count = entries.len(), "Submitting batch write");
        self.registry.invalidate(self.room);
        let (reply, result) = oneshot::channel();
        self.writer
            .send(WriteTask::Batch {
                entries,
                budget: self.config.batch_timeout,
                reply,
            })
            .map_err(|_| NetError::ClientShutdown)?;

        let outcomes = result.await.map_err(|_| NetError::ClientShutdown)?;
        self.registry.invalidate(self.room);
        outcomes
    }

    /// Drop any cached snapshot of this room.
    pub fn invalidate(&self) {
        self.registry.invalidate(self.room);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::memory::{CloudEvent, Faults, MemoryCloud};

    const ROOM: RoomId = RoomId(185_655_560);

    fn connector(cloud: &MemoryCloud) -> StoreConnector {
        let config = StoreConfig {
            read_timeout: Duration::from_secs(2),
            write_timeout: Duration::from_secs(2),
            connect_timeout: Duration::from_secs(1),
            ..StoreConfig::default()
        };
        StoreConnector::new(Arc::new(cloud.clone()), config)
    }

    fn write_log(cloud: &MemoryCloud) -> Vec<String> {
        cloud
            .events()
            .into_iter()
            .filter_map(|event| match event {
                CloudEvent::SetReceived { name, .. } => Some(format!("set {name}")),
                CloudEvent::AckSent { name, .. } => Some(format!("ack {name}")),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_concurrent_snapshots_use_one_connection() {
        let cloud = MemoryCloud::new();
        cloud.seed(ROOM, "a", "1");
        cloud.seed(ROOM, "b", "2");
        let connector = connector(&cloud);
        let first = connector.client(ROOM);
        let second = connector.client(ROOM);

        let (a, b) = tokio::join!(first.snapshot(), second.snapshot());

        assert_eq!(a, b);
        assert_eq!(a.len(), 2);
        assert_eq!(cloud.connections(), 1);
    }

    #[tokio::test]
    async fn test_snapshot_after_write_sees_the_write() {
        let cloud = MemoryCloud::new();
        cloud.seed(ROOM, "a", "1");
        let client = connector(&cloud).client(ROOM);

        assert_eq!(client.snapshot().await.len(), 1);
        client.write("b", "2").await.unwrap();

        let snapshot = client.snapshot().await;
        assert_eq!(snapshot.get("b").map(String::as_str), Some("2"));
        assert_eq!(client.lookup("a").await.as_deref(), Some("1"));
        assert_eq!(client.lookup("zzz").await, None);
    }

    #[tokio::test]
    async fn test_fetch_once_bypasses_coalescing() {
        let cloud = MemoryCloud::new();
        cloud.seed(ROOM, "a", "1");
        let client = connector(&cloud).client(ROOM);

        client.fetch_once().await;
        client.fetch_once().await;
        assert_eq!(cloud.connections(), 2);
    }

    #[tokio::test]
    async fn test_writes_wait_for_previous_ack() {
        let cloud = MemoryCloud::new();
        cloud.set_faults(Faults {
            ack_delay: Some(Duration::from_millis(50)),
            ..Faults::default()
        });
        let client = connector(&cloud).client(ROOM);

        let (a, b, c) = tokio::join!(
            client.write("a", "1"),
            client.write("b", "2"),
            client.write("c", "3")
        );

        assert!(a.is_ok() && b.is_ok() && c.is_ok());
        assert_eq!(
            write_log(&cloud),
            vec!["set a", "ack a", "set b", "ack b", "set c", "ack c"]
        );
        assert_eq!(cloud.connections(), 1);
    }

    #[tokio::test]
    async fn test_rejected_write() {
        let cloud = MemoryCloud::new();
        cloud.set_faults(Faults {
            reject_writes: true,
            ..Faults::default()
        });
        let client = connector(&cloud).client(ROOM);

        assert_eq!(
            client.write("a", "1").await,
            Err(NetError::Rejected("FAIL".into()))
        );
        assert!(cloud.entries(ROOM).is_empty());

        cloud.set_faults(Faults::default());
        client.write("a", "1").await.unwrap();
        assert_eq!(cloud.connections(), 1);
    }

    #[tokio::test]
    async fn test_connection_loss_cancels_queued_writes() {
        let cloud = MemoryCloud::new();
        cloud.set_faults(Faults {
            drop_on_set: true,
            ..Faults::default()
        });
        let client = connector(&cloud).client(ROOM);

        let (a, b, c) = tokio::join!(
            client.write("a", "1"),
            client.write("b", "2"),
            client.write("c", "3")
        );

        assert_eq!(a, Err(NetError::ConnectionClosed));
        assert_eq!(b, Err(NetError::TaskCancelled));
        assert_eq!(c, Err(NetError::TaskCancelled));

        cloud.set_faults(Faults::default());
        client.write("d", "4").await.unwrap();
        assert_eq!(cloud.connections(), 2);
    }

    #[tokio::test]
    async fn test_write_timeout_drops_connection() {
        let cloud = MemoryCloud::new();
        cloud.set_faults(Faults {
            ack_delay: Some(Duration::from_millis(300)),
            ..Faults::default()
        });
        let config = StoreConfig {
            write_timeout: Duration::from_millis(50),
            ..StoreConfig::default()
        };
        let client = StoreConnector::new(Arc::new(cloud.clone()), config).client(ROOM);

        assert_eq!(client.write("a", "1").await, Err(NetError::Timeout));

        cloud.set_faults(Faults::default());
        client.write("b", "2").await.unwrap();
        assert_eq!(cloud.connections(), 2);
    }

    #[tokio::test]
    async fn test_unreachable_service_fails_write() {
        let cloud = MemoryCloud::new();
        cloud.set_faults(Faults {
            refuse_connections: true,
            ..Faults::default()
        });
        let client = connector(&cloud).client(ROOM);

        assert!(matches!(
            client.write("a", "1").await,
            Err(NetError::Connect(_))
        ));
        assert!(client.snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn test_empty_values_are_refused() {
        let cloud = MemoryCloud::new();
        let client = connector(&cloud).client(ROOM);

        assert_eq!(client.write("a", "").await, Err(NetError::EmptyValue));
        assert_eq!(
            client.write_many(vec![("a".into(), "1".into()), ("b".into(), String::new())]).await,
            Err(NetError::EmptyValue)
        );
        assert_eq!(client.write_many(Vec::new()).await, Err(NetError::EmptyBatch));
        assert_eq!(cloud.connections(), 0);
    }

    #[tokio::test]
    async fn test_batch_write() {
        let cloud = MemoryCloud::new();
        let client = connector(&cloud).client(ROOM);

        let outcomes = client
            .write_many(vec![
                ("a".into(), "1".into()),
                ("b".into(), "2".into()),
            ])
            .await
            .unwrap();

        assert_eq!(outcomes.len(), 2);
        assert!(outcomes.iter().all(|o| o.result.is_ok()));
        assert_eq!(cloud.entries(ROOM).len(), 2);
    }

    #[tokio::test]
    async fn test_batch_stops_on_connection_loss() {
        let cloud = MemoryCloud::new();
        cloud.set_faults(Faults {
            drop_on_set: true,
            ..Faults::default()
        });
        let client = connector(&cloud).client(ROOM);

        let outcomes = client
            .write_many(vec![
                ("a".into(), "1".into()),
                ("b".into(), "2".into()),
            ])
            .await
            .unwrap();

        assert_eq!(
            outcomes,
            vec![WriteOutcome {
                name: "a".into(),
                result: Err(NetError::ConnectionClosed),
            }]
        );
    }
}
