use std::time::Duration;

use cloudchat_shared::constants::{
    BATCH_WRITE_TIMEOUT, CONNECT_TIMEOUT, DEFAULT_ENDPOINT, DEFAULT_PROTOCOL_USER, READ_TIMEOUT,
    SNAPSHOT_FRESHNESS, WRITE_TIMEOUT,
};

/// Settings shared by every [`StoreClient`](crate::StoreClient) of a connector.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// WebSocket endpoint of the cloud-variable service.
    pub endpoint: String,

    /// Account id sent in every handshake and write.
    pub protocol_user: String,

    /// Budget for a full snapshot read; exceeding it yields a partial result.
    pub read_timeout: Duration,

    /// How long a write waits for its acknowledgement.
    pub write_timeout: Duration,

    /// How long opening the write connection may take.
    pub connect_timeout: Duration,

    /// Budget for a batch write as a whole.
    pub batch_timeout: Duration,

    /// Window during which a finished read is served again verbatim.
    pub freshness: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            protocol_user: DEFAULT_PROTOCOL_USER.to_string(),
            read_timeout: READ_TIMEOUT,
            write_timeout: WRITE_TIMEOUT,
            connect_timeout: CONNECT_TIMEOUT,
            batch_timeout: BATCH_WRITE_TIMEOUT,
            freshness: SNAPSHOT_FRESHNESS,
        }
    }
}
