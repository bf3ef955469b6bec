use std::time::Duration;

/// Public cloud-variable WebSocket endpoint.
pub const DEFAULT_ENDPOINT: &str = "wss://api.xueersi.com/codecloudvariable/ws:80";

/// Fixed account id the protocol expects in every request.
pub const DEFAULT_PROTOCOL_USER: &str = "16641346";

/// Display name used when a message carries no username.
pub const ANONYMOUS_USERNAME: &str = "匿名用户";

/// Body that replaces the content of a recalled message.
pub const RECALLED_PLACEHOLDER: &str = "[该消息已撤回]";

/// How long after sending a message it may still be recalled, in seconds.
pub const RECALL_WINDOW_SECS: f64 = 120.0;

/// Room every client falls back to.
pub const DEFAULT_ROOM_ID: u64 = 185_655_560;
pub const DEFAULT_ROOM_TITLE: &str = "项目大群";

/// Room id that was shut down; dropped from stored room lists on load.
pub const RETIRED_ROOM_ID: u64 = 26_329_675;

/// Exclusive upper bound for randomly generated room ids.
pub const MAX_RANDOM_ROOM_ID: u64 = 1_000_000_000;

/// Snapshot polling interval
pub const POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Read / write / write-connect timeouts
pub const READ_TIMEOUT: Duration = Duration::from_secs(30);
pub const WRITE_TIMEOUT: Duration = Duration::from_secs(30);
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Budget for a batch write as a whole.
pub const BATCH_WRITE_TIMEOUT: Duration = Duration::from_secs(80);

/// Window during which a finished read is served again verbatim.
pub const SNAPSHOT_FRESHNESS: Duration = Duration::from_secs(2);

/// Persistent key prefix for cached room snapshots.
pub const SNAPSHOT_CACHE_PREFIX: &str = "msg_cache_";

/// Persistent key holding the room list.
pub const ROOM_LIST_KEY: &str = "roomList";
