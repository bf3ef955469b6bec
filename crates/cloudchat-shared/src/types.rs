use std::str::FromStr;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_ROOM_ID, DEFAULT_ROOM_TITLE};

/// Raw remote contents of a room: payload → stamp, in arrival order.
pub type Snapshot = IndexMap<String, String>;

// Room identity = remote project id
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct RoomId(pub u64);

impl RoomId {
    /// The room every client falls back to.
    pub const DEFAULT: RoomId = RoomId(DEFAULT_ROOM_ID);

    /// Project id string used on the wire.
    pub fn to_project_id(&self) -> String {
        self.0.to_string()
    }
}

impl std::fmt::Display for RoomId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RoomId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<u64>().map(RoomId)
    }
}

/// A known chat room as kept in the local room list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Room {
    pub id: RoomId,
    pub title: String,
}

impl Room {
    pub fn new(id: RoomId, title: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
        }
    }

    pub fn default_room() -> Self {
        Self::new(RoomId::DEFAULT, DEFAULT_ROOM_TITLE)
    }

    /// Title shown for a room whose name message is missing.
    pub fn fallback_title(id: RoomId) -> String {
        format!("房间{id}")
    }
}

/// Current Unix time in seconds with millisecond precision.
pub fn now_secs() -> f64 {
    chrono::Utc::now().timestamp_millis() as f64 / 1000.0
}

/// Render a message time the way it is stored as a remote value.
pub fn format_stamp(time: f64) -> String {
    time.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_room_id_parse_and_display() {
        let id: RoomId = " 42 ".parse().unwrap();
        assert_eq!(id, RoomId(42));
        assert_eq!(id.to_project_id(), "42");
        assert!("abc".parse::<RoomId>().is_err());
    }

    #[test]
    fn test_room_json_shape() {
        let room = Room::new(RoomId(7), "lobby");
        let json = serde_json::to_string(&room).unwrap();
        assert_eq!(json, r#"{"id":7,"title":"lobby"}"#);
    }

    #[test]
    fn test_format_stamp() {
        assert_eq!(format_stamp(100.0), "100");
        assert_eq!(format_stamp(1700000000.123), "1700000000.123");
        assert_eq!(Room::fallback_title(RoomId(9)), "房间9");
    }
}
