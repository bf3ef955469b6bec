//! Persistence of the local room list.

use tracing::warn;

use cloudchat_shared::constants::{RETIRED_ROOM_ID, ROOM_LIST_KEY};
use cloudchat_shared::{Room, RoomId};

use crate::error::Result;
use crate::kv::KvStore;

/// Load the stored room list.
///
/// Unreadable lists are treated as empty.  The retired room is dropped and
/// the default room is always present.
pub fn load_rooms(store: &dyn KvStore) -> Result<Vec<Room>> {
    let mut rooms: Vec<Room> = match store.get(ROOM_LIST_KEY)? {
        Some(stored) if !stored.is_empty() => match serde_json::from_str(&stored) {
            Ok(rooms) => rooms,
            Err(e) => {
                warn!(error = %e, "Stored room list is unreadable, starting fresh");
                Vec::new()
            }
        },
        _ => Vec::new(),
    };

    rooms.retain(|room| room.id != RoomId(RETIRED_ROOM_ID));
    if !rooms.iter().any(|room| room.id == RoomId::DEFAULT) {
        rooms.push(Room::default_room());
    }
    Ok(rooms)
}

pub fn save_rooms(store: &dyn KvStore, rooms: &[Room]) -> Result<()> {
    store.set(ROOM_LIST_KEY, &serde_json::to_string(rooms)?)
}
