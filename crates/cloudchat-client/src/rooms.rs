//! The local list of known rooms.

use std::sync::Arc;

use rand::Rng;
use tracing::{info, warn};

use cloudchat_net::StoreConnector;
use cloudchat_shared::constants::MAX_RANDOM_ROOM_ID;
use cloudchat_shared::{now_secs, Message, Room, RoomId};
use cloudchat_store::{load_rooms, save_rooms, KvStore};

use crate::error::{ChatError, Result};
use crate::reconcile::reconcile;

/// Known rooms and which one is current.
///
/// The list is persisted after every change; the directory only holds the
/// in-memory projection.
pub struct RoomDirectory {
    store: Arc<dyn KvStore>,
    connector: StoreConnector,
    rooms: Vec<Room>,
    current: RoomId,
}

impl RoomDirectory {
    /// Load the persisted list.  The default room is current.
    pub fn load(store: Arc<dyn KvStore>, connector: StoreConnector) -> Result<Self> {
        let rooms = load_rooms(store.as_ref())?;
        save_rooms(store.as_ref(), &rooms)?;
        Ok(Self {
            store,
            connector,
            rooms,
            current: RoomId::DEFAULT,
        })
    }

    pub fn rooms(&self) -> &[Room] {
        &self.rooms
    }

    pub fn current(&self) -> RoomId {
        self.current
    }

    pub fn get(&self, id: RoomId) -> Option<&Room> {
        self.rooms.iter().find(|room| room.id == id)
    }

    pub fn contains(&self, id: RoomId) -> bool {
        self.get(id).is_some()
    }

    pub fn set_current(&mut self, id: RoomId) -> Result<()> {
        if !self.contains(id) {
            return Err(ChatError::UnknownRoom(id));
        }
        self.current = id;
        Ok(())
    }

    /// Create a room under a fresh random id, name it and make it current.
    pub async fn create(&mut self, username: &str, title: &str) -> Result<Room> {
        let title = title.trim();
        if title.is_empty() {
            return Err(ChatError::EmptyRoomName);
        }

        let id = self.unused_id();
        self.write_name(id, username, title).await?;

        let room = Room::new(id, title);
        self.rooms.push(room.clone());
        self.current = id;
        self.persist()?;
        info!(room = %id, title = %title, "Room created");
        Ok(room)
    }

    /// Join the room typed in by the user and make it current.
    ///
    /// An unknown room is read once to find its title.
    pub async fn join(&mut self, input: &str) -> Result<Room> {
        let id: RoomId = input
            .parse()
            .map_err(|_| ChatError::InvalidRoomId(input.to_string()))?;

        if let Some(room) = self.get(id).cloned() {
            self.current = id;
            return Ok(room);
        }

        let snapshot = self.connector.client(id).snapshot().await;
        let (messages, _) = reconcile(&snapshot);
        let title = room_title(&messages).unwrap_or_else(|| Room::fallback_title(id));

        let room = Room::new(id, title);
        self.rooms.push(room.clone());
        self.current = id;
        self.persist()?;
        info!(room = %id, title = %room.title, "Room joined");
        Ok(room)
    }

    /// Give a known room a new name, visible to everyone in it.
    pub async fn rename(&mut self, id: RoomId, username: &str, title: &str) -> Result<Room> {
        let title = title.trim();
        if title.is_empty() {
            return Err(ChatError::EmptyRoomName);
        }
        if !self.contains(id) {
            return Err(ChatError::UnknownRoom(id));
        }

        self.write_name(id, username, title).await?;

        let room = Room::new(id, title);
        if let Some(slot) = self.rooms.iter_mut().find(|r| r.id == id) {
            *slot = room.clone();
        }
        self.persist()?;
        info!(room = %id, title = %title, "Room renamed");
        Ok(room)
    }

    /// Forget a room locally.  Returns the room that is current afterwards.
    pub fn delete(&mut self, id: RoomId) -> Result<RoomId> {
        let before = self.rooms.len();
        self.rooms.retain(|room| room.id != id);
        if self.rooms.len() == before {
            return Err(ChatError::UnknownRoom(id));
        }

        if self.current == id {
            self.current = match self.rooms.first() {
                Some(room) => room.id,
                None => {
                    self.rooms.push(Room::default_room());
                    RoomId::DEFAULT
                }
            };
        }
        self.persist()?;
        info!(room = %id, current = %self.current, "Room removed");
        Ok(self.current)
    }

    async fn write_name(&self, id: RoomId, username: &str, title: &str) -> Result<()> {
        let message = Message::room_name(username, title, now_secs());
        let (payload, stamp) = message.encode()?;
        self.connector.client(id).write(&payload, &stamp).await?;
        Ok(())
    }

    fn unused_id(&self) -> RoomId {
        let mut rng = rand::thread_rng();
        loop {
            let id = RoomId(rng.gen_range(1..MAX_RANDOM_ROOM_ID));
            if !self.contains(id) {
                return id;
            }
            warn!(room = %id, "Random room id already known, drawing again");
        }
    }

    fn persist(&self) -> Result<()> {
        save_rooms(self.store.as_ref(), &self.rooms)?;
        Ok(())
    }
}

/// Title defined by the latest non-empty `name` message.
pub fn room_title(messages: &[Message]) -> Option<String> {
    messages
        .iter()
        .rev()
        .find(|m| m.is_room_name() && !m.msg.is_empty())
        .map(|m| m.msg.clone())
}
