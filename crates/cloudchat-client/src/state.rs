//! Application state shared by every front-end action.
//!
//! [`AppState`] ties the room directory to the message reconciler: whenever
//! the current room changes, the reconciler is switched to it.

use std::sync::Arc;

use tracing::info;

use cloudchat_net::StoreConnector;
use cloudchat_shared::{FileDescriptor, Message, Room, RoomId};
use cloudchat_store::KvStore;

use crate::error::Result;
use crate::events::{emit_notice, EventSender, NoticeLevel};
use crate::reconciler::{ChatUser, MessageReconciler, ReconcilerConfig};
use crate::rooms::RoomDirectory;

pub struct AppState {
    pub directory: RoomDirectory,
    pub reconciler: MessageReconciler,
    events: EventSender,
}

impl AppState {
    pub fn new(
        connector: StoreConnector,
        store: Arc<dyn KvStore>,
        user: ChatUser,
        config: ReconcilerConfig,
        events: EventSender,
    ) -> Result<Self> {
        let directory = RoomDirectory::load(Arc::clone(&store), connector.clone())?;
        let reconciler = MessageReconciler::new(connector, store, user, config, events.clone());
        Ok(Self {
            directory,
            reconciler,
            events,
        })
    }

    /// Open the current room.  Must be called from within a tokio runtime.
    pub fn start(&self) {
        info!(room = %self.directory.current(), user = %self.reconciler.user().display_name(), "Starting chat");
        self.reconciler.open_room(self.directory.current());
    }

    pub fn current_room(&self) -> Option<&Room> {
        self.directory.get(self.directory.current())
    }

    pub async fn create_room(&mut self, title: &str) -> Result<Room> {
        let username = self.reconciler.user().display_name().to_string();
        let result = self.directory.create(&username, title).await;
        match &result {
            Ok(room) => {
                self.reconciler.open_room(room.id);
                self.notice(
                    NoticeLevel::Success,
                    format!("新聊天室创建成功，聊天室ID: {}，发给好友即可加入", room.id),
                );
            }
            Err(e) => self.notice(NoticeLevel::Error, format!("新聊天室创建失败: {e}")),
        }
        result
    }

    pub async fn join_room(&mut self, input: &str) -> Result<Room> {
        let result = self.directory.join(input).await;
        match &result {
            Ok(room) => {
                self.reconciler.open_room(room.id);
                self.notice(NoticeLevel::Success, format!("已加入聊天室 {}", room.title));
            }
            Err(e) => self.notice(NoticeLevel::Error, format!("加入聊天室失败: {e}")),
        }
        result
    }

    pub fn switch_room(&mut self, id: RoomId) -> Result<()> {
        self.directory.set_current(id)?;
        self.reconciler.open_room(id);
        Ok(())
    }

    pub async fn rename_room(&mut self, id: RoomId, title: &str) -> Result<Room> {
        let username = self.reconciler.user().display_name().to_string();
        let result = self.directory.rename(id, &username, title).await;
        match &result {
            Ok(room) => {
                if self.reconciler.current_room() == Some(id) {
                    if let Err(e) = self.reconciler.refresh().await {
                        tracing::warn!(room = %id, error = %e, "Refresh after rename failed");
                    }
                }
                self.notice(NoticeLevel::Success, format!("聊天室已改名为 {}", room.title));
            }
            Err(e) => self.notice(NoticeLevel::Error, format!("改名失败: {e}")),
        }
        result
    }

    /// Forget a room, moving to another one if it was current.
    pub fn delete_room(&mut self, id: RoomId) -> Result<RoomId> {
        let was_open = self.reconciler.current_room() == Some(id);
        let current = self.directory.delete(id)?;
        if was_open || self.reconciler.current_room() != Some(current) {
            self.reconciler.open_room(current);
        }
        Ok(current)
    }

    pub async fn send(&self, content: &str, quote: Option<f64>) -> Result<Message> {
        self.reconciler.send_message(content, quote).await
    }

    pub async fn share(&self, file: &FileDescriptor) -> Result<Message> {
        self.reconciler.send_file(file).await
    }

    pub async fn recall(&self, time: f64) -> Result<()> {
        self.reconciler.recall(time).await
    }

    fn notice(&self, level: NoticeLevel, text: String) {
        emit_notice(&self.events, level, text);
    }
}
