//! Live message list of the open room.
//!
//! The [`MessageReconciler`] owns one room session at a time: a
//! [`StoreClient`] for the room and a polling task that re-reads the room's
//! snapshot on a fixed cadence.  Sends and recalls write through the same
//! client and re-read authoritatively afterwards.  Every change of the list
//! is published as a [`ChatEvent`].

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use cloudchat_net::{StoreClient, StoreConnector};
use cloudchat_shared::constants::{ANONYMOUS_USERNAME, POLL_INTERVAL, RECALL_WINDOW_SECS};
use cloudchat_shared::{now_secs, FileDescriptor, Message, RoomId, Snapshot};
use cloudchat_store::{CacheConfig, KvStore, SnapshotCacheManager};

use crate::error::{ChatError, Result};
use crate::events::{emit_event, emit_notice, ChatEvent, EventSender, NoticeLevel};
use crate::reconcile::{apply_recall, reconcile};

#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// Pause between the end of one poll and the start of the next.
    pub poll_interval: Duration,
    /// How long after sending a message may still be recalled, in seconds.
    pub recall_window_secs: f64,
    pub cache: CacheConfig,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            poll_interval: POLL_INTERVAL,
            recall_window_secs: RECALL_WINDOW_SECS,
            cache: CacheConfig {
                memory_capacity: 200,
                persistent_expiry: Duration::from_secs(30 * 60),
                version: 1,
            },
        }
    }
}

/// Who is chatting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatUser {
    pub username: String,
    /// Admins may recall anyone's messages.
    pub is_admin: bool,
}

impl ChatUser {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            is_admin: false,
        }
    }

    pub fn admin(username: impl Into<String>) -> Self {
        Self {
            is_admin: true,
            ..Self::new(username)
        }
    }

    /// Name written into messages.
    pub fn display_name(&self) -> &str {
        if self.username.is_empty() {
            ANONYMOUS_USERNAME
        } else {
            &self.username
        }
    }
}

#[derive(Default)]
struct RoomView {
    room: Option<RoomId>,
    messages: Vec<Message>,
    reported: HashSet<String>,
}

/// State reachable from both the reconciler and its polling task.
struct Shared {
    cache: SnapshotCacheManager,
    events: EventSender,
    view: Mutex<RoomView>,
}

impl Shared {
    fn view(&self) -> MutexGuard<'_, RoomView> {
        self.view.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Read the room through `client` and apply the result.
    async fn fetch(&self, client: &StoreClient) -> Option<Vec<Message>> {
        let room = client.room();
        let snapshot = client.snapshot().await;

        if snapshot.is_empty() {
            let view = self.view();
            if view.room == Some(room) && !view.messages.is_empty() {
                // Messages are never deleted, so an empty read is a failed read.
                warn!(room = %room, "Empty snapshot for a non-empty room, keeping current messages");
                return Some(view.messages.clone());
            }
        } else {
            self.cache.set(room, &snapshot);
        }

        self.apply(room, &snapshot)
    }

    /// Replace the messages of `room`; `None` if `room` is no longer open.
    fn apply(&self, room: RoomId, snapshot: &Snapshot) -> Option<Vec<Message>> {
        let (messages, failures) = reconcile(snapshot);

        let (changed, new_failures) = {
            let mut view = self.view();
            if view.room != Some(room) {
                debug!(room = %room, "Discarding snapshot of a room that is no longer open");
                return None;
            }
            let changed = view.messages != messages;
            if changed {
                view.messages = messages.clone();
            }
            let new_failures: Vec<_> = failures
                .into_iter()
                .filter(|failure| view.reported.insert(failure.payload.clone()))
                .collect();
            (changed, new_failures)
        };

        for failure in new_failures {
            warn!(room = %room, payload = %failure.payload, error = %failure.error, "Failed to parse message");
            emit_event(
                &self.events,
                ChatEvent::DecodeFailed {
                    room,
                    payload: failure.payload,
                    reason: failure.error.to_string(),
                },
            );
        }

        if changed {
            debug!(room = %room, count = messages.len(), "Messages updated");
            emit_event(
                &self.events,
                ChatEvent::MessagesUpdated {
                    room,
                    messages: messages.clone(),
                },
            );
        }
        Some(messages)
    }

    fn publish_view(&self, room: RoomId) {
        let messages = self.view().messages.clone();
        emit_event(&self.events, ChatEvent::MessagesUpdated { room, messages });
    }
}

struct Session {
    client: Arc<StoreClient>,
    poller: JoinHandle<()>,
}

async fn poll_loop(shared: Arc<Shared>, client: Arc<StoreClient>, interval: Duration) {
    loop {
        shared.fetch(&client).await;
        tokio::time::sleep(interval).await;
    }
}

pub struct MessageReconciler {
    connector: StoreConnector,
    config: ReconcilerConfig,
    user: ChatUser,
    shared: Arc<Shared>,
    session: Mutex<Option<Session>>,
    last_stamp: Mutex<f64>,
}

impl MessageReconciler {
    pub fn new(
        connector: StoreConnector,
        store: Arc<dyn KvStore>,
        user: ChatUser,
        config: ReconcilerConfig,
        events: EventSender,
    ) -> Self {
        let cache = SnapshotCacheManager::new(store, config.cache.clone());
        Self {
            connector,
            config,
            user,
            shared: Arc::new(Shared {
                cache,
                events,
                view: Mutex::new(RoomView::default()),
            }),
            session: Mutex::new(None),
            last_stamp: Mutex::new(0.0),
        }
    }

    pub fn user(&self) -> &ChatUser {
        &self.user
    }

    pub fn current_room(&self) -> Option<RoomId> {
        self.shared.view().room
    }

    pub fn messages(&self) -> Vec<Message> {
        self.shared.view().messages.clone()
    }

    /// Make `room` the open room and start polling it.
    ///
    /// Cached messages are shown right away; the first poll runs
    /// immediately.  Must be called from within a tokio runtime.
    pub fn open_room(&self, room: RoomId) {
        self.close();

        {
            let mut view = self.shared.view();
            view.room = Some(room);
            view.messages.clear();
            view.reported.clear();
        }
        if let Some(cached) = self.shared.cache.get(room) {
            debug!(room = %room, "Showing cached messages");
            self.shared.apply(room, &cached);
        }

        let client = Arc::new(self.connector.client(room));
        let poller = tokio::spawn(poll_loop(
            Arc::clone(&self.shared),
            Arc::clone(&client),
            self.config.poll_interval,
        ));
        *self.session() = Some(Session { client, poller });
        info!(room = %room, "Room opened");
    }

    /// Stop polling and forget the open room.  Idempotent.
    pub fn close(&self) {
        if let Some(session) = self.session().take() {
            session.poller.abort();
            info!(room = %session.client.room(), "Room closed");
        }
        let mut view = self.shared.view();
        view.room = None;
        view.messages.clear();
    }

    /// Re-read the open room now.
    pub async fn refresh(&self) -> Result<Vec<Message>> {
        let client = self.active_client()?;
        Ok(self
            .shared
            .fetch(&client)
            .await
            .unwrap_or_else(|| self.messages()))
    }

    /// Send a text message, optionally quoting the message at `quote`.
    pub async fn send_message(&self, content: &str, quote: Option<f64>) -> Result<Message> {
        let result = self.try_send_message(content, quote).await;
        self.report(&result, "发送成功", "发送失败");
        result
    }

    /// Share a file.
    pub async fn send_file(&self, file: &FileDescriptor) -> Result<Message> {
        let result = self.try_send_file(file).await;
        self.report(&result, "发送成功", "发送失败");
        result
    }

    /// Recall the message at `time`.
    ///
    /// The message is shown as recalled right away and restored if the
    /// replacement cannot be written.
    pub async fn recall(&self, time: f64) -> Result<()> {
        let result = self.try_recall(time).await;
        self.report(&result, "消息撤回成功", "消息撤回失败");
        result
    }

    async fn try_send_message(&self, content: &str, quote: Option<f64>) -> Result<Message> {
        let content = content.trim();
        if content.is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        let client = self.active_client()?;

        let message =
            Message::text(self.user.display_name(), content, self.next_stamp()).with_quote(quote);
        self.publish(&client, &message).await?;
        Ok(message)
    }

    async fn try_send_file(&self, file: &FileDescriptor) -> Result<Message> {
        let client = self.active_client()?;
        let message = Message::share(self.user.display_name(), file, self.next_stamp())?;
        self.publish(&client, &message).await?;
        Ok(message)
    }

    async fn try_recall(&self, time: f64) -> Result<()> {
        let client = self.active_client()?;
        let room = client.room();

        let target = self
            .messages()
            .into_iter()
            .find(|m| m.time == time)
            .ok_or(ChatError::MessageNotFound(time))?;
        if target.username != self.user.display_name() && !self.user.is_admin {
            return Err(ChatError::NotAuthor);
        }
        if now_secs() - target.time > self.config.recall_window_secs {
            return Err(ChatError::RecallWindowExpired);
        }

        let token = apply_recall(&mut self.shared.view().messages, time);
        self.shared.publish_view(room);

        match self.publish(&client, &target.recalled_copy()).await {
            Ok(()) => Ok(()),
            Err(e) => {
                if let Some(token) = token {
                    let mut view = self.shared.view();
                    if view.room == Some(room) {
                        token.rollback(&mut view.messages);
                    }
                }
                self.shared.publish_view(room);
                Err(e)
            }
        }
    }

    /// Write `message`, then drop the room's cached snapshot and re-read.
    async fn publish(&self, client: &StoreClient, message: &Message) -> Result<()> {
        let (payload, stamp) = message.encode()?;
        client.write(&payload, &stamp).await?;

        self.shared.cache.clear(client.room());
        self.shared.fetch(client).await;
        Ok(())
    }

    fn active_client(&self) -> Result<Arc<StoreClient>> {
        self.session()
            .as_ref()
            .map(|session| Arc::clone(&session.client))
            .ok_or(ChatError::NoActiveRoom)
    }

    /// Current time, bumped past the last issued stamp if needed.
    fn next_stamp(&self) -> f64 {
        let mut last = self.last_stamp.lock().unwrap_or_else(PoisonError::into_inner);
        let now = now_secs();
        let stamp = if now > *last {
            now
        } else {
            ((*last * 1000.0).round() + 1.0) / 1000.0
        };
        *last = stamp;
        stamp
    }

    fn report<T>(&self, result: &Result<T>, success: &str, failure: &str) {
        match result {
            Ok(_) => emit_notice(&self.shared.events, NoticeLevel::Success, success),
            Err(e) => {
                error!(error = %e, "{failure}");
                emit_notice(
                    &self.shared.events,
                    NoticeLevel::Error,
                    format!("{failure}: {e}"),
                );
            }
        }
    }

    fn session(&self) -> MutexGuard<'_, Option<Session>> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for MessageReconciler {
    fn drop(&mut self) {
        self.close();
    }
}
