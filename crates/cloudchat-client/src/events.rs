use serde::Serialize;
use tokio::sync::mpsc;

use cloudchat_shared::{Message, RoomId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum NoticeLevel {
    Success,
    Error,
}

/// Everything a front-end needs to render.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum ChatEvent {
    /// The reconciled message list of the open room changed.
    MessagesUpdated { room: RoomId, messages: Vec<Message> },
    /// Outcome of a user action.
    Notice { level: NoticeLevel, text: String },
    /// A stored payload could not be decoded; reported once per payload.
    DecodeFailed {
        room: RoomId,
        payload: String,
        reason: String,
    },
}

pub type EventSender = mpsc::UnboundedSender<ChatEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<ChatEvent>;

pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

pub fn emit_event(events: &EventSender, event: ChatEvent) {
    if events.send(event).is_err() {
        tracing::debug!("Event receiver dropped");
    }
}

pub fn emit_notice(events: &EventSender, level: NoticeLevel, text: impl Into<String>) {
    emit_event(
        events,
        ChatEvent::Notice {
            level,
            text: text.into(),
        },
    );
}
