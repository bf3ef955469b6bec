//! Turning [`ChatEvent`]s into terminal lines.

use std::collections::HashMap;

use chrono::{DateTime, Local};

use cloudchat_client::{ChatEvent, EventReceiver, NoticeLevel};
use cloudchat_shared::{format_stamp, Message, RoomId};

/// Prints each message once, and again when it gets recalled.
#[derive(Default)]
pub struct Renderer {
    room: Option<RoomId>,
    shown: HashMap<u64, bool>,
}

impl Renderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn render(&mut self, event: &ChatEvent) -> Vec<String> {
        match event {
            ChatEvent::MessagesUpdated { room, messages } => {
                let mut lines = Vec::new();
                if self.room != Some(*room) {
                    self.room = Some(*room);
                    self.shown.clear();
                    lines.push(format!("── room {room} ──"));
                }
                for message in messages {
                    let key = message.time.to_bits();
                    if self.shown.get(&key) == Some(&message.recalled) {
                        continue;
                    }
                    self.shown.insert(key, message.recalled);
                    lines.push(format_message(message, messages));
                }
                lines
            }
            ChatEvent::Notice { level, text } => {
                let marker = match level {
                    NoticeLevel::Success => "✓",
                    NoticeLevel::Error => "✗",
                };
                vec![format!("{marker} {text}")]
            }
            ChatEvent::DecodeFailed { room, reason, .. } => {
                vec![format!("! room {room}: unreadable message ({reason})")]
            }
        }
    }
}

/// One display line for `message`; `all` resolves quotes.
pub fn format_message(message: &Message, all: &[Message]) -> String {
    let head = format!("[{} #{}]", format_time(message.time), format_stamp(message.time));

    if message.is_room_name() {
        return format!("{head} * {} named the room \"{}\"", message.username, message.msg);
    }
    if message.recalled {
        return format!("{head} {}: {}", message.username, message.msg);
    }
    if let Some(file) = message.file() {
        return format!(
            "{head} {} shared {} ({}) {}",
            message.username, file.name, file.size, file.link
        );
    }

    let quote = match (message.quote_time_stamp, message.quoted(all)) {
        (_, Some(quoted)) => format!(" ↪ {}: {}", quoted.username, excerpt(&quoted.msg)),
        (Some(_), None) => " ↪ (message unavailable)".to_string(),
        (None, None) => String::new(),
    };
    format!("{head} {}: {}{quote}", message.username, message.msg)
}

fn format_time(time: f64) -> String {
    DateTime::from_timestamp_millis((time * 1000.0) as i64)
        .map(|t| t.with_timezone(&Local).format("%H:%M:%S").to_string())
        .unwrap_or_else(|| "--:--:--".to_string())
}

fn excerpt(text: &str) -> String {
    const MAX: usize = 24;
    if text.chars().count() <= MAX {
        text.to_string()
    } else {
        format!("{}…", text.chars().take(MAX).collect::<String>())
    }
}

/// Print events until the channel closes.
pub async fn run(mut events: EventReceiver) {
    let mut renderer = Renderer::new();
    while let Some(event) = events.recv().await {
        for line in renderer.render(&event) {
            println!("{line}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cloudchat_shared::FileDescriptor;

    fn update(room: u64, messages: Vec<Message>) -> ChatEvent {
        ChatEvent::MessagesUpdated {
            room: RoomId(room),
            messages,
        }
    }

    #[test]
    fn test_messages_are_printed_once() {
        let mut renderer = Renderer::new();
        let first = Message::text("alice", "hi", 100.0);
        let second = Message::text("bob", "hey", 101.0);

        let lines = renderer.render(&update(1, vec![first.clone()]));
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("room 1"));
        assert!(lines[1].ends_with("alice: hi"));

        let lines = renderer.render(&update(1, vec![first.clone(), second]));
        assert_eq!(lines.len(), 1);
        assert!(lines[0].ends_with("bob: hey"));

        let lines = renderer.render(&update(1, vec![first.recalled_copy()]));
        assert_eq!(lines.len(), 1);
        assert!(lines[0].ends_with("alice: [该消息已撤回]"));
    }

    #[test]
    fn test_room_switch_reprints() {
        let mut renderer = Renderer::new();
        let message = Message::text("alice", "hi", 100.0);
        renderer.render(&update(1, vec![message.clone()]));

        let lines = renderer.render(&update(2, vec![message]));
        assert_eq!(lines.len(), 2);
    }

    #[test]
    fn test_special_messages() {
        let original = Message::text("bob", "what time is it", 50.0);
        let reply = Message::text("alice", "noon", 60.0).with_quote(Some(50.0));
        let dangling = Message::text("alice", "huh", 70.0).with_quote(Some(1.0));
        let all = vec![original.clone(), reply.clone(), dangling.clone()];

        assert!(format_message(&reply, &all).ends_with("alice: noon ↪ bob: what time is it"));
        assert!(format_message(&dangling, &all).ends_with("(message unavailable)"));
        assert!(format_message(&Message::room_name("bob", "den", 1.0), &all)
            .ends_with("bob named the room \"den\""));

        let file = FileDescriptor {
            name: "a.png".into(),
            link: "https://example.invalid/a.png".into(),
            size: "3 KB".into(),
            time: "1".into(),
        };
        let share = Message::share("carol", &file, 2.0).unwrap();
        assert!(format_message(&share, &all).ends_with("carol shared a.png (3 KB) https://example.invalid/a.png"));
    }

    #[test]
    fn test_notices() {
        let mut renderer = Renderer::new();
        let lines = renderer.render(&ChatEvent::Notice {
            level: NoticeLevel::Error,
            text: "发送失败".into(),
        });
        assert_eq!(lines, vec!["✗ 发送失败".to_string()]);
    }
}
