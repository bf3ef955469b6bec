//! Turning raw snapshots into the displayed message list.

use std::collections::HashMap;

use cloudchat_shared::{DecodeError, Message, Snapshot};

/// A stored payload that is not a message.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseFailure {
    pub payload: String,
    pub error: DecodeError,
}

/// Decode every entry of a snapshot, keeping the ones that fail aside.
pub fn parse_snapshot(snapshot: &Snapshot) -> (Vec<Message>, Vec<ParseFailure>) {
    let mut messages = Vec::with_capacity(snapshot.len());
    let mut failures = Vec::new();

    for (payload, stamp) in snapshot {
        match Message::decode(payload, stamp) {
            Ok(message) => messages.push(message),
            Err(error) => failures.push(ParseFailure {
                payload: payload.clone(),
                error,
            }),
        }
    }
    (messages, failures)
}

/// One message per `time`, sorted by `time`.
///
/// A recalled entry beats a live one for the same `time`; otherwise the
/// entry seen last wins.
pub fn dedupe(messages: Vec<Message>) -> Vec<Message> {
    let mut by_time: HashMap<u64, Message> = HashMap::with_capacity(messages.len());

    for message in messages {
        let key = time_key(message.time);
        match by_time.get(&key) {
            Some(existing) if existing.recalled && !message.recalled => {}
            _ => {
                by_time.insert(key, message);
            }
        }
    }

    let mut deduped: Vec<Message> = by_time.into_values().collect();
    deduped.sort_by(|a, b| a.time.total_cmp(&b.time));
    deduped
}

pub fn reconcile(snapshot: &Snapshot) -> (Vec<Message>, Vec<ParseFailure>) {
    let (messages, failures) = parse_snapshot(snapshot);
    (dedupe(messages), failures)
}

fn time_key(time: f64) -> u64 {
    // -0.0 and 0.0 are the same message time
    (time + 0.0).to_bits()
}

/// Undo record of an optimistic recall.
#[derive(Debug, Clone)]
pub struct RecallToken {
    previous: Message,
}

impl RecallToken {
    pub fn time(&self) -> f64 {
        self.previous.time
    }

    /// Restore the message as it was before [`apply_recall`].
    pub fn rollback(self, messages: &mut [Message]) {
        if let Some(slot) = messages.iter_mut().find(|m| m.time == self.previous.time) {
            *slot = self.previous;
        }
    }
}

/// Mark the message at `time` as recalled in place.
pub fn apply_recall(messages: &mut [Message], time: f64) -> Option<RecallToken> {
    let slot = messages.iter_mut().find(|m| m.time == time)?;
    let previous = slot.clone();
    *slot = previous.recalled_copy();
    Some(RecallToken { previous })
}

#[cfg(test)]
mod tests {
    use super::*;
    use cloudchat_shared::constants::{ANONYMOUS_USERNAME, RECALLED_PLACEHOLDER};

    fn entry(snapshot: &mut Snapshot, message: &Message) {
        let (payload, stamp) = message.encode().unwrap();
        snapshot.insert(payload, stamp);
    }

    #[test]
    fn test_recalled_entry_wins_its_time() {
        let original = Message::text("alice", "hello", 100.0);
        let mut snapshot = Snapshot::new();
        entry(&mut snapshot, &original.recalled_copy());
        entry(&mut snapshot, &original);

        let (messages, failures) = reconcile(&snapshot);
        assert!(failures.is_empty());
        assert_eq!(messages.len(), 1);
        assert!(messages[0].recalled);
        assert_eq!(messages[0].msg, RECALLED_PLACEHOLDER);
    }

    #[test]
    fn test_later_entry_wins_otherwise() {
        let mut snapshot = Snapshot::new();
        entry(&mut snapshot, &Message::text("alice", "first", 100.0));
        entry(&mut snapshot, &Message::text("alice", "second", 100.0));

        let (messages, _) = reconcile(&snapshot);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].msg, "second");
    }

    #[test]
    fn test_sorted_by_time_and_unique() {
        let mut snapshot = Snapshot::new();
        for time in [300.0, 100.0, 200.0, 100.0] {
            entry(&mut snapshot, &Message::text("bob", format!("at {time}"), time));
        }

        let (messages, _) = reconcile(&snapshot);
        let times: Vec<f64> = messages.iter().map(|m| m.time).collect();
        assert_eq!(times, vec![100.0, 200.0, 300.0]);
    }

    #[test]
    fn test_malformed_payloads_are_set_aside() {
        let mut snapshot = Snapshot::new();
        snapshot.insert("not json".into(), "100".into());
        snapshot.insert("[1,2]".into(), "101".into());
        snapshot.insert(r#"{"msg":"hi"}"#.into(), "102".into());

        let (messages, failures) = reconcile(&snapshot);
        assert_eq!(failures.len(), 2);
        assert_eq!(failures[1].error, DecodeError::NotAnObject);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].username, ANONYMOUS_USERNAME);
        assert_eq!(messages[0].time, 102.0);
    }

    #[test]
    fn test_recall_and_rollback() {
        let mut messages = vec![
            Message::text("alice", "one", 1.0),
            Message::text("alice", "two", 2.0),
        ];
        let before = messages.clone();

        let token = apply_recall(&mut messages, 2.0).unwrap();
        assert!(messages[1].recalled);
        assert_eq!(messages[1].msg, RECALLED_PLACEHOLDER);
        assert_eq!(token.time(), 2.0);

        token.rollback(&mut messages);
        assert_eq!(messages, before);
        assert!(apply_recall(&mut messages, 3.0).is_none());
    }
}
