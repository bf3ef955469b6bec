//! Chat message model and its strict codec.
//!
//! A message travels as a JSON payload used as the remote *key*, with its
//! send time rendered as the remote *value*.  Payloads come from any client
//! that can reach the store, so decoding never trusts field presence or
//! types: every field has an explicit default.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::constants::{ANONYMOUS_USERNAME, RECALLED_PLACEHOLDER};
use crate::error::{DecodeError, FrameError};
use crate::types::format_stamp;

/// Reserved message kinds.  Plain text messages carry no kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    /// Carries the room's display name in `msg`.
    Name,
    /// Carries a JSON-encoded [`FileDescriptor`] in `msg`.
    Share,
}

/// A reconciled chat message.  `time` doubles as the message id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub username: String,
    pub msg: String,
    /// Send time in Unix seconds.
    pub time: f64,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<MessageKind>,
    #[serde(default)]
    pub recalled: bool,
    /// `time` of the message this one replies to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quote_time_stamp: Option<f64>,
}

/// Attachment metadata shared through a `share` message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDescriptor {
    pub name: String,
    pub link: String,
    pub size: String,
    pub time: String,
}

impl Message {
    pub fn text(username: impl Into<String>, msg: impl Into<String>, time: f64) -> Self {
        Self {
            username: username.into(),
            msg: msg.into(),
            time,
            kind: None,
            recalled: false,
            quote_time_stamp: None,
        }
    }

    pub fn room_name(username: impl Into<String>, title: impl Into<String>, time: f64) -> Self {
        Self {
            kind: Some(MessageKind::Name),
            ..Self::text(username, title, time)
        }
    }

    pub fn share(
        username: impl Into<String>,
        file: &FileDescriptor,
        time: f64,
    ) -> Result<Self, FrameError> {
        Ok(Self {
            kind: Some(MessageKind::Share),
            ..Self::text(username, serde_json::to_string(file)?, time)
        })
    }

    pub fn with_quote(mut self, quote_time_stamp: Option<f64>) -> Self {
        self.quote_time_stamp = quote_time_stamp;
        self
    }

    /// The replacement written when this message is recalled.
    pub fn recalled_copy(&self) -> Self {
        Self {
            msg: RECALLED_PLACEHOLDER.to_string(),
            recalled: true,
            ..self.clone()
        }
    }

    /// Decode a raw `(payload, stamp)` entry.
    ///
    /// `time` is taken from the stamp when it is a non-zero number, then from
    /// the payload's own `time` field, and is `0` otherwise.
    pub fn decode(payload: &str, stamp: &str) -> Result<Self, DecodeError> {
        let value: Value =
            serde_json::from_str(payload).map_err(|e| DecodeError::InvalidJson(e.to_string()))?;
        let obj = value.as_object().ok_or(DecodeError::NotAnObject)?;

        let time = parse_number(stamp)
            .filter(|t| *t != 0.0)
            .or_else(|| obj.get("time").and_then(number_of).filter(|t| *t != 0.0))
            .unwrap_or(0.0);

        let username = obj
            .get("username")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .unwrap_or(ANONYMOUS_USERNAME)
            .to_string();

        let msg = obj
            .get("msg")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let kind = match obj.get("type").and_then(Value::as_str) {
            Some("name") => Some(MessageKind::Name),
            Some("share") => Some(MessageKind::Share),
            _ => None,
        };

        let recalled = obj
            .get("recalled")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        let quote_time_stamp = obj.get("quoteTimeStamp").and_then(number_of);

        Ok(Self {
            username,
            msg,
            time,
            kind,
            recalled,
            quote_time_stamp,
        })
    }

    /// Encode into the `(payload, stamp)` pair written to the store.
    pub fn encode(&self) -> Result<(String, String), FrameError> {
        Ok((serde_json::to_string(self)?, self.stamp()))
    }

    pub fn stamp(&self) -> String {
        format_stamp(self.time)
    }

    pub fn is_room_name(&self) -> bool {
        self.kind == Some(MessageKind::Name)
    }

    /// Attachment carried by a `share` message.
    pub fn file(&self) -> Option<FileDescriptor> {
        if self.kind != Some(MessageKind::Share) {
            return None;
        }
        serde_json::from_str(&self.msg).ok()
    }

    /// The message this one quotes, if it is present in `messages`.
    pub fn quoted<'a>(&self, messages: &'a [Message]) -> Option<&'a Message> {
        let target = self.quote_time_stamp?;
        messages.iter().find(|m| m.time == target)
    }
}

fn parse_number(s: &str) -> Option<f64> {
    s.trim().parse::<f64>().ok().filter(|n| n.is_finite())
}

fn number_of(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64().filter(|n| n.is_finite()),
        Value::String(s) => parse_number(s),
        _ => None,
    }
}
