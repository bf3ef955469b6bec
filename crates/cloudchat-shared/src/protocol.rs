use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::FrameError;

/// Frames the client sends to the cloud-variable service.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "method", rename_all = "lowercase")]
pub enum OutboundFrame {
    /// Requests the next `(name, value)` pair of a project.
    Handshake { user: String, project_id: String },

    /// Stores `value` under `name` in a project.
    Set {
        user: String,
        project_id: String,
        name: String,
        value: String,
    },

    /// Keepalive answer to a server `ping`.
    Pong,
}

impl OutboundFrame {
    pub fn handshake(user: &str, project_id: &str) -> Self {
        Self::Handshake {
            user: user.to_string(),
            project_id: project_id.to_string(),
        }
    }

    pub fn set(user: &str, project_id: &str, name: &str, value: &str) -> Self {
        Self::Set {
            user: user.to_string(),
            project_id: project_id.to_string(),
            name: name.to_string(),
            value: value.to_string(),
        }
    }

    /// Serialize to a JSON text frame
    pub fn to_text(&self) -> Result<String, FrameError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Frames received from the cloud-variable service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundFrame {
    /// Keepalive; must be answered with [`OutboundFrame::Pong`].
    Ping,
    /// Write acknowledgement; `reply == "OK"` means success.
    Ack { reply: String },
    /// One stored pair, returned per handshake.
    Entry { name: String, value: String },
    /// Anything else the service sends.
    Other(String),
}

#[derive(Deserialize)]
struct RawInbound {
    method: Option<String>,
    reply: Option<String>,
    name: Option<Value>,
    value: Option<Value>,
}

impl InboundFrame {
    /// Parse a JSON text frame
    pub fn parse(text: &str) -> Result<Self, FrameError> {
        let raw: RawInbound =
            serde_json::from_str(text).map_err(|e| FrameError::Malformed(e.to_string()))?;

        match raw.method.as_deref() {
            Some("ping") => return Ok(Self::Ping),
            Some("ack") => {
                return Ok(Self::Ack {
                    reply: raw.reply.unwrap_or_default(),
                })
            }
            _ => {}
        }

        match (
            raw.name.as_ref().and_then(scalar_text),
            raw.value.as_ref().and_then(scalar_text),
        ) {
            (Some(name), Some(value)) => Ok(Self::Entry { name, value }),
            _ => Ok(Self::Other(raw.method.unwrap_or_default())),
        }
    }

    pub fn is_ok_ack(&self) -> bool {
        matches!(self, Self::Ack { reply } if reply == "OK")
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
