//! In-process stand-in for the cloud-variable service.
//!
//! Speaks the same frame protocol as the real endpoint: every handshake is
//! answered with the next stored pair of the project, cycling back to the
//! first one, and every `set` is stored and acknowledged.  Faults can be
//! switched on to exercise error paths, and every observable step is logged
//! as a [`CloudEvent`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use indexmap::IndexMap;
use serde_json::{json, Value};
use tracing::debug;

use cloudchat_shared::{RoomId, Snapshot};

use crate::error::NetError;
use crate::transport::{Connection, RemoteEnd, Transport};

/// Failure modes the service can be told to exhibit.
#[derive(Debug, Clone, Default)]
pub struct Faults {
    /// Refuse new connections.
    pub refuse_connections: bool,
    /// Acknowledge writes with a failure reply and keep nothing.
    pub reject_writes: bool,
    /// Delay every acknowledgement.
    pub ack_delay: Option<Duration>,
    /// Close the connection when a write arrives instead of answering.
    pub drop_on_set: bool,
    /// Send a keepalive ping before every handshake reply.
    pub ping_before_reply: bool,
    /// Stop answering handshakes after this many replies per connection.
    pub stall_reads_after: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloudEvent {
    Connected,
    Handshake { project: String },
    SetReceived { project: String, name: String },
    AckSent { project: String, name: String, ok: bool },
    Pong,
}

#[derive(Default)]
struct CloudState {
    projects: HashMap<String, IndexMap<String, String>>,
    faults: Faults,
    events: Vec<CloudEvent>,
}

#[derive(Clone, Default)]
pub struct MemoryCloud {
    state: Arc<Mutex<CloudState>>,
}

impl MemoryCloud {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a pair directly, bypassing the protocol.
    pub fn seed(&self, room: RoomId, name: impl Into<String>, value: impl Into<String>) {
        self.state()
            .projects
            .entry(room.to_project_id())
            .or_default()
            .insert(name.into(), value.into());
    }

    /// Everything stored for `room`, in insertion order.
    pub fn entries(&self, room: RoomId) -> Snapshot {
        self.state()
            .projects
            .get(&room.to_project_id())
            .map(|entries| entries.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default()
    }

    pub fn set_faults(&self, faults: Faults) {
        self.state().faults = faults;
    }

    pub fn events(&self) -> Vec<CloudEvent> {
        self.state().events.clone()
    }

    pub fn connections(&self) -> usize {
        self.count(|event| matches!(event, CloudEvent::Connected))
    }

    pub fn count(&self, predicate: impl Fn(&CloudEvent) -> bool) -> usize {
        self.state().events.iter().filter(|e| predicate(e)).count()
    }

    fn state(&self) -> MutexGuard<'_, CloudState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn serve(self, mut remote: RemoteEnd) {
        let mut cursors: HashMap<String, usize> = HashMap::new();
        let mut replies = 0usize;

        while let Some(text) = remote.from_client.recv().await {
            let Ok(frame) = serde_json::from_str::<Value>(&text) else {
                debug!(frame = %text, "Memory cloud ignoring unparsable frame");
                continue;
            };
            let project = frame["project_id"].as_str().unwrap_or_default().to_string();

            match frame["method"].as_str() {
                Some("handshake") => {
                    let (ping, reply) = {
                        let mut state = self.state();
                        state.events.push(CloudEvent::Handshake {
                            project: project.clone(),
                        });
                        let stalled = state
                            .faults
                            .stall_reads_after
                            .is_some_and(|limit| replies >= limit);
                        let cursor = cursors.entry(project.clone()).or_insert(0);
                        let reply = match state.projects.get(&project) {
                            Some(entries) if !entries.is_empty() && !stalled => {
                                let (name, value) = entries
                                    .get_index(*cursor % entries.len())
                                    .map(|(k, v)| (k.clone(), v.clone()))
                                    .unwrap_or_default();
                                *cursor += 1;
                                Some(json!({ "name": name, "value": value }))
                            }
                            _ => None,
                        };
                        (state.faults.ping_before_reply, reply)
                    };

                    if ping && remote.to_client.send(json!({"method": "ping"}).to_string()).is_err() {
                        return;
                    }
                    if let Some(reply) = reply {
                        replies += 1;
                        if remote.to_client.send(reply.to_string()).is_err() {
                            return;
                        }
                    }
                }

                Some("set") => {
                    let name = frame["name"].as_str().unwrap_or_default().to_string();
                    let value = frame["value"].as_str().unwrap_or_default().to_string();
                    let faults = {
                        let mut state = self.state();
                        state.events.push(CloudEvent::SetReceived {
                            project: project.clone(),
                            name: name.clone(),
                        });
                        state.faults.clone()
                    };

                    if faults.drop_on_set {
                        debug!(project = %project, "Memory cloud dropping connection on write");
                        return;
                    }
                    if let Some(delay) = faults.ack_delay {
                        tokio::time::sleep(delay).await;
                    }

                    let ok = !faults.reject_writes;
                    {
                        let mut state = self.state();
                        if ok {
                            state
                                .projects
                                .entry(project.clone())
                                .or_default()
                                .insert(name.clone(), value);
                        }
                        state.events.push(CloudEvent::AckSent { project, name, ok });
                    }

                    let reply = if ok { "OK" } else { "FAIL" };
                    let ack = json!({ "method": "ack", "reply": reply });
                    if remote.to_client.send(ack.to_string()).is_err() {
                        return;
                    }
                }

                Some("pong") => self.state().events.push(CloudEvent::Pong),

                _ => debug!(frame = %text, "Memory cloud ignoring frame"),
            }
        }
    }
}

#[async_trait]
impl Transport for MemoryCloud {
    async fn connect(&self) -> Result<Connection, NetError> {
        {
            let mut state = self.state();
            if state.faults.refuse_connections {
                return Err(NetError::Connect("connection refused".into()));
            }
            state.events.push(CloudEvent::Connected);
        }

        let (conn, remote) = Connection::pair();
        tokio::spawn(self.clone().serve(remote));
        Ok(conn)
    }
}
