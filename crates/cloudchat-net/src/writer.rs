//! Serialized writes over one persistent connection per room.
//!
//! The writer runs in a dedicated tokio task.  Callers submit [`WriteTask`]s
//! through an mpsc channel and get the outcome on a oneshot; tasks run one
//! at a time, and a `set` is only sent after the previous one was
//! acknowledged.  Losing the connection fails the running task and cancels
//! everything queued behind it.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, warn};

use cloudchat_shared::{InboundFrame, OutboundFrame, RoomId};

use crate::error::NetError;
use crate::transport::{Connection, ConnectionState, Transport};

/// Result of one entry of a batch write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteOutcome {
    pub name: String,
    pub result: Result<(), NetError>,
}

pub(crate) enum WriteTask {
    Single {
        name: String,
        value: String,
        reply: oneshot::Sender<Result<(), NetError>>,
    },
    Batch {
        entries: Vec<(String, String)>,
        budget: Duration,
        reply: oneshot::Sender<Result<Vec<WriteOutcome>, NetError>>,
    },
}

impl WriteTask {
    fn cancel(self) {
        match self {
            WriteTask::Single { reply, .. } => {
                let _ = reply.send(Err(NetError::TaskCancelled));
            }
            WriteTask::Batch { reply, .. } => {
                let _ = reply.send(Err(NetError::TaskCancelled));
            }
        }
    }
}

pub(crate) struct WriterConfig {
    pub room: RoomId,
    pub user: String,
    pub write_timeout: Duration,
    pub connect_timeout: Duration,
}

struct Writer {
    config: WriterConfig,
    project_id: String,
    transport: Arc<dyn Transport>,
    conn: Option<Connection>,
}

enum Wake {
    Task(Option<WriteTask>),
    Frame(Option<InboundFrame>),
}

/// Start the writer task; it stops once every sender is dropped.
pub(crate) fn spawn_writer(
    transport: Arc<dyn Transport>,
    config: WriterConfig,
) -> mpsc::UnboundedSender<WriteTask> {
    let (task_tx, task_rx) = mpsc::unbounded_channel();
    let writer = Writer {
        project_id: config.room.to_project_id(),
        config,
        transport,
        conn: None,
    };
    tokio::spawn(writer.run(task_rx));
    task_tx
}

impl Writer {
    async fn run(mut self, mut tasks: mpsc::UnboundedReceiver<WriteTask>) {
        loop {
            let wake = match self.conn.as_mut() {
                Some(conn) => tokio::select! {
                    task = tasks.recv() => Wake::Task(task),
                    frame = conn.recv() => Wake::Frame(frame),
                },
                None => Wake::Task(tasks.recv().await),
            };

            match wake {
                Wake::Frame(frame) => self.on_idle_frame(frame),
                Wake::Task(Some(task)) => self.execute(task, &mut tasks).await,
                Wake::Task(None) => break,
            }
        }
        debug!(room = %self.config.room, "Writer stopped");
    }

    fn on_idle_frame(&mut self, frame: Option<InboundFrame>) {
        match frame {
            None => {
                debug!(room = %self.config.room, "Write connection closed while idle");
                self.conn = None;
            }
            Some(InboundFrame::Ping) => {
                if let Some(conn) = self.conn.as_mut() {
                    if conn.send(&OutboundFrame::Pong).is_err() {
                        self.conn = None;
                    }
                }
            }
            Some(other) => debug!(room = %self.config.room, frame = ?other, "Ignoring idle frame"),
        }
    }

    async fn execute(&mut self, task: WriteTask, queue: &mut mpsc::UnboundedReceiver<WriteTask>) {
        let lost = match task {
            WriteTask::Single { name, value, reply } => {
                let result = self.write_one(&name, &value, self.config.write_timeout).await;
                let lost = result.as_ref().is_err_and(NetError::is_connection_loss);
                let _ = reply.send(result);
                lost
            }
            WriteTask::Batch {
                entries,
                budget,
                reply,
            } => {
                let (outcomes, lost) = self.write_batch(entries, budget).await;
                let _ = reply.send(Ok(outcomes));
                lost
            }
        };

        if lost {
            self.drain(queue);
        }
    }

    /// Write entries in order until done, the budget runs out or the
    /// connection is lost.  Returns the outcomes of the attempted entries.
    async fn write_batch(
        &mut self,
        entries: Vec<(String, String)>,
        budget: Duration,
    ) -> (Vec<WriteOutcome>, bool) {
        let deadline = Instant::now() + budget;
        let total = entries.len();
        let mut outcomes = Vec::with_capacity(total);

        for (name, value) in entries {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                warn!(room = %self.config.room, done = outcomes.len(), total, "Batch write ran out of time");
                break;
            }

            let result = self
                .write_one(&name, &value, remaining.min(self.config.write_timeout))
                .await;
            let stop = match &result {
                Err(NetError::Timeout) => Some(false),
                Err(e) if e.is_connection_loss() => Some(true),
                _ => None,
            };
            outcomes.push(WriteOutcome { name, result });

            if let Some(lost) = stop {
                warn!(room = %self.config.room, done = outcomes.len(), total, "Batch write stopped early");
                return (outcomes, lost);
            }
        }

        info!(room = %self.config.room, written = outcomes.iter().filter(|o| o.result.is_ok()).count(), total, "Batch write finished");
        (outcomes, false)
    }

    async fn write_one(&mut self, name: &str, value: &str, timeout: Duration) -> Result<(), NetError> {
        let mut conn = match self.conn.take() {
            Some(conn) if conn.is_open() => conn,
            _ => self.connect().await?,
        };

        let frame = OutboundFrame::set(&self.config.user, &self.project_id, name, value);
        conn.send(&frame)?;
        conn.set_state(ConnectionState::Writing);

        let deadline = Instant::now() + timeout;
        let frame = loop {
            let Ok(frame) = timeout_at(deadline, conn.recv()).await else {
                // The late ack would otherwise answer the next write.
                warn!(room = %self.config.room, name = %name, "Write timed out, dropping connection");
                return Err(NetError::Timeout);
            };
            match frame {
                None => {
                    warn!(room = %self.config.room, name = %name, "Connection closed while awaiting ack");
                    return Err(NetError::ConnectionClosed);
                }
                Some(InboundFrame::Ping) => conn.send(&OutboundFrame::Pong)?,
                Some(frame) => break frame,
            }
        };

        conn.set_state(ConnectionState::Open);
        self.conn = Some(conn);
        match frame {
            InboundFrame::Ack { reply } if reply == "OK" => {
                debug!(room = %self.config.room, name = %name, "Write acknowledged");
                Ok(())
            }
            InboundFrame::Ack { reply } => {
                warn!(room = %self.config.room, name = %name, reply = %reply, "Write rejected");
                Err(NetError::Rejected(reply))
            }
            other => Err(NetError::UnexpectedReply(format!("{other:?}"))),
        }
    }

    async fn connect(&self) -> Result<Connection, NetError> {
        debug!(room = %self.config.room, state = ?ConnectionState::Connecting, "Opening write connection");
        match tokio::time::timeout(self.config.connect_timeout, self.transport.connect()).await {
            Ok(Ok(conn)) => Ok(conn),
            Ok(Err(e)) => {
                warn!(room = %self.config.room, error = %e, "Write connection failed");
                Err(e)
            }
            Err(_) => {
                warn!(room = %self.config.room, "Write connection timed out");
                Err(NetError::ConnectTimeout)
            }
        }
    }

    fn drain(&mut self, queue: &mut mpsc::UnboundedReceiver<WriteTask>) {
        self.conn = None;
        let mut cancelled = 0usize;
        while let Ok(task) = queue.try_recv() {
            task.cancel();
            cancelled += 1;
        }
        if cancelled > 0 {
            info!(room = %self.config.room, cancelled, "Cancelled queued writes after connection loss");
        }
    }
}
