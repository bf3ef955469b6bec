// Chat logic on top of the cloud-variable store: message reconciliation,
// room management and the event stream consumed by front-ends.

pub mod error;
pub mod events;
pub mod reconcile;
pub mod reconciler;
pub mod rooms;
pub mod state;

pub use error::{ChatError, Result};
pub use events::{emit_event, event_channel, ChatEvent, EventReceiver, EventSender, NoticeLevel};
pub use reconcile::{apply_recall, dedupe, parse_snapshot, reconcile, ParseFailure, RecallToken};
pub use reconciler::{ChatUser, MessageReconciler, ReconcilerConfig};
pub use rooms::{room_title, RoomDirectory};
pub use state::AppState;
