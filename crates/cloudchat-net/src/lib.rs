//! Client for the cloud-variable key/value service.
//!
//! A room is a project on the service holding `(name, value)` pairs.  Reads
//! fetch every pair of a room over a short-lived connection and are
//! coalesced per room by the [`SnapshotRegistry`]; writes go through one
//! persistent connection per room and are strictly serialized.

pub mod client;
pub mod config;
pub mod error;
pub mod memory;
pub mod reader;
pub mod registry;
pub mod transport;
pub mod websocket;
mod writer;

pub use client::{StoreClient, StoreConnector};
pub use config::StoreConfig;
pub use error::NetError;
pub use memory::{CloudEvent, Faults, MemoryCloud};
pub use reader::read_snapshot;
pub use registry::SnapshotRegistry;
pub use transport::{Connection, ConnectionState, RemoteEnd, Transport};
pub use websocket::WebSocketTransport;
pub use writer::WriteOutcome;
