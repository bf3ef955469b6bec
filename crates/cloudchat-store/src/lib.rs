//! # cloudchat-store
//!
//! Local persistence for the cloudchat client.
//!
//! The crate exposes a [`KvStore`] abstraction with SQLite and in-memory
//! backends, the [`BoundedCache`] LRU map, the two-tier
//! [`SnapshotCacheManager`] that shields the network from redundant room
//! reads, and helpers that persist the local room list.

pub mod bounded;
pub mod database;
pub mod kv;
pub mod migrations;
pub mod rooms;
pub mod snapshot_cache;

mod error;

pub use bounded::BoundedCache;
pub use database::SqliteStore;
pub use error::{Result, StoreError};
pub use kv::{KvStore, MemoryStore};
pub use rooms::{load_rooms, save_rooms};
pub use snapshot_cache::{CacheConfig, CacheEntry, SnapshotCacheManager};
