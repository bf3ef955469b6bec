//! Persistent key/value abstraction.
//!
//! The chat core only needs four primitives from local storage: point reads,
//! writes, deletes and enumeration by key prefix.  There is no atomicity
//! guarantee across calls.

use std::collections::BTreeMap;
use std::sync::Mutex;

use crate::error::{Result, StoreError};

/// Local key/value storage shared by the snapshot cache and the room list.
pub trait KvStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;

    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Returns `true` if a value was removed.
    fn delete(&self, key: &str) -> Result<bool>;

    /// All keys starting with `prefix`, in ascending order.
    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>>;
}

/// Process-local store, used for ephemeral sessions and tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, String>>,
    max_value_bytes: Option<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that rejects values larger than `max` bytes.
    pub fn with_quota(max: usize) -> Self {
        Self {
            entries: Mutex::new(BTreeMap::new()),
            max_value_bytes: Some(max),
        }
    }

    fn entries(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, String>>> {
        self.entries.lock().map_err(|_| StoreError::Poisoned)
    }
}

impl KvStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        if let Some(max) = self.max_value_bytes {
            if value.len() > max {
                return Err(StoreError::QuotaExceeded {
                    size: value.len(),
                    max,
                });
            }
        }
        self.entries()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<bool> {
        Ok(self.entries()?.remove(key).is_some())
    }

    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .entries()?
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect())
    }
}
