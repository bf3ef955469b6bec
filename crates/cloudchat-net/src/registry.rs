//! Coalescing of concurrent snapshot reads.
//!
//! Per room, at most one read is in flight: later callers join it instead of
//! opening their own connection.  A finished read is served again to anyone
//! asking within the freshness window.  Writes invalidate both, so a read
//! that started before a write can never be cached after it.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use futures::future::{BoxFuture, FutureExt, Shared};
use tracing::debug;

use cloudchat_shared::{RoomId, Snapshot};

struct FreshSnapshot {
    fetched_at: Instant,
    snapshot: Snapshot,
}

struct PendingRead {
    generation: u64,
    result: Shared<BoxFuture<'static, Snapshot>>,
}

#[derive(Default)]
struct RegistryState {
    fresh: HashMap<RoomId, FreshSnapshot>,
    pending: HashMap<RoomId, PendingRead>,
    next_generation: u64,
}

pub struct SnapshotRegistry {
    freshness: Duration,
    state: Mutex<RegistryState>,
}

impl SnapshotRegistry {
    pub fn new(freshness: Duration) -> Self {
        Self {
            freshness,
            state: Mutex::new(RegistryState::default()),
        }
    }

    /// Snapshot of `room`, from the freshness window, an in-flight read, or
    /// by running `fetch`.
    ///
    /// `fetch` runs as its own task, so a caller that gives up does not
    /// cancel the read for the others.
    pub async fn snapshot_with<F>(self: &Arc<Self>, room: RoomId, fetch: F) -> Snapshot
    where
        F: Future<Output = Snapshot> + Send + 'static,
    {
        let result = {
            let mut state = self.state();

            if let Some(fresh) = state.fresh.get(&room) {
                if fresh.fetched_at.elapsed() < self.freshness {
                    debug!(room = %room, "Serving fresh snapshot");
                    return fresh.snapshot.clone();
                }
            }

            match state.pending.get(&room) {
                Some(pending) => {
                    debug!(room = %room, "Joining in-flight read");
                    pending.result.clone()
                }
                None => {
                    let generation = state.next_generation;
                    state.next_generation += 1;

                    let registry = Arc::clone(self);
                    let handle = tokio::spawn(async move {
                        let snapshot = fetch.await;
                        registry.complete(room, generation, &snapshot);
                        snapshot
                    });
                    let result = async move { handle.await.unwrap_or_default() }
                        .boxed()
                        .shared();

                    state.pending.insert(
                        room,
                        PendingRead {
                            generation,
                            result: result.clone(),
                        },
                    );
                    result
                }
            }
        };

        result.await
    }

    /// Drop the fresh snapshot of `room` and detach its in-flight read.
    pub fn invalidate(&self, room: RoomId) {
        let mut state = self.state();
        state.fresh.remove(&room);
        if state.pending.remove(&room).is_some() {
            debug!(room = %room, "Detached in-flight read");
        }
    }

    /// Forget everything.
    pub fn reset(&self) {
        let mut state = self.state();
        state.fresh.clear();
        state.pending.clear();
    }

    pub fn is_pending(&self, room: RoomId) -> bool {
        self.state().pending.contains_key(&room)
    }

    fn complete(&self, room: RoomId, generation: u64, snapshot: &Snapshot) {
        let mut state = self.state();
        let current = state.pending.get(&room).map(|p| p.generation);
        if current != Some(generation) {
            debug!(room = %room, "Discarding superseded read");
            return;
        }
        state.pending.remove(&room);
        state.fresh.insert(
            room,
            FreshSnapshot {
                fetched_at: Instant::now(),
                snapshot: snapshot.clone(),
            },
        );
    }

    fn state(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn snapshot(value: &str) -> Snapshot {
        [("k".to_string(), value.to_string())].into_iter().collect()
    }

    fn counted_fetch(
        calls: &Arc<AtomicUsize>,
        value: &'static str,
        delay: Duration,
    ) -> impl Future<Output = Snapshot> + Send + 'static {
        let calls = Arc::clone(calls);
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(delay).await;
            snapshot(value)
        }
    }

    #[tokio::test]
    async fn test_concurrent_reads_share_one_fetch() {
        let registry = Arc::new(SnapshotRegistry::new(Duration::from_secs(2)));
        let calls = Arc::new(AtomicUsize::new(0));
        let room = RoomId(1);

        let (a, b) = tokio::join!(
            registry.snapshot_with(room, counted_fetch(&calls, "1", Duration::from_millis(50))),
            registry.snapshot_with(room, counted_fetch(&calls, "2", Duration::from_millis(50))),
        );

        assert_eq!(a, snapshot("1"));
        assert_eq!(b, snapshot("1"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!registry.is_pending(room));
    }

    #[tokio::test]
    async fn test_fresh_snapshot_is_reused_until_invalidated() {
        let registry = Arc::new(SnapshotRegistry::new(Duration::from_secs(60)));
        let calls = Arc::new(AtomicUsize::new(0));
        let room = RoomId(1);

        registry
            .snapshot_with(room, counted_fetch(&calls, "1", Duration::ZERO))
            .await;
        let again = registry
            .snapshot_with(room, counted_fetch(&calls, "2", Duration::ZERO))
            .await;
        assert_eq!(again, snapshot("1"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        registry.invalidate(room);
        let after = registry
            .snapshot_with(room, counted_fetch(&calls, "3", Duration::ZERO))
            .await;
        assert_eq!(after, snapshot("3"));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_expired_snapshot_is_refetched() {
        let registry = Arc::new(SnapshotRegistry::new(Duration::from_millis(20)));
        let calls = Arc::new(AtomicUsize::new(0));
        let room = RoomId(1);

        registry
            .snapshot_with(room, counted_fetch(&calls, "1", Duration::ZERO))
            .await;
        tokio::time::sleep(Duration::from_millis(40)).await;
        let later = registry
            .snapshot_with(room, counted_fetch(&calls, "2", Duration::ZERO))
            .await;

        assert_eq!(later, snapshot("2"));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_read_detached_by_invalidate_is_not_cached() {
        let registry = Arc::new(SnapshotRegistry::new(Duration::from_secs(60)));
        let calls = Arc::new(AtomicUsize::new(0));
        let room = RoomId(1);

        let slow = {
            let registry = Arc::clone(&registry);
            let fetch = counted_fetch(&calls, "stale", Duration::from_millis(50));
            tokio::spawn(async move { registry.snapshot_with(room, fetch).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        registry.invalidate(room);

        assert_eq!(slow.await.unwrap(), snapshot("stale"));
        let next = registry
            .snapshot_with(room, counted_fetch(&calls, "new", Duration::ZERO))
            .await;
        assert_eq!(next, snapshot("new"));
    }

    #[tokio::test]
    async fn test_rooms_are_independent() {
        let registry = Arc::new(SnapshotRegistry::new(Duration::from_secs(60)));
        let calls = Arc::new(AtomicUsize::new(0));

        let a = registry
            .snapshot_with(RoomId(1), counted_fetch(&calls, "a", Duration::ZERO))
            .await;
        let b = registry
            .snapshot_with(RoomId(2), counted_fetch(&calls, "b", Duration::ZERO))
            .await;

        assert_eq!(a, snapshot("a"));
        assert_eq!(b, snapshot("b"));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
