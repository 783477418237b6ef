//! Per-subscriber turn serialization.
//!
//! Two messages from the same subscriber must not run concurrently: both
//! would read the same conversation and one update would be lost. Turns of
//! different subscribers are independent.

use std::future::Future;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::trace;

/// Async mutexes keyed by subscriber id.
///
/// Entries are created on demand and pruned once no turn holds or waits on
/// them.
#[derive(Clone, Default)]
pub struct TurnLocks {
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl TurnLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `turn` while holding the lock of `sender`.
    pub async fn run<F, T>(&self, sender: &str, turn: F) -> T
    where
        F: Future<Output = T>,
    {
        let lock = self
            .locks
            .entry(sender.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        let output = {
            let _guard = lock.lock().await;
            trace!(sender = %sender, "Acquired turn lock");
            turn.await
        };

        drop(lock);
        self.locks
            .remove_if(sender, |_, lock| Arc::strong_count(lock) == 1);
        output
    }

    /// Number of subscribers with a running or waiting turn.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

impl std::fmt::Debug for TurnLocks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TurnLocks")
            .field("active", &self.locks.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_same_sender_turns_do_not_overlap() {
        let locks = TurnLocks::new();
        let running = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let turns = (0..8).map(|_| {
            let locks = locks.clone();
            let running = running.clone();
            let max_seen = max_seen.clone();
            tokio::spawn(async move {
                locks
                    .run("sub-1", async {
                        let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                        max_seen.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(5)).await;
                        running.fetch_sub(1, Ordering::SeqCst);
                    })
                    .await
            })
        });
        futures::future::join_all(turns).await;

        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
        assert!(locks.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_different_senders_run_concurrently() {
        let locks = TurnLocks::new();
        let barrier = Arc::new(tokio::sync::Barrier::new(2));

        let a = {
            let locks = locks.clone();
            let barrier = barrier.clone();
            tokio::spawn(async move { locks.run("sub-a", async { barrier.wait().await }).await })
        };
        let b = {
            let locks = locks.clone();
            let barrier = barrier.clone();
            tokio::spawn(async move { locks.run("sub-b", async { barrier.wait().await }).await })
        };

        // Both turns must be inside their lock at once to pass the barrier.
        tokio::time::timeout(Duration::from_secs(5), async {
            a.await.unwrap();
            b.await.unwrap();
        })
        .await
        .unwrap();
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn test_returns_turn_output() {
        let locks = TurnLocks::new();
        let value = locks.run("sub-1", async { 42 }).await;
        assert_eq!(value, 42);
        assert_eq!(locks.len(), 0);
    }
}
