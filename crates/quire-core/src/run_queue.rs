//! Serialization point for wrapped storage operations
//!
//! Every wrapped operation of a database runs under a [`RunQueue`] guard.
//! Reads share the queue, writes and lifecycle operations hold it alone.
//! The underlying tokio `RwLock` is fair, so guards are handed out in FIFO
//! order and a queued writer is never starved by a stream of readers.

use crate::error::{QuireError, Result};
use std::time::{Duration, Instant};
use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Default acquisition timeout (5 seconds)
pub const DEFAULT_LOCK_TIMEOUT_MS: u64 = 5000;

pub struct RunQueue {
    lock: RwLock<()>,
    timeout: Duration,
}

/// Held while a read-only operation runs
pub type SharedGuard<'a> = RwLockReadGuard<'a, ()>;

/// Held while a write, `remove` or `close` runs
pub type ExclusiveGuard<'a> = RwLockWriteGuard<'a, ()>;

impl RunQueue {
    pub fn new(timeout: Duration) -> Self {
        Self {
            lock: RwLock::new(()),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Queue up behind pending writers, then run alongside other readers
    ///
    /// # Errors
    ///
    /// Returns `LockTimeout` if the slot is not granted within the timeout.
    pub async fn shared(&self) -> Result<SharedGuard<'_>> {
        let started = Instant::now();
        let guard = tokio::time::timeout(self.timeout, self.lock.read())
            .await
            .map_err(|_| self.timed_out())?;
        crate::observe::record_lock_wait(started.elapsed());
        Ok(guard)
    }

    /// Queue up and run alone
    ///
    /// # Errors
    ///
    /// Returns `LockTimeout` if the slot is not granted within the timeout.
    pub async fn exclusive(&self) -> Result<ExclusiveGuard<'_>> {
        let started = Instant::now();
        let guard = tokio::time::timeout(self.timeout, self.lock.write())
            .await
            .map_err(|_| self.timed_out())?;
        crate::observe::record_lock_wait(started.elapsed());
        Ok(guard)
    }

    fn timed_out(&self) -> QuireError {
        QuireError::LockTimeout {
            timeout_ms: self.timeout.as_millis() as u64,
        }
    }
}

impl Default for RunQueue {
    fn default() -> Self {
        Self::new(Duration::from_millis(DEFAULT_LOCK_TIMEOUT_MS))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_readers_share() {
        let queue = RunQueue::default();
        let _a = queue.shared().await.unwrap();
        let _b = queue.shared().await.unwrap();
    }

    #[tokio::test]
    async fn test_exclusive_blocks_readers() {
        let queue = RunQueue::new(Duration::from_millis(50));
        let _guard = queue.exclusive().await.unwrap();

        assert!(matches!(
            queue.shared().await,
            Err(QuireError::LockTimeout { timeout_ms: 50 })
        ));
    }

    #[tokio::test]
    async fn test_reader_blocks_writer() {
        let queue = RunQueue::new(Duration::from_millis(50));
        let _guard = queue.shared().await.unwrap();

        assert!(matches!(
            queue.exclusive().await,
            Err(QuireError::LockTimeout { .. })
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_writers_never_overlap() {
        let queue = Arc::new(RunQueue::default());
        let active = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..10)
            .map(|_| {
                let queue = queue.clone();
                let active = active.clone();
                tokio::spawn(async move {
                    for _ in 0..20 {
                        let _guard = queue.exclusive().await.unwrap();
                        assert_eq!(active.fetch_add(1, Ordering::SeqCst), 0);
                        tokio::task::yield_now().await;
                        active.fetch_sub(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.await.unwrap();
        }
    }
}
