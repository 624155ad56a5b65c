//! Exclusive action gate.
//!
//! At most one job may mutate the rendering surface at any instant.
//! Submissions and finalizing click sequences run under the gate; the
//! read-only polling between them does not.
//!
//! The gate is a [`tokio::sync::Mutex`], so waiters are served in FIFO
//! order and the guard is released on every exit path, including when the
//! wrapped future returns an error or is dropped mid-flight.

use std::future::Future;

use tokio::sync::{Mutex, MutexGuard};

/// Proof that the caller currently holds the gate.
pub type ActionGuard<'a> = MutexGuard<'a, ()>;

/// Single shared lock serializing surface mutations across jobs.
#[derive(Debug, Default)]
pub struct ActionGate {
    lock: Mutex<()>,
}

impl ActionGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for the gate and hold it until the guard is dropped.
    pub async fn acquire(&self) -> ActionGuard<'_> {
        self.lock.lock().await
    }

    /// Run `action` while holding the gate and return its result.
    pub async fn with_exclusive<F, Fut, T>(&self, action: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let _guard = self.acquire().await;
        action().await
    }

    /// Whether some job holds the gate right now.
    pub fn is_held(&self) -> bool {
        self.lock.try_lock().is_err()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn serializes_overlapping_actions() {
        let gate = Arc::new(ActionGate::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..4 {
            let gate = Arc::clone(&gate);
            let inside = Arc::clone(&inside);
            let peak = Arc::clone(&peak);
            handles.push(tokio::spawn(async move {
                gate.with_exclusive(|| async {
                    let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    inside.fetch_sub(1, Ordering::SeqCst);
                })
                .await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(peak.load(Ordering::SeqCst), 1);
        assert!(!gate.is_held());
    }

    #[tokio::test]
    async fn released_when_action_fails() {
        let gate = ActionGate::new();

        let result: Result<(), &str> = gate.with_exclusive(|| async { Err("element vanished") }).await;
        assert_eq!(result, Err("element vanished"));
        assert!(!gate.is_held());

        let value = gate.with_exclusive(|| async { 7 }).await;
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn guard_holds_until_dropped() {
        let gate = ActionGate::new();
        let guard = gate.acquire().await;
        assert!(gate.is_held());
        drop(guard);
        assert!(!gate.is_held());
    }
}
