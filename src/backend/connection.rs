//! Connection controller for the document store.
//!
//! Tracks whether the store is reachable and performs bounded resets: wait
//! out the backoff, then disable and re-enable the network back to back.
//! The counter only goes back to zero after a successful enable, so a store
//! that keeps failing is reset at most `MAX_RESET_ATTEMPTS` times.
//!
//! The store is shared by every request, so resets are serialised. Callers
//! that queued behind a reset reuse its outcome instead of starting another.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

use super::DocumentStore;

/// Resets allowed before the controller gives up.
pub const MAX_RESET_ATTEMPTS: u32 = 3;
/// Delay before the first re-enable; doubled on every further reset.
pub const RESET_BASE_DELAY: Duration = Duration::from_millis(1_000);
/// Upper bound for the reset delay.
pub const RESET_MAX_DELAY: Duration = Duration::from_millis(10_000);

pub struct ConnectionController {
    store: Arc<dyn DocumentStore>,
    online: AtomicBool,
    reset_attempts: AtomicU32,
    /// Resets finished so far; lets queued callers see that one completed.
    resets_completed: AtomicU64,
    reset_lock: Mutex<()>,
    base_delay: Duration,
}

impl ConnectionController {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self::with_base_delay(store, RESET_BASE_DELAY)
    }

    /// Controller with a custom base delay (tests use `Duration::ZERO`).
    pub fn with_base_delay(store: Arc<dyn DocumentStore>, base_delay: Duration) -> Self {
        let online = store.is_online();
        Self {
            store,
            online: AtomicBool::new(online),
            reset_attempts: AtomicU32::new(0),
            resets_completed: AtomicU64::new(0),
            reset_lock: Mutex::new(()),
            base_delay,
        }
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    /// Whether the last enable/disable left the store online.
    pub fn status(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// Resets performed since the last successful enable.
    pub fn reset_attempts(&self) -> u32 {
        self.reset_attempts.load(Ordering::SeqCst)
    }

    fn set_online_status(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
        tracing::info!(
            "Document store is now {}",
            if online { "online" } else { "offline" }
        );
    }

    pub async fn enable_connection(&self) -> bool {
        match self.store.enable_network() {
            Ok(()) => {
                self.set_online_status(true);
                self.reset_attempts.store(0, Ordering::SeqCst);
                true
            }
            Err(e) => {
                tracing::error!("Failed to enable network: {e}");
                false
            }
        }
    }

    pub async fn disable_connection(&self) -> bool {
        match self.store.disable_network() {
            Ok(()) => {
                self.set_online_status(false);
                true
            }
            Err(e) => {
                tracing::error!("Failed to disable network: {e}");
                false
            }
        }
    }

    /// Delay used for the `attempt`-th reset (1-based).
    pub fn reset_delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay
            .saturating_mul(factor)
            .min(RESET_MAX_DELAY)
    }

    /// Wait out the reset delay, then disable and enable the network.
    ///
    /// Returns `false` without touching the store once `MAX_RESET_ATTEMPTS`
    /// consecutive resets have been spent. A caller that waited for another
    /// reset to finish returns `status()` without resetting again.
    pub async fn reset_connection(&self) -> bool {
        let seen = self.resets_completed.load(Ordering::SeqCst);
        let _guard = self.reset_lock.lock().await;
        if self.resets_completed.load(Ordering::SeqCst) != seen {
            tracing::debug!("Connection was reset while waiting, skipping");
            return self.status();
        }

        let attempt = match self.reset_attempts.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
            (n < MAX_RESET_ATTEMPTS).then_some(n + 1)
        }) {
            Ok(previous) => previous + 1,
            Err(_) => {
                tracing::warn!("Max connection reset attempts reached");
                return false;
            }
        };

        let delay = self.reset_delay(attempt);
        tracing::info!(
            attempt,
            delay_ms = delay.as_millis() as u64,
            "Resetting document store connection"
        );

        tokio::time::sleep(delay).await;
        self.disable_connection().await;
        let enabled = self.enable_connection().await;
        self.resets_completed.fetch_add(1, Ordering::SeqCst);

        if enabled {
            tracing::info!("Connection reset successful");
        } else {
            tracing::error!(attempt, "Connection reset attempt failed");
        }
        enabled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{MemoryStore, StoreError, StoreErrorCode};

    fn controller() -> (Arc<MemoryStore>, ConnectionController) {
        let store = Arc::new(MemoryStore::new());
        let controller = ConnectionController::with_base_delay(store.clone(), Duration::ZERO);
        (store, controller)
    }

    #[tokio::test]
    async fn disable_and_enable_track_status() {
        let (store, controller) = controller();
        assert!(controller.status());

        assert!(controller.disable_connection().await);
        assert!(!controller.status());
        assert!(!store.is_online());

        assert!(controller.enable_connection().await);
        assert!(controller.status());
        assert!(store.is_online());
    }

    #[tokio::test]
    async fn successful_reset_clears_counter() {
        let (store, controller) = controller();
        assert!(controller.reset_connection().await);
        assert_eq!(controller.reset_attempts(), 0);
        assert!(store.is_online());
    }

    #[tokio::test]
    async fn failing_resets_are_capped_at_three() {
        let (store, controller) = controller();
        store.set_network_toggle_failure(Some(StoreError::new(StoreErrorCode::Internal, "stuck")));

        for expected in 1..=MAX_RESET_ATTEMPTS {
            assert!(!controller.reset_connection().await);
            assert_eq!(controller.reset_attempts(), expected);
        }
        // Fourth call refuses without touching the store
        assert!(!controller.reset_connection().await);
        assert_eq!(controller.reset_attempts(), MAX_RESET_ATTEMPTS);

        // A manual enable that succeeds re-arms the controller
        store.set_network_toggle_failure(None);
        assert!(controller.enable_connection().await);
        assert_eq!(controller.reset_attempts(), 0);
        assert!(controller.reset_connection().await);
    }

    #[tokio::test]
    async fn reads_keep_working_while_a_reset_waits() {
        let store = Arc::new(MemoryStore::new());
        let controller = Arc::new(ConnectionController::with_base_delay(
            store.clone(),
            Duration::from_millis(200),
        ));

        let resetting = tokio::spawn({
            let controller = controller.clone();
            async move { controller.reset_connection().await }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(store.list("patients").is_ok());
        assert!(controller.status());

        assert!(resetting.await.unwrap());
        assert!(store.list("patients").is_ok());
    }

    #[tokio::test]
    async fn concurrent_resets_run_once() {
        let store = Arc::new(MemoryStore::new());
        store.set_network_toggle_failure(Some(StoreError::new(StoreErrorCode::Internal, "stuck")));
        let controller = Arc::new(ConnectionController::with_base_delay(
            store.clone(),
            Duration::from_millis(50),
        ));

        let handles: Vec<_> = (0..5)
            .map(|_| {
                let controller = controller.clone();
                tokio::spawn(async move { controller.reset_connection().await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(controller.reset_attempts(), 1);
    }

    #[test]
    fn reset_delay_doubles_and_caps() {
        let store = Arc::new(MemoryStore::new());
        let controller = ConnectionController::new(store);
        assert_eq!(controller.reset_delay(1), Duration::from_millis(1_000));
        assert_eq!(controller.reset_delay(2), Duration::from_millis(2_000));
        assert_eq!(controller.reset_delay(3), Duration::from_millis(4_000));
        assert_eq!(controller.reset_delay(5), RESET_MAX_DELAY);
        assert_eq!(controller.reset_delay(40), RESET_MAX_DELAY);
    }
}
