//! Cancelable fire-once timers keyed per lobby.

use std::{
    future::Future,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use dashmap::DashMap;
use tracing::debug;

/// Handle returned by [`TimerScheduler::arm`], used to cancel the pending fire.
#[derive(Debug, Clone)]
pub struct TimerHandle {
    key: String,
    generation: u64,
}

struct TimerEntry {
    generation: u64,
}

/// Registry of pending fire-once timers.
///
/// Firing and cancellation race to remove the registered entry; whichever
/// side removes it wins, so a canceled timer never runs its callback and a
/// fired timer treats a late cancel as a no-op. Re-arming an existing key
/// replaces the pending timer instead of stacking a second one.
pub struct TimerScheduler {
    entries: DashMap<String, TimerEntry>,
    counter: AtomicU64,
}

impl Default for TimerScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl TimerScheduler {
    /// Create an empty scheduler.
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            counter: AtomicU64::new(0),
        }
    }

    /// Schedule `callback` to run once after `duration`, replacing any timer
    /// already registered under `key`.
    pub fn arm<F, Fut>(self: &Arc<Self>, key: &str, duration: Duration, callback: F) -> TimerHandle
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let generation = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        self.entries
            .insert(key.to_string(), TimerEntry { generation });

        let scheduler = Arc::clone(self);
        let task_key = key.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            // Claim the entry before running; losing the claim means the
            // timer was canceled or replaced while we slept.
            let claimed = scheduler
                .entries
                .remove_if(&task_key, |_, entry| entry.generation == generation)
                .is_some();
            if claimed {
                callback().await;
            } else {
                debug!(key = %task_key, "timer superseded before firing");
            }
        });

        TimerHandle {
            key: key.to_string(),
            generation,
        }
    }

    /// Cancel a pending timer. Safe to call after the timer has fired and
    /// safe to call repeatedly.
    pub fn cancel(&self, handle: &TimerHandle) {
        self.entries
            .remove_if(&handle.key, |_, entry| entry.generation == handle.generation);
    }

    /// Cancel whatever timer is currently registered under `key`.
    pub fn disarm(&self, key: &str) {
        self.entries.remove(key);
    }

    /// Release every timer whose key starts with `prefix` (lobby teardown).
    pub fn release_prefix(&self, prefix: &str) {
        self.entries.retain(|key, _| !key.starts_with(prefix));
    }

    /// Number of currently pending timers.
    pub fn pending(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    fn counter_callback(
        hits: &Arc<AtomicUsize>,
    ) -> impl FnOnce() -> std::future::Ready<()> + Send + 'static {
        let hits = Arc::clone(hits);
        move || {
            hits.fetch_add(1, Ordering::SeqCst);
            std::future::ready(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn timer_fires_exactly_once() {
        let scheduler = Arc::new(TimerScheduler::new());
        let hits = Arc::new(AtomicUsize::new(0));

        scheduler.arm("ABCD", Duration::from_secs(5), counter_callback(&hits));
        tokio::time::sleep(Duration::from_secs(6)).await;
        tokio::task::yield_now().await;

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(scheduler.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn canceled_timer_never_fires() {
        let scheduler = Arc::new(TimerScheduler::new());
        let hits = Arc::new(AtomicUsize::new(0));

        let handle = scheduler.arm("ABCD", Duration::from_secs(5), counter_callback(&hits));
        scheduler.cancel(&handle);
        // Canceling twice is a no-op.
        scheduler.cancel(&handle);

        tokio::time::sleep(Duration::from_secs(6)).await;
        tokio::task::yield_now().await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_after_fire_is_noop() {
        let scheduler = Arc::new(TimerScheduler::new());
        let hits = Arc::new(AtomicUsize::new(0));

        let handle = scheduler.arm("ABCD", Duration::from_secs(1), counter_callback(&hits));
        tokio::time::sleep(Duration::from_secs(2)).await;
        tokio::task::yield_now().await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        scheduler.cancel(&handle);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn rearming_replaces_the_pending_timer() {
        let scheduler = Arc::new(TimerScheduler::new());
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        scheduler.arm("ABCD", Duration::from_secs(5), counter_callback(&first));
        scheduler.arm("ABCD", Duration::from_secs(10), counter_callback(&second));

        tokio::time::sleep(Duration::from_secs(11)).await;
        tokio::task::yield_now().await;

        // Only the replacement fired; the superseded timer lost its claim.
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn release_prefix_drops_lobby_timers() {
        let scheduler = Arc::new(TimerScheduler::new());
        let hits = Arc::new(AtomicUsize::new(0));

        scheduler.arm("ABCD", Duration::from_secs(5), counter_callback(&hits));
        scheduler.arm("ABCD:drop:alice", Duration::from_secs(5), counter_callback(&hits));
        scheduler.arm("WXYZ", Duration::from_secs(5), counter_callback(&hits));

        scheduler.release_prefix("ABCD");
        tokio::time::sleep(Duration::from_secs(6)).await;
        tokio::task::yield_now().await;

        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
