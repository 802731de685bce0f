use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::AbortHandle;
use tracing::debug;

/// Delay before the next automatic probe after `attempt` consecutive failures
/// (0-indexed): `min(initial * 2^attempt, max)`
#[inline]
pub fn backoff_delay(attempt: u32, initial: Duration, max: Duration) -> Duration {
    let initial_ms = initial.as_millis().min(u64::MAX as u128) as u64;
    let factor = 2u64.checked_pow(attempt).unwrap_or(u64::MAX);
    Duration::from_millis(initial_ms.saturating_mul(factor)).min(max)
}

#[derive(Default)]
struct TimerSlot {
    // Bumped on every arm/disarm so a timer that lost its slot never fires
    generation: u64,
    pending: Option<AbortHandle>,
}

/// Single-slot retry timer with exponential backoff
pub struct BackoffScheduler {
    initial_delay: Duration,
    max_delay: Duration,
    slot: Arc<Mutex<TimerSlot>>,
}

impl BackoffScheduler {
    pub fn new(initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            initial_delay,
            max_delay,
            slot: Arc::new(Mutex::new(TimerSlot::default())),
        }
    }

    #[inline]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        backoff_delay(attempt, self.initial_delay, self.max_delay)
    }

    /// Schedule `callback` to run once after `delay`, replacing any timer
    /// that is already armed. Must be called from within a tokio runtime.
    pub fn arm<F, Fut>(&self, delay: Duration, callback: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut slot = self.slot.lock();
        if let Some(previous) = slot.pending.take() {
            previous.abort();
        }
        slot.generation = slot.generation.wrapping_add(1);

        let generation = slot.generation;
        let shared = Arc::clone(&self.slot);
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;

            // Vacate the slot before running so the callback can re-arm or
            // disarm without aborting itself
            let fire = {
                let mut slot = shared.lock();
                if slot.generation == generation && slot.pending.is_some() {
                    slot.pending = None;
                    true
                } else {
                    false
                }
            };

            if fire {
                callback().await;
            }
        });

        slot.pending = Some(task.abort_handle());
        debug!(delay_ms = delay.as_millis() as u64, "Retry timer armed");
    }

    /// Cancel the pending timer, if any. Returns whether one was armed.
    pub fn disarm(&self) -> bool {
        let mut slot = self.slot.lock();
        slot.generation = slot.generation.wrapping_add(1);
        match slot.pending.take() {
            Some(handle) => {
                handle.abort();
                debug!("Retry timer disarmed");
                true
            }
            None => false,
        }
    }

    #[inline]
    pub fn is_armed(&self) -> bool {
        self.slot.lock().pending.is_some()
    }
}

impl Drop for BackoffScheduler {
    fn drop(&mut self) {
        self.disarm();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn arm_counter(scheduler: &BackoffScheduler, delay: Duration, counter: &Arc<AtomicUsize>) {
        let counter = Arc::clone(counter);
        scheduler.arm(delay, move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
        });
    }

    #[test]
    fn test_delay_calculation() {
        let initial = Duration::from_millis(1000);
        let max = Duration::from_millis(30000);

        assert_eq!(backoff_delay(0, initial, max), Duration::from_millis(1000));
        assert_eq!(backoff_delay(1, initial, max), Duration::from_millis(2000));
        assert_eq!(backoff_delay(2, initial, max), Duration::from_millis(4000));
        assert_eq!(backoff_delay(3, initial, max), Duration::from_millis(8000));
        assert_eq!(backoff_delay(4, initial, max), Duration::from_millis(16000));
        assert_eq!(backoff_delay(5, initial, max), Duration::from_millis(30000));
    }

    #[test]
    fn test_delay_is_monotonic_and_capped() {
        let initial = Duration::from_millis(250);
        let max = Duration::from_secs(30);

        let mut previous = Duration::ZERO;
        for attempt in 0..200 {
            let delay = backoff_delay(attempt, initial, max);
            assert!(delay >= previous);
            assert!(delay <= max);
            let expected = (250u128 << attempt.min(100)).min(30_000);
            assert_eq!(delay.as_millis(), expected);
            previous = delay;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_armed_timer_fires_once() {
        let scheduler = BackoffScheduler::new(Duration::from_millis(1000), Duration::from_secs(30));
        let fired = Arc::new(AtomicUsize::new(0));

        arm_counter(&scheduler, Duration::from_millis(1000), &fired);
        assert!(scheduler.is_armed());

        tokio::time::sleep(Duration::from_millis(999)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(!scheduler.is_armed());

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearm_replaces_previous_timer() {
        let scheduler = BackoffScheduler::new(Duration::from_millis(1000), Duration::from_secs(30));
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        arm_counter(&scheduler, Duration::from_millis(500), &first);
        arm_counter(&scheduler, Duration::from_millis(2000), &second);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disarm_is_idempotent() {
        let scheduler = BackoffScheduler::new(Duration::from_millis(1000), Duration::from_secs(30));
        let fired = Arc::new(AtomicUsize::new(0));

        assert!(!scheduler.disarm());

        arm_counter(&scheduler, Duration::from_millis(1000), &fired);
        assert!(scheduler.disarm());
        assert!(!scheduler.disarm());
        assert!(!scheduler.is_armed());

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_cancels_timer() {
        let fired = Arc::new(AtomicUsize::new(0));
        {
            let scheduler =
                BackoffScheduler::new(Duration::from_millis(1000), Duration::from_secs(30));
            arm_counter(&scheduler, Duration::from_millis(100), &fired);
        }

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }
}
