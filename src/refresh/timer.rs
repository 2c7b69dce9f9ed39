//! Refresh timer - One periodic task per running key
//!
//! Each timer is a spawned task selecting between its interval and a
//! cancellation token. Dropping the [`RefreshTimer`] cancels the task.

use std::time::Duration;

use tokio::runtime::Handle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::base::RefreshKey;

/// Longest period a ticker is armed with; longer intervals tick at this pace
pub(crate) const MAX_TICK_PERIOD: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Handle to a running per-key timer
pub(crate) struct RefreshTimer {
    interval: Duration,
    cancel_token: CancellationToken,
}

impl RefreshTimer {
    /// Spawns a timer whose first tick lands one full `interval` from now.
    ///
    /// `on_tick` receives the timer's token and returns false to end the loop.
    pub fn spawn<F>(runtime: &Handle, key: RefreshKey, interval: Duration, on_tick: F) -> Self
    where
        F: Fn(&CancellationToken) -> bool + Send + 'static,
    {
        let cancel_token = CancellationToken::new();
        let token = cancel_token.clone();
        let period = interval.min(MAX_TICK_PERIOD);

        // Read the runtime's clock so the phase starts at the moment of the call
        let start = {
            let _guard = runtime.enter();
            Instant::now() + period
        };

        runtime.spawn(async move {
            let mut ticker = tokio::time::interval_at(start, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => {
                        break;
                    }
                    _ = ticker.tick() => {
                        if !on_tick(&token) {
                            break;
                        }
                    }
                }
            }

            tracing::debug!("Refresh timer for '{}' exited", key);
        });

        Self {
            interval,
            cancel_token,
        }
    }

    /// Returns the requested interval, before any clamping of the ticker
    pub fn interval(&self) -> Duration {
        self.interval
    }
}

impl Drop for RefreshTimer {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn counting_timer(interval: Duration, counter: Arc<AtomicU32>) -> RefreshTimer {
        RefreshTimer::spawn(&Handle::current(), RefreshKey::Logging, interval, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            true
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_tick_waits_full_interval() {
        let counter = Arc::new(AtomicU32::new(0));
        let _timer = counting_timer(Duration::from_millis(100), counter.clone());

        tokio::time::sleep(Duration::from_millis(99)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(2)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticks_repeat() {
        let counter = Arc::new(AtomicU32::new(0));
        let timer = counting_timer(Duration::from_millis(100), counter.clone());

        tokio::time::sleep(Duration::from_millis(350)).await;

        assert_eq!(counter.load(Ordering::SeqCst), 3);
        assert_eq!(timer.interval(), Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_cancels_task() {
        let counter = Arc::new(AtomicU32::new(0));
        let timer = counting_timer(Duration::from_millis(100), counter.clone());

        tokio::time::sleep(Duration::from_millis(150)).await;
        drop(timer);
        tokio::time::sleep(Duration::from_millis(500)).await;

        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_on_tick_false_ends_loop() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();
        let _timer = RefreshTimer::spawn(
            &Handle::current(),
            RefreshKey::Gallery,
            Duration::from_millis(10),
            move |_| {
                counter_clone.fetch_add(1, Ordering::SeqCst);
                false
            },
        );

        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_huge_interval_is_clamped() {
        let counter = Arc::new(AtomicU32::new(0));
        let timer = counting_timer(Duration::MAX, counter.clone());

        tokio::time::sleep(Duration::from_secs(3600)).await;

        assert_eq!(counter.load(Ordering::SeqCst), 0);
        assert_eq!(timer.interval(), Duration::MAX);
    }
}
