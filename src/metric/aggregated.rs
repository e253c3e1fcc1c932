//! Aggregated metric with background sample expiry

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::window::{MetricSnapshot, SampleWindow, WindowConfig, LONG_WINDOW, MIN_INTERVAL};

/// Records values for one metric and reports last value and rolling averages
///
/// Each instance owns a background task that purges expired samples every
/// `WindowConfig::expiry_interval`. The task stops on `stop()` or when the
/// metric is dropped.
pub struct AggregatedMetric {
    window: Arc<Mutex<SampleWindow>>,
    expiry: JoinHandle<()>,
}

impl AggregatedMetric {
    /// Create a metric with default retention and expiry interval
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new() -> Self {
        Self::with_config(WindowConfig::default())
    }

    /// Create a metric and spawn its expiry task
    pub fn with_config(config: WindowConfig) -> Self {
        let window = Arc::new(Mutex::new(SampleWindow::new()));
        let expiry = tokio::spawn(expire(Arc::clone(&window), config));

        Self { window, expiry }
    }

    /// Record `value` at the current time
    pub fn update(&self, value: f64) {
        lock(&self.window).record(Instant::now(), value);
    }

    /// Last value and rolling averages over the current samples
    pub fn snapshot(&self) -> MetricSnapshot {
        lock(&self.window).snapshot(Instant::now())
    }

    /// Number of samples currently held
    pub fn sample_count(&self) -> usize {
        lock(&self.window).len()
    }

    /// Stop the expiry task
    pub fn stop(&self) {
        self.expiry.abort();
    }

    /// Whether the expiry task has finished
    pub fn is_stopped(&self) -> bool {
        self.expiry.is_finished()
    }
}

impl Default for AggregatedMetric {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for AggregatedMetric {
    fn drop(&mut self) {
        self.expiry.abort();
    }
}

impl std::fmt::Debug for AggregatedMetric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AggregatedMetric")
            .field("samples", &self.sample_count())
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

// A panic while holding the lock cannot leave the deque half-updated
fn lock(window: &Mutex<SampleWindow>) -> MutexGuard<'_, SampleWindow> {
    window.lock().unwrap_or_else(PoisonError::into_inner)
}

async fn expire(window: Arc<Mutex<SampleWindow>>, config: WindowConfig) {
    let retention = config.retention.max(LONG_WINDOW);
    let mut ticker = tokio::time::interval(config.expiry_interval.max(MIN_INTERVAL));

    loop {
        ticker.tick().await;

        let purged = lock(&window).purge_older_than(Instant::now(), retention);
        if purged > 0 {
            tracing::trace!(purged = purged, "Expired metric samples");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::time::sleep;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_empty_metric_snapshot() {
        let metric = AggregatedMetric::new();

        assert_eq!(metric.snapshot(), MetricSnapshot::default());
    }

    #[tokio::test(start_paused = true)]
    async fn test_recent_values() {
        let metric = AggregatedMetric::new();

        metric.update(1.0);
        sleep(Duration::from_secs(1)).await;
        metric.update(2.0);
        sleep(Duration::from_secs(1)).await;
        metric.update(3.0);
        sleep(Duration::from_secs(2)).await;

        let snapshot = metric.snapshot();
        assert_eq!(snapshot.last, 3.0);
        assert_eq!(snapshot.avg_10s, 2.0);
        assert_eq!(snapshot.avg_30s, 2.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rapid_updates_all_counted() {
        let metric = AggregatedMetric::new();

        metric.update(1.0);
        metric.update(3.0);

        assert_eq!(metric.sample_count(), 2);
        assert_eq!(metric.snapshot().avg_10s, 2.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_old_sample_excluded_then_expired() {
        let metric = AggregatedMetric::new();
        metric.update(5.0);

        sleep(Duration::from_secs(40)).await;

        // Past both windows, but the expiry task has not run since it aged out
        let snapshot = metric.snapshot();
        assert_eq!(snapshot.avg_10s, 0.0);
        assert_eq!(snapshot.avg_30s, 0.0);
        assert_eq!(metric.sample_count(), 1);

        // Next expiry tick at 45s
        sleep(Duration::from_secs(6)).await;
        assert_eq!(metric.sample_count(), 0);
        assert_eq!(metric.snapshot(), MetricSnapshot::default());
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_window_fields_set_directly() {
        let metric = AggregatedMetric::with_config(WindowConfig {
            retention: Duration::ZERO,
            expiry_interval: Duration::ZERO,
        });
        metric.update(5.0);

        sleep(Duration::from_secs(1)).await;
        assert!(!metric.is_stopped());
        assert_eq!(metric.sample_count(), 1);

        sleep(Duration::from_secs(30)).await;
        assert_eq!(metric.sample_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_halts_expiry() {
        let metric = AggregatedMetric::new();
        metric.update(5.0);

        metric.stop();
        sleep(Duration::from_secs(60)).await;

        assert!(metric.is_stopped());
        assert_eq!(metric.sample_count(), 1);
    }
}
