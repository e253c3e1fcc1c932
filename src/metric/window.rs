//! Sliding-window sample storage
//!
//! Samples are kept in insertion order, so expiry pops from the front and the
//! most recent value is always at the back. Two samples recorded at the same
//! instant are both kept.

use std::collections::VecDeque;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// Window for the short rolling average
pub const SHORT_WINDOW: Duration = Duration::from_secs(10);

/// Window for the long rolling average
pub const LONG_WINDOW: Duration = Duration::from_secs(30);

/// Shortest period a background task ticks at
pub(crate) const MIN_INTERVAL: Duration = Duration::from_millis(10);

/// Sample retention and expiry cadence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowConfig {
    /// Samples older than this are purged (never less than `LONG_WINDOW`)
    pub retention: Duration,

    /// How often the expiry task runs
    pub expiry_interval: Duration,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            retention: LONG_WINDOW,
            expiry_interval: Duration::from_secs(15),
        }
    }
}

impl WindowConfig {
    /// Set retention, clamped so the long average always has its samples
    pub fn retention(mut self, retention: Duration) -> Self {
        self.retention = retention.max(LONG_WINDOW);
        self
    }

    /// Set the expiry interval
    pub fn expiry_interval(mut self, interval: Duration) -> Self {
        self.expiry_interval = interval;
        self
    }
}

/// Derived view of a metric: last value plus two rolling averages
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricSnapshot {
    /// Value of the most recent sample (0 when empty)
    pub last: f64,

    /// Mean of samples younger than 10s, two decimals
    #[serde(rename = "10s")]
    pub avg_10s: f64,

    /// Mean of samples younger than 30s, two decimals
    #[serde(rename = "30s")]
    pub avg_30s: f64,
}

#[derive(Debug, Clone, Copy)]
struct Sample {
    at: Instant,
    value: f64,
}

#[derive(Debug, Default)]
struct Average {
    sum: f64,
    count: usize,
}

impl Average {
    fn add(&mut self, value: f64) {
        self.sum += value;
        self.count += 1;
    }

    fn result(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }

        round2(self.sum / self.count as f64)
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Time-ordered samples for one metric
#[derive(Debug, Clone, Default)]
pub struct SampleWindow {
    samples: VecDeque<Sample>,
}

impl SampleWindow {
    /// Create an empty window
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `value` observed at `at`
    ///
    /// Out-of-order timestamps are placed after every sample not newer than
    /// them, so the deque stays sorted.
    pub fn record(&mut self, at: Instant, value: f64) {
        let sample = Sample { at, value };

        match self.samples.back() {
            Some(last) if last.at > at => {
                let index = self.samples.partition_point(|s| s.at <= at);
                self.samples.insert(index, sample);
            }
            _ => self.samples.push_back(sample),
        }
    }

    /// Drop samples older than `retention`, returning how many went
    pub fn purge_older_than(&mut self, now: Instant, retention: Duration) -> usize {
        let before = self.samples.len();

        while let Some(front) = self.samples.front() {
            if now.saturating_duration_since(front.at) > retention {
                self.samples.pop_front();
            } else {
                break;
            }
        }

        before - self.samples.len()
    }

    /// Compute last value and rolling averages as of `now`
    pub fn snapshot(&self, now: Instant) -> MetricSnapshot {
        let mut short = Average::default();
        let mut long = Average::default();

        // Newest first; everything past the long window is older still
        for sample in self.samples.iter().rev() {
            let age = now.saturating_duration_since(sample.at);
            if age >= LONG_WINDOW {
                break;
            }
            if age < SHORT_WINDOW {
                short.add(sample.value);
            }
            long.add(sample.value);
        }

        MetricSnapshot {
            last: self.samples.back().map_or(0.0, |s| s.value),
            avg_10s: short.result(),
            avg_30s: long.result(),
        }
    }

    /// Number of stored samples
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether no samples are stored
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}
