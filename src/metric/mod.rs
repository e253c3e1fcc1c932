//! Time-windowed metric aggregation
//!
//! - `SampleWindow`: pure storage of timestamped samples with expiry and
//!   last/average computation
//! - `AggregatedMetric`: a thread-safe window plus the periodic task that
//!   purges samples past retention

pub mod aggregated;
pub mod window;

pub use aggregated::AggregatedMetric;
pub use window::{MetricSnapshot, SampleWindow, WindowConfig, LONG_WINDOW, SHORT_WINDOW};
