//! Real-time device telemetry hub
//!
//! Devices publish state on broker topics. The hub keeps, per device, the
//! latest metadata and a sliding window of samples for each configured
//! metric, and pushes a JSON snapshot to every live subscriber of that device
//! after each update.
//!
//! # Example
//!
//! ```no_run
//! use telemetry_hub::{TelemetryHub, DeviceSnapshot};
//!
//! #[tokio::main]
//! async fn main() -> telemetry_hub::Result<()> {
//!     let hub = TelemetryHub::from_file("telemetry-hub.yaml")?;
//!     let mut sub = hub.subscribe("porch-sensor").await?;
//!
//!     hub.ingest("sensors/porch-sensor/state", br#"{"temperature":21.5}"#).await?;
//!
//!     if let Some(payload) = sub.recv().await {
//!         if let Ok(snapshot) = DeviceSnapshot::from_slice(&payload) {
//!             println!("{:?}", snapshot.metrics);
//!         }
//!     }
//!
//!     hub.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod hub;
pub mod metric;
pub mod registry;
pub mod router;
pub mod service;

pub use config::{ConfigError, HubSettings, TopicMapping};
pub use error::{Error, Result};
pub use hub::{Hub, HubConfig, HubError, Subscription};
pub use metric::{AggregatedMetric, MetricSnapshot};
pub use registry::{DeviceRegistry, DeviceSnapshot, RegistryConfig, RegistryError, Updates};
pub use router::{RoutedUpdate, TopicRouter};
pub use service::{InboundMessage, TelemetryHub};
