//! Update and snapshot payload types
//!
//! `Updates` is what the ingestion side hands to the registry. `DeviceSnapshot`
//! is what every subscriber receives, serialized as JSON, after each update.

use std::collections::{BTreeMap, HashMap};

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::metric::MetricSnapshot;

/// Field values for one device, consumed by `DeviceRegistry::update`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Updates {
    /// Metric name to new sample value
    pub metrics: HashMap<String, f64>,
    /// Metadata key to new value
    pub metadata: HashMap<String, String>,
}

impl Updates {
    /// Create an empty update set
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a metric value
    pub fn metric(mut self, name: impl Into<String>, value: f64) -> Self {
        self.metrics.insert(name.into(), value);
        self
    }

    /// Add a metadata value
    pub fn meta(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Whether there is nothing to apply
    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty() && self.metadata.is_empty()
    }
}

/// Full state of a device as pushed to subscribers
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceSnapshot {
    pub metadata: BTreeMap<String, String>,
    pub metrics: BTreeMap<String, MetricSnapshot>,
}

impl DeviceSnapshot {
    /// Serialize to the wire payload
    pub fn to_bytes(&self) -> Result<Bytes, serde_json::Error> {
        serde_json::to_vec(self).map(Bytes::from)
    }

    /// Parse a wire payload
    pub fn from_slice(payload: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(payload)
    }
}
