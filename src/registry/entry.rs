//! Device entry and state types
//!
//! This module defines the per-device state stored in the registry.

use std::collections::BTreeMap;
use std::ops::Deref;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::hub::Hub;
use crate::metric::AggregatedMetric;

use super::config::RegistryConfig;
use super::payload::{DeviceSnapshot, Updates};

/// Mutable part of a device, guarded per device
#[derive(Debug, Default)]
pub(super) struct DeviceState {
    /// Latest value for each metadata key
    pub(super) metadata: BTreeMap<String, String>,

    /// When the last update was applied (None if never updated)
    pub(super) last_update: Option<Instant>,
}

/// Entry for a single device in the registry
pub struct Device {
    /// Fan-out of serialized snapshots to this device's subscribers
    pub(super) hub: Hub<Bytes>,

    /// One aggregated metric per configured metric name
    pub(super) metrics: BTreeMap<String, AggregatedMetric>,

    /// Held across apply, serialize and publish so snapshots go out in update order
    pub(super) state: Mutex<DeviceState>,

    /// Registry operations currently holding this device
    leases: AtomicUsize,

    /// When the device was registered
    created_at: Instant,
}

impl Device {
    /// Create a new device entry
    pub(super) fn new(config: &RegistryConfig) -> Self {
        let metrics = config
            .metrics
            .iter()
            .map(|name| (name.clone(), AggregatedMetric::with_config(config.window)))
            .collect();

        Self {
            hub: Hub::with_config(config.hub),
            metrics,
            state: Mutex::new(DeviceState::default()),
            leases: AtomicUsize::new(0),
            created_at: Instant::now(),
        }
    }

    /// Get the number of subscribers
    pub fn subscriber_count(&self) -> usize {
        self.hub.active_subscribers()
    }

    /// Apply `updates`, returning how many metric values were dropped
    pub(super) fn apply(&self, state: &mut DeviceState, updates: Updates) -> usize {
        state.last_update = Some(Instant::now());

        let mut dropped = 0;
        for (name, value) in updates.metrics {
            if !value.is_finite() {
                tracing::trace!(metric = %name, value = value, "Dropping non-finite metric value");
                dropped += 1;
                continue;
            }

            match self.metrics.get(&name) {
                Some(metric) => metric.update(value),
                None => {
                    tracing::trace!(metric = %name, "Dropping unrecognised metric");
                    dropped += 1;
                }
            }
        }

        state.metadata.extend(updates.metadata);

        dropped
    }

    /// Build the full snapshot pushed to subscribers
    pub(super) fn snapshot(&self, state: &DeviceState) -> DeviceSnapshot {
        DeviceSnapshot {
            metadata: state.metadata.clone(),
            metrics: self
                .metrics
                .iter()
                .map(|(name, metric)| (name.clone(), metric.snapshot()))
                .collect(),
        }
    }

    /// Whether the device can be evicted
    ///
    /// Requires no update for longer than `idle_timeout`, no subscribers and no
    /// registry operation in progress. A device that is busy right now is
    /// never idle.
    pub(super) fn is_idle(&self, now: Instant, idle_timeout: Duration) -> bool {
        if self.leases.load(Ordering::Acquire) > 0 || self.subscriber_count() > 0 {
            return false;
        }

        let Ok(state) = self.state.try_lock() else {
            return false;
        };

        match state.last_update {
            Some(at) => now.saturating_duration_since(at) > idle_timeout,
            None => true,
        }
    }

    /// Stop every metric's expiry task and close the hub
    pub(super) async fn retire(&self) {
        for metric in self.metrics.values() {
            metric.stop();
        }
        self.hub.shutdown().await;
    }

    /// Collect statistics for this device
    ///
    /// Never waits on the device lock. While an update holds it (possibly
    /// stalled on a slow subscriber) the metadata count is unknown and the
    /// device reports zero idle time.
    pub(super) fn stats(&self) -> DeviceStats {
        let (metadata_keys, idle_for) = match self.state.try_lock() {
            Ok(state) => (
                Some(state.metadata.len()),
                state.last_update.map(|at| at.elapsed()),
            ),
            Err(_) => (None, Some(Duration::ZERO)),
        };

        DeviceStats {
            subscriber_count: self.subscriber_count(),
            metadata_keys,
            samples: self.metrics.values().map(AggregatedMetric::sample_count).sum(),
            idle_for,
            age: self.created_at.elapsed(),
        }
    }
}

/// Device held by an in-progress registry operation
///
/// While any lease is alive the sweep leaves the device alone, so an update or
/// subscribe never lands on an entry that was just evicted.
pub(super) struct DeviceLease(Arc<Device>);

impl DeviceLease {
    /// Take a lease; call with the device map locked
    pub(super) fn new(device: &Arc<Device>) -> Self {
        device.leases.fetch_add(1, Ordering::AcqRel);
        Self(Arc::clone(device))
    }
}

impl Deref for DeviceLease {
    type Target = Device;

    fn deref(&self) -> &Device {
        &self.0
    }
}

impl Drop for DeviceLease {
    fn drop(&mut self) {
        self.0.leases.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Statistics for a device
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceStats {
    /// Number of active subscribers
    pub subscriber_count: usize,
    /// Number of metadata keys recorded (None while an update is in progress)
    pub metadata_keys: Option<usize>,
    /// Samples held across all metrics
    pub samples: usize,
    /// Time since the last update (None if never updated)
    pub idle_for: Option<Duration>,
    /// Time since the device was registered
    pub age: Duration,
}
