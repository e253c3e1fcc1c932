//! Device registry implementation
//!
//! The central registry that owns every device, applies updates and pushes
//! the resulting snapshots to subscribers.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use bytes::Bytes;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::hub::Subscription;
use crate::metric::window::MIN_INTERVAL;

use super::config::RegistryConfig;
use super::entry::{Device, DeviceLease, DeviceStats};
use super::error::RegistryError;
use super::payload::Updates;

/// Central registry for all known devices
///
/// The device map is the only structure behind a registry-wide lock, and that
/// lock is held for lookup, insert and removal only. Metric recording and
/// snapshot delivery happen on the device itself, so different devices never
/// wait on each other.
pub struct DeviceRegistry {
    /// Map of device ID to device entry
    devices: Mutex<HashMap<String, Arc<Device>>>,

    /// Metadata keys listed in configuration
    known_metadata: HashSet<String>,

    /// Periodic idle sweep, if running
    sweeper: StdMutex<Option<JoinHandle<()>>>,

    closed: AtomicBool,

    /// Configuration
    config: RegistryConfig,
}

impl DeviceRegistry {
    /// Create a registry without starting the idle sweep
    pub fn with_config(config: RegistryConfig) -> Self {
        Self {
            devices: Mutex::new(HashMap::new()),
            known_metadata: config.metadata.iter().cloned().collect(),
            sweeper: StdMutex::new(None),
            closed: AtomicBool::new(false),
            config,
        }
    }

    /// Create a registry and start its idle sweep
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(config: RegistryConfig) -> Arc<Self> {
        let registry = Arc::new(Self::with_config(config));
        registry.spawn_sweep_task();
        registry
    }

    /// Get the registry configuration
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Apply `updates` to a device and publish its new snapshot
    ///
    /// Creates the device on first sight. Metric names outside the configured
    /// set are dropped; metadata is always stored. Returns once every
    /// subscriber of the device has accepted the snapshot.
    pub async fn update(&self, device_id: &str, updates: Updates) -> Result<(), RegistryError> {
        let device = self.acquire(device_id).await?;
        let mut state = device.state.lock().await;

        for key in updates.metadata.keys() {
            if !self.known_metadata.contains(key) {
                tracing::debug!(device = %device_id, key = %key, "Recording unlisted metadata key");
            }
        }

        let dropped = device.apply(&mut state, updates);

        let started = Instant::now();
        let payload = match device.snapshot(&state).to_bytes() {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!(device = %device_id, error = %e, "Failed to serialize snapshot");
                return Ok(());
            }
        };

        tracing::trace!(
            device = %device_id,
            dropped_metrics = dropped,
            bytes = payload.len(),
            serialize_us = started.elapsed().as_micros() as u64,
            "Publishing snapshot"
        );

        if device.hub.publish(payload).await.is_err() {
            tracing::debug!(device = %device_id, "Snapshot not delivered, hub closed");
        }

        Ok(())
    }

    /// Subscribe to a device's snapshots
    ///
    /// Creates the device if it is unknown. A subscribed device is never
    /// swept, so it lives at least until the subscription is released.
    pub async fn subscribe(&self, device_id: &str) -> Result<Subscription<Bytes>, RegistryError> {
        let device = self.acquire(device_id).await?;
        let subscription = device
            .hub
            .subscribe()
            .await
            .map_err(|_| RegistryError::Closed)?;

        tracing::debug!(
            device = %device_id,
            subscriber = %subscription.id(),
            subscribers = device.subscriber_count(),
            "Client subscribed"
        );

        Ok(subscription)
    }

    /// Stop delivering to `subscription` and close it
    ///
    /// An unknown device is created (and later swept) rather than treated as
    /// an error. After shutdown every feed is already closed and this does
    /// nothing.
    pub async fn unsubscribe(&self, device_id: &str, subscription: &Subscription<Bytes>) {
        let Ok(device) = self.acquire(device_id).await else {
            return;
        };

        device.hub.unsubscribe(subscription).await;

        tracing::debug!(
            device = %device_id,
            subscriber = %subscription.id(),
            subscribers = device.subscriber_count(),
            "Client unsubscribed"
        );
    }

    /// Check if a device is currently registered
    pub async fn contains(&self, device_id: &str) -> bool {
        self.devices.lock().await.contains_key(device_id)
    }

    /// Get total number of devices
    pub async fn device_count(&self) -> usize {
        self.devices.lock().await.len()
    }

    /// Get device statistics
    pub async fn device_stats(&self, device_id: &str) -> Option<DeviceStats> {
        let device = self.devices.lock().await.get(device_id).cloned()?;
        Some(device.stats())
    }

    /// Run one idle sweep, returning how many devices were evicted
    ///
    /// Evicts devices that have not been updated for longer than
    /// `idle_timeout` and have no subscribers. Their metric expiry tasks are
    /// stopped and their hubs closed.
    pub async fn sweep(&self) -> usize {
        let now = Instant::now();

        let evicted: Vec<(String, Arc<Device>)> = {
            let mut devices = self.devices.lock().await;

            let idle: Vec<String> = devices
                .iter()
                .filter(|(_, device)| device.is_idle(now, self.config.idle_timeout))
                .map(|(id, _)| id.clone())
                .collect();

            idle.into_iter()
                .filter_map(|id| devices.remove(&id).map(|device| (id, device)))
                .collect()
        };

        for (id, device) in &evicted {
            device.retire().await;
            tracing::info!(device = %id, "Removed stale device");
        }

        evicted.len()
    }

    /// Spawn the background sweep task
    ///
    /// The task holds only a weak reference, so it ends by itself once the
    /// registry is dropped. Spawning again replaces the previous task.
    pub fn spawn_sweep_task(self: &Arc<Self>) {
        let registry = Arc::downgrade(self);
        let interval = self.config.sweep_interval.max(MIN_INTERVAL);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let Some(registry) = registry.upgrade() else {
                    break;
                };
                registry.sweep().await;
            }
        });

        let previous = self
            .sweeper
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(handle);
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    /// Stop the sweep and close every device's hub
    ///
    /// Every open subscription observes the end of its feed. Later updates and
    /// subscribes fail with `RegistryError::Closed`. Safe to call more than once.
    pub async fn shutdown(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        let sweeper = self
            .sweeper
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(sweeper) = sweeper {
            sweeper.abort();
        }

        let devices: Vec<(String, Arc<Device>)> = self.devices.lock().await.drain().collect();
        for (_, device) in &devices {
            device.retire().await;
        }

        tracing::info!(devices = devices.len(), "Device registry shut down");
    }

    /// Whether `shutdown` has been called
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Look up or create a device and lease it for one operation
    async fn acquire(&self, device_id: &str) -> Result<DeviceLease, RegistryError> {
        let mut devices = self.devices.lock().await;

        // Checked under the map lock so nothing is inserted after shutdown drains it
        if self.is_closed() {
            return Err(RegistryError::Closed);
        }

        let device = devices.entry(device_id.to_string()).or_insert_with(|| {
            tracing::info!(device = %device_id, "Registered new device");
            Arc::new(Device::new(&self.config))
        });

        Ok(DeviceLease::new(device))
    }
}

impl Drop for DeviceRegistry {
    fn drop(&mut self) {
        if let Some(sweeper) = self
            .sweeper
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            sweeper.abort();
        }
    }
}
