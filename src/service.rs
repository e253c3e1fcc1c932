//! Telemetry hub service
//!
//! Ties the device registry to the topic router. A transport (an MQTT client,
//! a test harness, stdin) feeds `InboundMessage`s in; streaming clients
//! subscribe per device and receive JSON snapshots.

use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::config::HubSettings;
use crate::error::Result;
use crate::hub::Subscription;
use crate::registry::{DeviceRegistry, RegistryConfig};
use crate::router::TopicRouter;

/// One message received from the broker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub body: Bytes,
}

impl InboundMessage {
    pub fn new(topic: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Self {
            topic: topic.into(),
            body: body.into(),
        }
    }
}

/// Registry plus router
pub struct TelemetryHub {
    registry: Arc<DeviceRegistry>,
    router: TopicRouter,
}

impl TelemetryHub {
    /// Start a hub from an already built registry config and router
    ///
    /// Starts the idle sweep, so must be called from within a Tokio runtime.
    pub fn new(config: RegistryConfig, router: TopicRouter) -> Self {
        Self {
            registry: DeviceRegistry::start(config),
            router,
        }
    }

    /// Start a hub from validated settings
    pub fn from_settings(settings: &HubSettings) -> Result<Self> {
        let router = settings.router()?;
        Ok(Self::new(settings.registry_config(), router))
    }

    /// Load settings from a YAML file and start a hub
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let settings = HubSettings::from_file(path)?;
        Self::from_settings(&settings)
    }

    /// Get a reference to the device registry
    pub fn registry(&self) -> &Arc<DeviceRegistry> {
        &self.registry
    }

    /// Get a reference to the topic router
    pub fn router(&self) -> &TopicRouter {
        &self.router
    }

    /// Route one message into the registry
    ///
    /// Returns whether the message produced a device update.
    pub async fn ingest(&self, topic: &str, body: &[u8]) -> Result<bool> {
        Ok(self.router.dispatch(&self.registry, topic, body).await?)
    }

    /// Subscribe to a device's snapshots
    pub async fn subscribe(&self, device_id: &str) -> Result<Subscription<Bytes>> {
        Ok(self.registry.subscribe(device_id).await?)
    }

    /// Release a subscription
    pub async fn unsubscribe(&self, device_id: &str, subscription: &Subscription<Bytes>) {
        self.registry.unsubscribe(device_id, subscription).await;
    }

    /// Ingest messages until `shutdown` completes or the sender side closes
    ///
    /// The registry is shut down on return, closing every subscription.
    pub async fn run_until<F>(
        &self,
        mut messages: mpsc::Receiver<InboundMessage>,
        shutdown: F,
    ) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let config = self.registry.config();
        tracing::info!(
            filters = ?self.router.subscription_filters(),
            metrics = config.metrics.len(),
            idle_timeout_secs = config.idle_timeout.as_secs(),
            "Telemetry hub running"
        );

        let result = tokio::select! {
            _ = shutdown => {
                tracing::info!("Shutdown signal received");
                Ok(())
            }
            result = self.ingest_loop(&mut messages) => result,
        };

        self.registry.shutdown().await;

        result
    }

    async fn ingest_loop(&self, messages: &mut mpsc::Receiver<InboundMessage>) -> Result<()> {
        while let Some(message) = messages.recv().await {
            self.ingest(&message.topic, &message.body).await?;
        }

        tracing::info!("Inbound message stream ended");
        Ok(())
    }

    /// Close every subscription and stop background tasks
    pub async fn shutdown(&self) {
        self.registry.shutdown().await;
    }
}
