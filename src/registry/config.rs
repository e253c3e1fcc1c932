//! Registry configuration

use std::time::Duration;

use crate::hub::HubConfig;
use crate::metric::WindowConfig;

/// Registry configuration options
#[derive(Debug, Clone, PartialEq)]
pub struct RegistryConfig {
    /// Metric names every device records; updates for other names are dropped
    pub metrics: Vec<String>,

    /// Expected metadata keys (others are still stored)
    pub metadata: Vec<String>,

    /// How often idle devices are swept
    pub sweep_interval: Duration,

    /// A device with no update for longer than this and no subscribers is evicted
    pub idle_timeout: Duration,

    /// Sample retention for each metric
    pub window: WindowConfig,

    /// Fan-out settings for each device hub
    pub hub: HubConfig,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            metrics: Vec::new(),
            metadata: Vec::new(),
            sweep_interval: Duration::from_secs(15),
            idle_timeout: Duration::from_secs(60),
            window: WindowConfig::default(),
            hub: HubConfig::default(),
        }
    }
}

impl RegistryConfig {
    /// Create a config recording the given metric names
    pub fn new<I, S>(metrics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            metrics: metrics.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    /// Set the expected metadata keys
    pub fn metadata<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.metadata = keys.into_iter().map(Into::into).collect();
        self
    }

    /// Set the sweep interval
    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Set the idle timeout
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Set metric window settings
    pub fn window(mut self, window: WindowConfig) -> Self {
        self.window = window;
        self
    }

    /// Set hub settings
    pub fn hub(mut self, hub: HubConfig) -> Self {
        self.hub = hub;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RegistryConfig::default();

        assert!(config.metrics.is_empty());
        assert_eq!(config.sweep_interval, Duration::from_secs(15));
        assert_eq!(config.idle_timeout, Duration::from_secs(60));
        assert_eq!(config.window, WindowConfig::default());
        assert_eq!(config.hub.feed_capacity, 1);
    }

    #[test]
    fn test_builder_chaining() {
        let config = RegistryConfig::new(["temp", "humidity"])
            .metadata(["name"])
            .sweep_interval(Duration::from_secs(5))
            .idle_timeout(Duration::from_secs(20))
            .hub(HubConfig::default().feed_capacity(4));

        assert_eq!(config.metrics, vec!["temp", "humidity"]);
        assert_eq!(config.metadata, vec!["name"]);
        assert_eq!(config.sweep_interval, Duration::from_secs(5));
        assert_eq!(config.idle_timeout, Duration::from_secs(20));
        assert_eq!(config.hub.feed_capacity, 4);
    }
}
