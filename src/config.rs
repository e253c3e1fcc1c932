//! File-based configuration
//!
//! Settings are loaded once at startup from YAML. Any invalid value is an
//! error; a process must not start with a routing table it cannot honour.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::hub::HubConfig;
use crate::metric::WindowConfig;
use crate::registry::RegistryConfig;
use crate::router::TopicRouter;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid topic pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("topic pattern regex error: {0}")]
    Regex(#[from] regex::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HubSettings {
    /// Device registry settings
    #[serde(default)]
    pub manager: ManagerSettings,

    /// Topic routing for the ingestion side
    #[serde(default)]
    pub router: RouterSettings,
}

/// Device registry settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagerSettings {
    /// Fields each device records
    #[serde(default)]
    pub fields: FieldSettings,

    /// Idle sweep interval (seconds)
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    /// Inactivity before a device without subscribers is evicted (seconds)
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,

    /// Metric sample expiry interval (seconds)
    #[serde(default = "default_expiry_interval")]
    pub expiry_interval_secs: u64,

    /// Metric sample retention (seconds)
    #[serde(default = "default_retention")]
    pub retention_secs: u64,

    /// Snapshots buffered per subscriber
    #[serde(default = "default_feed_capacity")]
    pub feed_capacity: usize,
}

fn default_sweep_interval() -> u64 {
    15
}

fn default_idle_timeout() -> u64 {
    60
}

fn default_expiry_interval() -> u64 {
    15
}

fn default_retention() -> u64 {
    30
}

fn default_feed_capacity() -> usize {
    1
}

impl Default for ManagerSettings {
    fn default() -> Self {
        Self {
            fields: FieldSettings::default(),
            sweep_interval_secs: default_sweep_interval(),
            idle_timeout_secs: default_idle_timeout(),
            expiry_interval_secs: default_expiry_interval(),
            retention_secs: default_retention(),
            feed_capacity: default_feed_capacity(),
        }
    }
}

/// Metric and metadata fields recorded per device
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FieldSettings {
    #[serde(default)]
    pub metrics: Vec<String>,

    #[serde(default)]
    pub metadata: Vec<String>,
}

/// Routing table settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RouterSettings {
    /// Patterns in match order
    #[serde(default)]
    pub topics: Vec<TopicMapping>,
}

/// One topic pattern and the body fields it maps
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TopicMapping {
    /// Topic with exactly one `{DEVICE}` placeholder
    pub pattern: String,

    /// Body path to metric name
    #[serde(default)]
    pub metrics: BTreeMap<String, String>,

    /// Body path to metadata key
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl HubSettings {
    /// Load and validate settings from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    /// Parse and validate settings from YAML text
    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        let settings: Self = serde_yaml::from_str(content)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Validate the settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        let manager = &self.manager;

        if manager.fields.metrics.is_empty() {
            return Err(ConfigError::Invalid("no metric fields configured".into()));
        }

        let mut names = HashSet::new();
        for name in &manager.fields.metrics {
            if !names.insert(name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate metric field '{}'",
                    name
                )));
            }
        }

        let intervals = [
            ("sweep_interval_secs", manager.sweep_interval_secs),
            ("idle_timeout_secs", manager.idle_timeout_secs),
            ("expiry_interval_secs", manager.expiry_interval_secs),
            ("retention_secs", manager.retention_secs),
        ];
        for (field, value) in intervals {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("{} must be positive", field)));
            }
        }

        if manager.feed_capacity == 0 {
            return Err(ConfigError::Invalid("feed_capacity must be positive".into()));
        }

        // Compiles every pattern; invalid or duplicated ones fail here
        TopicRouter::new(&self.router.topics)?;

        for topic in &self.router.topics {
            if topic.metrics.is_empty() && topic.metadata.is_empty() {
                tracing::warn!(pattern = %topic.pattern, "Topic maps no fields");
            }
            for target in topic.metrics.values() {
                if !names.contains(target.as_str()) {
                    tracing::warn!(
                        pattern = %topic.pattern,
                        metric = %target,
                        "Mapped metric is not a configured field and will be dropped"
                    );
                }
            }
        }

        Ok(())
    }

    /// Registry configuration derived from these settings
    pub fn registry_config(&self) -> RegistryConfig {
        let manager = &self.manager;

        RegistryConfig::new(manager.fields.metrics.iter().cloned())
            .metadata(manager.fields.metadata.iter().cloned())
            .sweep_interval(Duration::from_secs(manager.sweep_interval_secs))
            .idle_timeout(Duration::from_secs(manager.idle_timeout_secs))
            .window(
                WindowConfig::default()
                    .retention(Duration::from_secs(manager.retention_secs))
                    .expiry_interval(Duration::from_secs(manager.expiry_interval_secs)),
            )
            .hub(HubConfig::default().feed_capacity(manager.feed_capacity))
    }

    /// Compiled router for these settings
    pub fn router(&self) -> Result<TopicRouter, ConfigError> {
        TopicRouter::new(&self.router.topics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
manager:
  fields:
    metrics: [temp, humidity]
    metadata: [name]
  idle_timeout_secs: 120
  feed_capacity: 4
router:
  topics:
    - pattern: "sensors/{DEVICE}/state"
      metrics:
        env.temperature: temp
        env.humidity: humidity
      metadata:
        info.name: name
    - pattern: "legacy/{DEVICE}"
      metrics:
        t: temp
"#;

    #[test]
    fn test_parse_sample() {
        let settings = HubSettings::from_yaml_str(SAMPLE).unwrap();

        assert_eq!(settings.manager.fields.metrics, vec!["temp", "humidity"]);
        assert_eq!(settings.manager.fields.metadata, vec!["name"]);
        assert_eq!(settings.manager.idle_timeout_secs, 120);
        assert_eq!(settings.manager.sweep_interval_secs, 15);
        assert_eq!(settings.router.topics.len(), 2);
        assert_eq!(settings.router.topics[0].metrics["env.temperature"], "temp");
        assert_eq!(settings.router.topics[1].pattern, "legacy/{DEVICE}");
    }

    #[test]
    fn test_registry_config_from_settings() {
        let config = HubSettings::from_yaml_str(SAMPLE).unwrap().registry_config();

        assert_eq!(config.metrics, vec!["temp", "humidity"]);
        assert_eq!(config.idle_timeout, Duration::from_secs(120));
        assert_eq!(config.sweep_interval, Duration::from_secs(15));
        assert_eq!(config.window.retention, Duration::from_secs(30));
        assert_eq!(config.window.expiry_interval, Duration::from_secs(15));
        assert_eq!(config.hub.feed_capacity, 4);
    }

    #[test]
    fn test_router_from_settings() {
        let router = HubSettings::from_yaml_str(SAMPLE).unwrap().router().unwrap();

        assert_eq!(router.len(), 2);
        assert_eq!(router.subscription_filters(), vec!["sensors/#", "legacy/#"]);
    }

    #[test]
    fn test_missing_metrics_rejected() {
        let err = HubSettings::from_yaml_str("manager:\n  fields:\n    metadata: [name]\n")
            .unwrap_err();

        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_duplicate_metric_rejected() {
        let err = HubSettings::from_yaml_str("manager:\n  fields:\n    metrics: [a, a]\n")
            .unwrap_err();

        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn test_zero_interval_rejected() {
        let yaml = "manager:\n  fields:\n    metrics: [a]\n  sweep_interval_secs: 0\n";
        let err = HubSettings::from_yaml_str(yaml).unwrap_err();

        assert!(err.to_string().contains("sweep_interval_secs"));
    }

    #[test]
    fn test_wildcard_pattern_rejected() {
        let yaml = r#"
manager:
  fields:
    metrics: [temp]
router:
  topics:
    - pattern: "sensors/#"
      metrics: { t: temp }
"#;
        let err = HubSettings::from_yaml_str(yaml).unwrap_err();

        assert!(matches!(err, ConfigError::InvalidPattern { .. }));
    }

    #[test]
    fn test_malformed_yaml_rejected() {
        let err = HubSettings::from_yaml_str("manager: [unclosed").unwrap_err();

        assert!(matches!(err, ConfigError::Yaml(_)));
    }

    #[test]
    fn test_missing_file() {
        let err = HubSettings::from_file("/nonexistent/telemetry-hub.yaml").unwrap_err();

        assert!(matches!(err, ConfigError::Io(_)));
    }
}
