//! Topic router
//!
//! Built once from configuration into an immutable table, then consulted for
//! every inbound message.

use std::collections::HashSet;

use serde_json::Value;

use crate::config::{ConfigError, TopicMapping};
use crate::registry::{DeviceRegistry, RegistryError, Updates};

use super::extract::{as_metadata, as_metric, lookup};
use super::pattern::TopicPattern;

/// Device updates extracted from one message
#[derive(Debug, Clone, PartialEq)]
pub struct RoutedUpdate {
    pub device_id: String,
    pub updates: Updates,
}

/// One compiled pattern and its field mappings
#[derive(Debug, Clone)]
struct Route {
    pattern: TopicPattern,
    /// (source path, target metric)
    metrics: Vec<(String, String)>,
    /// (source path, target metadata key)
    metadata: Vec<(String, String)>,
}

/// Maps inbound topic/body pairs to device updates
#[derive(Debug, Clone)]
pub struct TopicRouter {
    routes: Vec<Route>,
}

impl TopicRouter {
    /// Compile the configured mappings, in order
    ///
    /// Fails on any invalid or duplicated pattern.
    pub fn new(mappings: &[TopicMapping]) -> Result<Self, ConfigError> {
        let mut seen = HashSet::new();
        let mut routes = Vec::with_capacity(mappings.len());

        for mapping in mappings {
            if !seen.insert(mapping.pattern.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate topic pattern '{}'",
                    mapping.pattern
                )));
            }

            routes.push(Route {
                pattern: TopicPattern::parse(&mapping.pattern)?,
                metrics: mapping
                    .metrics
                    .iter()
                    .map(|(source, target)| (source.clone(), target.clone()))
                    .collect(),
                metadata: mapping
                    .metadata
                    .iter()
                    .map(|(source, target)| (source.clone(), target.clone()))
                    .collect(),
            });
        }

        Ok(Self { routes })
    }

    /// Number of configured patterns
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Whether no patterns are configured
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Broker subscriptions needed to receive every routable topic
    pub fn subscription_filters(&self) -> Vec<String> {
        let mut filters: Vec<String> = Vec::new();
        for route in &self.routes {
            let filter = route.pattern.subscription_filter();
            if !filters.contains(&filter) {
                filters.push(filter);
            }
        }
        filters
    }

    /// Extract a device update from one message
    ///
    /// Uses the first pattern matching `topic`. Returns `None` when nothing
    /// matches, the body is not JSON, or none of the mapped paths are present.
    pub fn route(&self, topic: &str, body: &[u8]) -> Option<RoutedUpdate> {
        let Some((route, device_id)) = self
            .routes
            .iter()
            .find_map(|route| route.pattern.device_id(topic).map(|id| (route, id)))
        else {
            tracing::trace!(topic = %topic, "No route for topic");
            return None;
        };

        let body: Value = match serde_json::from_slice(body) {
            Ok(body) => body,
            Err(e) => {
                tracing::debug!(topic = %topic, error = %e, "Ignoring message with invalid JSON body");
                return None;
            }
        };

        let mut updates = Updates::new();

        for (source, target) in &route.metrics {
            if let Some(value) = lookup(&body, source).and_then(as_metric) {
                updates.metrics.insert(target.clone(), value);
            }
        }

        for (source, target) in &route.metadata {
            if let Some(value) = lookup(&body, source).and_then(as_metadata) {
                updates.metadata.insert(target.clone(), value);
            }
        }

        if updates.is_empty() {
            tracing::trace!(topic = %topic, pattern = route.pattern.as_str(), "No mapped fields in message");
            return None;
        }

        Some(RoutedUpdate {
            device_id: device_id.to_string(),
            updates,
        })
    }

    /// Route a message and apply it to `registry`
    ///
    /// Returns whether an update was issued.
    pub async fn dispatch(
        &self,
        registry: &DeviceRegistry,
        topic: &str,
        body: &[u8],
    ) -> Result<bool, RegistryError> {
        match self.route(topic, body) {
            Some(routed) => {
                registry.update(&routed.device_id, routed.updates).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
