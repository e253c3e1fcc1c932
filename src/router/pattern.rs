//! Topic patterns with a device placeholder
//!
//! A pattern such as `sensors/{DEVICE}/state` compiles to an anchored regex
//! that captures the device identifier from an inbound topic. A level that is
//! exactly `+` matches any single topic level. Multi-level `#` wildcards are
//! rejected.

use regex::Regex;

use crate::config::ConfigError;

/// Placeholder marking where the device identifier sits in a topic
pub const DEVICE_PLACEHOLDER: &str = "{DEVICE}";

const MULTI_LEVEL_WILDCARD: char = '#';
const SINGLE_LEVEL_WILDCARD: &str = "+";

/// Characters accepted in a device identifier (ASCII only)
const DEVICE_ID: &str = r"([A-Za-z0-9_-]+)";

/// Compiled topic pattern
#[derive(Debug, Clone)]
pub struct TopicPattern {
    pattern: String,
    prefix: String,
    matcher: Regex,
}

impl TopicPattern {
    /// Validate and compile `pattern`
    pub fn parse(pattern: &str) -> Result<Self, ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: reason.to_string(),
        };

        if pattern.contains(MULTI_LEVEL_WILDCARD) {
            return Err(invalid("multi-level wildcard '#' is not supported"));
        }

        let (prefix, suffix) = match pattern.matches(DEVICE_PLACEHOLDER).count() {
            0 => return Err(invalid("missing {DEVICE} placeholder")),
            1 => pattern
                .split_once(DEVICE_PLACEHOLDER)
                .ok_or_else(|| invalid("missing {DEVICE} placeholder"))?,
            _ => return Err(invalid("more than one {DEVICE} placeholder")),
        };

        let expression = format!("^{}{}{}$", levels(prefix), DEVICE_ID, levels(suffix));
        let matcher = Regex::new(&expression)?;

        Ok(Self {
            pattern: pattern.to_string(),
            prefix: prefix.to_string(),
            matcher,
        })
    }

    /// Extract the device identifier if `topic` matches
    pub fn device_id<'t>(&self, topic: &'t str) -> Option<&'t str> {
        self.matcher
            .captures(topic)
            .and_then(|captures| captures.get(1))
            .map(|m| m.as_str())
    }

    /// Broker subscription covering every topic this pattern can match
    ///
    /// Brokers allow nothing after `#`, so the filter is the text before the
    /// placeholder followed by `#`.
    pub fn subscription_filter(&self) -> String {
        format!("{}{}", self.prefix, MULTI_LEVEL_WILDCARD)
    }

    /// The pattern as configured
    pub fn as_str(&self) -> &str {
        &self.pattern
    }
}

/// Regex for literal topic text, with `+` levels as single-level wildcards
fn levels(text: &str) -> String {
    text.split('/')
        .map(|level| {
            if level == SINGLE_LEVEL_WILDCARD {
                "[^/]+".to_string()
            } else {
                regex::escape(level)
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}
