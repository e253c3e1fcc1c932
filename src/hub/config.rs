//! Hub configuration

/// Hub configuration options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HubConfig {
    /// Payloads buffered per subscriber before delivery waits on it
    pub feed_capacity: usize,

    /// Pending control messages before callers wait on the control loop
    pub command_capacity: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            feed_capacity: 1,
            command_capacity: 64,
        }
    }
}

impl HubConfig {
    /// Set the per-subscriber feed capacity (minimum 1)
    pub fn feed_capacity(mut self, capacity: usize) -> Self {
        self.feed_capacity = capacity.max(1);
        self
    }

    /// Set the control channel capacity (minimum 1)
    pub fn command_capacity(mut self, capacity: usize) -> Self {
        self.command_capacity = capacity.max(1);
        self
    }
}
