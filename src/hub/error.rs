//! Hub error types

use thiserror::Error;

/// Error type for hub operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum HubError {
    /// The control loop has stopped (shutdown or all handles dropped)
    #[error("hub is closed")]
    Closed,
}
