//! Error types

use thiserror::Error;

use crate::config::ConfigError;
use crate::hub::HubError;
use crate::registry::RegistryError;

/// Result type alias using the crate's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Hub(#[from] HubError),
}
