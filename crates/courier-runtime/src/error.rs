//! Runtime error types.

use thiserror::Error;

use crate::config::ConfigError;
use courier_core::CoreError;

/// Errors that can occur while configuring or building a kernel.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Configuration could not be loaded or is invalid.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The packer could not be built from the configuration.
    #[error("Packer error: {0}")]
    Packer(CoreError),

    /// A global middleware entry names nothing in the registry.
    #[error("Global middleware '{0}' is not registered")]
    UnknownMiddleware(String),
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
