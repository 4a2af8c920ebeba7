//! Runtime error types.

use thiserror::Error;

use bronze_core::{ApiError, TransportError};
use bronze_framework::{EventRegisterError, RegisterError};

use crate::config::ConfigError;

/// Errors that can occur while building or running a bot.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Configuration could not be loaded or failed validation.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The receiver stopped with an unrecoverable error.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// A command could not be registered.
    #[error("command registration failed: {0}")]
    Register(#[from] RegisterError),

    /// An event handler could not be registered.
    #[error("event handler registration failed: {0}")]
    EventRegister(#[from] EventRegisterError),

    /// An API call made by the runtime itself failed.
    #[error("API error: {0}")]
    Api(#[from] ApiError),

    /// The configuration needs a transport whose cargo feature is disabled.
    #[error("'{0}' support is not compiled in (enable the matching feature)")]
    MissingCapability(&'static str),

    /// A runtime task ended abnormally.
    #[error("task failed: {0}")]
    Task(String),
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
