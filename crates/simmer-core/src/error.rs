//! Core error types for simmer-core.
//!
//! Nothing in the engine is user-fatal. Notification failures degrade to
//! "the countdown still advances, only the background alert is missing";
//! these types exist so the degraded paths can be logged and tested rather
//! than silently lost.

use std::path::PathBuf;
use thiserror::Error;

/// Umbrella error type for simmer-core.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Notification subsystem errors
    #[error("Notification error: {0}")]
    Notify(#[from] NotifyError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The owning service task has shut down; queries can no longer be answered
    #[error("Timer service is no longer running")]
    ServiceStopped,

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Notification scheduling errors.
///
/// Never surfaced to operation callers: the service logs them and keeps the
/// countdown running without a background alert.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NotifyError {
    /// Notification permission is absent
    #[error("Notification permission denied")]
    PermissionDenied,

    /// Platform-level scheduling failure
    #[error("Notification scheduling failed: {0}")]
    Scheduling(String),
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Failed to parse configuration
    #[error("Failed to parse configuration: {0}")]
    ParseFailed(String),

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },
}

/// Result type alias for EngineError
pub type Result<T, E = EngineError> = std::result::Result<T, E>;
