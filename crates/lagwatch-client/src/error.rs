//! Client and configuration error types.

use std::time::Duration;

use thiserror::Error;

/// Result type alias for cluster client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors returned by a cluster client.
///
/// Errors are `Clone` because the failure counter keeps the most recent
/// one around after the snapshot that carried it is gone.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    #[error("connection failed: {0}")]
    Connect(String),

    #[error("broker error: {0}")]
    Broker(String),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("client is closed")]
    Closed,

    #[error("unsupported: {0}")]
    Unsupported(String),
}

/// Errors in the static connection configuration.
///
/// These are raised before any connection attempt is made.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid server address: {0}")]
    InvalidAddress(String),

    #[error("invalid port number: {0}")]
    InvalidPort(String),

    #[error("at least one seed broker is required")]
    NoSeedBrokers,

    #[error("invalid duration: {0}")]
    InvalidDuration(String),

    #[error("invalid {key}: {reason}")]
    InvalidValue { key: String, reason: String },

    #[error("failed to read config file {path}: {reason}")]
    File { path: String, reason: String },
}
