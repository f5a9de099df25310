//! Error types for the palisade authorization engine.

use thiserror::Error;

/// Main error type for palisade operations.
#[derive(Error, Debug)]
pub enum PalisadeError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Access error: {0}")]
    Access(#[from] AccessError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Configuration-related errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadFile(#[source] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Unknown group type: {0}")]
    UnknownGroupType(String),

    #[error("Unknown role: {0}")]
    UnknownRole(String),
}

/// Storage-related errors.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),
}

/// Access computation errors.
#[derive(Error, Debug)]
pub enum AccessError {
    /// The caller passed an operation string the compiler does not know.
    /// This is a contract violation, not a runtime condition to recover from.
    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),
}

/// Result type alias for palisade operations.
pub type Result<T> = std::result::Result<T, PalisadeError>;
