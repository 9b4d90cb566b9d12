//! Core error types for lifekernel-core.
//!
//! Handlers distinguish two kinds of rejection. A benign race (missing
//! aggregate, focus cap, flag on an unknown item) is answered with zero
//! events and never reaches this module. A real policy violation raises one
//! of the errors below and no event is emitted.

use std::path::PathBuf;
use thiserror::Error;

use crate::hard_mode::Module;

/// Core error type for lifekernel-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Command payload failed validation
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Hard Mode plan broke a session constraint
    #[error("Constraint violation: {0}")]
    Constraint(#[from] ConstraintViolation),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A Hard Mode session is already active
    #[error("Hard Mode session '{session_id}' is already active")]
    SessionAlreadyActive { session_id: String },

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic errors with context
    #[error("{0}")]
    Custom(String),
}

/// Validation errors raised synchronously by command handlers.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// Invalid value
    #[error("Invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },

    /// Required text was empty or whitespace
    #[error("'{0}' must not be empty")]
    EmptyField(String),

    /// Numeric value outside its allowed range
    #[error("'{field}' must be within {min}..={max}, got {value}")]
    OutOfRange {
        field: String,
        value: f64,
        min: f64,
        max: f64,
    },

    /// Empty collection
    #[error("Empty collection: {0}")]
    EmptyCollection(String),
}

impl ValidationError {
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        ValidationError::InvalidValue {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn empty(field: impl Into<String>) -> Self {
        ValidationError::EmptyField(field.into())
    }
}

/// Hard Mode constraint violations. One violating item rejects the whole plan.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConstraintViolation {
    #[error("item '{item_id}' belongs to disallowed module {module}")]
    DisallowedModule { item_id: String, module: Module },

    #[error("habit item '{item_id}' has anchor {anchor:?} outside the allowed list")]
    AnchorNotAllowed {
        item_id: String,
        anchor: Option<String>,
    },

    #[error("plan has {count} items, at most {max} allowed")]
    TooManyItems { count: usize, max: usize },

    #[error("item '{item_id}' targets module {module} outside the session scope")]
    ModuleOutOfScope { item_id: String, module: Module },
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

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Key does not exist in the configuration tree
    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),

    /// Failed to parse configuration
    #[error("Failed to parse configuration: {0}")]
    ParseFailed(String),
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        ConfigError::ParseFailed(err.to_string())
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
