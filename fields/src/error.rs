//! Error types for field registry and resolution
//!
//! Ordinary invalid input is never an error here: validation failures are
//! returned as [`crate::ValidationOutcome`] values. `FieldError` is reserved
//! for programmer errors (unregistered names) and registry loading.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for field operations
pub type Result<T> = std::result::Result<T, FieldError>;

#[derive(Debug, Error)]
pub enum FieldError {
    #[error("field '{name}' is not registered")]
    UnknownField { name: String },

    #[error("field '{name}' is defined more than once")]
    DuplicateField { name: String },

    #[error("invalid definition for field '{name}': {reason}")]
    InvalidDefinition { name: String, reason: String },

    #[error("failed to read field registry {path}: {source}")]
    RegistryRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse field registry: {source}")]
    RegistryParse { source: toml::de::Error },
}

impl FieldError {
    pub fn unknown_field(name: impl Into<String>) -> Self {
        Self::UnknownField { name: name.into() }
    }

    /// Whether this error was caused by asking about a field the registry
    /// does not know.
    pub fn is_unknown_field(&self) -> bool {
        matches!(self, Self::UnknownField { .. })
    }
}
