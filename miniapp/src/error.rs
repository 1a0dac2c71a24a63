//! Mini-app error types

use marketkit_store::StoreError;
use thiserror::Error;

/// Result type for mini-app operations
pub type Result<T> = std::result::Result<T, MiniAppError>;

#[derive(Debug, Error)]
pub enum MiniAppError {
    /// A preset name that is not in the catalog
    #[error("unknown mini-app preset: {name}")]
    UnknownPreset { name: String },

    #[error("invalid mapping for mini-app {app_id}: {reason}")]
    InvalidMapping { app_id: String, reason: String },

    /// Persisting or loading field state failed
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl MiniAppError {
    pub fn invalid_mapping(app_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidMapping {
            app_id: app_id.into(),
            reason: reason.into(),
        }
    }
}
