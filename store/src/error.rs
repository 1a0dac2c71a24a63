//! Store error taxonomy
//!
//! "Not found" is never an error for reads: stores return `Ok(None)` or an
//! empty map. `StoreError::Storage` is the fatal class and always carries the
//! scope (project, task, field) of the operation that failed.

use thiserror::Error;

/// Result type for store operations
pub type Result<T> = std::result::Result<T, StoreError>;

/// Which rows an operation was touching
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreScope {
    pub project_id: String,
    pub task_id: Option<String>,
    pub field_name: Option<String>,
}

impl StoreScope {
    pub fn project(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            task_id: None,
            field_name: None,
        }
    }

    pub fn task(project_id: impl Into<String>, task_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            task_id: Some(task_id.into()),
            field_name: None,
        }
    }

    /// Builder: narrow to one field
    pub fn with_field(mut self, field_name: impl Into<String>) -> Self {
        self.field_name = Some(field_name.into());
        self
    }
}

impl std::fmt::Display for StoreScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "project={}", self.project_id)?;
        if let Some(task_id) = &self.task_id {
            write!(f, " task={task_id}")?;
        }
        if let Some(field_name) = &self.field_name {
            write!(f, " field={field_name}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    /// I/O or backend failure; fatal to the triggering operation
    #[error("storage error ({scope}): {message}")]
    Storage {
        scope: StoreScope,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A write addressed a project that was never onboarded
    #[error("project not found ({scope})")]
    NotFound { scope: StoreScope },

    #[error("project {project_id} already exists")]
    AlreadyExists { project_id: String },
}

impl StoreError {
    pub fn storage(scope: StoreScope, message: impl Into<String>) -> Self {
        Self::Storage {
            scope,
            message: message.into(),
            source: None,
        }
    }

    pub fn storage_with_source(
        scope: StoreScope,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Storage {
            scope,
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Scope metadata of the failed operation, when the error carries one
    pub fn scope(&self) -> Option<&StoreScope> {
        match self {
            Self::Storage { scope, .. } | Self::NotFound { scope } => Some(scope),
            Self::AlreadyExists { .. } => None,
        }
    }
}
