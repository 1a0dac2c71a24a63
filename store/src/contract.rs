//! Collaborator contracts consumed by the resolution engine
//!
//! Both traits are the only asynchronous boundary of the engine. A missing
//! project or override row is reported as `Ok(None)` / an empty map, never
//! as an error.

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use marketkit_fields::{ContextMap, OverrideMap};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;

/// Read/write access to per-project canonical values
#[async_trait]
pub trait ContextStore: Send + Sync {
    /// Context for a project, or `None` when the project is unknown
    async fn get_by_project_id(&self, project_id: &str) -> Result<Option<ContextMap>>;

    /// Merge `partial` into the project's context and return the result.
    /// A `Null` value removes the key.
    async fn update(&self, project_id: &str, partial: ContextMap) -> Result<ContextMap>;
}

/// Read/write access to per-(project, task, field) overrides
#[async_trait]
pub trait OverrideStore: Send + Sync {
    async fn get_all(&self, project_id: &str, task_id: &str) -> Result<OverrideMap>;

    async fn get(&self, project_id: &str, task_id: &str, field_name: &str)
    -> Result<Option<Value>>;

    /// Upsert one override; a `Null` value deletes it
    async fn set(
        &self,
        project_id: &str,
        task_id: &str,
        user_id: &str,
        field_name: &str,
        value: Value,
        source_tag: &str,
    ) -> Result<()>;

    /// Upsert several overrides of one task
    async fn set_batch(
        &self,
        project_id: &str,
        task_id: &str,
        user_id: &str,
        values: OverrideMap,
        source_tag: &str,
    ) -> Result<()>;

    /// Remove one override; returns whether a row existed
    async fn clear(&self, project_id: &str, task_id: &str, field_name: &str) -> Result<bool>;

    /// Remove every override of a task; returns the number removed
    async fn clear_all(&self, project_id: &str, task_id: &str) -> Result<usize>;

    /// Task ids that have at least one override in the project
    async fn task_ids_with_overrides(&self, project_id: &str) -> Result<BTreeSet<String>>;

    /// Overrides of a task with their metadata, ordered by field name
    async fn records(&self, project_id: &str, task_id: &str) -> Result<Vec<OverrideRecord>>;
}

/// A stored override with its metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverrideRecord {
    pub project_id: String,
    pub task_id: String,
    pub field_name: String,
    pub value: Value,
    pub user_id: String,
    pub source_tag: String,
    pub updated_at: DateTime<Utc>,
}

/// Apply a partial update to a context map in place
pub fn merge_context(target: &mut ContextMap, partial: ContextMap) {
    for (name, value) in partial {
        if value.is_null() {
            target.remove(&name);
        } else {
            target.insert(name, value);
        }
    }
}
