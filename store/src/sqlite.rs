//! SQLite-backed context and override store
//!
//! One database holds onboarded projects, their canonical context values and
//! task overrides (see `MARKETKIT_SCHEMA.sql`). SQLite work is synchronous,
//! so every operation runs on the blocking pool via `spawn_blocking`.

use crate::config::StoreConfig;
use crate::contract::{ContextStore, OverrideRecord, OverrideStore};
use crate::error::{Result, StoreError, StoreScope};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use marketkit_fields::{ContextMap, OverrideMap};
use rusqlite::{Connection, OptionalExtension, params};
use serde_json::Value;
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Embedded schema SQL
const SCHEMA_SQL: &str = include_str!("../MARKETKIT_SCHEMA.sql");

/// Failure inside a blocking closure, mapped to [`StoreError`] with scope
#[derive(Debug, thiserror::Error)]
enum OpError {
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    #[error("stored value is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid updated_at {value:?} on {field_name}: {source}")]
    Timestamp {
        field_name: String,
        value: String,
        source: chrono::ParseError,
    },

    #[error("project not found")]
    ProjectNotFound,

    #[error("project already exists")]
    ProjectExists,
}

type OpResult<T> = std::result::Result<T, OpError>;

#[derive(Debug, Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open the database named by the config, creating it if needed
    pub fn open(cfg: &StoreConfig) -> Result<Self> {
        cfg.validate();
        Self::open_at_path(&cfg.resolved_db_path(), cfg.busy_timeout())
    }

    pub fn open_at_path(path: &Path, busy_timeout: Duration) -> Result<Self> {
        let scope = StoreScope::default();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::storage_with_source(
                    scope.clone(),
                    format!("failed to create db directory: {}", parent.display()),
                    e,
                )
            })?;
        }

        let conn = Connection::open(path).map_err(|e| {
            StoreError::storage_with_source(
                scope.clone(),
                format!("failed to open db at {}", path.display()),
                e,
            )
        })?;
        conn.busy_timeout(busy_timeout).map_err(|e| {
            StoreError::storage_with_source(scope.clone(), "failed to set busy timeout", e)
        })?;
        conn.execute_batch("PRAGMA journal_mode = WAL;")
            .map_err(|e| StoreError::storage_with_source(scope, "failed to enable WAL", e))?;

        let store = Self::from_connection(conn)?;
        tracing::debug!(path = %path.display(), "Field store initialized");
        Ok(store)
    }

    /// Private in-memory database
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| {
            StoreError::storage_with_source(StoreScope::default(), "failed to open in-memory db", e)
        })?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA_SQL).map_err(|e| {
            StoreError::storage_with_source(StoreScope::default(), "failed to apply schema", e)
        })?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run a closure against the connection on the blocking pool
    async fn with_connection<F, T>(&self, scope: StoreScope, what: &'static str, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> OpResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        let task_scope = scope.clone();
        let joined = tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| StoreError::storage(task_scope.clone(), "connection lock poisoned"))?;
            f(&mut guard).map_err(|e| match e {
                OpError::ProjectNotFound => StoreError::NotFound { scope: task_scope },
                OpError::ProjectExists => StoreError::AlreadyExists {
                    project_id: task_scope.project_id,
                },
                other => {
                    StoreError::storage_with_source(task_scope, format!("failed to {what}"), other)
                }
            })
        })
        .await;

        match joined {
            Ok(result) => result,
            Err(e) => Err(StoreError::storage_with_source(
                scope,
                format!("blocking task failed during {what}"),
                e,
            )),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Project lifecycle
    // ─────────────────────────────────────────────────────────────────────────────

    /// Onboard a project with its initial context
    pub async fn create_project(&self, project_id: &str, initial: ContextMap) -> Result<()> {
        let project_id_owned = project_id.to_string();
        self.with_connection(StoreScope::project(project_id), "create project", move |conn| {
            let tx = conn.transaction()?;
            let now = Utc::now().to_rfc3339();
            let inserted = tx.execute(
                "INSERT OR IGNORE INTO projects (project_id, created_at, updated_at) VALUES (?1, ?2, ?2)",
                params![project_id_owned, now],
            )?;
            if inserted == 0 {
                return Err(OpError::ProjectExists);
            }
            write_context_fields(&tx, &project_id_owned, initial, &now)?;
            tx.commit()?;
            Ok(())
        })
        .await?;
        tracing::info!(project_id, "Project onboarded");
        Ok(())
    }

    /// Delete a project with its context and every task override
    pub async fn delete_project(&self, project_id: &str) -> Result<bool> {
        let project_id_owned = project_id.to_string();
        self.with_connection(StoreScope::project(project_id), "delete project", move |conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "DELETE FROM task_field_overrides WHERE project_id = ?1",
                params![project_id_owned],
            )?;
            let removed = tx.execute(
                "DELETE FROM projects WHERE project_id = ?1",
                params![project_id_owned],
            )?;
            tx.commit()?;
            Ok(removed > 0)
        })
        .await
    }
}

fn write_context_fields(
    conn: &Connection,
    project_id: &str,
    values: ContextMap,
    now: &str,
) -> OpResult<()> {
    for (field_name, value) in values {
        if value.is_null() {
            conn.execute(
                "DELETE FROM project_context_fields WHERE project_id = ?1 AND field_name = ?2",
                params![project_id, field_name],
            )?;
            continue;
        }
        let value_json = serde_json::to_string(&value)?;
        conn.execute(
            r#"
            INSERT INTO project_context_fields (project_id, field_name, value_json, updated_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(project_id, field_name) DO UPDATE SET
                value_json = excluded.value_json,
                updated_at = excluded.updated_at
            "#,
            params![project_id, field_name, value_json, now],
        )?;
    }
    Ok(())
}

fn read_context(conn: &Connection, project_id: &str) -> OpResult<ContextMap> {
    let mut stmt = conn.prepare(
        "SELECT field_name, value_json FROM project_context_fields WHERE project_id = ?1",
    )?;
    let rows = stmt.query_map(params![project_id], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;
    let mut context = ContextMap::new();
    for row in rows {
        let (name, value_json) = row?;
        context.insert(name, serde_json::from_str(&value_json)?);
    }
    Ok(context)
}

fn project_exists(conn: &Connection, project_id: &str) -> OpResult<bool> {
    let found = conn
        .query_row(
            "SELECT 1 FROM projects WHERE project_id = ?1",
            params![project_id],
            |_| Ok(()),
        )
        .optional()?;
    Ok(found.is_some())
}

fn upsert_override(
    conn: &Connection,
    key: (&str, &str),
    user_id: &str,
    field_name: &str,
    value: &Value,
    source_tag: &str,
    now: &str,
) -> OpResult<()> {
    let (project_id, task_id) = key;
    if value.is_null() {
        conn.execute(
            "DELETE FROM task_field_overrides WHERE project_id = ?1 AND task_id = ?2 AND field_name = ?3",
            params![project_id, task_id, field_name],
        )?;
        return Ok(());
    }
    let value_json = serde_json::to_string(value)?;
    conn.execute(
        r#"
        INSERT INTO task_field_overrides
            (project_id, task_id, field_name, value_json, user_id, source_tag, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        ON CONFLICT(project_id, task_id, field_name) DO UPDATE SET
            value_json = excluded.value_json,
            user_id = excluded.user_id,
            source_tag = excluded.source_tag,
            updated_at = excluded.updated_at
        "#,
        params![project_id, task_id, field_name, value_json, user_id, source_tag, now],
    )?;
    Ok(())
}

fn parse_timestamp(field_name: &str, value: &str) -> OpResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|source| OpError::Timestamp {
            field_name: field_name.to_string(),
            value: value.to_string(),
            source,
        })
}

#[async_trait]
impl ContextStore for SqliteStore {
    async fn get_by_project_id(&self, project_id: &str) -> Result<Option<ContextMap>> {
        let project_id_owned = project_id.to_string();
        self.with_connection(StoreScope::project(project_id), "load project context", move |conn| {
            if !project_exists(conn, &project_id_owned)? {
                return Ok(None);
            }
            read_context(conn, &project_id_owned).map(Some)
        })
        .await
    }

    async fn update(&self, project_id: &str, partial: ContextMap) -> Result<ContextMap> {
        let project_id_owned = project_id.to_string();
        let scope = StoreScope::project(project_id);
        let updated = self
            .with_connection(scope, "update project context", move |conn| {
                let tx = conn.transaction()?;
                if !project_exists(&tx, &project_id_owned)? {
                    return Err(OpError::ProjectNotFound);
                }
                let now = Utc::now().to_rfc3339();
                write_context_fields(&tx, &project_id_owned, partial, &now)?;
                tx.execute(
                    "UPDATE projects SET updated_at = ?2 WHERE project_id = ?1",
                    params![project_id_owned, now],
                )?;
                let context = read_context(&tx, &project_id_owned)?;
                tx.commit()?;
                Ok(context)
            })
            .await?;
        tracing::debug!(project_id, fields = updated.len(), "Updated project context");
        Ok(updated)
    }
}

#[async_trait]
impl OverrideStore for SqliteStore {
    async fn get_all(&self, project_id: &str, task_id: &str) -> Result<OverrideMap> {
        let records = self.records(project_id, task_id).await?;
        Ok(records
            .into_iter()
            .map(|record| (record.field_name, record.value))
            .collect())
    }

    async fn get(
        &self,
        project_id: &str,
        task_id: &str,
        field_name: &str,
    ) -> Result<Option<Value>> {
        let key = (project_id.to_string(), task_id.to_string(), field_name.to_string());
        self.with_connection(
            StoreScope::task(project_id, task_id).with_field(field_name),
            "load override",
            move |conn| {
                let value_json: Option<String> = conn
                    .query_row(
                        "SELECT value_json FROM task_field_overrides WHERE project_id = ?1 AND task_id = ?2 AND field_name = ?3",
                        params![key.0, key.1, key.2],
                        |row| row.get(0),
                    )
                    .optional()?;
                match value_json {
                    Some(json) => Ok(Some(serde_json::from_str(&json)?)),
                    None => Ok(None),
                }
            },
        )
        .await
    }

    async fn set(
        &self,
        project_id: &str,
        task_id: &str,
        user_id: &str,
        field_name: &str,
        value: Value,
        source_tag: &str,
    ) -> Result<()> {
        let owned = (
            project_id.to_string(),
            task_id.to_string(),
            user_id.to_string(),
            field_name.to_string(),
            source_tag.to_string(),
        );
        self.with_connection(
            StoreScope::task(project_id, task_id).with_field(field_name),
            "save override",
            move |conn| {
                let (project_id, task_id, user_id, field_name, source_tag) = owned;
                let now = Utc::now().to_rfc3339();
                upsert_override(
                    conn,
                    (&project_id, &task_id),
                    &user_id,
                    &field_name,
                    &value,
                    &source_tag,
                    &now,
                )
            },
        )
        .await
    }

    async fn set_batch(
        &self,
        project_id: &str,
        task_id: &str,
        user_id: &str,
        values: OverrideMap,
        source_tag: &str,
    ) -> Result<()> {
        let owned = (
            project_id.to_string(),
            task_id.to_string(),
            user_id.to_string(),
            source_tag.to_string(),
        );
        let count = values.len();
        self.with_connection(StoreScope::task(project_id, task_id), "save overrides", move |conn| {
            let (project_id, task_id, user_id, source_tag) = owned;
            let tx = conn.transaction()?;
            let now = Utc::now().to_rfc3339();
            for (field_name, value) in &values {
                upsert_override(
                    &tx,
                    (&project_id, &task_id),
                    &user_id,
                    field_name,
                    value,
                    &source_tag,
                    &now,
                )?;
            }
            tx.commit()?;
            Ok(())
        })
        .await?;
        tracing::debug!(project_id, task_id, count, "Saved override batch");
        Ok(())
    }

    async fn clear(&self, project_id: &str, task_id: &str, field_name: &str) -> Result<bool> {
        let key = (project_id.to_string(), task_id.to_string(), field_name.to_string());
        self.with_connection(
            StoreScope::task(project_id, task_id).with_field(field_name),
            "clear override",
            move |conn| {
                let removed = conn.execute(
                    "DELETE FROM task_field_overrides WHERE project_id = ?1 AND task_id = ?2 AND field_name = ?3",
                    params![key.0, key.1, key.2],
                )?;
                Ok(removed > 0)
            },
        )
        .await
    }

    async fn clear_all(&self, project_id: &str, task_id: &str) -> Result<usize> {
        let key = (project_id.to_string(), task_id.to_string());
        self.with_connection(StoreScope::task(project_id, task_id), "clear overrides", move |conn| {
            let removed = conn.execute(
                "DELETE FROM task_field_overrides WHERE project_id = ?1 AND task_id = ?2",
                params![key.0, key.1],
            )?;
            Ok(removed)
        })
        .await
    }

    async fn task_ids_with_overrides(&self, project_id: &str) -> Result<BTreeSet<String>> {
        let project_id_owned = project_id.to_string();
        self.with_connection(StoreScope::project(project_id), "list override tasks", move |conn| {
            let mut stmt = conn.prepare(
                "SELECT DISTINCT task_id FROM task_field_overrides WHERE project_id = ?1",
            )?;
            let rows = stmt.query_map(params![project_id_owned], |row| row.get::<_, String>(0))?;
            let mut ids = BTreeSet::new();
            for row in rows {
                ids.insert(row?);
            }
            Ok(ids)
        })
        .await
    }

    async fn records(&self, project_id: &str, task_id: &str) -> Result<Vec<OverrideRecord>> {
        let key = (project_id.to_string(), task_id.to_string());
        self.with_connection(StoreScope::task(project_id, task_id), "load overrides", move |conn| {
            let mut stmt = conn.prepare(
                r#"
                SELECT field_name, value_json, user_id, source_tag, updated_at
                FROM task_field_overrides
                WHERE project_id = ?1 AND task_id = ?2
                ORDER BY field_name
                "#,
            )?;
            let rows = stmt.query_map(params![key.0, key.1], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                ))
            })?;
            let mut records = Vec::new();
            for row in rows {
                let (field_name, value_json, user_id, source_tag, updated_at) = row?;
                let updated_at = parse_timestamp(&field_name, &updated_at)?;
                records.push(OverrideRecord {
                    project_id: key.0.clone(),
                    task_id: key.1.clone(),
                    field_name,
                    value: serde_json::from_str(&value_json)?,
                    user_id,
                    source_tag,
                    updated_at,
                });
            }
            Ok(records)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn ctx(pairs: &[(&str, Value)]) -> ContextMap {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    #[tokio::test]
    async fn project_lifecycle() {
        let store = SqliteStore::open_in_memory().expect("open");
        assert_eq!(store.get_by_project_id("p1").await.expect("read"), None);

        store
            .create_project("p1", ctx(&[("industry", json!("Retail"))]))
            .await
            .expect("create");
        assert_eq!(
            store.get_by_project_id("p1").await.expect("read"),
            Some(ctx(&[("industry", json!("Retail"))]))
        );

        let again = store.create_project("p1", ContextMap::new()).await;
        assert!(matches!(again, Err(StoreError::AlreadyExists { .. })));

        assert!(store.delete_project("p1").await.expect("delete"));
        assert_eq!(store.get_by_project_id("p1").await.expect("read"), None);
    }

    #[tokio::test]
    async fn update_requires_onboarded_project() {
        let store = SqliteStore::open_in_memory().expect("open");
        let err = store
            .update("ghost", ctx(&[("industry", json!("Retail"))]))
            .await
            .expect_err("not onboarded");
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn update_merges_partial_context() {
        let store = SqliteStore::open_in_memory().expect("open");
        store
            .create_project(
                "p1",
                ctx(&[("industry", json!("Retail")), ("marketingBudget", json!(900))]),
            )
            .await
            .expect("create");

        let updated = store
            .update(
                "p1",
                ctx(&[("industry", json!("Fintech")), ("marketingBudget", Value::Null)]),
            )
            .await
            .expect("update");
        assert_eq!(updated, ctx(&[("industry", json!("Fintech"))]));
    }

    #[tokio::test]
    async fn overrides_upsert_and_keep_metadata() {
        let store = SqliteStore::open_in_memory().expect("open");
        store
            .set("p1", "t1", "u1", "brandVoice", json!("casual"), "form")
            .await
            .expect("set");
        store
            .set("p1", "t1", "u2", "brandVoice", json!("playful"), "import")
            .await
            .expect("set");

        let records = store.records("p1", "t1").await.expect("records");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].value, json!("playful"));
        assert_eq!(records[0].user_id, "u2");
        assert_eq!(records[0].source_tag, "import");
        assert_eq!(
            store.get("p1", "t1", "brandVoice").await.expect("get"),
            Some(json!("playful"))
        );
    }

    #[tokio::test]
    async fn batch_clear_and_distinct_tasks() {
        let store = SqliteStore::open_in_memory().expect("open");
        store
            .set_batch(
                "p1",
                "t1",
                "u1",
                ctx(&[("industry", json!("Retail")), ("wordCount", json!(700))]),
                "batch",
            )
            .await
            .expect("batch");
        store
            .set("p1", "t2", "u1", "industry", json!("Retail"), "form")
            .await
            .expect("set");

        let ids = store.task_ids_with_overrides("p1").await.expect("ids");
        assert_eq!(ids.into_iter().collect::<Vec<_>>(), vec!["t1", "t2"]);

        assert_eq!(
            store.get_all("p1", "t1").await.expect("get_all"),
            ctx(&[("industry", json!("Retail")), ("wordCount", json!(700))])
        );
        assert!(store.clear("p1", "t1", "wordCount").await.expect("clear"));
        assert_eq!(store.clear_all("p1", "t1").await.expect("clear_all"), 1);
        assert!(store.get_all("p1", "t1").await.expect("get_all").is_empty());
    }

    #[tokio::test]
    async fn null_override_deletes_row() {
        let store = SqliteStore::open_in_memory().expect("open");
        store
            .set("p1", "t1", "u1", "industry", json!("Retail"), "form")
            .await
            .expect("set");
        store
            .set("p1", "t1", "u1", "industry", Value::Null, "form")
            .await
            .expect("set null");
        assert_eq!(store.get("p1", "t1", "industry").await.expect("get"), None);
    }

    #[tokio::test]
    async fn delete_project_drops_overrides() {
        let store = SqliteStore::open_in_memory().expect("open");
        store.create_project("p1", ContextMap::new()).await.expect("create");
        store
            .set("p1", "t1", "u1", "industry", json!("Retail"), "form")
            .await
            .expect("set");
        store.delete_project("p1").await.expect("delete");
        assert!(
            store
                .task_ids_with_overrides("p1")
                .await
                .expect("ids")
                .is_empty()
        );
    }

    #[tokio::test]
    async fn corrupt_timestamp_is_a_storage_error() {
        let store = SqliteStore::open_in_memory().expect("open");
        store
            .set("p1", "t1", "u1", "industry", json!("Retail"), "form")
            .await
            .expect("set");
        store
            .conn
            .lock()
            .expect("lock")
            .execute("UPDATE task_field_overrides SET updated_at = 'yesterday'", [])
            .expect("corrupt");

        let err = store.records("p1", "t1").await.expect_err("corrupt row");
        assert!(matches!(err, StoreError::Storage { .. }));
        let source = std::error::Error::source(&err).expect("source").to_string();
        assert!(source.contains("yesterday"), "{source}");
        assert!(source.contains("industry"), "{source}");
    }
}
