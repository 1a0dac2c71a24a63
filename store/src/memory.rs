//! In-memory stores
//!
//! Used by tests and by embedders that keep state elsewhere. Both stores
//! support fault injection (`fail_next`) and artificial latency so callers
//! can exercise storage failures, overlapping loads and slow writes.

use crate::contract::{ContextStore, OverrideRecord, OverrideStore, merge_context};
use crate::error::{Result, StoreError, StoreScope};
use async_trait::async_trait;
use chrono::Utc;
use marketkit_fields::{ContextMap, OverrideMap};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;

/// Injected failures and latency
#[derive(Debug, Default)]
struct Faults {
    remaining_failures: AtomicUsize,
    read_delay_ms: AtomicU64,
    write_delay_ms: AtomicU64,
}

impl Faults {
    fn check(&self, scope: StoreScope) -> Result<()> {
        let tripped = self
            .remaining_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if tripped {
            return Err(StoreError::storage(scope, "injected failure"));
        }
        Ok(())
    }

    fn read_delay(&self) -> Duration {
        Duration::from_millis(self.read_delay_ms.load(Ordering::SeqCst))
    }

    fn write_delay(&self) -> Duration {
        Duration::from_millis(self.write_delay_ms.load(Ordering::SeqCst))
    }

    fn store_delay(slot: &AtomicU64, delay: Duration) {
        let millis = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        slot.store(millis, Ordering::SeqCst);
    }

    async fn pause(delay: Duration) {
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Project context
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct MemoryContextStore {
    contexts: RwLock<BTreeMap<String, ContextMap>>,
    faults: Faults,
}

impl MemoryContextStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Onboard a project with its initial context
    pub async fn create_project(&self, project_id: &str, initial: ContextMap) -> Result<()> {
        let mut contexts = self.contexts.write().await;
        if contexts.contains_key(project_id) {
            return Err(StoreError::AlreadyExists {
                project_id: project_id.to_string(),
            });
        }
        let mut context = ContextMap::new();
        merge_context(&mut context, initial);
        contexts.insert(project_id.to_string(), context);
        Ok(())
    }

    pub async fn delete_project(&self, project_id: &str) -> bool {
        self.contexts.write().await.remove(project_id).is_some()
    }

    /// Make the next `count` operations fail with a storage error
    pub fn fail_next(&self, count: usize) {
        self.faults.remaining_failures.store(count, Ordering::SeqCst);
    }

    /// Delay applied to reads started after this call
    pub fn set_read_delay(&self, delay: Duration) {
        Faults::store_delay(&self.faults.read_delay_ms, delay);
    }
}

#[async_trait]
impl ContextStore for MemoryContextStore {
    async fn get_by_project_id(&self, project_id: &str) -> Result<Option<ContextMap>> {
        let delay = self.faults.read_delay();
        self.faults.check(StoreScope::project(project_id))?;
        let snapshot = self.contexts.read().await.get(project_id).cloned();
        Faults::pause(delay).await;
        Ok(snapshot)
    }

    async fn update(&self, project_id: &str, partial: ContextMap) -> Result<ContextMap> {
        self.faults.check(StoreScope::project(project_id))?;
        let mut contexts = self.contexts.write().await;
        let context = contexts
            .get_mut(project_id)
            .ok_or_else(|| StoreError::NotFound {
                scope: StoreScope::project(project_id),
            })?;
        merge_context(context, partial);
        Ok(context.clone())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Task overrides
// ─────────────────────────────────────────────────────────────────────────────

type TaskKey = (String, String);

#[derive(Debug, Default)]
pub struct MemoryOverrideStore {
    rows: RwLock<BTreeMap<TaskKey, BTreeMap<String, OverrideRecord>>>,
    faults: Faults,
}

impl MemoryOverrideStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next(&self, count: usize) {
        self.faults.remaining_failures.store(count, Ordering::SeqCst);
    }

    pub fn set_read_delay(&self, delay: Duration) {
        Faults::store_delay(&self.faults.read_delay_ms, delay);
    }

    /// Delay applied before writes started after this call are committed
    pub fn set_write_delay(&self, delay: Duration) {
        Faults::store_delay(&self.faults.write_delay_ms, delay);
    }

    /// Drop every override of a project
    pub async fn delete_project(&self, project_id: &str) -> usize {
        let mut rows = self.rows.write().await;
        let before: usize = rows.values().map(BTreeMap::len).sum();
        rows.retain(|(project, _), _| project != project_id);
        let after: usize = rows.values().map(BTreeMap::len).sum();
        before - after
    }

    fn key(project_id: &str, task_id: &str) -> TaskKey {
        (project_id.to_string(), task_id.to_string())
    }

    fn upsert(
        task: &mut BTreeMap<String, OverrideRecord>,
        key: &TaskKey,
        user_id: &str,
        field_name: &str,
        value: Value,
        source_tag: &str,
    ) {
        if value.is_null() {
            task.remove(field_name);
            return;
        }
        task.insert(
            field_name.to_string(),
            OverrideRecord {
                project_id: key.0.clone(),
                task_id: key.1.clone(),
                field_name: field_name.to_string(),
                value,
                user_id: user_id.to_string(),
                source_tag: source_tag.to_string(),
                updated_at: Utc::now(),
            },
        );
    }
}

#[async_trait]
impl OverrideStore for MemoryOverrideStore {
    async fn get_all(&self, project_id: &str, task_id: &str) -> Result<OverrideMap> {
        let delay = self.faults.read_delay();
        self.faults.check(StoreScope::task(project_id, task_id))?;
        let snapshot = self
            .rows
            .read()
            .await
            .get(&Self::key(project_id, task_id))
            .map(|task| {
                task.iter()
                    .map(|(name, record)| (name.clone(), record.value.clone()))
                    .collect()
            })
            .unwrap_or_default();
        Faults::pause(delay).await;
        Ok(snapshot)
    }

    async fn get(
        &self,
        project_id: &str,
        task_id: &str,
        field_name: &str,
    ) -> Result<Option<Value>> {
        self.faults
            .check(StoreScope::task(project_id, task_id).with_field(field_name))?;
        Ok(self
            .rows
            .read()
            .await
            .get(&Self::key(project_id, task_id))
            .and_then(|task| task.get(field_name))
            .map(|record| record.value.clone()))
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
        let delay = self.faults.write_delay();
        self.faults
            .check(StoreScope::task(project_id, task_id).with_field(field_name))?;
        Faults::pause(delay).await;
        let key = Self::key(project_id, task_id);
        let mut rows = self.rows.write().await;
        let task = rows.entry(key.clone()).or_default();
        Self::upsert(task, &key, user_id, field_name, value, source_tag);
        Ok(())
    }

    async fn set_batch(
        &self,
        project_id: &str,
        task_id: &str,
        user_id: &str,
        values: OverrideMap,
        source_tag: &str,
    ) -> Result<()> {
        let delay = self.faults.write_delay();
        self.faults.check(StoreScope::task(project_id, task_id))?;
        Faults::pause(delay).await;
        let key = Self::key(project_id, task_id);
        let mut rows = self.rows.write().await;
        let task = rows.entry(key.clone()).or_default();
        for (field_name, value) in values {
            Self::upsert(task, &key, user_id, &field_name, value, source_tag);
        }
        Ok(())
    }

    async fn clear(&self, project_id: &str, task_id: &str, field_name: &str) -> Result<bool> {
        let delay = self.faults.write_delay();
        self.faults
            .check(StoreScope::task(project_id, task_id).with_field(field_name))?;
        Faults::pause(delay).await;
        let mut rows = self.rows.write().await;
        Ok(rows
            .get_mut(&Self::key(project_id, task_id))
            .is_some_and(|task| task.remove(field_name).is_some()))
    }

    async fn clear_all(&self, project_id: &str, task_id: &str) -> Result<usize> {
        let delay = self.faults.write_delay();
        self.faults.check(StoreScope::task(project_id, task_id))?;
        Faults::pause(delay).await;
        let mut rows = self.rows.write().await;
        Ok(rows
            .remove(&Self::key(project_id, task_id))
            .map_or(0, |task| task.len()))
    }

    async fn task_ids_with_overrides(&self, project_id: &str) -> Result<BTreeSet<String>> {
        self.faults.check(StoreScope::project(project_id))?;
        Ok(self
            .rows
            .read()
            .await
            .iter()
            .filter(|((project, _), task)| project == project_id && !task.is_empty())
            .map(|((_, task_id), _)| task_id.clone())
            .collect())
    }

    async fn records(&self, project_id: &str, task_id: &str) -> Result<Vec<OverrideRecord>> {
        self.faults.check(StoreScope::task(project_id, task_id))?;
        Ok(self
            .rows
            .read()
            .await
            .get(&Self::key(project_id, task_id))
            .map(|task| task.values().cloned().collect())
            .unwrap_or_default())
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
    async fn unknown_project_is_none_not_error() {
        let store = MemoryContextStore::new();
        let result = store.get_by_project_id("nope").await.expect("no io error");
        assert_eq!(result, None);
    }

    #[tokio::test]
    async fn update_merges_and_requires_project() {
        let store = MemoryContextStore::new();
        let err = store
            .update("p1", ctx(&[("industry", json!("Retail"))]))
            .await
            .expect_err("project missing");
        assert!(err.is_not_found());

        store
            .create_project("p1", ctx(&[("industry", json!("Retail"))]))
            .await
            .expect("create");
        let updated = store
            .update("p1", ctx(&[("productName", json!("Acme"))]))
            .await
            .expect("update");
        assert_eq!(
            updated,
            ctx(&[("industry", json!("Retail")), ("productName", json!("Acme"))])
        );
    }

    #[tokio::test]
    async fn duplicate_project_rejected() {
        let store = MemoryContextStore::new();
        store.create_project("p1", ContextMap::new()).await.expect("create");
        let err = store
            .create_project("p1", ContextMap::new())
            .await
            .expect_err("duplicate");
        assert!(matches!(err, StoreError::AlreadyExists { .. }));
    }

    #[tokio::test]
    async fn set_is_upsert() {
        let store = MemoryOverrideStore::new();
        store
            .set("p1", "t1", "u1", "industry", json!("Retail"), "form")
            .await
            .expect("set");
        store
            .set("p1", "t1", "u2", "industry", json!("Fintech"), "form")
            .await
            .expect("set");

        let records = store.records("p1", "t1").await.expect("records");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].value, json!("Fintech"));
        assert_eq!(records[0].user_id, "u2");
    }

    #[tokio::test]
    async fn clear_and_clear_all() {
        let store = MemoryOverrideStore::new();
        store
            .set_batch(
                "p1",
                "t1",
                "u1",
                ctx(&[("industry", json!("Retail")), ("keywords", json!("crm"))]),
                "batch",
            )
            .await
            .expect("batch");

        assert!(store.clear("p1", "t1", "industry").await.expect("clear"));
        assert!(!store.clear("p1", "t1", "industry").await.expect("clear"));
        assert_eq!(store.clear_all("p1", "t1").await.expect("clear_all"), 1);
        assert!(store.get_all("p1", "t1").await.expect("get_all").is_empty());
    }

    #[tokio::test]
    async fn distinct_task_ids() {
        let store = MemoryOverrideStore::new();
        for (task, field) in [("t1", "industry"), ("t1", "keywords"), ("t2", "industry")] {
            store
                .set("p1", task, "u1", field, json!("x"), "form")
                .await
                .expect("set");
        }
        store
            .set("p2", "t9", "u1", "industry", json!("x"), "form")
            .await
            .expect("set");

        let ids = store.task_ids_with_overrides("p1").await.expect("ids");
        assert_eq!(ids.into_iter().collect::<Vec<_>>(), vec!["t1", "t2"]);
    }

    #[tokio::test]
    async fn slow_write_is_not_visible_until_committed() {
        let store = std::sync::Arc::new(MemoryOverrideStore::new());
        store.set_write_delay(Duration::from_millis(100));

        let writer = {
            let store = store.clone();
            tokio::spawn(async move {
                store
                    .set("p1", "t1", "u1", "industry", json!("Retail"), "form")
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(store.get_all("p1", "t1").await.expect("get_all").is_empty());

        writer.await.expect("join").expect("set");
        assert_eq!(
            store.get("p1", "t1", "industry").await.expect("get"),
            Some(json!("Retail"))
        );
    }

    #[tokio::test]
    async fn injected_failure_is_storage_error_with_scope() {
        let store = MemoryOverrideStore::new();
        store.fail_next(1);
        let err = store.get_all("p1", "t1").await.expect_err("injected");
        assert!(matches!(err, StoreError::Storage { .. }));
        assert_eq!(
            err.scope().and_then(|s| s.task_id.as_deref()),
            Some("t1")
        );
        assert!(store.get_all("p1", "t1").await.is_ok());
    }
}
