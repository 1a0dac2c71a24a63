//! Store-backed field session for one (project, task, user)
//!
//! A [`FieldSession`] owns an adapter and moves its state to and from the
//! context and override stores. Loads may overlap: each load takes a
//! generation ticket and only the newest ticket may install its response.
//! A field keeps its local state over a load response when it was written
//! or settled after the load started, or when its write is still in flight.
//!
//! The state mutex is never held across a store call.

use crate::adapter::MiniAppFieldAdapter;
use crate::error::Result;
use marketkit_fields::{
    ContextMap, FieldScope, FieldSummary, OverrideMap, RequiredCheck, ResolvedField,
    ValidationOutcome,
};
use marketkit_store::{ContextStore, OverrideStore};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Source tag recorded on overrides written by a session
pub const DEFAULT_SOURCE_TAG: &str = "form";

/// What happened to the response of a [`FieldSession::load`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// The loaded context and overrides were installed
    Applied,
    /// A newer load started before this one finished; its response was dropped
    Superseded,
    /// The stores failed; the values of the last applied load remain in use
    CachedFallback,
}

#[derive(Debug)]
struct SessionState {
    adapter: MiniAppFieldAdapter,
    /// Latest load ticket handed out
    generation: u64,
    /// Bumped on every local write and every settled persist
    epoch: u64,
    /// Canonical name → epoch of its last local write
    dirty: BTreeMap<String, u64>,
    /// Canonical name → epoch of its last local write or settled persist
    touched: BTreeMap<String, u64>,
    /// Canonical name → persists not yet returned
    in_flight: BTreeMap<String, usize>,
    /// Epoch of the last local context update
    context_epoch: u64,
    loaded: bool,
}

impl SessionState {
    /// Record a local write whose persist is about to start
    fn begin_write(&mut self, name: &str) -> u64 {
        self.epoch += 1;
        self.dirty.insert(name.to_string(), self.epoch);
        self.touched.insert(name.to_string(), self.epoch);
        *self.in_flight.entry(name.to_string()).or_default() += 1;
        self.epoch
    }

    /// Record that a persist started by [`Self::begin_write`] returned
    fn finish_write(&mut self, name: &str) {
        self.epoch += 1;
        self.touched.insert(name.to_string(), self.epoch);
        if let Some(pending) = self.in_flight.get_mut(name) {
            *pending -= 1;
            if *pending == 0 {
                self.in_flight.remove(name);
            }
        }
    }

    fn written_at(&self, name: &str, epoch: u64) -> bool {
        self.dirty.get(name) == Some(&epoch)
    }

    /// Whether a load started at `started_at` must leave this field alone
    fn keeps_local(&self, name: &str, started_at: u64) -> bool {
        self.in_flight.contains_key(name)
            || self.touched.get(name).is_some_and(|epoch| *epoch > started_at)
    }

    /// Drop bookkeeping a load started at `started_at` has made obsolete
    fn settle_before(&mut self, started_at: u64) {
        let in_flight = &self.in_flight;
        self.touched
            .retain(|name, epoch| *epoch > started_at || in_flight.contains_key(name));
        self.dirty.retain(|name, _| in_flight.contains_key(name));
    }
}

pub struct FieldSession {
    scope: FieldScope,
    user_id: String,
    source_tag: String,
    contexts: Arc<dyn ContextStore>,
    overrides: Arc<dyn OverrideStore>,
    state: Mutex<SessionState>,
}

impl FieldSession {
    pub fn new(
        adapter: MiniAppFieldAdapter,
        contexts: Arc<dyn ContextStore>,
        overrides: Arc<dyn OverrideStore>,
        user_id: impl Into<String>,
    ) -> Self {
        Self {
            scope: adapter.scope().clone(),
            user_id: user_id.into(),
            source_tag: DEFAULT_SOURCE_TAG.to_string(),
            contexts,
            overrides,
            state: Mutex::new(SessionState {
                adapter,
                generation: 0,
                epoch: 0,
                dirty: BTreeMap::new(),
                touched: BTreeMap::new(),
                in_flight: BTreeMap::new(),
                context_epoch: 0,
                loaded: false,
            }),
        }
    }

    /// Builder: tag recorded on every override this session writes
    pub fn with_source_tag(mut self, source_tag: impl Into<String>) -> Self {
        self.source_tag = source_tag.into();
        self
    }

    pub fn scope(&self) -> &FieldScope {
        &self.scope
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn source_tag(&self) -> &str {
        &self.source_tag
    }

    /// Fetch project context and task overrides and install them.
    ///
    /// A missing project context is treated as empty.
    pub async fn load(&self) -> Result<LoadOutcome> {
        let (ticket, started_at) = {
            let mut state = self.state.lock().await;
            state.generation += 1;
            (state.generation, state.epoch)
        };

        let fetched = self.fetch().await;

        let mut state = self.state.lock().await;
        if state.generation != ticket {
            tracing::warn!(
                scope = %self.scope,
                ticket,
                current = state.generation,
                "Discarding stale field load"
            );
            return Ok(LoadOutcome::Superseded);
        }

        let (context, mut overrides) = match fetched {
            Ok(fetched) => fetched,
            Err(err) if state.loaded => {
                tracing::warn!(
                    scope = %self.scope,
                    error = %err,
                    "Field load failed; using last-known-good values"
                );
                return Ok(LoadOutcome::CachedFallback);
            }
            Err(err) => return Err(err.into()),
        };

        // The response may predate local writes; those fields keep local state
        let current = state.adapter.batch().resolver().overrides().clone();
        let kept: Vec<String> = state
            .touched
            .keys()
            .chain(state.in_flight.keys())
            .filter(|name| state.keeps_local(name, started_at))
            .cloned()
            .collect();
        for name in &kept {
            match current.get(name) {
                Some(value) => overrides.insert(name.clone(), value.clone()),
                None => overrides.remove(name),
            };
        }
        state.settle_before(started_at);

        let context = if state.context_epoch > started_at {
            state.adapter.batch().context().clone()
        } else {
            context
        };

        let field_count = overrides.len();
        state.adapter.load(context, overrides);
        state.loaded = true;
        tracing::debug!(scope = %self.scope, overrides = field_count, "Loaded field state");
        Ok(LoadOutcome::Applied)
    }

    async fn fetch(&self) -> marketkit_store::Result<(ContextMap, OverrideMap)> {
        let context = self
            .contexts
            .get_by_project_id(&self.scope.project_id)
            .await?
            .unwrap_or_default();
        let overrides = self
            .overrides
            .get_all(&self.scope.project_id, &self.scope.task_id)
            .await?;
        Ok((context, overrides))
    }

    /// Validate, stage and persist one field. An invalid value is returned
    /// as an outcome without touching the stores. A failed write restores
    /// the previous local value.
    pub async fn set_field(&self, local_id: &str, value: Value) -> Result<ValidationOutcome> {
        let (name, prior, epoch, outcome) = {
            let mut state = self.state.lock().await;
            let name = state.adapter.storage_name(local_id);
            let prior = state.adapter.override_value(local_id);
            let outcome = state.adapter.set_field(local_id, value.clone());
            if !outcome.is_valid {
                return Ok(outcome);
            }
            let epoch = state.begin_write(&name);
            (name, prior, epoch, outcome)
        };

        let persisted = self
            .overrides
            .set(
                &self.scope.project_id,
                &self.scope.task_id,
                &self.user_id,
                &name,
                value,
                &self.source_tag,
            )
            .await;

        let mut state = self.state.lock().await;
        if let Err(err) = persisted {
            if state.written_at(&name, epoch) {
                state.adapter.restore_override(&name, prior);
            }
            state.finish_write(&name);
            return Err(err.into());
        }
        state.finish_write(&name);
        Ok(outcome)
    }

    /// Apply several fields independently and persist the accepted ones in
    /// one batch. Rejected entries are reported and not persisted.
    pub async fn set_fields(
        &self,
        updates: BTreeMap<String, Value>,
    ) -> Result<BTreeMap<String, ValidationOutcome>> {
        let (outcomes, accepted, priors) = {
            let mut state = self.state.lock().await;
            let mut outcomes = BTreeMap::new();
            let mut accepted = OverrideMap::new();
            let mut priors = Vec::new();
            for (local_id, value) in updates {
                let name = state.adapter.storage_name(&local_id);
                let prior = state.adapter.override_value(&local_id);
                let outcome = state.adapter.set_field(&local_id, value.clone());
                if outcome.is_valid {
                    let epoch = state.begin_write(&name);
                    accepted.insert(name.clone(), value);
                    priors.push((name, prior, epoch));
                }
                outcomes.insert(local_id, outcome);
            }
            (outcomes, accepted, priors)
        };

        if accepted.is_empty() {
            return Ok(outcomes);
        }

        let persisted = self
            .overrides
            .set_batch(
                &self.scope.project_id,
                &self.scope.task_id,
                &self.user_id,
                accepted,
                &self.source_tag,
            )
            .await;

        let mut state = self.state.lock().await;
        match persisted {
            Ok(()) => {
                for (name, _, _) in &priors {
                    state.finish_write(name);
                }
                Ok(outcomes)
            }
            Err(err) => {
                // Undo newest first so a field written twice ends at its
                // original value
                for (name, prior, epoch) in priors.into_iter().rev() {
                    if state.written_at(&name, epoch) {
                        state.adapter.restore_override(&name, prior);
                    }
                    state.finish_write(&name);
                }
                Err(err.into())
            }
        }
    }

    /// Clear one override locally and in the store
    pub async fn clear_field(&self, local_id: &str) -> Result<bool> {
        let (name, prior, epoch, existed) = {
            let mut state = self.state.lock().await;
            let name = state.adapter.storage_name(local_id);
            let prior = state.adapter.override_value(local_id);
            let existed = state.adapter.clear_field(local_id);
            let epoch = state.begin_write(&name);
            (name, prior, epoch, existed)
        };

        let cleared = self
            .overrides
            .clear(&self.scope.project_id, &self.scope.task_id, &name)
            .await;

        let mut state = self.state.lock().await;
        state.finish_write(&name);
        match cleared {
            Ok(removed) => Ok(existed || removed),
            Err(err) => {
                if state.written_at(&name, epoch) {
                    state.adapter.restore_override(&name, prior);
                }
                Err(err.into())
            }
        }
    }

    /// Drop every override of the task; returns the local ids cleared locally
    pub async fn reset_to_inherited(&self) -> Result<Vec<String>> {
        let (snapshot, cleared, written) = {
            let mut state = self.state.lock().await;
            let snapshot = state.adapter.override_snapshot();
            let cleared = state.adapter.reset_to_inherited();
            let names: Vec<String> = state.adapter.batch().fields().to_vec();
            let written: Vec<(String, u64)> = names
                .into_iter()
                .map(|name| {
                    let epoch = state.begin_write(&name);
                    (name, epoch)
                })
                .collect();
            (snapshot, cleared, written)
        };

        let removed = self
            .overrides
            .clear_all(&self.scope.project_id, &self.scope.task_id)
            .await;

        let mut state = self.state.lock().await;
        match removed {
            Ok(removed) => {
                for (name, _) in &written {
                    state.finish_write(name);
                }
                tracing::debug!(scope = %self.scope, removed, "Cleared task overrides");
                Ok(cleared)
            }
            Err(err) => {
                for (name, epoch) in &written {
                    if state.written_at(name, *epoch) {
                        state.adapter.restore_override(name, snapshot.get(name).cloned());
                    }
                    state.finish_write(name);
                }
                Err(err.into())
            }
        }
    }

    /// Merge `partial` into the project context and install the result
    pub async fn update_project_context(&self, partial: ContextMap) -> Result<ContextMap> {
        let updated = self
            .contexts
            .update(&self.scope.project_id, partial)
            .await?;
        let mut state = self.state.lock().await;
        state.epoch += 1;
        state.context_epoch = state.epoch;
        state.adapter.replace_context(updated.clone());
        Ok(updated)
    }

    pub async fn get_field(&self, local_id: &str) -> ResolvedField {
        self.state.lock().await.adapter.get_field(local_id)
    }

    pub async fn export_field_data(&self, include_null: bool) -> BTreeMap<String, Value> {
        self.state.lock().await.adapter.export_field_data(include_null)
    }

    pub async fn validate_required(&self) -> RequiredCheck {
        self.state.lock().await.adapter.validate_required()
    }

    pub async fn summary(&self) -> FieldSummary {
        self.state.lock().await.adapter.summary()
    }

    /// Run a read-only closure against the adapter
    pub async fn with_adapter<R>(&self, f: impl FnOnce(&MiniAppFieldAdapter) -> R) -> R {
        let state = self.state.lock().await;
        f(&state.adapter)
    }
}

impl std::fmt::Debug for FieldSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldSession")
            .field("scope", &self.scope)
            .field("user_id", &self.user_id)
            .field("source_tag", &self.source_tag)
            .finish_non_exhaustive()
    }
}
