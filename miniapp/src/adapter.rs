//! Local-id facade over a batch resolver
//!
//! A [`MiniAppFieldAdapter`] lets a form read and write fields by its own
//! local ids. Ids are translated with [`registered_canonical`], the same
//! lookup the schema analyzer uses. An id that resolves to no registered
//! field is ad hoc: it is stored as an override under its mapping target
//! (or the id itself) without validation and never inherits.

use crate::catalog::{FieldMapping, MappingCatalog, MiniAppDefinition, registered_canonical};
use crate::error::Result;
use crate::spec::MiniAppFieldSpec;
use marketkit_fields::{
    BatchFieldResolver, ContextMap, FieldRegistry, FieldScope, FieldSource, FieldSummary,
    OverrideMap, RequiredCheck, ResolvedField, ValidationOutcome,
};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Canonical name a local id resolves to
#[derive(Debug)]
struct Target {
    canonical: String,
    /// Not backed by a registry definition
    ad_hoc: bool,
}

#[derive(Debug, Clone)]
pub struct MiniAppFieldAdapter {
    definition: MiniAppDefinition,
    batch: BatchFieldResolver,
    /// Local ids outside the mapping that carry state: written through this
    /// adapter or found among loaded overrides
    ad_hoc: BTreeSet<String>,
}

impl MiniAppFieldAdapter {
    pub fn new(
        registry: Arc<FieldRegistry>,
        catalog: &MappingCatalog,
        spec: MiniAppFieldSpec,
        scope: FieldScope,
    ) -> Result<Self> {
        let definition = spec.resolve(catalog, &registry)?;
        Ok(Self::from_definition(registry, definition, scope))
    }

    pub fn from_definition(
        registry: Arc<FieldRegistry>,
        definition: MiniAppDefinition,
        scope: FieldScope,
    ) -> Self {
        let fields: Vec<String> = definition
            .mapping
            .canonical_names()
            .map(str::to_string)
            .collect();
        for (local_id, canonical) in definition.mapping.iter() {
            if !registry.contains(canonical) {
                tracing::warn!(
                    app_id = %definition.app_id,
                    local_id,
                    canonical,
                    "Mapping targets an unregistered field; treating it as ad hoc"
                );
            }
        }
        let batch = BatchFieldResolver::new(registry, scope, fields);
        Self {
            definition,
            batch,
            ad_hoc: BTreeSet::new(),
        }
    }

    pub fn app_id(&self) -> &str {
        &self.definition.app_id
    }

    pub fn scope(&self) -> &FieldScope {
        self.batch.scope()
    }

    pub fn definition(&self) -> &MiniAppDefinition {
        &self.definition
    }

    pub fn mapping(&self) -> &FieldMapping {
        &self.definition.mapping
    }

    pub fn batch(&self) -> &BatchFieldResolver {
        &self.batch
    }

    /// Mapped local ids followed by ad hoc ids
    pub fn local_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.mapping().local_ids().map(str::to_string).collect();
        ids.extend(self.ad_hoc.iter().cloned());
        ids
    }

    /// Canonical name of a mapped local id
    pub fn canonical_name(&self, local_id: &str) -> Option<&str> {
        self.mapping().canonical_for(local_id)
    }

    /// Name under which a local id is resolved and persisted
    pub fn storage_name(&self, local_id: &str) -> String {
        self.target(local_id).canonical
    }

    pub fn ad_hoc_fields(&self) -> &BTreeSet<String> {
        &self.ad_hoc
    }

    fn target(&self, local_id: &str) -> Target {
        if let Some(canonical) =
            registered_canonical(Some(self.mapping()), self.batch.registry(), local_id)
        {
            return Target {
                canonical,
                ad_hoc: false,
            };
        }
        let canonical = self.mapping().canonical_for(local_id).unwrap_or(local_id);
        Target {
            canonical: canonical.to_string(),
            ad_hoc: true,
        }
    }

    /// Whether a local id needs its own entry in `ad_hoc`: it has no mapping
    /// entry and no mapped id already covers its canonical field
    fn is_extra(&self, local_id: &str, canonical: &str) -> bool {
        !self.mapping().contains(local_id)
            && !self.mapping().canonical_names().any(|name| name == canonical)
    }

    /// Install loaded project context and task overrides.
    ///
    /// Override keys no mapped id covers join the field set as ad hoc ids,
    /// so they stay visible to export and reset after a reload.
    pub fn load(&mut self, context: ContextMap, overrides: OverrideMap) {
        let extra: Vec<String> = overrides
            .keys()
            .filter(|name| self.is_extra(name, name))
            .cloned()
            .collect();
        for name in extra {
            self.batch.add_field(name.as_str());
            if self.ad_hoc.insert(name.clone()) {
                tracing::debug!(
                    app_id = %self.definition.app_id,
                    local_id = %name,
                    "Loaded override outside the mapping"
                );
            }
        }
        self.batch.load(context, overrides);
    }

    pub fn replace_context(&mut self, context: ContextMap) {
        self.batch.replace_context(context);
    }

    pub fn get_field(&self, local_id: &str) -> ResolvedField {
        let target = self.target(local_id);
        if target.ad_hoc && !self.ad_hoc.contains(local_id) {
            tracing::debug!(
                app_id = %self.definition.app_id,
                local_id,
                "Read of unmapped local field id"
            );
        }
        self.batch.get(&target.canonical)
    }

    pub fn set_field(&mut self, local_id: &str, value: Value) -> ValidationOutcome {
        let target = self.target(local_id);
        if self.is_extra(local_id, &target.canonical) && self.ad_hoc.insert(local_id.to_string())
        {
            tracing::warn!(
                app_id = %self.definition.app_id,
                local_id,
                canonical = %target.canonical,
                ad_hoc = target.ad_hoc,
                "No mapping for local field id; using it as the canonical name"
            );
        }
        if target.ad_hoc {
            self.batch.set_unchecked(&target.canonical, value);
            return ValidationOutcome::valid();
        }
        self.batch.add_field(target.canonical.as_str());
        self.batch.set(&target.canonical, value)
    }

    /// Apply each entry independently, keyed by local id
    pub fn set_fields<I>(&mut self, updates: I) -> BTreeMap<String, ValidationOutcome>
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        updates
            .into_iter()
            .map(|(local_id, value)| {
                let outcome = self.set_field(&local_id, value);
                (local_id, outcome)
            })
            .collect()
    }

    /// Remove the override behind a local id; returns whether one existed
    pub fn clear_field(&mut self, local_id: &str) -> bool {
        let target = self.target(local_id);
        self.batch.clear(&target.canonical)
    }

    /// Current override value behind a local id
    pub fn override_value(&self, local_id: &str) -> Option<Value> {
        let canonical = self.target(local_id).canonical;
        self.batch.resolver().overrides().get(&canonical).cloned()
    }

    /// Put back a whole override map captured with [`Self::override_snapshot`]
    pub fn restore_overrides(&mut self, snapshot: OverrideMap) {
        let names: Vec<String> = self.batch.fields().to_vec();
        for name in &names {
            let prior = snapshot.get(name).cloned();
            self.batch.restore(name, prior);
        }
    }

    /// Put back an override state captured with [`Self::override_value`],
    /// addressed by canonical name
    pub fn restore_override(&mut self, canonical: &str, prior: Option<Value>) {
        self.batch.restore(canonical, prior);
    }

    pub fn override_snapshot(&self) -> OverrideMap {
        self.batch.override_snapshot()
    }

    pub fn is_required(&self, local_id: &str) -> bool {
        self.definition.required.iter().any(|r| r == local_id)
    }

    pub fn is_overridden(&self, local_id: &str) -> bool {
        self.get_field_source(local_id) == FieldSource::Override
    }

    pub fn is_inherited(&self, local_id: &str) -> bool {
        self.get_field_source(local_id) == FieldSource::Inherited
    }

    pub fn get_field_source(&self, local_id: &str) -> FieldSource {
        self.get_field(local_id).source
    }

    /// Required-field check keyed by local id
    pub fn validate_required(&self) -> RequiredCheck {
        let mut errors = BTreeMap::new();
        for local_id in &self.definition.required {
            let canonical = self.target(local_id).canonical;
            if !self.batch.get(&canonical).is_filled() {
                errors.insert(local_id.clone(), self.batch.required_message(&canonical));
            }
        }
        RequiredCheck::from_errors(errors)
    }

    /// Resolved value of every local id. Null values are skipped unless
    /// `include_null` is set.
    pub fn export_field_data(&self, include_null: bool) -> BTreeMap<String, Value> {
        self.local_ids()
            .into_iter()
            .filter_map(|local_id| {
                let value = self.get_field(&local_id).value;
                (include_null || !value.is_null()).then_some((local_id, value))
            })
            .collect()
    }

    /// Clear every override in the field set; returns the local ids whose
    /// override was removed.
    pub fn reset_to_inherited(&mut self) -> Vec<String> {
        let cleared: BTreeSet<String> = self.batch.clear_all().into_iter().collect();
        let locals: Vec<String> = self
            .local_ids()
            .into_iter()
            .filter(|local_id| cleared.contains(&self.storage_name(local_id)))
            .collect();
        tracing::debug!(
            app_id = %self.definition.app_id,
            scope = %self.batch.scope(),
            cleared = cleared.len(),
            "Reset fields to inherited values"
        );
        locals
    }

    pub fn summary(&self) -> FieldSummary {
        self.batch.summary()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn blog() -> MiniAppFieldAdapter {
        MiniAppFieldAdapter::new(
            Arc::new(FieldRegistry::builtin()),
            &MappingCatalog::builtin(),
            MiniAppFieldSpec::preset("blog"),
            FieldScope::new("p1", "t1"),
        )
        .expect("blog preset")
    }

    fn context(pairs: &[(&str, Value)]) -> ContextMap {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn missing_required_fields_are_all_reported() {
        let adapter = blog();
        let check = adapter.validate_required();
        assert!(!check.is_valid);
        let keys: Vec<&str> = check.errors.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["productName", "targetAudience"]);
        assert_eq!(check.errors["productName"], "Product name is required");
    }

    #[test]
    fn local_ids_translate_to_canonical_fields() {
        let mut adapter = blog();
        adapter.load(
            context(&[("brandVoice", json!("friendly"))]),
            OverrideMap::new(),
        );

        assert_eq!(adapter.get_field("tone").value, json!("friendly"));
        assert!(adapter.is_inherited("tone"));

        let outcome = adapter.set_field("tone", json!("casual"));
        assert!(outcome.is_valid);
        assert!(adapter.is_overridden("tone"));
        assert_eq!(
            adapter.batch().resolver().overrides().get("brandVoice"),
            Some(&json!("casual"))
        );

        let rejected = adapter.set_field("tone", json!("sarcastic"));
        assert!(!rejected.is_valid);
        assert_eq!(adapter.get_field("tone").value, json!("casual"));

        assert!(adapter.clear_field("tone"));
        assert_eq!(adapter.get_field_source("tone"), FieldSource::Inherited);
    }

    #[test]
    fn unmapped_ids_become_ad_hoc_fields() {
        let mut adapter = blog();
        assert!(adapter.set_field("seasonalHook", json!(42)).is_valid);
        assert!(adapter.ad_hoc_fields().contains("seasonalHook"));
        assert_eq!(
            adapter.get_field("seasonalHook"),
            ResolvedField::overridden(json!(42))
        );
        assert_eq!(adapter.export_field_data(false).get("seasonalHook"), Some(&json!(42)));
    }

    #[test]
    fn snake_case_ids_resolve_through_the_alias_table() {
        let mut adapter = blog();
        adapter.load(
            context(&[("productName", json!("Acme"))]),
            OverrideMap::new(),
        );
        assert_eq!(
            adapter.get_field("product_name"),
            ResolvedField::inherited(json!("Acme"))
        );
        assert!(!adapter.set_field("product_name", json!(12345)).is_valid);
        assert!(adapter.set_field("product_name", json!("Acme Cloud")).is_valid);
        assert_eq!(adapter.get_field("productName").value, json!("Acme Cloud"));
        assert!(adapter.ad_hoc_fields().is_empty());
    }

    #[test]
    fn loaded_overrides_outside_the_mapping_join_the_field_set() {
        let mut adapter = blog();
        adapter.load(
            ContextMap::new(),
            context(&[
                ("seasonalHook", json!("Black Friday")),
                ("brandVoice", json!("casual")),
            ]),
        );
        assert_eq!(
            adapter.ad_hoc_fields().iter().collect::<Vec<_>>(),
            vec!["seasonalHook"]
        );
        assert_eq!(
            adapter.export_field_data(false).get("seasonalHook"),
            Some(&json!("Black Friday"))
        );

        let mut cleared = adapter.reset_to_inherited();
        cleared.sort();
        assert_eq!(cleared, vec!["seasonalHook", "tone"]);
        assert!(adapter.override_snapshot().is_empty());
    }

    #[test]
    fn unmapped_registered_name_is_still_validated() {
        let mut adapter = blog();
        let outcome = adapter.set_field("marketingBudget", json!("lots"));
        assert!(!outcome.is_valid);
        assert!(adapter.set_field("marketingBudget", json!(1500)).is_valid);
        assert_eq!(adapter.get_field("marketingBudget").value, json!(1500));
    }

    #[test]
    fn export_skips_null_unless_asked() {
        let mut adapter = blog();
        adapter.load(
            context(&[("productName", json!("Acme"))]),
            OverrideMap::new(),
        );
        let sparse = adapter.export_field_data(false);
        assert_eq!(sparse.len(), 1);
        assert_eq!(sparse["productName"], json!("Acme"));

        let full = adapter.export_field_data(true);
        assert_eq!(full.len(), adapter.mapping().len());
        assert_eq!(full["topic"], Value::Null);
    }

    #[test]
    fn reset_to_inherited_reports_local_ids() {
        let mut adapter = blog();
        adapter.load(
            context(&[("targetAudience", json!("B2B founders"))]),
            OverrideMap::new(),
        );
        adapter.set_field("targetAudience", json!("Enterprise CTOs"));
        adapter.set_field("topic", json!("Pricing pages"));

        let mut cleared = adapter.reset_to_inherited();
        cleared.sort();
        assert_eq!(cleared, vec!["targetAudience", "topic"]);
        assert_eq!(
            adapter.get_field("targetAudience"),
            ResolvedField::inherited(json!("B2B founders"))
        );
        assert!(adapter.override_snapshot().is_empty());
    }

    #[test]
    fn set_fields_keys_outcomes_by_local_id() {
        let mut adapter = blog();
        let outcomes = adapter.set_fields([
            ("length".to_string(), json!("medium")),
            ("cta".to_string(), json!("Start a trial")),
            ("length".to_string(), json!("epic")),
        ]);
        assert_eq!(outcomes.len(), 2);
        assert!(!outcomes["length"].is_valid);
        assert!(outcomes["cta"].is_valid);
        assert_eq!(adapter.get_field("length").value, json!("medium"));
    }

    #[test]
    fn restore_overrides_rolls_back_staged_values() {
        let mut adapter = blog();
        adapter.set_field("topic", json!("Launch week"));
        let snapshot = adapter.override_snapshot();
        adapter.set_field("topic", json!("Changelog"));
        adapter.set_field("cta", json!("Sign up"));

        adapter.restore_overrides(snapshot.clone());
        assert_eq!(adapter.override_snapshot(), snapshot);
    }
}
