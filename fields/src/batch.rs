//! Batch resolution over a managed field set
//!
//! A [`BatchFieldResolver`] owns the resolver state for one (project, task)
//! scope and an explicit list of canonical fields. Every field is resolved,
//! validated and mutated independently: `set_many` applies the valid entries
//! of a batch and rejects the invalid ones one by one, leaving their prior
//! overrides untouched.

use crate::registry::FieldRegistry;
use crate::resolver::FieldResolver;
use crate::types::{ContextMap, FieldScope, FieldSource, OverrideMap, ResolvedField};
use crate::validation::ValidationOutcome;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Aggregated required-field check
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequiredCheck {
    pub is_valid: bool,
    /// Field key → message, one entry per missing field
    pub errors: BTreeMap<String, String>,
}

impl RequiredCheck {
    pub fn from_errors(errors: BTreeMap<String, String>) -> Self {
        Self {
            is_valid: errors.is_empty(),
            errors,
        }
    }
}

/// Per-field line of a [`FieldSummary`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDetail {
    pub name: String,
    pub value: Value,
    pub source: FieldSource,
    pub required: bool,
    pub overridden: bool,
}

/// Counts over the managed field set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSummary {
    pub total: usize,
    pub overridden: usize,
    pub inherited: usize,
    /// Inheritable fields currently not overridden
    pub inheritable_not_overridden: usize,
    pub fields: Vec<FieldDetail>,
}

#[derive(Debug, Clone)]
pub struct BatchFieldResolver {
    scope: FieldScope,
    fields: Vec<String>,
    resolver: FieldResolver,
}

impl BatchFieldResolver {
    pub fn new<I, S>(registry: Arc<FieldRegistry>, scope: FieldScope, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut batch = Self {
            scope,
            fields: Vec::new(),
            resolver: FieldResolver::new(registry),
        };
        for field in fields {
            batch.add_field(field);
        }
        batch
    }

    pub fn scope(&self) -> &FieldScope {
        &self.scope
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn registry(&self) -> &FieldRegistry {
        self.resolver.registry()
    }

    pub fn resolver(&self) -> &FieldResolver {
        &self.resolver
    }

    pub fn is_managed(&self, field_name: &str) -> bool {
        self.fields.iter().any(|f| f == field_name)
    }

    /// Add a field to the managed set; returns false when already present
    pub fn add_field(&mut self, field_name: impl Into<String>) -> bool {
        let field_name = field_name.into();
        if self.is_managed(&field_name) {
            return false;
        }
        self.fields.push(field_name);
        true
    }

    /// Install freshly loaded project context and task overrides
    pub fn load(&mut self, context: ContextMap, overrides: OverrideMap) {
        self.resolver.replace_context(context);
        self.resolver.replace_overrides(overrides);
    }

    pub fn replace_context(&mut self, context: ContextMap) {
        self.resolver.replace_context(context);
    }

    pub fn context(&self) -> &ContextMap {
        self.resolver.context()
    }

    pub fn get(&self, field_name: &str) -> ResolvedField {
        self.resolver.resolve(field_name)
    }

    /// Resolve every managed field
    pub fn get_all(&self) -> BTreeMap<String, ResolvedField> {
        self.fields
            .iter()
            .map(|name| (name.clone(), self.resolver.resolve(name)))
            .collect()
    }

    /// Resolved values only, keyed by canonical name
    pub fn values(&self) -> BTreeMap<String, Value> {
        self.fields
            .iter()
            .map(|name| (name.clone(), self.resolver.resolve(name).value))
            .collect()
    }

    /// Validate and apply one value for a managed, registered field
    pub fn set(&mut self, field_name: &str, value: Value) -> ValidationOutcome {
        if !self.is_managed(field_name) {
            return ValidationOutcome::invalid(format!(
                "field '{field_name}' is not managed for task {}",
                self.scope.task_id
            ));
        }
        match self.resolver.set_override(field_name, value) {
            Ok(outcome) => outcome,
            Err(err) => ValidationOutcome::invalid(err.to_string()),
        }
    }

    /// Apply each entry independently; invalid entries are rejected without
    /// affecting the valid ones or their own prior override.
    pub fn set_many<I>(&mut self, updates: I) -> BTreeMap<String, ValidationOutcome>
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        let mut outcomes = BTreeMap::new();
        for (field_name, value) in updates {
            let outcome = self.set(&field_name, value);
            if !outcome.is_valid {
                tracing::debug!(
                    scope = %self.scope,
                    field = %field_name,
                    error = outcome.error.as_deref().unwrap_or_default(),
                    "Rejected field update"
                );
            }
            outcomes.insert(field_name, outcome);
        }
        outcomes
    }

    /// Stage a value for a field the registry does not know, adding it to
    /// the managed set.
    pub fn set_unchecked(&mut self, field_name: &str, value: Value) {
        self.add_field(field_name);
        self.resolver.set_unchecked(field_name, value);
    }

    /// Put back a previously observed override state without validation
    pub fn restore(&mut self, field_name: &str, prior: Option<Value>) {
        match prior {
            Some(value) => self.resolver.set_unchecked(field_name, value),
            None => {
                self.resolver.clear_override(field_name);
            }
        }
    }

    pub fn clear(&mut self, field_name: &str) -> bool {
        self.resolver.clear_override(field_name)
    }

    /// Clear the override of every managed field; returns the cleared names
    pub fn clear_all(&mut self) -> Vec<String> {
        let mut cleared = Vec::new();
        for name in &self.fields {
            if self.resolver.clear_override(name) {
                cleared.push(name.clone());
            }
        }
        cleared
    }

    pub fn is_overridden(&self, field_name: &str) -> bool {
        self.resolver.has_override(field_name)
    }

    /// Current override values of the managed fields
    pub fn override_snapshot(&self) -> OverrideMap {
        self.fields
            .iter()
            .filter_map(|name| {
                self.resolver
                    .overrides()
                    .get(name)
                    .map(|v| (name.clone(), v.clone()))
            })
            .collect()
    }

    /// Check that every field in `required` resolves to a filled value.
    /// All misses are reported, not just the first.
    pub fn validate_required<'a, I>(&self, required: I) -> RequiredCheck
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut errors = BTreeMap::new();
        for name in required {
            if !self.resolver.resolve(name).is_filled() {
                errors.insert(name.to_string(), self.required_message(name));
            }
        }
        RequiredCheck::from_errors(errors)
    }

    pub fn required_message(&self, field_name: &str) -> String {
        let label = self
            .registry()
            .definition_of(field_name)
            .map_or(field_name, |def| def.label.as_str());
        format!("{label} is required")
    }

    pub fn summary(&self) -> FieldSummary {
        let registry = self.registry();
        let mut overridden = 0;
        let mut inherited = 0;
        let mut inheritable_not_overridden = 0;
        let mut fields = Vec::with_capacity(self.fields.len());

        for name in &self.fields {
            let resolved = self.resolver.resolve(name);
            let is_overridden = resolved.source == FieldSource::Override;
            if is_overridden {
                overridden += 1;
            }
            if resolved.source == FieldSource::Inherited {
                inherited += 1;
            }
            if registry.is_inheritable(name) && !is_overridden {
                inheritable_not_overridden += 1;
            }
            fields.push(FieldDetail {
                name: name.clone(),
                value: resolved.value,
                source: resolved.source,
                required: registry.is_required(name),
                overridden: is_overridden,
            });
        }

        FieldSummary {
            total: self.fields.len(),
            overridden,
            inherited,
            inheritable_not_overridden,
            fields,
        }
    }
}
