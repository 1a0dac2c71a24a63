//! Single-field resolution
//!
//! Precedence is fixed: override, then inherited project context (only for
//! inheritable fields), then default. The resolver holds the two value maps
//! it is given and performs no I/O.

use crate::error::Result;
use crate::registry::FieldRegistry;
use crate::types::{ContextMap, OverrideMap, ResolvedField, is_present};
use crate::validation::{ValidationOutcome, ValidationService};
use serde_json::Value;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct FieldResolver {
    validator: ValidationService,
    context: ContextMap,
    overrides: OverrideMap,
}

impl FieldResolver {
    pub fn new(registry: Arc<FieldRegistry>) -> Self {
        Self {
            validator: ValidationService::new(registry),
            context: ContextMap::new(),
            overrides: OverrideMap::new(),
        }
    }

    /// Builder: install project context
    pub fn with_context(mut self, context: ContextMap) -> Self {
        self.context = context;
        self
    }

    /// Builder: install task overrides
    pub fn with_overrides(mut self, overrides: OverrideMap) -> Self {
        self.replace_overrides(overrides);
        self
    }

    pub fn registry(&self) -> &FieldRegistry {
        self.validator.registry()
    }

    pub fn validator(&self) -> &ValidationService {
        &self.validator
    }

    /// Effective value and provenance of `field_name`
    pub fn resolve(&self, field_name: &str) -> ResolvedField {
        if let Some(value) = self.overrides.get(field_name).filter(|v| is_present(v)) {
            return ResolvedField::overridden(value.clone());
        }
        if self.registry().is_inheritable(field_name)
            && let Some(value) = self.context.get(field_name).filter(|v| is_present(v))
        {
            return ResolvedField::inherited(value.clone());
        }
        ResolvedField::default_value()
    }

    /// Validate and stage an override.
    ///
    /// An invalid value leaves the override map exactly as it was. A `Null`
    /// value is valid and clears the override.
    pub fn set_override(&mut self, field_name: &str, value: Value) -> Result<ValidationOutcome> {
        let outcome = self.validator.validate(field_name, &value)?;
        if outcome.is_valid {
            self.stage(field_name, value);
        }
        Ok(outcome)
    }

    /// Stage a value for a field with no registry entry. No validation is
    /// performed and the value can never be inherited.
    pub fn set_unchecked(&mut self, field_name: &str, value: Value) {
        self.stage(field_name, value);
    }

    /// Remove an override; returns whether one existed
    pub fn clear_override(&mut self, field_name: &str) -> bool {
        self.overrides.remove(field_name).is_some()
    }

    pub fn has_override(&self, field_name: &str) -> bool {
        self.overrides.get(field_name).is_some_and(is_present)
    }

    pub fn context(&self) -> &ContextMap {
        &self.context
    }

    pub fn overrides(&self) -> &OverrideMap {
        &self.overrides
    }

    pub fn replace_context(&mut self, context: ContextMap) {
        self.context = context;
    }

    /// Replace the override map; null entries are dropped
    pub fn replace_overrides(&mut self, overrides: OverrideMap) {
        self.overrides = overrides.into_iter().filter(|(_, v)| is_present(v)).collect();
    }

    fn stage(&mut self, field_name: &str, value: Value) {
        if value.is_null() {
            self.overrides.remove(field_name);
        } else {
            self.overrides.insert(field_name.to_string(), value);
        }
    }
}
