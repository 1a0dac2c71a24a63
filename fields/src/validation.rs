//! Field value validation
//!
//! Checks a candidate value against the registered type and rule of a
//! canonical field. Invalid input produces a [`ValidationOutcome`] with an
//! explanatory message; only an unregistered field name is an `Err`.

use crate::error::{FieldError, Result};
use crate::registry::{CanonicalFieldDefinition, FieldFormat, FieldRegistry};
use crate::types::FieldType;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// Result of validating one value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationOutcome {
    pub is_valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ValidationOutcome {
    pub fn valid() -> Self {
        Self {
            is_valid: true,
            error: None,
        }
    }

    pub fn invalid(error: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            error: Some(error.into()),
        }
    }
}

/// Stateless validator over a shared registry
#[derive(Debug, Clone)]
pub struct ValidationService {
    registry: Arc<FieldRegistry>,
}

impl ValidationService {
    pub fn new(registry: Arc<FieldRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &FieldRegistry {
        &self.registry
    }

    /// Validate `value` for the canonical field `field_name`.
    ///
    /// `Null` is always valid: it means "no value" and clears an override.
    pub fn validate(&self, field_name: &str, value: &Value) -> Result<ValidationOutcome> {
        let def = self
            .registry
            .definition_of(field_name)
            .ok_or_else(|| FieldError::unknown_field(field_name))?;
        Ok(validate_definition(def, value))
    }
}

/// Validate against a definition directly
pub fn validate_definition(def: &CanonicalFieldDefinition, value: &Value) -> ValidationOutcome {
    if value.is_null() {
        return ValidationOutcome::valid();
    }
    let checked = match def.field_type {
        FieldType::String => check_string(def, value),
        FieldType::Number => check_number(def, value),
        FieldType::Enum => check_enum(def, value),
        FieldType::Boolean => check_boolean(def, value),
    };
    match checked {
        Ok(()) => ValidationOutcome::valid(),
        Err(message) => ValidationOutcome::invalid(message),
    }
}

/// Numeric view of a number field's value; numeric strings are accepted.
pub fn numeric_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
        _ => None,
    }
}

fn check_string(def: &CanonicalFieldDefinition, value: &Value) -> std::result::Result<(), String> {
    let Value::String(s) = value else {
        return Err(format!("{} must be text", def.label));
    };
    if let Some(max) = def.validation.max_length {
        let len = s.chars().count();
        if len > max {
            return Err(format!(
                "{} must be at most {max} characters (got {len})",
                def.label
            ));
        }
    }
    match def.validation.format {
        Some(FieldFormat::Url) if !looks_like_url(s) => Err(format!(
            "{} must be a URL starting with http:// or https://",
            def.label
        )),
        Some(FieldFormat::Email) if !looks_like_email(s) => {
            Err(format!("{} must be a valid email address", def.label))
        }
        _ => Ok(()),
    }
}

fn check_number(def: &CanonicalFieldDefinition, value: &Value) -> std::result::Result<(), String> {
    let Some(n) = numeric_value(value) else {
        return Err(format!("{} must be a number", def.label));
    };
    if let Some(min) = def.validation.min
        && n < min
    {
        return Err(format!("{} must be at least {min}", def.label));
    }
    if let Some(max) = def.validation.max
        && n > max
    {
        return Err(format!("{} must be at most {max}", def.label));
    }
    Ok(())
}

fn check_enum(def: &CanonicalFieldDefinition, value: &Value) -> std::result::Result<(), String> {
    let allowed = &def.validation.allowed_values;
    match value {
        Value::String(s) if allowed.iter().any(|a| a == s) => Ok(()),
        _ => Err(format!(
            "{} must be one of: {}",
            def.label,
            allowed.join(", ")
        )),
    }
}

fn check_boolean(def: &CanonicalFieldDefinition, value: &Value) -> std::result::Result<(), String> {
    match value {
        Value::Bool(_) => Ok(()),
        Value::String(s) if matches!(s.as_str(), "true" | "false") => Ok(()),
        _ => Err(format!("{} must be true or false", def.label)),
    }
}

fn looks_like_url(s: &str) -> bool {
    let rest = s
        .strip_prefix("https://")
        .or_else(|| s.strip_prefix("http://"));
    match rest {
        Some(rest) => {
            let host = rest.split(['/', '?', '#']).next().unwrap_or_default();
            !host.is_empty() && !host.contains(char::is_whitespace)
        }
        None => false,
    }
}

fn looks_like_email(s: &str) -> bool {
    let mut parts = s.split('@');
    let (Some(local), Some(domain), None) = (parts.next(), parts.next(), parts.next()) else {
        return false;
    };
    !local.is_empty()
        && !s.contains(char::is_whitespace)
        && domain.split('.').count() >= 2
        && domain.split('.').all(|label| !label.is_empty())
}
