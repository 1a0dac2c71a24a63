//! Core value and provenance types shared by the resolver layers

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Project-level canonical values, keyed by canonical field name.
pub type ContextMap = BTreeMap<String, Value>;

/// Task-level override values, keyed by canonical field name.
pub type OverrideMap = BTreeMap<String, Value>;

/// The single declared type of a canonical field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Number,
    Enum,
    Boolean,
}

impl FieldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Enum => "enum",
            Self::Boolean => "boolean",
        }
    }

    /// Parse from string (case-insensitive). `select` is accepted as an
    /// alias for `enum` since mini-app forms describe choice widgets that way.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "string" | "text" => Some(Self::String),
            "number" => Some(Self::Number),
            "enum" | "select" => Some(Self::Enum),
            "boolean" | "bool" => Some(Self::Boolean),
            _ => None,
        }
    }
}

impl std::fmt::Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a resolved value came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldSource {
    /// Task-scoped override
    Override,
    /// Project context value
    Inherited,
    /// Nothing set anywhere; the value is null
    Default,
}

impl FieldSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Override => "override",
            Self::Inherited => "inherited",
            Self::Default => "default",
        }
    }
}

impl std::fmt::Display for FieldSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Effective value of one field together with its provenance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedField {
    pub value: Value,
    pub source: FieldSource,
}

impl ResolvedField {
    pub fn overridden(value: Value) -> Self {
        Self {
            value,
            source: FieldSource::Override,
        }
    }

    pub fn inherited(value: Value) -> Self {
        Self {
            value,
            source: FieldSource::Inherited,
        }
    }

    pub fn default_value() -> Self {
        Self {
            value: Value::Null,
            source: FieldSource::Default,
        }
    }

    pub fn is_filled(&self) -> bool {
        is_filled(&self.value)
    }
}

/// The (project, task) pair a batch of fields is resolved for
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldScope {
    pub project_id: String,
    pub task_id: String,
}

impl FieldScope {
    pub fn new(project_id: impl Into<String>, task_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            task_id: task_id.into(),
        }
    }
}

impl std::fmt::Display for FieldScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.project_id, self.task_id)
    }
}

/// A value takes part in resolution only when it is not null.
pub fn is_present(value: &Value) -> bool {
    !value.is_null()
}

/// A required field counts as filled when its value is non-null and, for
/// strings, non-empty.
pub fn is_filled(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.is_empty(),
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn filled_rejects_null_and_empty_strings() {
        assert!(!is_filled(&Value::Null));
        assert!(!is_filled(&json!("")));
        assert!(is_filled(&json!("x")));
        assert!(is_filled(&json!(0)));
        assert!(is_filled(&json!(false)));
    }

    #[test]
    fn field_type_parse_accepts_aliases() {
        assert_eq!(FieldType::parse("Select"), Some(FieldType::Enum));
        assert_eq!(FieldType::parse("text"), Some(FieldType::String));
        assert_eq!(FieldType::parse("bool"), Some(FieldType::Boolean));
        assert_eq!(FieldType::parse("date"), None);
    }

    #[test]
    fn source_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&FieldSource::Inherited).ok().as_deref(),
            Some("\"inherited\"")
        );
    }
}
