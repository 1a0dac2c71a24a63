//! Mapping analysis over the whole mini-app catalog
//!
//! Everything here is a pure function of the catalog and the registry.
//! Live resolved state is never consulted.

use marketkit_fields::{FieldRegistry, FieldType};
use marketkit_miniapp::{MappingCatalog, registered_canonical};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Usage count from which a shared field is flagged critical
pub const CRITICAL_USAGE: usize = 5;
/// Usage count from which a shared field is flagged high
pub const HIGH_USAGE: usize = 3;

/// A form input as declared by a mini-app
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalFieldDescriptor {
    pub id: String,
    /// Declared local type, when the form states one
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub field_type: Option<FieldType>,
}

impl LocalFieldDescriptor {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            field_type: None,
        }
    }

    pub fn typed(id: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            id: id.into(),
            field_type: Some(field_type),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsolidatedField {
    pub local_id: String,
    pub canonical: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsolidationResult {
    pub consolidated_fields: Vec<ConsolidatedField>,
    pub unmapped_fields: Vec<String>,
    /// Percentage of descriptors with a canonical mapping; 0 for no descriptors
    pub consolidation_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SchemaIssue {
    Unmapped {
        local_id: String,
    },
    TypeMismatch {
        local_id: String,
        canonical: String,
        expected: FieldType,
        found: FieldType,
    },
}

impl std::fmt::Display for SchemaIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unmapped { local_id } => {
                write!(f, "{local_id}: no canonical field mapping")
            }
            Self::TypeMismatch {
                local_id,
                canonical,
                expected,
                found,
            } => write!(
                f,
                "{local_id}: declared {found} but {canonical} is registered as {expected}"
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaValidation {
    pub is_valid: bool,
    pub issues: Vec<SchemaIssue>,
}

/// Ordered most urgent first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Critical,
    High,
}

impl Priority {
    /// Priority for a field used by `usage` distinct mini-apps
    pub fn for_usage(usage: usize) -> Option<Self> {
        if usage >= CRITICAL_USAGE {
            Some(Self::Critical)
        } else if usage >= HIGH_USAGE {
            Some(Self::High)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::High => "high",
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recommendation {
    pub canonical: String,
    pub priority: Priority,
    pub usage_count: usize,
    pub mini_apps: Vec<String>,
    pub inheritable: bool,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct SchemaConsolidationAnalyzer {
    registry: Arc<FieldRegistry>,
    catalog: Arc<MappingCatalog>,
}

impl SchemaConsolidationAnalyzer {
    pub fn new(registry: Arc<FieldRegistry>, catalog: Arc<MappingCatalog>) -> Self {
        Self { registry, catalog }
    }

    pub fn registry(&self) -> &FieldRegistry {
        &self.registry
    }

    pub fn catalog(&self) -> &MappingCatalog {
        &self.catalog
    }

    /// Canonical field a local id of `app_id` stands for.
    ///
    /// Lookup order: the app's mapping table, then the id itself when it is
    /// a registered canonical name, then the snake_case alias table. Table
    /// entries pointing at unregistered fields are not canonical.
    pub fn map_local_to_canonical(&self, app_id: &str, local_id: &str) -> Option<String> {
        registered_canonical(self.catalog.mapping(app_id), &self.registry, local_id)
    }

    /// Registered canonical fields the app's mapping points at
    pub fn canonical_fields_used_by(&self, app_id: &str) -> BTreeSet<String> {
        self.catalog
            .mapping(app_id)
            .map(|mapping| {
                mapping
                    .canonical_names()
                    .filter(|canonical| self.registry.contains(canonical))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Sorted ids of the mini-apps whose mapping points at `canonical`
    pub fn mini_apps_using(&self, canonical: &str) -> Vec<String> {
        self.catalog
            .iter()
            .filter(|def| def.mapping.iter().any(|(_, target)| target == canonical))
            .map(|def| def.app_id.clone())
            .collect()
    }

    pub fn consolidate(
        &self,
        app_id: &str,
        descriptors: &[LocalFieldDescriptor],
    ) -> ConsolidationResult {
        let mut consolidated_fields = Vec::new();
        let mut unmapped_fields = Vec::new();
        for descriptor in descriptors {
            match self.map_local_to_canonical(app_id, &descriptor.id) {
                Some(canonical) => consolidated_fields.push(ConsolidatedField {
                    local_id: descriptor.id.clone(),
                    canonical,
                }),
                None => unmapped_fields.push(descriptor.id.clone()),
            }
        }
        let consolidation_rate = rate(consolidated_fields.len(), descriptors.len());
        ConsolidationResult {
            consolidated_fields,
            unmapped_fields,
            consolidation_rate,
        }
    }

    /// Flag descriptors without a canonical mapping and declared types that
    /// disagree with the registered type
    pub fn validate_against_schema(
        &self,
        app_id: &str,
        descriptors: &[LocalFieldDescriptor],
    ) -> SchemaValidation {
        let mut issues = Vec::new();
        for descriptor in descriptors {
            let Some(canonical) = self.map_local_to_canonical(app_id, &descriptor.id) else {
                issues.push(SchemaIssue::Unmapped {
                    local_id: descriptor.id.clone(),
                });
                continue;
            };
            if let (Some(found), Some(expected)) =
                (descriptor.field_type, self.registry.field_type_of(&canonical))
                && found != expected
            {
                issues.push(SchemaIssue::TypeMismatch {
                    local_id: descriptor.id.clone(),
                    canonical,
                    expected,
                    found,
                });
            }
        }
        SchemaValidation {
            is_valid: issues.is_empty(),
            issues,
        }
    }

    /// Canonical fields shared by enough mini-apps to manage at project
    /// level, most urgent first
    pub fn recommendations(&self) -> Vec<Recommendation> {
        let mut out: Vec<Recommendation> = self
            .registry
            .definitions()
            .filter_map(|def| {
                let mini_apps = self.mini_apps_using(&def.name);
                let usage_count = mini_apps.len();
                let priority = Priority::for_usage(usage_count)?;
                let message = if def.inheritable {
                    format!(
                        "{} is used by {usage_count} mini-apps; prefill it from project context",
                        def.name
                    )
                } else {
                    format!(
                        "{} is used by {usage_count} mini-apps but is task-specific; consider making it inheritable",
                        def.name
                    )
                };
                Some(Recommendation {
                    canonical: def.name.clone(),
                    priority,
                    usage_count,
                    mini_apps,
                    inheritable: def.inheritable,
                    message,
                })
            })
            .collect();
        out.sort_by(|a, b| {
            a.priority
                .cmp(&b.priority)
                .then_with(|| b.usage_count.cmp(&a.usage_count))
                .then_with(|| a.canonical.cmp(&b.canonical))
        });
        out
    }
}

/// `100 * part / total`, 0 when `total` is 0
pub(crate) fn rate(part: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    100.0 * part as f64 / total as f64
}
