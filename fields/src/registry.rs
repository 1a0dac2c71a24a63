//! Canonical field registry
//!
//! A static, versioned catalog of the fields every mini-app shares. The
//! registry is built once (builtin table or a deployment TOML file), wrapped
//! in an `Arc` by callers, and never mutated afterwards.

use crate::error::{FieldError, Result};
use crate::types::FieldType;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Version of the builtin field table
pub const REGISTRY_VERSION: u32 = 3;

/// Extra format checks for string fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldFormat {
    Url,
    Email,
}

/// Widget the form layer should render
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WidgetHint {
    #[default]
    Text,
    Textarea,
    Select,
    Number,
    Toggle,
    Url,
}

/// Validation constraints beyond the type check
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationRule {
    /// Allowed values for enum fields
    pub allowed_values: Vec<String>,
    /// Inclusive lower bound for number fields
    pub min: Option<f64>,
    /// Inclusive upper bound for number fields
    pub max: Option<f64>,
    /// Maximum length in characters for string fields
    pub max_length: Option<usize>,
    pub format: Option<FieldFormat>,
}

/// UI metadata carried alongside the definition
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UiHint {
    pub placeholder: Option<String>,
    pub widget: WidgetHint,
}

/// One registered canonical field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalFieldDefinition {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    pub label: String,
    #[serde(default)]
    pub description: String,
    /// Global default; mini-apps may declare their own required set
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub inheritable: bool,
    #[serde(default)]
    pub validation: ValidationRule,
    #[serde(default)]
    pub ui: UiHint,
}

impl CanonicalFieldDefinition {
    pub fn new(name: impl Into<String>, field_type: FieldType, label: impl Into<String>) -> Self {
        let widget = match field_type {
            FieldType::String => WidgetHint::Text,
            FieldType::Number => WidgetHint::Number,
            FieldType::Enum => WidgetHint::Select,
            FieldType::Boolean => WidgetHint::Toggle,
        };
        Self {
            name: name.into(),
            field_type,
            label: label.into(),
            description: String::new(),
            required: false,
            inheritable: false,
            validation: ValidationRule::default(),
            ui: UiHint {
                placeholder: None,
                widget,
            },
        }
    }

    /// Builder: set description
    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Builder: mark globally required
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Builder: allow the value to come from project context
    pub fn inheritable(mut self) -> Self {
        self.inheritable = true;
        self
    }

    /// Builder: restrict an enum field to a value set
    pub fn with_values(mut self, values: &[&str]) -> Self {
        self.validation.allowed_values = values.iter().map(|v| (*v).to_string()).collect();
        self
    }

    /// Builder: inclusive numeric range
    pub fn with_range(mut self, min: Option<f64>, max: Option<f64>) -> Self {
        self.validation.min = min;
        self.validation.max = max;
        self
    }

    /// Builder: maximum string length
    pub fn with_max_length(mut self, max_length: usize) -> Self {
        self.validation.max_length = Some(max_length);
        self
    }

    /// Builder: string format check
    pub fn with_format(mut self, format: FieldFormat) -> Self {
        self.validation.format = Some(format);
        if format == FieldFormat::Url {
            self.ui.widget = WidgetHint::Url;
        }
        self
    }

    /// Builder: widget hint
    pub fn with_widget(mut self, widget: WidgetHint) -> Self {
        self.ui.widget = widget;
        self
    }

    /// Builder: placeholder text
    pub fn with_placeholder(mut self, placeholder: impl Into<String>) -> Self {
        self.ui.placeholder = Some(placeholder.into());
        self
    }

    fn check(&self) -> Result<()> {
        let invalid = |reason: &str| FieldError::InvalidDefinition {
            name: self.name.clone(),
            reason: reason.to_string(),
        };

        if self.name.trim().is_empty() {
            return Err(invalid("name must not be empty"));
        }
        if self.field_type == FieldType::Enum && self.validation.allowed_values.is_empty() {
            return Err(invalid("enum fields need at least one allowed value"));
        }
        if self.field_type != FieldType::Enum && !self.validation.allowed_values.is_empty() {
            return Err(invalid("allowed_values is only meaningful for enum fields"));
        }
        if let (Some(min), Some(max)) = (self.validation.min, self.validation.max)
            && min > max
        {
            return Err(invalid("min is greater than max"));
        }
        Ok(())
    }
}

/// On-disk shape of a registry file
#[derive(Debug, Deserialize)]
struct RegistryFile {
    #[serde(default)]
    version: u32,
    #[serde(default, rename = "field")]
    fields: Vec<CanonicalFieldDefinition>,
}

/// Read-only lookup over canonical field definitions
#[derive(Debug, Clone)]
pub struct FieldRegistry {
    version: u32,
    definitions: BTreeMap<String, CanonicalFieldDefinition>,
}

impl FieldRegistry {
    /// Build a registry, rejecting duplicate names and inconsistent rules
    pub fn from_definitions(
        version: u32,
        definitions: Vec<CanonicalFieldDefinition>,
    ) -> Result<Self> {
        let mut by_name = BTreeMap::new();
        for def in definitions {
            def.check()?;
            if by_name.contains_key(&def.name) {
                return Err(FieldError::DuplicateField { name: def.name });
            }
            by_name.insert(def.name.clone(), def);
        }
        Ok(Self {
            version,
            definitions: by_name,
        })
    }

    /// The builtin catalog shipped with the engine
    pub fn builtin() -> Self {
        let definitions = builtin_definitions()
            .into_iter()
            .map(|def| (def.name.clone(), def))
            .collect();
        Self {
            version: REGISTRY_VERSION,
            definitions,
        }
    }

    /// Parse a registry from TOML (`[[field]]` tables)
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let file: RegistryFile =
            toml::from_str(contents).map_err(|source| FieldError::RegistryParse { source })?;
        let registry = Self::from_definitions(file.version, file.fields)?;
        tracing::info!(
            version = registry.version,
            fields = registry.len(),
            "Loaded field registry"
        );
        Ok(registry)
    }

    /// Load a registry file from disk
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|source| FieldError::RegistryRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    /// Definition for a canonical name, or `None` when not recognized
    pub fn definition_of(&self, name: &str) -> Option<&CanonicalFieldDefinition> {
        self.definitions.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.definitions.contains_key(name)
    }

    /// Unknown fields are never inheritable
    pub fn is_inheritable(&self, name: &str) -> bool {
        self.definition_of(name).is_some_and(|def| def.inheritable)
    }

    pub fn is_required(&self, name: &str) -> bool {
        self.definition_of(name).is_some_and(|def| def.required)
    }

    pub fn field_type_of(&self, name: &str) -> Option<FieldType> {
        self.definition_of(name).map(|def| def.field_type)
    }

    /// All canonical names in sorted order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.definitions.keys().map(String::as_str)
    }

    pub fn definitions(&self) -> impl Iterator<Item = &CanonicalFieldDefinition> {
        self.definitions.values()
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    pub fn version(&self) -> u32 {
        self.version
    }
}

impl Default for FieldRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

fn builtin_definitions() -> Vec<CanonicalFieldDefinition> {
    use FieldType::{Boolean, Enum, Number, String};

    vec![
        CanonicalFieldDefinition::new("productName", String, "Product name")
            .describe("Name of the product or service being marketed")
            .required()
            .inheritable()
            .with_max_length(120)
            .with_placeholder("e.g. Acme Analytics"),
        CanonicalFieldDefinition::new("productDescription", String, "Product description")
            .describe("What the product does, in a few sentences")
            .inheritable()
            .with_max_length(2000)
            .with_widget(WidgetHint::Textarea),
        CanonicalFieldDefinition::new("targetAudience", String, "Target audience")
            .describe("Who the content is written for")
            .required()
            .inheritable()
            .with_max_length(500)
            .with_placeholder("e.g. B2B founders"),
        CanonicalFieldDefinition::new("brandVoice", Enum, "Brand voice")
            .describe("Overall tone the brand speaks in")
            .inheritable()
            .with_values(&[
                "professional",
                "casual",
                "friendly",
                "authoritative",
                "playful",
                "inspirational",
            ]),
        CanonicalFieldDefinition::new("industry", String, "Industry")
            .inheritable()
            .with_max_length(120),
        CanonicalFieldDefinition::new("businessType", Enum, "Business type")
            .inheritable()
            .with_values(&["b2b", "b2c", "saas", "ecommerce", "agency", "nonprofit", "other"]),
        CanonicalFieldDefinition::new("marketingBudget", Number, "Marketing budget")
            .describe("Monthly marketing budget in USD")
            .inheritable()
            .with_range(Some(0.0), None),
        CanonicalFieldDefinition::new("primaryGoal", Enum, "Primary goal")
            .inheritable()
            .with_values(&["awareness", "leads", "sales", "engagement", "retention"]),
        CanonicalFieldDefinition::new("uniqueValueProposition", String, "Unique value proposition")
            .describe("Why customers pick this product over alternatives")
            .inheritable()
            .with_max_length(1000)
            .with_widget(WidgetHint::Textarea),
        CanonicalFieldDefinition::new("keyFeatures", String, "Key features")
            .inheritable()
            .with_max_length(2000)
            .with_widget(WidgetHint::Textarea),
        CanonicalFieldDefinition::new("competitors", String, "Competitors")
            .inheritable()
            .with_max_length(1000),
        CanonicalFieldDefinition::new("websiteUrl", String, "Website URL")
            .inheritable()
            .with_format(FieldFormat::Url)
            .with_placeholder("https://"),
        CanonicalFieldDefinition::new("contactEmail", String, "Contact email")
            .inheritable()
            .with_format(FieldFormat::Email),
        CanonicalFieldDefinition::new("callToAction", String, "Call to action")
            .inheritable()
            .with_max_length(200),
        CanonicalFieldDefinition::new("keywords", String, "Keywords")
            .describe("Comma-separated SEO keywords")
            .inheritable()
            .with_max_length(500),
        CanonicalFieldDefinition::new("contentTopic", String, "Topic")
            .describe("Subject of this specific piece of content")
            .with_max_length(300),
        CanonicalFieldDefinition::new("contentLength", Enum, "Length")
            .with_values(&["short", "medium", "long"]),
        CanonicalFieldDefinition::new("wordCount", Number, "Word count")
            .with_range(Some(50.0), Some(5000.0)),
        CanonicalFieldDefinition::new("includeEmojis", Boolean, "Include emojis"),
    ]
}
