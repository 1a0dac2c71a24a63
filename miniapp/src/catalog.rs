//! Static field mappings of the known mini-apps
//!
//! Each mini-app form names its inputs with local ids. A [`FieldMapping`]
//! translates those ids to canonical field names. Several local ids may map
//! to the same canonical field.

use crate::error::{MiniAppError, Result};
use marketkit_fields::{FieldRegistry, names};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Local id → canonical name table of one mini-app
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldMapping {
    entries: BTreeMap<String, String>,
}

impl FieldMapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs<I, L, C>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (L, C)>,
        L: Into<String>,
        C: Into<String>,
    {
        Self {
            entries: pairs
                .into_iter()
                .map(|(local, canonical)| (local.into(), canonical.into()))
                .collect(),
        }
    }

    /// Canonical name for a local id, when the table has an entry
    pub fn canonical_for(&self, local_id: &str) -> Option<&str> {
        self.entries.get(local_id).map(String::as_str)
    }

    pub fn contains(&self, local_id: &str) -> bool {
        self.entries.contains_key(local_id)
    }

    /// Local ids in sorted order
    pub fn local_ids(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Distinct canonical targets
    pub fn canonical_names(&self) -> impl Iterator<Item = &str> {
        let mut seen = std::collections::BTreeSet::new();
        self.entries
            .values()
            .map(String::as_str)
            .filter(move |name| seen.insert(*name))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(local, canonical)| (local.as_str(), canonical.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Registered canonical field behind a local id.
///
/// Lookup order: the mapping entry, then the id itself when it is a
/// registered name, then the snake_case alias table. Entries that point at
/// unregistered names yield `None`. Adapters and the analyzer both resolve
/// ids through here.
pub fn registered_canonical(
    mapping: Option<&FieldMapping>,
    registry: &FieldRegistry,
    local_id: &str,
) -> Option<String> {
    if let Some(canonical) = mapping
        .and_then(|mapping| mapping.canonical_for(local_id))
        .filter(|canonical| registry.contains(canonical))
    {
        return Some(canonical.to_string());
    }
    if registry.contains(local_id) {
        return Some(local_id.to_string());
    }
    names::canonical_for_alias(local_id)
        .filter(|canonical| registry.contains(canonical))
        .map(str::to_string)
}

/// A mini-app's mapping together with the local ids its form requires
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MiniAppDefinition {
    pub app_id: String,
    pub mapping: FieldMapping,
    /// Local ids that must be filled before the form can run
    pub required: Vec<String>,
}

impl MiniAppDefinition {
    /// Build a definition, rejecting empty ids and required ids the mapping
    /// does not contain.
    pub fn new(
        app_id: impl Into<String>,
        mapping: FieldMapping,
        required: Vec<String>,
    ) -> Result<Self> {
        let app_id = app_id.into();
        if app_id.trim().is_empty() {
            return Err(MiniAppError::invalid_mapping(app_id, "app id must not be empty"));
        }
        if let Some((local, _)) = mapping
            .iter()
            .find(|(local, canonical)| local.is_empty() || canonical.is_empty())
        {
            return Err(MiniAppError::invalid_mapping(
                app_id,
                format!("empty id in mapping entry '{local}'"),
            ));
        }
        if let Some(missing) = required.iter().find(|local| !mapping.contains(local)) {
            return Err(MiniAppError::invalid_mapping(
                app_id,
                format!("required field '{missing}' is not in the mapping"),
            ));
        }
        Ok(Self {
            app_id,
            mapping,
            required,
        })
    }
}

/// Every mini-app known to the process, keyed by app id
#[derive(Debug, Clone, Default)]
pub struct MappingCatalog {
    apps: BTreeMap<String, MiniAppDefinition>,
}

impl MappingCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog of the shipped presets
    pub fn builtin() -> Self {
        let mut catalog = Self::new();
        for (app_id, pairs, required) in PRESETS {
            let definition = MiniAppDefinition {
                app_id: (*app_id).to_string(),
                mapping: FieldMapping::from_pairs(pairs.iter().copied()),
                required: required.iter().map(|s| (*s).to_string()).collect(),
            };
            catalog.insert(definition);
        }
        catalog
    }

    /// Add or replace a mini-app definition
    pub fn insert(&mut self, definition: MiniAppDefinition) -> Option<MiniAppDefinition> {
        self.apps.insert(definition.app_id.clone(), definition)
    }

    pub fn get(&self, app_id: &str) -> Option<&MiniAppDefinition> {
        self.apps.get(app_id)
    }

    pub fn mapping(&self, app_id: &str) -> Option<&FieldMapping> {
        self.apps.get(app_id).map(|def| &def.mapping)
    }

    pub fn app_ids(&self) -> impl Iterator<Item = &str> {
        self.apps.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &MiniAppDefinition> {
        self.apps.values()
    }

    pub fn len(&self) -> usize {
        self.apps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.apps.is_empty()
    }
}

type Preset = (&'static str, &'static [(&'static str, &'static str)], &'static [&'static str]);

const PRESETS: &[Preset] = &[
    (
        "blog",
        &[
            ("productName", "productName"),
            ("targetAudience", "targetAudience"),
            ("topic", "contentTopic"),
            ("tone", "brandVoice"),
            ("length", "contentLength"),
            ("keywords", "keywords"),
            ("cta", "callToAction"),
        ],
        &["productName", "targetAudience"],
    ),
    (
        "social-media",
        &[
            ("product", "productName"),
            ("audience", "targetAudience"),
            ("postTopic", "contentTopic"),
            ("voice", "brandVoice"),
            ("hashtags", "keywords"),
            ("includeEmojis", "includeEmojis"),
        ],
        &["product", "postTopic"],
    ),
    (
        "email-campaign",
        &[
            ("product_name", "productName"),
            ("target_audience", "targetAudience"),
            ("subject_topic", "contentTopic"),
            ("voice", "brandVoice"),
            ("goal", "primaryGoal"),
            ("cta", "callToAction"),
        ],
        &["product_name", "target_audience", "cta"],
    ),
    (
        "ad-copy",
        &[
            ("productName", "productName"),
            ("audience", "targetAudience"),
            ("usp", "uniqueValueProposition"),
            ("budget", "marketingBudget"),
            ("cta", "callToAction"),
            ("landingUrl", "websiteUrl"),
        ],
        &["productName", "audience", "usp"],
    ),
    (
        "landing-page",
        &[
            ("productName", "productName"),
            ("productDescription", "productDescription"),
            ("targetAudience", "targetAudience"),
            ("features", "keyFeatures"),
            ("usp", "uniqueValueProposition"),
            ("websiteUrl", "websiteUrl"),
            ("cta", "callToAction"),
        ],
        &["productName", "productDescription"],
    ),
    (
        "press-release",
        &[
            ("product", "productName"),
            ("summary", "productDescription"),
            ("industry", "industry"),
            ("mediaContact", "contactEmail"),
            ("wordCount", "wordCount"),
        ],
        &["product", "summary", "mediaContact"],
    ),
    (
        "seo-content",
        &[
            ("productName", "productName"),
            ("targetAudience", "targetAudience"),
            ("topic", "contentTopic"),
            ("keywords", "keywords"),
            ("competitors", "competitors"),
            ("wordCount", "wordCount"),
        ],
        &["topic", "keywords"],
    ),
    (
        "product-launch",
        &[
            ("productName", "productName"),
            ("description", "productDescription"),
            ("targetAudience", "targetAudience"),
            ("launchGoal", "primaryGoal"),
            ("businessType", "businessType"),
            ("budget", "marketingBudget"),
        ],
        &["productName", "targetAudience", "launchGoal"],
    ),
];
