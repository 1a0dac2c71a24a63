//! How a caller names the mini-app it wants an adapter for
//!
//! Either a preset from the [`MappingCatalog`] or a custom mapping supplied
//! inline. The choice is resolved to a [`MiniAppDefinition`] once, at
//! construction time.

use crate::catalog::{FieldMapping, MappingCatalog, MiniAppDefinition};
use crate::error::{MiniAppError, Result};
use marketkit_fields::FieldRegistry;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MiniAppFieldSpec {
    /// A mini-app shipped in the catalog
    Preset { name: String },

    /// An inline mapping. With `required: None` the required local ids are
    /// derived from the registry's global `required` flags.
    Custom {
        app_id: String,
        mappings: BTreeMap<String, String>,
        #[serde(default)]
        required: Option<Vec<String>>,
    },
}

impl MiniAppFieldSpec {
    pub fn preset(name: impl Into<String>) -> Self {
        Self::Preset { name: name.into() }
    }

    pub fn custom<I, L, C>(app_id: impl Into<String>, mappings: I) -> Self
    where
        I: IntoIterator<Item = (L, C)>,
        L: Into<String>,
        C: Into<String>,
    {
        Self::Custom {
            app_id: app_id.into(),
            mappings: mappings
                .into_iter()
                .map(|(l, c)| (l.into(), c.into()))
                .collect(),
            required: None,
        }
    }

    /// Builder: set the required local ids of a custom spec
    pub fn with_required<I, S>(self, required: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        match self {
            Self::Custom {
                app_id, mappings, ..
            } => Self::Custom {
                app_id,
                mappings,
                required: Some(required.into_iter().map(Into::into).collect()),
            },
            preset @ Self::Preset { .. } => preset,
        }
    }

    pub fn resolve(
        self,
        catalog: &MappingCatalog,
        registry: &FieldRegistry,
    ) -> Result<MiniAppDefinition> {
        match self {
            Self::Preset { name } => catalog
                .get(&name)
                .cloned()
                .ok_or(MiniAppError::UnknownPreset { name }),
            Self::Custom {
                app_id,
                mappings,
                required,
            } => {
                let mapping = FieldMapping::from_pairs(mappings);
                let required = match required {
                    Some(required) => required,
                    None => mapping
                        .iter()
                        .filter(|(_, canonical)| registry.is_required(canonical))
                        .map(|(local, _)| local.to_string())
                        .collect(),
                };
                MiniAppDefinition::new(app_id, mapping, required)
            }
        }
    }
}
