//! Whole-catalog coverage report

use crate::analyzer::{Recommendation, SchemaConsolidationAnalyzer, rate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Mapping coverage of one mini-app
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppCoverage {
    pub app_id: String,
    /// Mapping entries
    pub total: usize,
    /// Entries whose target is a registered canonical field
    pub mapped: usize,
    /// Local ids whose target is not registered
    pub dangling: Vec<String>,
    pub coverage_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverageReport {
    pub registry_version: u32,
    pub apps: Vec<AppCoverage>,
    pub overall_rate: f64,
    /// Registered canonical fields no mini-app maps to
    pub unused_fields: Vec<String>,
    pub recommendations: Vec<Recommendation>,
}

impl CoverageReport {
    /// Whether every mapping entry of every app targets a registered field
    pub fn is_fully_mapped(&self) -> bool {
        self.apps.iter().all(|app| app.dangling.is_empty())
    }
}

impl SchemaConsolidationAnalyzer {
    pub fn coverage_report(&self) -> CoverageReport {
        let registry = self.registry();
        let mut apps = Vec::new();
        let mut used = BTreeSet::new();
        let (mut mapped_total, mut entries_total) = (0, 0);

        for def in self.catalog().iter() {
            let mut mapped = 0;
            let mut dangling = Vec::new();
            for (local_id, canonical) in def.mapping.iter() {
                if registry.contains(canonical) {
                    mapped += 1;
                    used.insert(canonical);
                } else {
                    dangling.push(local_id.to_string());
                }
            }
            let total = def.mapping.len();
            mapped_total += mapped;
            entries_total += total;
            if !dangling.is_empty() {
                tracing::debug!(
                    app_id = %def.app_id,
                    dangling = ?dangling,
                    "Mapping has dangling entries"
                );
            }
            apps.push(AppCoverage {
                app_id: def.app_id.clone(),
                total,
                mapped,
                dangling,
                coverage_rate: rate(mapped, total),
            });
        }

        let unused_fields = registry
            .names()
            .filter(|name| !used.contains(name))
            .map(str::to_string)
            .collect();

        CoverageReport {
            registry_version: registry.version(),
            apps,
            overall_rate: rate(mapped_total, entries_total),
            unused_fields,
            recommendations: self.recommendations(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use marketkit_fields::FieldRegistry;
    use marketkit_miniapp::{FieldMapping, MappingCatalog, MiniAppDefinition};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    #[test]
    fn builtin_catalog_is_fully_mapped() {
        let analyzer = SchemaConsolidationAnalyzer::new(
            Arc::new(FieldRegistry::builtin()),
            Arc::new(MappingCatalog::builtin()),
        );
        let report = analyzer.coverage_report();
        assert!(report.is_fully_mapped());
        assert_eq!(report.overall_rate, 100.0);
        assert_eq!(report.apps.len(), 8);
        assert!(report.unused_fields.is_empty(), "{:?}", report.unused_fields);
    }

    #[test]
    fn dangling_entries_lower_coverage() {
        let mut catalog = MappingCatalog::new();
        catalog.insert(MiniAppDefinition {
            app_id: "legacy".to_string(),
            mapping: FieldMapping::from_pairs([
                ("product", "productName"),
                ("slogan", "tagline"),
                ("sector", "vertical"),
                ("who", "targetAudience"),
            ]),
            required: Vec::new(),
        });
        let analyzer =
            SchemaConsolidationAnalyzer::new(Arc::new(FieldRegistry::builtin()), Arc::new(catalog));
        let report = analyzer.coverage_report();

        assert!(!report.is_fully_mapped());
        let legacy = &report.apps[0];
        assert_eq!(legacy.mapped, 2);
        assert_eq!(legacy.dangling, vec!["sector", "slogan"]);
        assert_eq!(legacy.coverage_rate, 50.0);
        assert!(report.unused_fields.contains(&"wordCount".to_string()));
        assert!(report.recommendations.is_empty());
    }

    #[test]
    fn empty_catalog_reports_zero_rate() {
        let analyzer = SchemaConsolidationAnalyzer::new(
            Arc::new(FieldRegistry::builtin()),
            Arc::new(MappingCatalog::new()),
        );
        let report = analyzer.coverage_report();
        assert_eq!(report.overall_rate, 0.0);
        assert!(report.apps.is_empty());
    }
}
