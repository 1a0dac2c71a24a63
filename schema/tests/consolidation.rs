#![allow(clippy::expect_used, clippy::unwrap_used)]

use marketkit_fields::{ContextMap, FieldRegistry, FieldScope, FieldType, OverrideMap};
use marketkit_miniapp::{MappingCatalog, MiniAppFieldAdapter, MiniAppFieldSpec};
use marketkit_schema::{LocalFieldDescriptor, Priority, SchemaConsolidationAnalyzer};
use pretty_assertions::assert_eq;
use std::sync::Arc;

fn analyzer() -> SchemaConsolidationAnalyzer {
    SchemaConsolidationAnalyzer::new(
        Arc::new(FieldRegistry::builtin()),
        Arc::new(MappingCatalog::builtin()),
    )
}

#[test]
fn blog_descriptors_two_of_three_mapped() {
    let descriptors: Vec<LocalFieldDescriptor> =
        serde_json::from_str(r#"[{"id":"product_name"},{"id":"target_audience"},{"id":"custom_x"}]"#)
            .expect("descriptors");
    let result = analyzer().consolidate("blog", &descriptors);

    assert_eq!(result.unmapped_fields, vec!["custom_x"]);
    assert_eq!(format!("{:.1}", result.consolidation_rate), "66.7");
}

#[test]
fn adapters_resolve_ids_the_analyzer_consolidates() {
    let registry = Arc::new(FieldRegistry::builtin());
    let catalog = MappingCatalog::builtin();
    let analyzer = analyzer();
    let context: ContextMap = registry
        .names()
        .filter(|name| registry.is_inheritable(name))
        .map(|name| (name.to_string(), serde_json::json!("from context")))
        .collect();

    for app_id in catalog.app_ids() {
        let mut adapter = MiniAppFieldAdapter::new(
            registry.clone(),
            &catalog,
            MiniAppFieldSpec::preset(app_id),
            FieldScope::new("p1", "t1"),
        )
        .expect("preset");
        adapter.load(context.clone(), OverrideMap::new());

        for local_id in ["product_name", "target_audience", "website_url", "custom_x"] {
            let canonical = analyzer.map_local_to_canonical(app_id, local_id);
            assert_eq!(
                canonical.is_some(),
                !adapter.get_field(local_id).value.is_null(),
                "{app_id}/{local_id}"
            );
            if let Some(canonical) = canonical {
                assert_eq!(adapter.storage_name(local_id), canonical, "{app_id}/{local_id}");
            }
        }
        assert!(adapter.ad_hoc_fields().is_empty());
    }
}

#[test]
fn descriptor_json_accepts_declared_type() {
    let descriptors: Vec<LocalFieldDescriptor> =
        serde_json::from_str(r#"[{"id":"wordCount","type":"string"},{"id":"topic","type":"string"}]"#)
            .expect("descriptors");
    assert_eq!(descriptors[0].field_type, Some(FieldType::String));

    let validation = analyzer().validate_against_schema("seo-content", &descriptors);
    assert!(!validation.is_valid);
    assert_eq!(validation.issues.len(), 1);
    assert!(validation.issues[0].to_string().contains("wordCount"));
}

#[test]
fn every_preset_consolidates_its_own_mapping_fully() {
    let a = analyzer();
    for def in a.catalog().iter() {
        let descriptors: Vec<LocalFieldDescriptor> = def
            .mapping
            .local_ids()
            .map(LocalFieldDescriptor::new)
            .collect();
        let result = a.consolidate(&def.app_id, &descriptors);
        assert_eq!(result.consolidation_rate, 100.0, "{}", def.app_id);
        assert!(a.validate_against_schema(&def.app_id, &descriptors).is_valid);
    }
}

#[test]
fn report_serializes_for_tooling() {
    let report = analyzer().coverage_report();
    let json = serde_json::to_value(&report).expect("serialize");

    assert_eq!(json["apps"].as_array().map(Vec::len), Some(8));
    assert_eq!(json["recommendations"][0]["canonical"], "productName");
    assert_eq!(json["recommendations"][0]["priority"], "critical");

    let high: Vec<&str> = report
        .recommendations
        .iter()
        .filter(|r| r.priority == Priority::High)
        .map(|r| r.canonical.as_str())
        .collect();
    assert!(high.contains(&"brandVoice"));
    assert!(high.contains(&"callToAction"));
}
