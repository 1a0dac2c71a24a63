#![allow(clippy::expect_used, clippy::unwrap_used)]

use marketkit_fields::{ContextMap, FieldRegistry, FieldScope, OverrideMap};
use marketkit_miniapp::{MappingCatalog, MiniAppFieldAdapter, MiniAppFieldSpec};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;

fn adapter_for(app: &str, task_id: &str) -> MiniAppFieldAdapter {
    MiniAppFieldAdapter::new(
        Arc::new(FieldRegistry::builtin()),
        &MappingCatalog::builtin(),
        MiniAppFieldSpec::preset(app),
        FieldScope::new("p1", task_id),
    )
    .expect("preset")
}

fn project_context() -> ContextMap {
    [
        ("productName", json!("Acme Analytics")),
        ("targetAudience", json!("B2B founders")),
        ("brandVoice", json!("friendly")),
        ("keywords", json!("dashboards, kpis")),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect()
}

#[test]
fn blog_requires_product_and_audience() {
    let adapter = adapter_for("blog", "t1");
    let check = adapter.validate_required();
    assert!(!check.is_valid);
    assert_eq!(check.errors.len(), 2);
    assert!(check.errors.contains_key("productName"));
    assert!(check.errors.contains_key("targetAudience"));
}

#[test]
fn export_then_reapply_reproduces_values() {
    for app in MappingCatalog::builtin().app_ids() {
        let mut source = adapter_for(app, "t1");
        source.load(project_context(), OverrideMap::new());
        let topic_ids: Vec<String> = source
            .mapping()
            .iter()
            .filter(|(_, canonical)| *canonical == "contentTopic")
            .map(|(local, _)| local.to_string())
            .collect();
        for local in &topic_ids {
            source.set_field(local, json!("Quarterly review"));
        }
        let exported = source.export_field_data(false);

        let mut target = adapter_for(app, "t2");
        target.load(project_context(), OverrideMap::new());
        let outcomes = target.set_fields(exported.clone());
        assert!(outcomes.values().all(|o| o.is_valid), "{app}: {outcomes:?}");

        assert_eq!(target.export_field_data(false), exported, "{app}");
        assert_eq!(target.export_field_data(true), source.export_field_data(true), "{app}");
    }
}

#[test]
fn shared_canonical_field_resolves_identically_across_apps() {
    let mut blog = adapter_for("blog", "t1");
    let mut social = adapter_for("social-media", "t1");
    blog.load(project_context(), OverrideMap::new());
    social.load(project_context(), OverrideMap::new());

    assert_eq!(blog.get_field("targetAudience"), social.get_field("audience"));
    assert_eq!(blog.get_field("tone"), social.get_field("voice"));
}

#[test]
fn custom_spec_without_required_uses_registry_flags() {
    let adapter = MiniAppFieldAdapter::new(
        Arc::new(FieldRegistry::builtin()),
        &MappingCatalog::builtin(),
        MiniAppFieldSpec::custom(
            "webinar",
            [("title", "contentTopic"), ("who", "targetAudience")],
        ),
        FieldScope::new("p1", "t9"),
    )
    .expect("custom");
    assert!(adapter.is_required("who"));
    assert!(!adapter.is_required("title"));
    assert_eq!(
        adapter.validate_required().errors.keys().collect::<Vec<_>>(),
        vec!["who"]
    );
}
