//! Resolution properties checked across the whole builtin registry.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::sync::Arc;

use marketkit_fields::{
    BatchFieldResolver, ContextMap, FieldRegistry, FieldResolver, FieldScope, FieldSource,
    FieldType, ResolvedField,
};
use pretty_assertions::assert_eq;
use serde_json::{Value, json};

fn registry() -> Arc<FieldRegistry> {
    Arc::new(FieldRegistry::builtin())
}

/// A value every builtin field accepts
fn sample_value(registry: &FieldRegistry, name: &str) -> Value {
    let def = registry.definition_of(name).expect("registered");
    match def.field_type {
        FieldType::String => match def.validation.format {
            Some(marketkit_fields::FieldFormat::Url) => json!("https://example.com"),
            Some(marketkit_fields::FieldFormat::Email) => json!("team@example.com"),
            None => json!("sample"),
        },
        FieldType::Number => json!(100),
        FieldType::Enum => json!(def.validation.allowed_values[0]),
        FieldType::Boolean => json!(true),
    }
}

fn full_context(registry: &FieldRegistry) -> ContextMap {
    registry
        .names()
        .map(|name| (name.to_string(), sample_value(registry, name)))
        .collect()
}

#[test]
fn non_inheritable_fields_never_resolve_inherited() {
    let registry = registry();
    let resolver = FieldResolver::new(Arc::clone(&registry)).with_context(full_context(&registry));

    for def in registry.definitions() {
        let resolved = resolver.resolve(&def.name);
        if def.inheritable {
            assert_eq!(resolved.source, FieldSource::Inherited, "{}", def.name);
        } else {
            assert_ne!(resolved.source, FieldSource::Inherited, "{}", def.name);
        }
    }
}

#[test]
fn present_override_always_wins() {
    let registry = registry();
    let mut resolver =
        FieldResolver::new(Arc::clone(&registry)).with_context(full_context(&registry));

    for def in registry.definitions() {
        let value = sample_value(&registry, &def.name);
        let outcome = resolver
            .set_override(&def.name, value.clone())
            .expect("registered");
        assert!(outcome.is_valid, "{}: {:?}", def.name, outcome.error);
        assert_eq!(resolver.resolve(&def.name), ResolvedField::overridden(value));
    }
}

#[test]
fn clearing_restores_never_overridden_state() {
    let registry = registry();
    let context = full_context(&registry);
    let pristine = FieldResolver::new(Arc::clone(&registry)).with_context(context.clone());
    let mut touched = FieldResolver::new(Arc::clone(&registry)).with_context(context);

    for name in registry.names() {
        touched
            .set_override(name, sample_value(&registry, name))
            .expect("registered");
        touched.clear_override(name);
        assert_eq!(touched.resolve(name), pristine.resolve(name), "{name}");
    }
}

#[test]
fn scenario_walkthrough_target_audience() {
    let registry = registry();
    let context: ContextMap = [("targetAudience".to_string(), json!("B2B founders"))]
        .into_iter()
        .collect();
    let mut resolver = FieldResolver::new(registry).with_context(context);

    assert_eq!(
        resolver.resolve("targetAudience"),
        ResolvedField::inherited(json!("B2B founders"))
    );

    resolver
        .set_override("targetAudience", json!("Enterprise CTOs"))
        .expect("registered");
    assert_eq!(
        resolver.resolve("targetAudience"),
        ResolvedField::overridden(json!("Enterprise CTOs"))
    );

    resolver.clear_override("targetAudience");
    assert_eq!(
        resolver.resolve("targetAudience"),
        ResolvedField::inherited(json!("B2B founders"))
    );
}

#[test]
fn bad_budget_does_not_move_resolution() {
    let mut resolver = FieldResolver::new(registry());
    let before = resolver.resolve("marketingBudget");

    let outcome = resolver
        .set_override("marketingBudget", json!("abc"))
        .expect("registered");

    assert!(!outcome.is_valid);
    assert!(outcome.error.is_some());
    assert_eq!(resolver.resolve("marketingBudget"), before);
}

#[test]
fn required_check_matches_resolution() {
    let registry = registry();
    let names: Vec<String> = registry.names().map(str::to_string).collect();
    let mut batch = BatchFieldResolver::new(
        Arc::clone(&registry),
        FieldScope::new("p", "t"),
        names.iter().cloned(),
    );

    let required = ["productName", "targetAudience", "wordCount"];
    assert!(!batch.validate_required(required).is_valid);

    batch.set("productName", json!("Acme"));
    batch.set("targetAudience", json!("Founders"));
    assert_eq!(
        batch.validate_required(required).errors.keys().collect::<Vec<_>>(),
        vec!["wordCount"]
    );

    batch.set("wordCount", json!(750));
    assert!(batch.validate_required(required).is_valid);
}
