//! `marketkit inspect`

use crate::config::CliConfig;
use anyhow::Context;
use clap::Parser;
use marketkit_fields::{FieldRegistry, FieldType};
use marketkit_miniapp::{MappingCatalog, MiniAppDefinition, MiniAppError};
use marketkit_schema::{LocalFieldDescriptor, SchemaConsolidationAnalyzer};
use std::sync::Arc;

#[derive(Debug, Parser)]
pub struct InspectArgs {
    /// Mini-app preset name
    pub app: String,

    /// Comma-separated form field ids to check, optionally typed as `id:type`
    #[arg(long, value_delimiter = ',', value_name = "ID[:TYPE]")]
    pub fields: Vec<String>,
}

pub fn run(args: InspectArgs, config: &CliConfig) -> anyhow::Result<i32> {
    let registry = Arc::new(config.registry()?);
    let catalog = Arc::new(MappingCatalog::builtin());
    let definition = catalog
        .get(&args.app)
        .cloned()
        .ok_or_else(|| MiniAppError::UnknownPreset {
            name: args.app.clone(),
        })?;

    print_mapping(&definition, &registry);

    if args.fields.is_empty() {
        return Ok(0);
    }

    let descriptors = args
        .fields
        .iter()
        .map(|spec| parse_descriptor(spec))
        .collect::<anyhow::Result<Vec<_>>>()?;
    let analyzer = SchemaConsolidationAnalyzer::new(registry, catalog);
    let consolidation = analyzer.consolidate(&args.app, &descriptors);
    let validation = analyzer.validate_against_schema(&args.app, &descriptors);

    println!();
    println!(
        "Consolidation: {}/{} mapped ({:.1}%)",
        consolidation.consolidated_fields.len(),
        descriptors.len(),
        consolidation.consolidation_rate
    );
    for field in &consolidation.consolidated_fields {
        println!("  {} -> {}", field.local_id, field.canonical);
    }
    for issue in &validation.issues {
        println!("  ! {issue}");
    }

    Ok(if validation.is_valid { 0 } else { 1 })
}

fn print_mapping(definition: &MiniAppDefinition, registry: &FieldRegistry) {
    println!("{}", definition.app_id);
    for (local_id, canonical) in definition.mapping.iter() {
        let detail = match registry.definition_of(canonical) {
            Some(def) => format!(
                "{} {}{}",
                def.field_type,
                if def.inheritable { "inheritable" } else { "task-only" },
                if registry.is_required(canonical) { ", required" } else { "" }
            ),
            None => "unregistered".to_string(),
        };
        let marker = if definition.required.iter().any(|r| r == local_id) {
            "*"
        } else {
            " "
        };
        println!("{marker} {local_id:<20} {canonical:<24} {detail}");
    }
}

/// `id` or `id:type`
fn parse_descriptor(spec: &str) -> anyhow::Result<LocalFieldDescriptor> {
    match spec.split_once(':') {
        Some((id, ty)) => {
            let field_type = FieldType::parse(ty)
                .with_context(|| format!("unknown field type '{ty}' for '{id}'"))?;
            Ok(LocalFieldDescriptor::typed(id.trim(), field_type))
        }
        None => Ok(LocalFieldDescriptor::new(spec.trim())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_syntax() {
        let plain = parse_descriptor("product_name").expect("plain");
        assert_eq!(plain.id, "product_name");
        assert_eq!(plain.field_type, None);

        let typed = parse_descriptor("budget:number").expect("typed");
        assert_eq!(typed.field_type, Some(FieldType::Number));

        assert!(parse_descriptor("budget:money").is_err());
    }
}
