//! `marketkit resolve`

use crate::config::CliConfig;
use clap::Parser;
use marketkit_fields::{FieldScope, RequiredCheck, ResolvedField};
use marketkit_miniapp::{FieldSession, MappingCatalog, MiniAppFieldAdapter, MiniAppFieldSpec};
use marketkit_store::SqliteStore;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Parser)]
pub struct ResolveArgs {
    /// Mini-app preset name
    pub app: String,

    #[arg(long, value_name = "PROJECT_ID")]
    pub project: String,

    #[arg(long, value_name = "TASK_ID")]
    pub task: String,

    /// SQLite database (defaults to `[store] db_path`)
    #[arg(long, value_name = "PATH")]
    pub db: Option<PathBuf>,

    /// Output as JSON for automation
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Serialize)]
struct ResolveOutput {
    app_id: String,
    scope: FieldScope,
    fields: BTreeMap<String, ResolvedField>,
    required: RequiredCheck,
}

pub async fn run(args: ResolveArgs, config: &CliConfig) -> anyhow::Result<i32> {
    let registry = Arc::new(config.registry()?);
    let store = match &args.db {
        Some(path) => SqliteStore::open_at_path(path, config.store.busy_timeout())?,
        None => SqliteStore::open(&config.store)?,
    };
    let store = Arc::new(store);

    let scope = FieldScope::new(args.project.as_str(), args.task.as_str());
    let adapter = MiniAppFieldAdapter::new(
        registry,
        &MappingCatalog::builtin(),
        MiniAppFieldSpec::preset(args.app.as_str()),
        scope.clone(),
    )?;
    let session = FieldSession::new(adapter, store.clone(), store, "cli")
        .with_source_tag(config.session.source_tag.as_str());
    session.load().await?;

    let output = session
        .with_adapter(|adapter| ResolveOutput {
            app_id: adapter.app_id().to_string(),
            scope,
            fields: adapter
                .local_ids()
                .into_iter()
                .map(|local_id| {
                    let resolved = adapter.get_field(&local_id);
                    (local_id, resolved)
                })
                .collect(),
            required: adapter.validate_required(),
        })
        .await;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        print_human(&output);
    }

    Ok(if output.required.is_valid { 0 } else { 1 })
}

fn print_human(output: &ResolveOutput) {
    println!("{} @ {}", output.app_id, output.scope);
    for (local_id, resolved) in &output.fields {
        let value = if resolved.value.is_null() {
            "-".to_string()
        } else {
            resolved.value.to_string()
        };
        println!("  {local_id:<20} {:<10} {value}", resolved.source.as_str());
    }
    if !output.required.is_valid {
        println!();
        for (local_id, message) in &output.required.errors {
            println!("  missing {local_id}: {message}");
        }
    }
}
