//! `marketkit audit`

use crate::config::CliConfig;
use clap::Parser;
use marketkit_miniapp::MappingCatalog;
use marketkit_schema::{CoverageReport, SchemaConsolidationAnalyzer};
use std::sync::Arc;

#[derive(Debug, Parser)]
pub struct AuditArgs {
    /// Output as JSON for automation
    #[arg(long)]
    pub json: bool,
}

pub fn run(args: AuditArgs, config: &CliConfig) -> anyhow::Result<i32> {
    let registry = Arc::new(config.registry()?);
    let analyzer = SchemaConsolidationAnalyzer::new(registry, Arc::new(MappingCatalog::builtin()));
    let report = analyzer.coverage_report();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_human_report(&report, analyzer.registry().len());
    }

    Ok(if report.is_fully_mapped() { 0 } else { 1 })
}

fn print_human_report(report: &CoverageReport, field_count: usize) {
    println!(
        "Field registry v{}: {field_count} canonical fields, {} mini-apps",
        report.registry_version,
        report.apps.len()
    );
    println!("Overall coverage: {:.1}%", report.overall_rate);
    println!();

    for app in &report.apps {
        let mut line = format!(
            "  {:<16} {:>2}/{:<2} {:>5.1}%",
            app.app_id, app.mapped, app.total, app.coverage_rate
        );
        if !app.dangling.is_empty() {
            line.push_str(&format!("  dangling: {}", app.dangling.join(", ")));
        }
        println!("{line}");
    }

    if !report.unused_fields.is_empty() {
        println!();
        println!("Unused canonical fields: {}", report.unused_fields.join(", "));
    }

    if !report.recommendations.is_empty() {
        println!();
        println!("Recommendations");
        for rec in &report.recommendations {
            println!("  [{}] {}", rec.priority, rec.message);
        }
    }
}
