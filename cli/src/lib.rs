//! `marketkit` command-line tool
//!
//! ## Commands
//!
//! - `marketkit audit` - mapping coverage of every mini-app
//! - `marketkit inspect <app>` - one mini-app's mapping, optionally checked
//!   against a list of form fields
//! - `marketkit resolve <app>` - resolved field values of a task from the
//!   SQLite store

pub mod audit_cmd;
pub mod config;
pub mod inspect_cmd;
pub mod resolve_cmd;

use clap::{Parser, Subcommand};
use config::CliConfig;

/// Audit and inspect canonical field mappings
#[derive(Debug, Parser)]
#[command(name = "marketkit", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Report mapping coverage and shared-field recommendations.
    ///
    /// Exits 1 when any mapping entry targets an unregistered field.
    Audit(audit_cmd::AuditArgs),

    /// Show a mini-app's mapping against the registry
    Inspect(inspect_cmd::InspectArgs),

    /// Resolve a task's fields from the store.
    ///
    /// Exits 1 when a required field is missing.
    Resolve(resolve_cmd::ResolveArgs),
}

impl Cli {
    /// Run the selected command and return the process exit code
    pub async fn run(self, config: CliConfig) -> anyhow::Result<i32> {
        match self.command {
            Command::Audit(args) => audit_cmd::run(args, &config),
            Command::Inspect(args) => inspect_cmd::run(args, &config),
            Command::Resolve(args) => resolve_cmd::run(args, &config).await,
        }
    }
}
