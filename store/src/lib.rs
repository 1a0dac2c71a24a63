//! Persistence collaborators for the marketkit field engine
//!
//! `ContextStore` holds per-project canonical values and `OverrideStore`
//! holds per-task overrides. Two implementations are provided:
//! - in-memory stores with fault injection, for tests and embedders
//! - a single SQLite database implementing both contracts

#![deny(clippy::print_stdout, clippy::print_stderr)]

pub mod config;
pub mod contract;
pub mod error;
pub mod memory;
pub mod sqlite;

pub use config::StoreConfig;
pub use contract::{ContextStore, OverrideRecord, OverrideStore, merge_context};
pub use error::{Result, StoreError, StoreScope};
pub use memory::{MemoryContextStore, MemoryOverrideStore};
pub use sqlite::SqliteStore;
