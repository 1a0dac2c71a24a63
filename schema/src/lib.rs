//! Schema consolidation analysis
//!
//! Audits every mini-app's field mapping against the canonical registry:
//! which local ids resolve to canonical fields, which do not, where local
//! types disagree with registered ones, and which canonical fields are
//! shared widely enough to be managed at project level.

#![deny(clippy::print_stdout, clippy::print_stderr)]

pub mod analyzer;
pub mod report;

pub use analyzer::{
    ConsolidatedField, ConsolidationResult, LocalFieldDescriptor, Priority, Recommendation,
    SchemaConsolidationAnalyzer, SchemaIssue, SchemaValidation,
};
pub use report::{AppCoverage, CoverageReport};
