//! Canonical field engine for marketkit
//!
//! Mini-app forms share a small set of strongly-typed canonical fields.
//! Project-level context supplies inherited values; any task may override a
//! field locally without touching the shared context. This crate provides:
//! - the canonical field registry and its validation rules
//! - single-field resolution with provenance (override / inherited / default)
//! - batch resolution, partial-application updates and required-field checks
//!
//! Nothing here performs I/O. Loading and persisting values is the job of
//! the store collaborators in `marketkit-store`.

#![deny(clippy::print_stdout, clippy::print_stderr)]

pub mod batch;
pub mod error;
pub mod names;
pub mod registry;
pub mod resolver;
pub mod types;
pub mod validation;

pub use batch::{BatchFieldResolver, FieldDetail, FieldSummary, RequiredCheck};
pub use error::{FieldError, Result};
pub use registry::{
    CanonicalFieldDefinition, FieldFormat, FieldRegistry, REGISTRY_VERSION, UiHint,
    ValidationRule, WidgetHint,
};
pub use resolver::FieldResolver;
pub use types::{
    ContextMap, FieldScope, FieldSource, FieldType, OverrideMap, ResolvedField, is_filled,
    is_present,
};
pub use validation::{ValidationOutcome, ValidationService};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
