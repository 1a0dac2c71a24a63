//! Mini-app layer of the marketkit field engine
//!
//! Forms address fields by local ids. This crate maps those ids onto the
//! canonical registry ([`catalog`]), selects a mapping by preset name or
//! inline definition ([`spec`]), exposes a local-id facade over batch
//! resolution ([`adapter`]) and binds that facade to the stores
//! ([`session`]).

#![deny(clippy::print_stdout, clippy::print_stderr)]

pub mod adapter;
pub mod catalog;
pub mod error;
pub mod session;
pub mod spec;

pub use adapter::MiniAppFieldAdapter;
pub use catalog::{FieldMapping, MappingCatalog, MiniAppDefinition, registered_canonical};
pub use error::{MiniAppError, Result};
pub use session::{DEFAULT_SOURCE_TAG, FieldSession, LoadOutcome};
pub use spec::MiniAppFieldSpec;
