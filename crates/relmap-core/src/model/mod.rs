//! Module: model
//! Responsibility: entity definitions, loaded once and resolved eagerly.
//! Does not own: query planning or value conversion.
//!
//! Every join is resolved to concrete local and foreign columns while the
//! document loads, so an unresolvable definition fails at construction
//! rather than on first use.

mod entity;
mod field;
mod raw;
mod store;


pub use entity::EntityDefinition;
pub use field::{FieldDefinition, JoinDefinition, RelationKind};
pub use store::DefinitionStore;

use std::path::PathBuf;
use thiserror::Error as ThisError;

///
/// DefinitionError
///

#[derive(Debug, ThisError)]
pub enum DefinitionError {
    #[error("unknown entity '{entity}'")]
    UnknownEntity { entity: String },

    #[error("unknown field '{field}' on '{entity}'")]
    UnknownField { entity: String, field: String },

    #[error("no field of '{entity}' is stored in column '{column}'")]
    UnknownColumn { entity: String, column: String },

    #[error("invalid key '{key}' on '{entity}': {reason}")]
    InvalidKey {
        entity: String,
        key: String,
        reason: String,
    },

    #[error("invalid field '{field}' on '{entity}': {reason}")]
    InvalidField {
        entity: String,
        field: String,
        reason: String,
    },

    #[error("cannot resolve join of '{entity}.{field}': {reason}")]
    InvalidJoin {
        entity: String,
        field: String,
        reason: String,
    },

    #[error("failed to parse entity definitions: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("failed to read entity definitions from '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}
