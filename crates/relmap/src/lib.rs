//! relmap maps YAML-declared entities onto relational tables.
//!
//! ## Crate layout
//! - `core`: definitions, join planning, decoding, caches and the
//!   `EntityManager` persistence surface.
//! - `error`: the public error type with a stable kind + origin taxonomy.
//!
//! The `prelude` module carries the vocabulary used by application code.

pub use relmap_core as core;

pub mod error;

pub use error::{Error, ErrorKind, ErrorOrigin};

//
// Consts
//

/// Workspace version re-export for downstream tooling/tests.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use crate::core::{
    cache::{CacheBackend, EncodedCache, IdentityCache, MemoryCache, NoCache},
    db::{EntityManager, EntityManagerBuilder, ParamSource, config::OrmConfig},
    model::DefinitionStore,
};

///
/// Prelude
///

pub mod prelude {
    pub use crate::core::{
        db::{
            EntityManager,
            query::OrderDirection,
            repository::{Condition, Criteria, FindOptions, Lookup, Repository},
        },
        entity::Entity,
        value::Value,
    };
    pub use crate::{Error, ErrorKind};
}
