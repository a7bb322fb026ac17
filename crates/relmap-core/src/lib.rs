//! Core runtime for relmap: entity definitions, join planning, row decoding,
//! identity/result caching, value transformers and the transactional
//! persistence surface exposed through [`db::EntityManager`].
#![warn(unreachable_pub)]

// public exports are one module level down
pub mod cache;
pub mod db;
pub mod entity;
pub mod error;
pub mod model;
pub mod obs;
pub mod transform;
pub mod value;

// test
#[cfg(test)]
pub(crate) mod test_fixtures;

pub use error::{ErrorClass, ErrorOrigin, OrmError};

///
/// CONSTANTS
///

/// Key types whose values are generated by the database on insert.
///
/// A primary-key field declaring one of these types may be null before the
/// first persist; any other null key is rejected.
pub const AUTO_GENERATED_TYPES: &[&str] = &["serial"];

///
/// Prelude
///
/// Prelude contains only domain vocabulary.
/// No executors, caches, or engines are re-exported here.
///

pub mod prelude {
    pub use crate::{
        db::{
            EntityManager,
            query::OrderDirection,
            repository::{Condition, Criteria, FindOptions, Lookup, Repository},
        },
        entity::Entity,
        value::Value,
    };
}
