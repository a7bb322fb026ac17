//! Field accessor tables.
//!
//! Field access is resolved once per entity type, when its repository is
//! compiled, instead of guessing accessor names on every read. Two styles
//! exist:
//!
//! - `property`: read and write the entity's managed field map.
//! - `methods`: bind registered getters/setters named after the field
//!   (`get|is|has{Field}` and `set|add|put{Field}`, Pascal-cased).

use crate::{
    entity::Entity,
    model::{EntityDefinition, FieldDefinition},
    value::Value,
};
use convert_case::{Case, Casing};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt};
use thiserror::Error as ThisError;

///
/// CONSTANTS
///

pub const READ_PREFIXES: [&str; 3] = ["get", "is", "has"];
pub const WRITE_PREFIXES: [&str; 3] = ["set", "add", "put"];

pub type Getter = fn(&Entity) -> Value;
pub type Setter = fn(&mut Entity, Value);

///
/// AccessError
///

#[derive(Debug, ThisError)]
pub enum AccessError {
    #[error("no accessor for field '{field}' on '{entity}' (tried {tried})")]
    NoAccessor {
        entity: String,
        field: String,
        tried: String,
    },

    #[error("no mutator for field '{field}' on '{entity}' (tried {tried})")]
    NoMutator {
        entity: String,
        field: String,
        tried: String,
    },
}

///
/// AccessStyle
///

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessStyle {
    #[default]
    Property,
    Methods,
}

///
/// EntityMethods
///
/// Named getters and setters registered for one entity type.
///

#[derive(Clone, Default)]
pub struct EntityMethods {
    getters: BTreeMap<String, Getter>,
    setters: BTreeMap<String, Setter>,
}

impl EntityMethods {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn getter(mut self, name: impl Into<String>, getter: Getter) -> Self {
        self.getters.insert(name.into(), getter);
        self
    }

    #[must_use]
    pub fn setter(mut self, name: impl Into<String>, setter: Setter) -> Self {
        self.setters.insert(name.into(), setter);
        self
    }

    fn find_getter(&self, names: &[String]) -> Option<Getter> {
        names.iter().find_map(|name| self.getters.get(name).copied())
    }

    fn find_setter(&self, names: &[String]) -> Option<Setter> {
        names.iter().find_map(|name| self.setters.get(name).copied())
    }
}

impl fmt::Debug for EntityMethods {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityMethods")
            .field("getters", &self.getters.keys().collect::<Vec<_>>())
            .field("setters", &self.setters.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Conventional method names for one field, in lookup order.
#[must_use]
pub fn method_names(prefixes: &[&str], field: &str) -> Vec<String> {
    let stem = field.to_case(Case::Pascal);

    prefixes.iter().map(|prefix| format!("{prefix}{stem}")).collect()
}

///
/// Reader / Writer
///

#[derive(Clone, Copy)]
enum Reader {
    Property,
    Method(Getter),
    Missing,
}

#[derive(Clone, Copy)]
enum Writer {
    Property,
    Method(Setter),
    Missing,
}

///
/// AccessorTable
///
/// Per-entity table mapping every declared field to its reader and writer.
///

pub struct AccessorTable {
    entity: String,
    readers: BTreeMap<String, Reader>,
    writers: BTreeMap<String, Writer>,
}

impl AccessorTable {
    /// Build the table for one definition.
    ///
    /// `methods` is only consulted for `AccessStyle::Methods`; a field without
    /// a matching method resolves to a missing accessor that fails on use.
    #[must_use]
    pub fn build(definition: &EntityDefinition, methods: Option<&EntityMethods>) -> Self {
        let mut readers = BTreeMap::new();
        let mut writers = BTreeMap::new();

        for field in definition.fields() {
            let (reader, writer) = match definition.access() {
                AccessStyle::Property => (Reader::Property, Writer::Property),
                AccessStyle::Methods => resolve_methods(field, methods),
            };

            readers.insert(field.name().to_string(), reader);
            writers.insert(field.name().to_string(), writer);
        }

        Self {
            entity: definition.name().to_string(),
            readers,
            writers,
        }
    }

    #[must_use]
    pub fn entity(&self) -> &str {
        &self.entity
    }

    /// Read one field in its in-memory representation.
    pub fn read(&self, entity: &Entity, field: &str) -> Result<Value, AccessError> {
        match self.readers.get(field) {
            Some(Reader::Property) => Ok(entity.value(field)),
            Some(Reader::Method(getter)) => Ok(getter(entity)),
            Some(Reader::Missing) | None => Err(AccessError::NoAccessor {
                entity: self.entity.clone(),
                field: field.to_string(),
                tried: method_names(&READ_PREFIXES, field).join(", "),
            }),
        }
    }

    /// Write one field in its in-memory representation.
    pub fn write(&self, entity: &mut Entity, field: &str, value: Value) -> Result<(), AccessError> {
        match self.writers.get(field) {
            Some(Writer::Property) => {
                entity.set(field, value);
                Ok(())
            }
            Some(Writer::Method(setter)) => {
                setter(entity, value);
                Ok(())
            }
            Some(Writer::Missing) | None => Err(AccessError::NoMutator {
                entity: self.entity.clone(),
                field: field.to_string(),
                tried: method_names(&WRITE_PREFIXES, field).join(", "),
            }),
        }
    }
}

fn resolve_methods(field: &FieldDefinition, methods: Option<&EntityMethods>) -> (Reader, Writer) {
    let Some(methods) = methods else {
        return (Reader::Missing, Writer::Missing);
    };

    let reader = methods
        .find_getter(&method_names(&READ_PREFIXES, field.name()))
        .map_or(Reader::Missing, Reader::Method);
    let writer = methods
        .find_setter(&method_names(&WRITE_PREFIXES, field.name()))
        .map_or(Writer::Missing, Writer::Method);

    (reader, writer)
}
