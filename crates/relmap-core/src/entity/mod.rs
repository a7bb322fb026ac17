//! Module: entity
//! Responsibility: the in-memory record mapped to one row, and the accessor
//! table that reads and writes its fields.
//! Does not own: storage conversion (transformers) or cache identity.

pub mod access;


use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

///
/// Entity
///
/// Named field record for one mapped row. Relations are carried inline as
/// `Value::Entity` / `Value::List` / `Value::Map`.
///
/// Repositories always hand out detached clones; mutating an `Entity`
/// never touches a cached copy.
///

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Entity {
    name: String,
    fields: BTreeMap<String, Value>,
}

impl Entity {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: BTreeMap::new(),
        }
    }

    /// Builder-style field assignment.
    #[must_use]
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(field, value);
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Owned field value; unset fields read as null.
    #[must_use]
    pub fn value(&self, field: &str) -> Value {
        self.fields.get(field).cloned().unwrap_or_default()
    }

    pub fn set(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(field.into(), value.into());
    }

    pub fn remove(&mut self, field: &str) -> Option<Value> {
        self.fields.remove(field)
    }

    #[must_use]
    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    /// Borrow a one-to-one relation.
    #[must_use]
    pub fn related(&self, field: &str) -> Option<&Self> {
        self.fields.get(field).and_then(Value::as_entity)
    }

    /// Borrow the entities of a one-to-many relation.
    #[must_use]
    pub fn related_many(&self, field: &str) -> Vec<&Self> {
        self.fields
            .get(field)
            .and_then(Value::as_list)
            .map(|items| items.iter().filter_map(Value::as_entity).collect())
            .unwrap_or_default()
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}
