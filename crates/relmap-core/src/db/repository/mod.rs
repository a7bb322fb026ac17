//! Module: db::repository
//! Responsibility: per-entity load, search, persist, delete and refresh.
//! Does not own: transactions (see `EntityManager`) or statement execution.

mod criteria;
mod decode;
mod persist;

#[cfg(test)]
mod tests;

pub use criteria::{Condition, Criteria, FindOptions, parse_operator};
pub use decode::distinct_rows;

use crate::{
    ErrorClass, OrmError,
    cache::CacheKey,
    db::{
        CompiledEntity, EntityManager,
        config::RepositoryConfig,
        plan::EntityPlan,
        query::{
            Binds, ColumnRef, CompareOp, DeleteQuery, OrderBy, Predicate, Query, SelectColumn,
            SelectQuery,
        },
    },
    entity::Entity,
    model::{DefinitionError, EntityDefinition, FieldDefinition},
    obs::{CacheTier, MetricsEvent, OperationKind},
    value::Value,
};
use std::collections::BTreeMap;
use thiserror::Error as ThisError;

///
/// RepositoryError
///

#[derive(Debug, ThisError)]
pub enum RepositoryError {
    #[error("missing primary key value(s) [{}] for '{entity}'", keys.join(", "))]
    MissingPrimaryKey { entity: String, keys: Vec<String> },

    #[error("'{entity}' has a composite key; look it up with a field map")]
    CompositeKeyRequiresMap { entity: String },

    #[error("key '{entity}.{field}' of type '{ty}' is not generated and must be set")]
    NonGeneratedKeyNull {
        entity: String,
        field: String,
        ty: String,
    },

    #[error("repository '{name}' is not registered")]
    RepositoryNotFound { name: String },

    #[error("'{entity}' no longer exists")]
    NotFound { entity: String },

    #[error("relation '{entity}.{field}' holds an invalid value: {reason}")]
    InvalidRelationValue {
        entity: String,
        field: String,
        reason: String,
    },

    #[error("relation '{entity}.{field}' cannot be written: {reason}")]
    UnresolvedRelation {
        entity: String,
        field: String,
        reason: String,
    },
}

impl RepositoryError {
    #[must_use]
    pub const fn class(&self) -> ErrorClass {
        match self {
            Self::NotFound { .. } => ErrorClass::NotFound,
            Self::RepositoryNotFound { .. } | Self::UnresolvedRelation { .. } => {
                ErrorClass::Configuration
            }
            Self::MissingPrimaryKey { .. }
            | Self::CompositeKeyRequiresMap { .. }
            | Self::NonGeneratedKeyNull { .. }
            | Self::InvalidRelationValue { .. } => ErrorClass::Invalid,
        }
    }
}

///
/// Lookup
///
/// Argument of `Repository::get`: a bare key for single-key entities, or
/// a field → value map naming every key field.
///

#[derive(Clone, Debug, PartialEq)]
pub enum Lookup {
    Key(Value),
    Params(BTreeMap<String, Value>),
}

impl Lookup {
    pub fn params<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
    {
        Self::Params(
            pairs
                .into_iter()
                .map(|(field, value)| (field.into(), value.into()))
                .collect(),
        )
    }
}

impl From<Value> for Lookup {
    fn from(value: Value) -> Self {
        Self::Key(value)
    }
}

impl From<i64> for Lookup {
    fn from(value: i64) -> Self {
        Self::Key(value.into())
    }
}

impl From<i32> for Lookup {
    fn from(value: i32) -> Self {
        Self::Key(value.into())
    }
}

impl From<&str> for Lookup {
    fn from(value: &str) -> Self {
        Self::Key(value.into())
    }
}

impl From<String> for Lookup {
    fn from(value: String) -> Self {
        Self::Key(value.into())
    }
}

impl From<BTreeMap<String, Value>> for Lookup {
    fn from(params: BTreeMap<String, Value>) -> Self {
        Self::Params(params)
    }
}

///
/// Repository
///
/// Borrowed view over one entity type. Cheap to create; all compiled state
/// lives in the manager.
///

pub struct Repository<'em> {
    em: &'em EntityManager,
    definition: &'em EntityDefinition,
    compiled: &'em CompiledEntity,
    config: &'em RepositoryConfig,
}

impl<'em> Repository<'em> {
    pub(crate) const fn new(
        em: &'em EntityManager,
        definition: &'em EntityDefinition,
        compiled: &'em CompiledEntity,
        config: &'em RepositoryConfig,
    ) -> Self {
        Self {
            em,
            definition,
            compiled,
            config,
        }
    }

    #[must_use]
    pub fn name(&self) -> &'em str {
        self.definition.name()
    }

    #[must_use]
    pub const fn definition(&self) -> &'em EntityDefinition {
        self.definition
    }

    #[must_use]
    pub const fn plan(&self) -> &'em EntityPlan {
        &self.compiled.plan
    }

    #[must_use]
    pub const fn config(&self) -> &'em RepositoryConfig {
        self.config
    }

    ///
    /// LOAD
    ///

    /// Load one entity with its relations. Identity cache first, then the
    /// result cache, then a single joined select.
    pub fn get(&self, lookup: impl Into<Lookup>) -> Result<Option<Entity>, OrmError> {
        let entity = self.name();
        self.em.record(MetricsEvent::Operation {
            kind: OperationKind::Get,
            entity,
        });

        let params = self.lookup_params(lookup.into())?;
        let skeleton = self.build(&params)?;
        let Some(key) = self.cache_key(&skeleton)? else {
            return Ok(None);
        };

        let hit = self.em.identity_cache().load(&key).cloned();
        if let Some(hit) = hit {
            tracing::trace!(%key, "identity cache hit");
            self.record_cache(CacheTier::Identity, true);
            return Ok(Some(hit));
        }
        self.record_cache(CacheTier::Identity, false);

        // published before decoding so cyclic relations resolve to it
        self.em.identity_mut().begin(key.clone(), skeleton.clone());

        if let Some(cached) = self.em.result_cache().load(&key) {
            tracing::trace!(%key, "result cache hit");
            self.record_cache(CacheTier::Result, true);
            self.em.identity_mut().finish(key, cached.clone());
            return Ok(Some(cached));
        }
        self.record_cache(CacheTier::Result, false);

        match self.load(skeleton, &key) {
            Ok(Some(loaded)) => {
                self.em.identity_mut().finish(key.clone(), loaded.clone());
                self.em.cache_result(&key, &loaded);
                Ok(Some(loaded))
            }
            Ok(None) => {
                self.em.identity_mut().invalidate(&key);
                Ok(None)
            }
            Err(err) => {
                self.em.identity_mut().invalidate(&key);
                Err(err)
            }
        }
    }

    /// Search by field criteria; every match is loaded through `get`.
    pub fn find(&self, criteria: &Criteria, options: &FindOptions) -> Result<Vec<Entity>, OrmError> {
        let entity = self.name();
        self.em.record(MetricsEvent::Operation {
            kind: OperationKind::Find,
            entity,
        });

        let plan = self.plan();
        let root = plan.aliases().root();

        let mut query = SelectQuery::new(plan.root().clone());
        for column in self.definition.key_columns() {
            query.columns.push(SelectColumn {
                column: ColumnRef::new(root, column),
                label: column.to_string(),
            });
        }

        let (filter, binds) = self.compile_criteria(criteria)?;
        query.filter = filter;
        query.binds = binds;

        for (field, direction) in &options.order_by {
            let column = self.em.definitions().map_field_to_column(entity, field)?;
            query.order_by.push(OrderBy {
                column: ColumnRef::new(root, column),
                direction: *direction,
            });
        }
        query.limit = options.limit;
        query.offset = options.offset;

        let rows = self.em.execute(&Query::Select(query))?.rows;
        tracing::debug!(entity, matches = rows.len(), "find");

        let mut found = Vec::with_capacity(rows.len());
        for row in rows {
            let mut params = BTreeMap::new();
            for (column, value) in row {
                let field = self.em.definitions().map_column_to_field(entity, &column)?;
                params.insert(field.to_string(), value);
            }
            if let Some(loaded) = self.get(Lookup::Params(params))? {
                found.push(loaded);
            }
        }

        Ok(found)
    }

    /// First match of `find`.
    pub fn find_one(
        &self,
        criteria: &Criteria,
        options: &FindOptions,
    ) -> Result<Option<Entity>, OrmError> {
        let mut options = options.clone();
        options.limit.get_or_insert(1);

        Ok(self.find(criteria, &options)?.into_iter().next())
    }

    ///
    /// MUTATE
    ///

    /// Delete the row identified by `entity`'s keys and evict it from both
    /// caches.
    pub fn delete(&self, entity: &Entity) -> Result<(), OrmError> {
        let name = self.name();
        self.em.record(MetricsEvent::Operation {
            kind: OperationKind::Delete,
            entity: name,
        });

        let keys = self.require_keys(entity)?;
        let (filter, binds) = key_filter(self.definition, &keys, None);

        let result = self.em.execute(&Query::Delete(DeleteQuery {
            table: self.definition.table().to_string(),
            filter,
            binds,
        }))?;
        tracing::debug!(entity = name, affected = result.affected, "delete");

        self.invalidate_graph(entity)
    }

    /// Reload from storage, discarding cached copies first.
    pub fn refresh(&self, entity: &Entity) -> Result<Entity, OrmError> {
        let name = self.name();
        self.em.record(MetricsEvent::Operation {
            kind: OperationKind::Refresh,
            entity: name,
        });

        let keys = self.require_keys(entity)?;
        if let Some(key) = self.cache_key(entity)? {
            self.em.invalidate(&key);
        }

        self.get(Lookup::Params(keys))?
            .ok_or_else(|| {
                RepositoryError::NotFound {
                    entity: name.to_string(),
                }
                .into()
            })
    }

    ///
    /// FIELD ACCESS
    ///

    /// Storage-form value of `field`.
    pub fn get_field_value(&self, entity: &Entity, field: &str) -> Result<Value, OrmError> {
        let definition = self.field(field)?;
        let value = self.compiled.accessors.read(entity, field)?;

        Ok(self.em.transformers().to_storage(definition, value)?)
    }

    /// Assign a storage-form value, transforming it to memory form.
    pub fn set_field_value(
        &self,
        entity: &mut Entity,
        field: &str,
        value: Value,
    ) -> Result<(), OrmError> {
        let definition = self.field(field)?;
        let value = self.em.transformers().to_memory(definition, value)?;
        self.compiled.accessors.write(entity, field, value)?;

        Ok(())
    }

    /// New instance with `params` assigned through the accessors.
    pub fn build(&self, params: &BTreeMap<String, Value>) -> Result<Entity, OrmError> {
        let mut entity = Entity::new(self.name());
        for (field, value) in params {
            self.set_field_value(&mut entity, field, value.clone())?;
        }

        Ok(entity)
    }

    /// Cache key of `entity`; `None` while any key value is unset.
    pub fn cache_key(&self, entity: &Entity) -> Result<Option<CacheKey>, OrmError> {
        let values = self
            .definition
            .keys()
            .iter()
            .map(|key| self.get_field_value(entity, key))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(CacheKey::for_entity(self.name(), &values))
    }

    ///
    /// INTERNAL
    ///

    fn field(&self, field: &str) -> Result<&'em FieldDefinition, DefinitionError> {
        self.definition
            .field(field)
            .ok_or_else(|| DefinitionError::UnknownField {
                entity: self.name().to_string(),
                field: field.to_string(),
            })
    }

    fn lookup_params(&self, lookup: Lookup) -> Result<BTreeMap<String, Value>, OrmError> {
        let keys = self.definition.keys();
        let params = match lookup {
            Lookup::Params(params) => params,
            Lookup::Key(value) => match keys {
                [key] => BTreeMap::from([(key.clone(), value)]),
                _ => {
                    return Err(RepositoryError::CompositeKeyRequiresMap {
                        entity: self.name().to_string(),
                    }
                    .into());
                }
            },
        };

        let missing: Vec<String> = keys
            .iter()
            .filter(|key| params.get(*key).is_none_or(Value::is_null))
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(RepositoryError::MissingPrimaryKey {
                entity: self.name().to_string(),
                keys: missing,
            }
            .into());
        }

        Ok(params)
    }

    /// Storage-form key values of `entity`, all of which must be set.
    fn require_keys(&self, entity: &Entity) -> Result<BTreeMap<String, Value>, OrmError> {
        let mut values = BTreeMap::new();
        let mut missing = Vec::new();
        for key in self.definition.keys() {
            let value = self.get_field_value(entity, key)?;
            if value.is_null() {
                missing.push(key.clone());
            } else {
                values.insert(key.clone(), value);
            }
        }

        if missing.is_empty() {
            Ok(values)
        } else {
            Err(RepositoryError::MissingPrimaryKey {
                entity: self.name().to_string(),
                keys: missing,
            }
            .into())
        }
    }

    fn load(&self, skeleton: Entity, key: &CacheKey) -> Result<Option<Entity>, OrmError> {
        let mut keys = BTreeMap::new();
        for field in self.definition.keys() {
            keys.insert(field.clone(), self.get_field_value(&skeleton, field)?);
        }

        let plan = self.plan();
        let mut query = plan.select();
        let (filter, binds) = key_filter(self.definition, &keys, Some(plan.aliases().root()));
        query.filter = Some(filter);
        query.binds = binds;

        let rows = self.em.execute(&Query::Select(query))?.rows;
        if rows.is_empty() {
            tracing::debug!(%key, "no row");
            return Ok(None);
        }

        self.decode(skeleton, key, &rows).map(Some)
    }

    fn compile_criteria(&self, criteria: &Criteria) -> Result<(Option<Predicate>, Binds), OrmError> {
        let mut binds = Binds::new();
        let mut parts = Vec::new();

        for (field, condition) in criteria.conditions() {
            let part = match condition {
                Condition::Value(value) => self.field_predicate(field, value, &mut binds)?,
                Condition::AnyOf(values) => {
                    let alternatives = values
                        .iter()
                        .map(|value| self.field_predicate(field, value, &mut binds))
                        .collect::<Result<Vec<_>, _>>()?;
                    Predicate::or(alternatives)
                }
            };
            parts.push(part);
        }
        parts.extend(criteria.predicates().cloned());

        let filter = (!parts.is_empty()).then(|| Predicate::and(parts));

        Ok((filter, binds))
    }

    fn field_predicate(
        &self,
        field: &str,
        value: &Value,
        binds: &mut Binds,
    ) -> Result<Predicate, OrmError> {
        let definition = self.field(field)?;
        let column = self
            .em
            .definitions()
            .map_field_to_column(self.name(), field)?;
        let left = ColumnRef::new(self.plan().aliases().root(), column);

        let (op, operand) = match value {
            Value::Bool(value) => {
                return Ok(Predicate::IsBool {
                    column: left,
                    value: *value,
                });
            }
            Value::Null => {
                return Ok(Predicate::IsNull {
                    column: left,
                    negated: false,
                });
            }
            Value::Text(text) => match parse_operator(text) {
                Some((op, rest)) => (op, Value::Text(rest.to_string())),
                None => (CompareOp::Eq, value.clone()),
            },
            other => (CompareOp::Eq, other.clone()),
        };

        let bind = next_bind_name(binds, column);
        binds.insert(
            bind.clone(),
            self.em.transformers().to_storage(definition, operand)?,
        );

        Ok(Predicate::compare(left, op, bind))
    }

    fn record_cache(&self, tier: CacheTier, hit: bool) {
        let entity = self.name();
        self.em.record(if hit {
            MetricsEvent::CacheHit { tier, entity }
        } else {
            MetricsEvent::CacheMiss { tier, entity }
        });
    }
}

/// First `{column}_{n}` not yet bound; repeated conditions on one column
/// each get their own name.
fn next_bind_name(binds: &Binds, column: &str) -> String {
    (0..)
        .map(|n| format!("{column}_{n}"))
        .find(|name| !binds.contains_key(name))
        .unwrap_or_else(|| column.to_string())
}

/// `key = :key` for every key field, qualified with `alias` when given.
fn key_filter(
    definition: &EntityDefinition,
    keys: &BTreeMap<String, Value>,
    alias: Option<&str>,
) -> (Predicate, Binds) {
    let mut binds = Binds::new();
    let mut parts = Vec::new();

    for field in definition.keys() {
        let Some(column) = definition.field(field).and_then(FieldDefinition::column) else {
            continue;
        };
        let left = alias.map_or_else(
            || ColumnRef::bare(column),
            |alias| ColumnRef::new(alias, column),
        );

        parts.push(Predicate::compare(left, CompareOp::Eq, field.clone()));
        binds.insert(field.clone(), keys.get(field).cloned().unwrap_or_default());
    }

    (Predicate::and(parts), binds)
}
