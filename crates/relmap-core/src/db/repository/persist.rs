use crate::{
    OrmError,
    db::{
        query::{InsertQuery, Query, UpdateQuery},
        repository::{Lookup, Repository, RepositoryError, key_filter},
    },
    entity::Entity,
    model::{FieldDefinition, JoinDefinition, RelationKind},
    obs::{MetricsEvent, OperationKind},
    value::Value,
};
use chrono::{Timelike, Utc};
use std::collections::BTreeMap;

///
/// PersistMode
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum PersistMode {
    Insert,
    Update,
}

///
/// Assignments
/// Column → value pairs; a later assignment to a column replaces it.
///

#[derive(Debug, Default)]
struct Assignments(Vec<(String, Value)>);

impl Assignments {
    fn assign(&mut self, column: &str, value: Value) {
        match self.0.iter_mut().find(|(existing, _)| existing == column) {
            Some(slot) => slot.1 = value,
            None => self.0.push((column.to_string(), value)),
        }
    }

    const fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn into_inner(self) -> Vec<(String, Value)> {
        self.0
    }
}

impl Repository<'_> {
    /// Insert or update `entity`, cascading to dependent relations.
    ///
    /// One-to-one relations stored on this row are written first so their
    /// key can be assigned. Relations whose foreign key lives on the related
    /// row are written after the insert, once this entity's key is known.
    /// Generated keys and persisted relations are written back into
    /// `entity`; the returned value is a copy of the final state.
    pub fn persist(&self, entity: &mut Entity) -> Result<Entity, OrmError> {
        let name = self.name();
        self.em.record(MetricsEvent::Operation {
            kind: OperationKind::Persist,
            entity: name,
        });

        let mode = self.persist_mode(entity)?;
        tracing::debug!(entity = name, ?mode, "persist");

        let deferred = match mode {
            PersistMode::Insert => self.insert(entity)?,
            PersistMode::Update => {
                self.update(entity)?;
                Vec::new()
            }
        };

        self.invalidate_graph(entity)?;

        if !deferred.is_empty() {
            for field in deferred {
                self.persist_dependents(entity, field)?;
            }
            // dependents may have loaded this entity again while saving
            self.invalidate_graph(entity)?;
        }

        Ok(entity.clone())
    }

    /// Fields that differ from the cached copy, in declaration order.
    ///
    /// Only locals and foreign keys stored on this row are compared. With
    /// no cached copy every such field counts as changed.
    pub fn compute_changes(&self, entity: &Entity) -> Result<Vec<String>, OrmError> {
        let cached = match self.cache_key(entity)? {
            Some(key) => {
                let identity = self.em.identity_cache().load(&key).cloned();
                identity.or_else(|| self.em.result_cache().load(&key))
            }
            None => None,
        };

        let mut changed = Vec::new();
        for field in self.definition.fields() {
            let differs = match (field.join(), &cached) {
                (None, None) => true,
                (None, Some(cached)) => {
                    self.get_field_value(entity, field.name())?
                        != self.get_field_value(cached, field.name())?
                }
                (Some(join), cached) if join.owner_side() => match cached {
                    None => true,
                    Some(cached) => {
                        self.relation_key(entity, field, join)?
                            != self.relation_key(cached, field, join)?
                    }
                },
                (Some(_), _) => false,
            };

            if differs {
                changed.push(field.name().to_string());
            }
        }

        Ok(changed)
    }

    pub(crate) fn persist_mode(&self, entity: &Entity) -> Result<PersistMode, OrmError> {
        let mut keys = BTreeMap::new();
        let mut generated = false;

        for key in self.definition.keys() {
            let value = self.get_field_value(entity, key)?;
            if !value.is_null() {
                keys.insert(key.clone(), value);
                continue;
            }

            let field = self.field(key)?;
            if !field.is_auto_generated() {
                return Err(RepositoryError::NonGeneratedKeyNull {
                    entity: self.name().to_string(),
                    field: key.clone(),
                    ty: field.ty().unwrap_or("untyped").to_string(),
                }
                .into());
            }
            generated = true;
        }

        if generated || self.get(Lookup::Params(keys))?.is_none() {
            Ok(PersistMode::Insert)
        } else {
            Ok(PersistMode::Update)
        }
    }

    fn insert(&self, entity: &mut Entity) -> Result<Vec<&FieldDefinition>, OrmError> {
        let mut values = Assignments::default();
        let mut deferred = Vec::new();

        for field in self.definition.local_fields() {
            let value = self.get_field_value(entity, field.name())?;
            if let (Some(column), false) = (field.column(), value.is_null()) {
                values.assign(column, value);
            }
        }

        // relation keys win over a scalar mapped to the same column
        for field in self.definition.relation_fields() {
            let Some(join) = field.join() else {
                continue;
            };
            if join.owner_side() {
                if let Some(value) = self.owner_side_key(entity, field, join)? {
                    values.assign(join.local_column(), value);
                }
            } else if field.target_entity().is_some() {
                deferred.push(field);
            }
        }

        let key_columns = self.definition.key_columns();
        let result = self.em.execute(&Query::Insert(InsertQuery {
            table: self.definition.table().to_string(),
            values: values.into_inner(),
            returning: key_columns.iter().map(ToString::to_string).collect(),
        }))?;

        if let Some(row) = result.rows.into_iter().next() {
            for key in self.definition.keys() {
                let Some(column) = self.field(key)?.column() else {
                    continue;
                };
                if let Some(value) = row.get(column) {
                    self.set_field_value(entity, key, value.clone())?;
                }
            }
        }

        Ok(deferred)
    }

    fn update(&self, entity: &mut Entity) -> Result<(), OrmError> {
        if let Some(stamp) = &self.config.modified_at_field {
            if self.definition.field(stamp).is_some() {
                let now = Utc::now().naive_utc();
                let now = now.with_nanosecond(0).unwrap_or(now);
                self.set_field_value(entity, stamp, Value::Timestamp(now))?;
            }
        }

        let changed = self.compute_changes(entity)?;
        let changed: Vec<&FieldDefinition> = self
            .definition
            .fields()
            .filter(|field| changed.iter().any(|name| name == field.name()))
            .filter(|field| !self.definition.is_key(field.name()))
            .collect();

        let mut set = Assignments::default();
        for field in changed.iter().filter(|field| field.is_local()) {
            let value = self.get_field_value(entity, field.name())?;
            if let (Some(column), false) = (field.column(), value.is_null()) {
                set.assign(column, value);
            }
        }
        for field in changed.iter().filter(|field| !field.is_local()) {
            let Some(join) = field.join() else {
                continue;
            };
            if let Some(value) = self.owner_side_key(entity, field, join)? {
                set.assign(join.local_column(), value);
            }
        }

        if set.is_empty() {
            tracing::debug!(entity = self.name(), "nothing to update");
            return Ok(());
        }

        let keys = self.require_keys(entity)?;
        let (filter, binds) = key_filter(self.definition, &keys, None);
        let result = self.em.execute(&Query::Update(UpdateQuery {
            table: self.definition.table().to_string(),
            set: set.into_inner(),
            filter,
            binds,
        }))?;
        tracing::debug!(entity = self.name(), affected = result.affected, "update");

        Ok(())
    }

    /// Foreign key value for a relation stored on this row, persisting the
    /// related entity first when it has none yet.
    fn owner_side_key(
        &self,
        entity: &mut Entity,
        field: &FieldDefinition,
        join: &JoinDefinition,
    ) -> Result<Option<Value>, OrmError> {
        let mut related = match self.compiled.accessors.read(entity, field.name())? {
            Value::Null => return Ok(None),
            Value::Entity(related) => *related,
            // a raw key assigned in place of the entity
            key => return Ok(Some(key)),
        };

        let repository = self.em.repository(related.name())?;
        let foreign = self.foreign_field(field, join)?;

        let mut value = repository.get_field_value(&related, foreign)?;
        if value.is_null() {
            repository.persist(&mut related)?;
            value = repository.get_field_value(&related, foreign)?;
            self.compiled
                .accessors
                .write(entity, field.name(), Value::from(related.clone()))?;
        }

        if let Some(key) = repository.cache_key(&related)? {
            self.em.invalidate(&key);
        }

        Ok((!value.is_null()).then_some(value))
    }

    /// Write the related entities of `field` with their foreign key set to
    /// this entity's local value.
    fn persist_dependents(&self, entity: &mut Entity, field: &FieldDefinition) -> Result<(), OrmError> {
        let (Some(join), Some(target)) = (field.join(), field.target_entity()) else {
            return Ok(());
        };
        let repository = self.em.repository(target)?;
        let foreign = self.foreign_field(field, join)?;
        let local = join.local_field().ok_or_else(|| {
            self.unresolved(
                field,
                format!("column '{}' maps to no field", join.local_column()),
            )
        })?;
        let owner_value = self.get_field_value(entity, local)?;

        let save = |mut related: Entity| -> Result<Value, OrmError> {
            repository.set_field_value(&mut related, foreign, owner_value.clone())?;
            repository.persist(&mut related)?;
            Ok(Value::from(related))
        };

        let written = match self.compiled.accessors.read(entity, field.name())? {
            Value::Null => return Ok(()),
            Value::Entity(related) if field.relation() != RelationKind::OneToMany => {
                save(*related)?
            }
            Value::List(items) if field.relation() == RelationKind::OneToMany => {
                let mut written = Vec::with_capacity(items.len());
                for item in items {
                    match item {
                        Value::Entity(related) => written.push(save(*related)?),
                        Value::Null => {}
                        other => return Err(self.invalid_relation(field, &other)),
                    }
                }
                Value::List(written)
            }
            other => return Err(self.invalid_relation(field, &other)),
        };

        self.compiled.accessors.write(entity, field.name(), written)?;

        Ok(())
    }

    /// Evict `entity` and every related entity whose key it stores.
    pub(super) fn invalidate_graph(&self, entity: &Entity) -> Result<(), OrmError> {
        if let Some(key) = self.cache_key(entity)? {
            self.em.invalidate(&key);
        }

        for field in self.definition.relation_fields() {
            let owner_side = field.join().is_some_and(JoinDefinition::owner_side);
            if !owner_side {
                continue;
            }
            if let Value::Entity(related) = self.compiled.accessors.read(entity, field.name())? {
                let repository = self.em.repository(related.name())?;
                if let Some(key) = repository.cache_key(&related)? {
                    self.em.invalidate(&key);
                }
            }
        }

        Ok(())
    }

    fn relation_key(
        &self,
        entity: &Entity,
        field: &FieldDefinition,
        join: &JoinDefinition,
    ) -> Result<Value, OrmError> {
        match self.compiled.accessors.read(entity, field.name())? {
            Value::Entity(related) => {
                let repository = self.em.repository(related.name())?;
                repository.get_field_value(&related, self.foreign_field(field, join)?)
            }
            other => Ok(other),
        }
    }

    fn foreign_field<'j>(
        &self,
        field: &FieldDefinition,
        join: &'j JoinDefinition,
    ) -> Result<&'j str, RepositoryError> {
        join.foreign_field().ok_or_else(|| {
            self.unresolved(
                field,
                format!("column '{}' maps to no field of the target", join.foreign_column()),
            )
        })
    }

    fn unresolved(&self, field: &FieldDefinition, reason: String) -> RepositoryError {
        RepositoryError::UnresolvedRelation {
            entity: self.name().to_string(),
            field: field.name().to_string(),
            reason,
        }
    }

    fn invalid_relation(&self, field: &FieldDefinition, value: &Value) -> OrmError {
        RepositoryError::InvalidRelationValue {
            entity: self.name().to_string(),
            field: field.name().to_string(),
            reason: format!("unexpected value {value}"),
        }
        .into()
    }
}
