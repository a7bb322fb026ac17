use crate::model::{
    DefinitionError, EntityDefinition, FieldDefinition, JoinDefinition, RelationKind,
    raw::{RawDocument, RawEntity, RawField, RawJoin},
};
use std::{collections::BTreeMap, path::Path};

///
/// DefinitionStore
///
/// Owns every entity definition, keyed by entity name.
///

#[derive(Clone, Debug, Default)]
pub struct DefinitionStore {
    entities: BTreeMap<String, EntityDefinition>,
}

impl DefinitionStore {
    /// Parse and resolve a YAML definition document.
    pub fn from_yaml_str(source: &str) -> Result<Self, DefinitionError> {
        let document: RawDocument = serde_yaml::from_str(source)?;

        let partials = document
            .into_iter()
            .map(|(name, raw)| Partial::from_raw(&name, raw).map(|partial| (name, partial)))
            .collect::<Result<BTreeMap<_, _>, _>>()?;

        let mut entities = BTreeMap::new();
        for (name, partial) in &partials {
            let definition = resolve_entity(name, partial, &partials)?;
            entities.insert(name.clone(), definition);
        }

        tracing::debug!(entities = entities.len(), "loaded entity definitions");

        Ok(Self { entities })
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, DefinitionError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| DefinitionError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        Self::from_yaml_str(&source)
    }

    pub fn definition(&self, entity: &str) -> Result<&EntityDefinition, DefinitionError> {
        self.entities
            .get(entity)
            .ok_or_else(|| DefinitionError::UnknownEntity {
                entity: entity.to_string(),
            })
    }

    #[must_use]
    pub fn contains(&self, entity: &str) -> bool {
        self.entities.contains_key(entity)
    }

    pub fn entities(&self) -> impl Iterator<Item = &EntityDefinition> {
        self.entities.values()
    }

    /// Fields of `entity` without a join.
    pub fn local_fields(&self, entity: &str) -> Result<Vec<&FieldDefinition>, DefinitionError> {
        Ok(self.definition(entity)?.local_fields().collect())
    }

    /// Field → column for every field stored on the entity's own row,
    /// including relations whose foreign key lives on the owner.
    pub fn column_map(&self, entity: &str) -> Result<BTreeMap<&str, &str>, DefinitionError> {
        let definition = self.definition(entity)?;

        Ok(definition
            .fields()
            .filter_map(|field| field.column().map(|column| (field.name(), column)))
            .collect())
    }

    pub fn map_field_to_column(&self, entity: &str, field: &str) -> Result<&str, DefinitionError> {
        self.definition(entity)?
            .field(field)
            .and_then(FieldDefinition::column)
            .ok_or_else(|| DefinitionError::UnknownField {
                entity: entity.to_string(),
                field: field.to_string(),
            })
    }

    /// Inverse of `map_field_to_column`; local fields win over relations
    /// sharing the column.
    pub fn map_column_to_field(&self, entity: &str, column: &str) -> Result<&str, DefinitionError> {
        let definition = self.definition(entity)?;

        definition
            .local_field_for_column(column)
            .or_else(|| definition.fields().find(|f| f.column() == Some(column)))
            .map(FieldDefinition::name)
            .ok_or_else(|| DefinitionError::UnknownColumn {
                entity: entity.to_string(),
                column: column.to_string(),
            })
    }
}

///
/// Partial
///
/// First loading pass: fields in declaration order plus the local column
/// map, so joins can be resolved against any entity in the second pass.
///

struct Partial {
    raw: RawEntity,
    fields: Vec<(String, RawField)>,
    columns: BTreeMap<String, String>,
}

impl Partial {
    fn from_raw(entity: &str, mut raw: RawEntity) -> Result<Self, DefinitionError> {
        let mapping = std::mem::take(&mut raw.fields);
        let mut fields = Vec::with_capacity(mapping.len());
        let mut columns = BTreeMap::new();

        for (key, value) in mapping {
            let Some(name) = key.as_str().map(str::to_string) else {
                return Err(DefinitionError::InvalidField {
                    entity: entity.to_string(),
                    field: format!("{key:?}"),
                    reason: "field names must be strings".to_string(),
                });
            };

            let field: RawField = if value.is_null() {
                RawField::default()
            } else {
                serde_yaml::from_value(value)?
            };

            if field.join.is_none() {
                let column = field.column.clone().unwrap_or_else(|| name.clone());
                columns.insert(name.clone(), column);
            }
            fields.push((name, field));
        }

        Ok(Self {
            raw,
            fields,
            columns,
        })
    }

    fn column_of(&self, field: &str) -> Option<&str> {
        self.columns.get(field).map(String::as_str)
    }

    fn field_of_column(&self, column: &str) -> Option<String> {
        self.fields
            .iter()
            .find(|(name, _)| self.column_of(name) == Some(column))
            .map(|(name, _)| name.clone())
    }

    fn key_columns(&self) -> Vec<&str> {
        self.raw
            .keys
            .iter()
            .filter_map(|key| self.column_of(key))
            .collect()
    }

    fn single_key(&self) -> Option<(&str, &str)> {
        match self.raw.keys.as_slice() {
            [key] => self.column_of(key).map(|column| (key.as_str(), column)),
            _ => None,
        }
    }
}

fn resolve_entity(
    name: &str,
    partial: &Partial,
    partials: &BTreeMap<String, Partial>,
) -> Result<EntityDefinition, DefinitionError> {
    let mut fields = Vec::with_capacity(partial.fields.len());

    for (field_name, raw) in &partial.fields {
        let field = match &raw.join {
            None => resolve_local(name, field_name, raw)?,
            Some(join) => resolve_relation(name, partial, field_name, raw, join, partials)?,
        };
        fields.push(field);
    }

    validate_keys(name, &partial.raw.keys, &fields)?;

    Ok(EntityDefinition {
        name: name.to_string(),
        table: partial.raw.table.clone(),
        keys: partial.raw.keys.clone(),
        repository: partial.raw.repository.clone(),
        access: partial.raw.access,
        fields,
    })
}

fn resolve_local(
    entity: &str,
    name: &str,
    raw: &RawField,
) -> Result<FieldDefinition, DefinitionError> {
    let invalid = |reason: &str| DefinitionError::InvalidField {
        entity: entity.to_string(),
        field: name.to_string(),
        reason: reason.to_string(),
    };

    if raw.relation.is_some_and(RelationKind::is_relation) {
        return Err(invalid("relation requires a join"));
    }
    if raw.target_entity.is_some() {
        return Err(invalid("targetEntity requires a join"));
    }

    Ok(FieldDefinition {
        name: name.to_string(),
        column: Some(raw.column.clone().unwrap_or_else(|| name.to_string())),
        ty: raw.ty.clone(),
        transformer: raw.transformer.clone(),
        target_entity: None,
        relation: RelationKind::Scalar,
        join: None,
    })
}

fn resolve_relation(
    entity: &str,
    owner: &Partial,
    name: &str,
    raw: &RawField,
    join: &RawJoin,
    partials: &BTreeMap<String, Partial>,
) -> Result<FieldDefinition, DefinitionError> {
    let invalid = |reason: &str| DefinitionError::InvalidJoin {
        entity: entity.to_string(),
        field: name.to_string(),
        reason: reason.to_string(),
    };

    let relation = match raw.relation.or(join.kind) {
        Some(RelationKind::OneToMany) => RelationKind::OneToMany,
        _ => RelationKind::OneToOne,
    };

    // local side
    let declares_local = join.local.is_some() || join.local_column.is_some();
    let (local_column, local_field) = if let Some(column) = &join.local_column {
        (column.clone(), owner.field_of_column(column))
    } else if let Some(local) = &join.local {
        match owner.column_of(local) {
            Some(column) => (column.to_string(), Some(local.clone())),
            None => (local.clone(), owner.field_of_column(local)),
        }
    } else if let Some((key, column)) = owner.single_key() {
        (column.to_string(), Some(key.to_string()))
    } else {
        return Err(invalid("no local column and the owner has no single key"));
    };

    // foreign side
    let (foreign_column, foreign_field, table) = match (&raw.target_entity, &join.table) {
        (Some(_), Some(_)) => {
            return Err(invalid("join.table cannot be combined with targetEntity"));
        }
        (Some(target), None) => {
            let target_partial =
                partials
                    .get(target)
                    .ok_or_else(|| DefinitionError::UnknownEntity {
                        entity: target.clone(),
                    })?;

            let (column, field) = if let Some(column) = &join.foreign_column {
                (column.clone(), target_partial.field_of_column(column))
            } else if let Some(foreign) = &join.foreign {
                match target_partial.column_of(foreign) {
                    Some(column) => (column.to_string(), Some(foreign.clone())),
                    None => (foreign.clone(), target_partial.field_of_column(foreign)),
                }
            } else if let Some((key, column)) = target_partial.single_key() {
                (column.to_string(), Some(key.to_string()))
            } else {
                return Err(invalid("no foreign column and the target has no single key"));
            };

            (column, field, target_partial.raw.table.clone())
        }
        (None, Some(table)) => {
            let column = join
                .foreign_column
                .clone()
                .or_else(|| join.foreign.clone())
                .ok_or_else(|| invalid("join-table relations need a foreignColumn"))?;

            (column, None, table.clone())
        }
        (None, None) => return Err(invalid("needs a targetEntity or a join.table")),
    };

    let owner_side = relation == RelationKind::OneToOne
        && declares_local
        && !owner.key_columns().contains(&local_column.as_str());

    Ok(FieldDefinition {
        name: name.to_string(),
        column: owner_side.then(|| local_column.clone()),
        ty: raw.ty.clone(),
        transformer: raw.transformer.clone(),
        target_entity: raw.target_entity.clone(),
        relation,
        join: Some(JoinDefinition {
            local_column,
            local_field,
            foreign_column,
            foreign_field,
            table,
            filter: join.filter.clone(),
            columns: join.columns.clone(),
            id_columns: join.id_columns.clone(),
            owner_side,
        }),
    })
}

fn validate_keys(
    entity: &str,
    keys: &[String],
    fields: &[FieldDefinition],
) -> Result<(), DefinitionError> {
    if keys.is_empty() {
        return Err(DefinitionError::InvalidKey {
            entity: entity.to_string(),
            key: String::new(),
            reason: "no primary key declared".to_string(),
        });
    }

    for key in keys {
        let local = fields
            .iter()
            .any(|field| field.name() == key && field.is_local());

        if !local {
            return Err(DefinitionError::InvalidKey {
                entity: entity.to_string(),
                key: key.clone(),
                reason: "keys must name local fields".to_string(),
            });
        }
    }

    Ok(())
}
