use crate::{
    OrmError,
    cache::CacheKey,
    db::{
        engine::Row,
        plan::{join_label, root_label},
        repository::{Lookup, Repository},
    },
    entity::Entity,
    model::{FieldDefinition, JoinDefinition, RelationKind},
    obs::MetricsEvent,
    value::Value,
};
use std::collections::{BTreeMap, HashSet};

impl Repository<'_> {
    /// Hydrate `entity` from the rows of its eager select.
    ///
    /// Locals come from the first row. The partial instance is published to
    /// the identity cache before relations are resolved, so a relation
    /// pointing back at this entity gets that instance instead of recursing.
    pub(super) fn decode(
        &self,
        mut entity: Entity,
        key: &CacheKey,
        rows: &[Row],
    ) -> Result<Entity, OrmError> {
        let Some(first) = rows.first() else {
            return Ok(entity);
        };
        let name = self.name();

        for field in self.definition.local_fields() {
            let Some(column) = field.column() else {
                continue;
            };
            let value = first
                .get(&root_label(name, column))
                .cloned()
                .unwrap_or_default();
            self.set_field_value(&mut entity, field.name(), value)?;
        }
        self.em.identity_mut().update(key, entity.clone());
        self.em.record(MetricsEvent::RowsDecoded {
            entity: name,
            rows: rows.len() as u64,
        });

        for field in self.definition.relation_fields() {
            let value = self.decode_relation(field, rows)?;
            self.set_field_value(&mut entity, field.name(), value)?;
        }

        tracing::trace!(entity = name, rows = rows.len(), "decoded");

        Ok(entity)
    }

    fn decode_relation(&self, field: &FieldDefinition, rows: &[Row]) -> Result<Value, OrmError> {
        let Some(join) = field.join() else {
            return Ok(Value::Null);
        };

        match field.target_entity() {
            Some(target) => self.decode_entity_relation(field, target, rows),
            None => Ok(decode_join_table(field, join, rows)),
        }
    }

    fn decode_entity_relation(
        &self,
        field: &FieldDefinition,
        target: &str,
        rows: &[Row],
    ) -> Result<Value, OrmError> {
        let repository = self.em.repository(target)?;
        let target_definition = repository.definition();

        // (key field, select label) pairs of the target
        let keys: Vec<(&str, String)> = target_definition
            .keys()
            .iter()
            .filter_map(|key| {
                let column = target_definition.field(key)?.column()?;
                Some((key.as_str(), join_label(field.name(), column)))
            })
            .collect();
        let labels: Vec<&str> = keys.iter().map(|(_, label)| label.as_str()).collect();

        let params = |row: &Row| -> BTreeMap<String, Value> {
            keys.iter()
                .map(|(key, label)| {
                    let value = row.get(label).cloned().unwrap_or_default();
                    ((*key).to_string(), value)
                })
                .collect()
        };

        if field.relation() == RelationKind::OneToMany {
            let mut related = Vec::new();
            for row in distinct_rows(rows, &labels) {
                if let Some(entity) = repository.get(Lookup::Params(params(row)))? {
                    related.push(Value::from(entity));
                }
            }

            return Ok(Value::List(related));
        }

        let Some(row) = distinct_rows(rows, &labels).into_iter().next() else {
            return Ok(Value::Null);
        };

        Ok(repository
            .get(Lookup::Params(params(row)))?
            .map_or(Value::Null, Value::from))
    }
}

/// Join-table relations decode to column → value maps.
fn decode_join_table(field: &FieldDefinition, join: &JoinDefinition, rows: &[Row]) -> Value {
    let id_labels: Vec<String> = join
        .id_columns()
        .iter()
        .map(|column| join_label(field.name(), column))
        .collect();
    let id_labels: Vec<&str> = id_labels.iter().map(String::as_str).collect();

    let to_map = |row: &Row| -> Value {
        Value::Map(
            join.columns()
                .iter()
                .map(|column| {
                    let value = row
                        .get(&join_label(field.name(), column))
                        .cloned()
                        .unwrap_or_default();
                    (column.clone(), value)
                })
                .collect(),
        )
    };

    let distinct = distinct_rows(rows, &id_labels);
    if field.relation() == RelationKind::OneToMany {
        Value::List(distinct.into_iter().map(to_map).collect())
    } else {
        distinct.into_iter().next().map_or(Value::Null, to_map)
    }
}

/// Rows with a distinct, fully non-null combination of `labels`, in first
/// occurrence order.
///
/// The eager select is a cross product of all joins, so the same related
/// row repeats once per row of every other join.
#[must_use]
pub fn distinct_rows<'a>(rows: &'a [Row], labels: &[&str]) -> Vec<&'a Row> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();

    for row in rows {
        let identity: Option<Vec<String>> = labels
            .iter()
            .map(|label| row.get(*label).and_then(Value::canonical_text))
            .collect();

        if let Some(identity) = identity {
            if seen.insert(identity) {
                out.push(row);
            }
        }
    }

    out
}
