use crate::{
    db::{
        plan::{PlanError, TableAliases},
        query::{ColumnRef, SelectColumn},
    },
    model::{DefinitionStore, EntityDefinition, FieldDefinition},
};

/// Select label of a root column: `{entity}_{column}`, entity lowercased.
#[must_use]
pub fn root_label(entity: &str, column: &str) -> String {
    format!("{}_{column}", entity.to_lowercase())
}

/// Select label of a joined column: `{field}_{column}`.
#[must_use]
pub fn join_label(field: &str, column: &str) -> String {
    format!("{field}_{column}")
}

/// Flattened select list: root local fields, then each join's columns.
///
/// Entity joins pull the target's local fields; join-table joins must list
/// their `columns`.
pub fn compute_column_sets(
    store: &DefinitionStore,
    definition: &EntityDefinition,
    joins: &[&FieldDefinition],
    aliases: &TableAliases,
) -> Result<Vec<SelectColumn>, PlanError> {
    let mut columns: Vec<SelectColumn> = definition
        .local_fields()
        .filter_map(FieldDefinition::column)
        .map(|column| SelectColumn {
            column: ColumnRef::new(aliases.root(), column),
            label: root_label(definition.name(), column),
        })
        .collect();

    for field in joins {
        let Some(alias) = aliases.get(field.name()) else {
            continue;
        };

        let joined: Vec<&str> = match field.target_entity() {
            Some(target) => store
                .definition(target)?
                .local_fields()
                .filter_map(FieldDefinition::column)
                .collect(),
            None => {
                let listed = field.join().map(|j| j.columns()).unwrap_or_default();
                if listed.is_empty() {
                    return Err(PlanError::MissingJoinColumns {
                        entity: definition.name().to_string(),
                        field: field.name().to_string(),
                    });
                }
                listed.iter().map(String::as_str).collect()
            }
        };

        columns.extend(joined.into_iter().map(|column| SelectColumn {
            column: ColumnRef::new(alias, column),
            label: join_label(field.name(), column),
        }));
    }

    Ok(columns)
}
