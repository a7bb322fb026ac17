use crate::{
    db::{
        plan::{PlanError, TableAliases},
        query::{ColumnRef, Join, Predicate, TableRef},
    },
    model::{DefinitionError, DefinitionStore, EntityDefinition, FieldDefinition},
};

/// Every field declaring a join, in declaration order.
#[must_use]
pub fn compute_join_sets(definition: &EntityDefinition) -> Vec<&FieldDefinition> {
    definition.relation_fields().collect()
}

/// LEFT join for one relation field:
/// `alias.foreignColumn = root.localColumn`, AND the join's filter fragment.
pub fn build_join(
    store: &DefinitionStore,
    field: &FieldDefinition,
    aliases: &TableAliases,
) -> Result<Option<Join>, PlanError> {
    let (Some(join), Some(alias)) = (field.join(), aliases.get(field.name())) else {
        return Ok(None);
    };

    let mut on = vec![Predicate::columns_eq(
        ColumnRef::new(alias, join.foreign_column()),
        ColumnRef::new(aliases.root(), join.local_column()),
    )];

    if let Some(filter) = join.filter() {
        let text = substitute_fields(filter, |name| match field.target_entity() {
            Some(target) => store
                .map_field_to_column(target, name)
                .map(|column| format!("{alias}.{column}")),
            None => Ok(format!("{alias}.{name}")),
        })?;
        on.push(Predicate::Fragment(text));
    }

    Ok(Some(Join {
        table: TableRef::new(join.table(), alias),
        on: Predicate::and(on),
    }))
}

/// Replace `$name` tokens in a filter fragment.
fn substitute_fields(
    fragment: &str,
    mut resolve: impl FnMut(&str) -> Result<String, DefinitionError>,
) -> Result<String, DefinitionError> {
    let mut out = String::with_capacity(fragment.len());
    let mut chars = fragment.char_indices().peekable();

    while let Some((start, c)) = chars.next() {
        if c != '$' {
            out.push(c);
            continue;
        }

        let mut end = start + 1;
        while let Some(&(i, next)) = chars.peek() {
            if next.is_ascii_alphanumeric() || next == '_' {
                end = i + next.len_utf8();
                chars.next();
            } else {
                break;
            }
        }

        let name = &fragment[start + 1..end];
        if name.is_empty() {
            out.push('$');
        } else {
            out.push_str(&resolve(name)?);
        }
    }

    Ok(out)
}
