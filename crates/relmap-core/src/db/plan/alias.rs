use crate::model::{EntityDefinition, FieldDefinition};
use std::collections::BTreeSet;

///
/// TableAliases
///
/// Root alias plus one alias per joined field, in join order.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TableAliases {
    root: String,
    joins: Vec<(String, String)>,
}

impl TableAliases {
    #[must_use]
    pub fn root(&self) -> &str {
        &self.root
    }

    /// Alias of a joined field.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&str> {
        self.joins
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, alias)| alias.as_str())
    }

    /// `(field, alias)` pairs in join order.
    pub fn joins(&self) -> impl Iterator<Item = (&str, &str)> {
        self.joins.iter().map(|(f, a)| (f.as_str(), a.as_str()))
    }

    /// Every alias, root first.
    pub fn all(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.root.as_str()).chain(self.joins.iter().map(|(_, a)| a.as_str()))
    }
}

fn initial(table: &str) -> String {
    table
        .chars()
        .next()
        .map_or_else(|| "t".to_string(), |c| c.to_lowercase().collect())
}

fn unique(base: String, used: &mut BTreeSet<String>) -> String {
    if used.insert(base.clone()) {
        return base;
    }

    let mut suffix = 0_u32;
    loop {
        let candidate = format!("{base}{suffix}");
        if used.insert(candidate.clone()) {
            return candidate;
        }
        suffix += 1;
    }
}

/// Root alias is the first letter of the entity's table; each join takes
/// the first letter of its joined table with `0, 1, 2, …` appended until
/// unique.
#[must_use]
pub fn generate_table_aliases(
    definition: &EntityDefinition,
    joins: &[&FieldDefinition],
) -> TableAliases {
    let mut used = BTreeSet::new();
    let root = unique(initial(definition.table()), &mut used);

    let joins = joins
        .iter()
        .filter_map(|field| {
            let join = field.join()?;
            let alias = unique(initial(join.table()), &mut used);
            Some((field.name().to_string(), alias))
        })
        .collect();

    TableAliases { root, joins }
}
