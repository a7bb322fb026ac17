//! Module: db::plan
//! Responsibility: per-entity select plans (aliases, joins, column sets).
//! Does not own: filters, ordering or paging of individual calls.

mod alias;
mod columns;
mod join;


pub use alias::{TableAliases, generate_table_aliases};
pub use columns::{compute_column_sets, join_label, root_label};
pub use join::{build_join, compute_join_sets};

use crate::{
    db::query::{Join, Query, SelectColumn, SelectQuery, TableRef},
    model::{DefinitionError, DefinitionStore},
};
use sha2::{Digest, Sha256};
use std::fmt;
use thiserror::Error as ThisError;

///
/// PlanError
///

#[derive(Debug, ThisError)]
pub enum PlanError {
    #[error("join-table relation '{entity}.{field}' declares no columns")]
    MissingJoinColumns { entity: String, field: String },

    #[error(transparent)]
    Definition(#[from] DefinitionError),
}

///
/// PlanFingerprint
///
/// Stable, deterministic fingerprint of a compiled entity plan.
///

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct PlanFingerprint([u8; 32]);

impl PlanFingerprint {
    #[must_use]
    pub fn as_hex(&self) -> String {
        let mut out = String::with_capacity(64);
        for byte in self.0 {
            use std::fmt::Write as _;
            let _ = write!(out, "{byte:02x}");
        }
        out
    }
}

impl fmt::Display for PlanFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_hex())
    }
}

///
/// EntityPlan
///
/// Everything needed to load one entity with all of its eager relations in
/// a single statement. Compiled once per entity type and shared.
///

#[derive(Clone, Debug)]
pub struct EntityPlan {
    entity: String,
    root: TableRef,
    aliases: TableAliases,
    joins: Vec<Join>,
    columns: Vec<SelectColumn>,
    fingerprint: PlanFingerprint,
}

impl EntityPlan {
    pub fn build(store: &DefinitionStore, entity: &str) -> Result<Self, PlanError> {
        let definition = store.definition(entity)?;

        let join_fields = compute_join_sets(definition);
        let aliases = generate_table_aliases(definition, &join_fields);
        let columns = compute_column_sets(store, definition, &join_fields, &aliases)?;

        let mut joins = Vec::with_capacity(join_fields.len());
        for field in &join_fields {
            if let Some(join) = build_join(store, field, &aliases)? {
                joins.push(join);
            }
        }

        let mut plan = Self {
            entity: entity.to_string(),
            root: TableRef::new(definition.table(), aliases.root()),
            aliases,
            joins,
            columns,
            fingerprint: PlanFingerprint([0; 32]),
        };
        plan.fingerprint = plan.compute_fingerprint();

        Ok(plan)
    }

    #[must_use]
    pub fn entity(&self) -> &str {
        &self.entity
    }

    #[must_use]
    pub const fn aliases(&self) -> &TableAliases {
        &self.aliases
    }

    #[must_use]
    pub fn columns(&self) -> &[SelectColumn] {
        &self.columns
    }

    #[must_use]
    pub fn joins(&self) -> &[Join] {
        &self.joins
    }

    #[must_use]
    pub const fn root(&self) -> &TableRef {
        &self.root
    }

    #[must_use]
    pub const fn fingerprint(&self) -> PlanFingerprint {
        self.fingerprint
    }

    /// Full eager select, without filter.
    #[must_use]
    pub fn select(&self) -> SelectQuery {
        let mut query = SelectQuery::new(self.root.clone());
        query.columns.clone_from(&self.columns);
        query.joins.clone_from(&self.joins);

        query
    }

    fn compute_fingerprint(&self) -> PlanFingerprint {
        let mut hasher = Sha256::new();
        hasher.update(b"planfp:v1");
        hasher.update(self.entity.as_bytes());
        hasher.update([0]);
        hasher.update(Query::Select(self.select()).to_string().as_bytes());

        let digest = hasher.finalize();
        let mut out = [0u8; 32];
        out.copy_from_slice(&digest);
        PlanFingerprint(out)
    }
}
