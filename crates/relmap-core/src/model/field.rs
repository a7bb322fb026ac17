use crate::AUTO_GENERATED_TYPES;
use serde::{Deserialize, Serialize};

///
/// RelationKind
///
/// Cardinality of a field. `join.type` spellings `one`, `1:1`, `many` and
/// `1:x` are accepted as aliases.
///

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum RelationKind {
    #[default]
    #[serde(rename = "scalar")]
    Scalar,

    #[serde(
        rename = "oneToOne",
        alias = "one",
        alias = "1:1",
        alias = "onetoone",
        alias = "one_to_one"
    )]
    OneToOne,

    #[serde(
        rename = "oneToMany",
        alias = "many",
        alias = "1:x",
        alias = "onetomany",
        alias = "one_to_many"
    )]
    OneToMany,
}

impl RelationKind {
    #[must_use]
    pub const fn is_relation(self) -> bool {
        !matches!(self, Self::Scalar)
    }
}

///
/// FieldDefinition
///

#[derive(Clone, Debug)]
pub struct FieldDefinition {
    pub(crate) name: String,
    pub(crate) column: Option<String>,
    pub(crate) ty: Option<String>,
    pub(crate) transformer: Option<String>,
    pub(crate) target_entity: Option<String>,
    pub(crate) relation: RelationKind,
    pub(crate) join: Option<JoinDefinition>,
}

impl FieldDefinition {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Storage column; `None` for relations whose key lives elsewhere.
    #[must_use]
    pub fn column(&self) -> Option<&str> {
        self.column.as_deref()
    }

    #[must_use]
    pub fn ty(&self) -> Option<&str> {
        self.ty.as_deref()
    }

    /// Explicitly named transformer, if any.
    #[must_use]
    pub fn transformer(&self) -> Option<&str> {
        self.transformer.as_deref()
    }

    #[must_use]
    pub fn target_entity(&self) -> Option<&str> {
        self.target_entity.as_deref()
    }

    #[must_use]
    pub const fn relation(&self) -> RelationKind {
        self.relation
    }

    #[must_use]
    pub const fn join(&self) -> Option<&JoinDefinition> {
        self.join.as_ref()
    }

    #[must_use]
    pub const fn is_local(&self) -> bool {
        self.join.is_none()
    }

    /// Relation over a join table, decoded into plain column maps.
    #[must_use]
    pub const fn is_join_table(&self) -> bool {
        self.join.is_some() && self.target_entity.is_none()
    }

    /// Whether the storage layer generates this field's value.
    #[must_use]
    pub fn is_auto_generated(&self) -> bool {
        self.ty
            .as_deref()
            .is_some_and(|ty| AUTO_GENERATED_TYPES.contains(&ty))
    }
}

///
/// JoinDefinition
///
/// A relation's join with both sides resolved to columns at load time.
///
/// owner_side  → the foreign key is stored on the owning entity's row
///               (`local_column` is not one of its key columns)
///

#[derive(Clone, Debug)]
pub struct JoinDefinition {
    pub(crate) local_column: String,
    pub(crate) local_field: Option<String>,
    pub(crate) foreign_column: String,
    pub(crate) foreign_field: Option<String>,
    pub(crate) table: String,
    pub(crate) filter: Option<String>,
    pub(crate) columns: Vec<String>,
    pub(crate) id_columns: Vec<String>,
    pub(crate) owner_side: bool,
}

impl JoinDefinition {
    #[must_use]
    pub fn local_column(&self) -> &str {
        &self.local_column
    }

    /// Owner field stored in `local_column`, when one is declared.
    #[must_use]
    pub fn local_field(&self) -> Option<&str> {
        self.local_field.as_deref()
    }

    #[must_use]
    pub fn foreign_column(&self) -> &str {
        &self.foreign_column
    }

    /// Target field stored in `foreign_column`, when one is declared.
    #[must_use]
    pub fn foreign_field(&self) -> Option<&str> {
        self.foreign_field.as_deref()
    }

    /// Joined table: the target entity's table or the join table.
    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Raw filter fragment; `$field` tokens name target fields.
    #[must_use]
    pub fn filter(&self) -> Option<&str> {
        self.filter.as_deref()
    }

    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Identity columns of a join-table row (defaults to the first column).
    #[must_use]
    pub fn id_columns(&self) -> &[String] {
        if self.id_columns.is_empty() {
            self.columns.get(..1).unwrap_or_default()
        } else {
            &self.id_columns
        }
    }

    #[must_use]
    pub const fn owner_side(&self) -> bool {
        self.owner_side
    }
}
