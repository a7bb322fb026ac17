use crate::{entity::access::AccessStyle, model::FieldDefinition};

///
/// EntityDefinition
///
/// Immutable mapping of one entity onto its table. Field order is the
/// declaration order of the definition document.
///

#[derive(Clone, Debug)]
pub struct EntityDefinition {
    pub(crate) name: String,
    pub(crate) table: String,
    pub(crate) keys: Vec<String>,
    pub(crate) repository: Option<String>,
    pub(crate) access: AccessStyle,
    pub(crate) fields: Vec<FieldDefinition>,
}

impl EntityDefinition {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Ordered primary key field names.
    #[must_use]
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    #[must_use]
    pub fn is_key(&self, field: &str) -> bool {
        self.keys.iter().any(|key| key == field)
    }

    /// Name of the repository profile this entity asks for.
    #[must_use]
    pub fn repository(&self) -> Option<&str> {
        self.repository.as_deref()
    }

    #[must_use]
    pub const fn access(&self) -> AccessStyle {
        self.access
    }

    pub fn fields(&self) -> impl Iterator<Item = &FieldDefinition> {
        self.fields.iter()
    }

    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldDefinition> {
        self.fields.iter().find(|field| field.name() == name)
    }

    /// Fields without a join, in declaration order.
    pub fn local_fields(&self) -> impl Iterator<Item = &FieldDefinition> {
        self.fields.iter().filter(|field| field.is_local())
    }

    /// Fields declaring a join, in declaration order.
    pub fn relation_fields(&self) -> impl Iterator<Item = &FieldDefinition> {
        self.fields.iter().filter(|field| !field.is_local())
    }

    /// Key columns, in key order. Keys are validated at load, so every key
    /// has a column.
    #[must_use]
    pub fn key_columns(&self) -> Vec<&str> {
        self.keys
            .iter()
            .filter_map(|key| self.field(key).and_then(FieldDefinition::column))
            .collect()
    }

    /// Local field stored in `column`.
    #[must_use]
    pub fn local_field_for_column(&self, column: &str) -> Option<&FieldDefinition> {
        self.local_fields().find(|field| field.column() == Some(column))
    }
}
