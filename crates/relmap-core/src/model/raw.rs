//! Serde shapes of the YAML definition document, before resolution.

use crate::{entity::access::AccessStyle, model::RelationKind};
use serde::Deserialize;
use std::collections::BTreeMap;

///
/// RawDocument
///

pub(crate) type RawDocument = BTreeMap<String, RawEntity>;

///
/// RawEntity
///
/// `fields` stays a YAML mapping so declaration order survives parsing.
///

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct RawEntity {
    pub table: String,

    #[serde(default)]
    pub keys: Vec<String>,

    #[serde(default)]
    pub repository: Option<String>,

    #[serde(default)]
    pub access: AccessStyle,

    #[serde(default)]
    pub fields: serde_yaml::Mapping,
}

///
/// RawField
///

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub(crate) struct RawField {
    #[serde(default)]
    pub column: Option<String>,

    #[serde(default, rename = "type")]
    pub ty: Option<String>,

    #[serde(default)]
    pub transformer: Option<String>,

    #[serde(default, alias = "target_entity")]
    pub target_entity: Option<String>,

    #[serde(default)]
    pub relation: Option<RelationKind>,

    #[serde(default)]
    pub join: Option<RawJoin>,
}

///
/// RawJoin
///

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub(crate) struct RawJoin {
    #[serde(default)]
    pub local: Option<String>,

    #[serde(default, alias = "local_column")]
    pub local_column: Option<String>,

    #[serde(default)]
    pub foreign: Option<String>,

    #[serde(default, alias = "foreign_column")]
    pub foreign_column: Option<String>,

    #[serde(default)]
    pub table: Option<String>,

    #[serde(default, rename = "where")]
    pub filter: Option<String>,

    #[serde(default)]
    pub columns: Vec<String>,

    #[serde(default, alias = "id_columns")]
    pub id_columns: Vec<String>,

    #[serde(default, rename = "type")]
    pub kind: Option<RelationKind>,
}
