//! Module: db::query
//! Responsibility: structured relational statement descriptions handed to
//! the query engine.
//! Does not own: SQL dialects. `Display` renders a generic SQL form for logs.

mod predicate;


pub use predicate::{ColumnRef, CompareOp, Operand, Predicate};

use crate::{obs::StatementKind, value::Value};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt};

///
/// Binds
/// Named parameters referenced by `Operand::Bind`.
///

pub type Binds = BTreeMap<String, Value>;

///
/// OrderDirection
///

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderDirection {
    #[default]
    #[serde(alias = "asc")]
    Asc,
    #[serde(alias = "desc")]
    Desc,
}

impl fmt::Display for OrderDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Asc => f.write_str("ASC"),
            Self::Desc => f.write_str("DESC"),
        }
    }
}

///
/// TableRef
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TableRef {
    pub table: String,
    pub alias: Option<String>,
}

impl TableRef {
    #[must_use]
    pub fn new(table: impl Into<String>, alias: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            alias: Some(alias.into()),
        }
    }

    #[must_use]
    pub fn bare(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            alias: None,
        }
    }

    /// Name rows of this table are qualified with.
    #[must_use]
    pub fn qualifier(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.table)
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.alias {
            Some(alias) => write!(f, "{} {alias}", self.table),
            None => f.write_str(&self.table),
        }
    }
}

///
/// Join
/// Always a LEFT join.
///

#[derive(Clone, Debug, PartialEq)]
pub struct Join {
    pub table: TableRef,
    pub on: Predicate,
}

///
/// SelectColumn
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SelectColumn {
    pub column: ColumnRef,
    pub label: String,
}

///
/// OrderBy
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct OrderBy {
    pub column: ColumnRef,
    pub direction: OrderDirection,
}

///
/// SelectQuery
///

#[derive(Clone, Debug, PartialEq)]
pub struct SelectQuery {
    pub columns: Vec<SelectColumn>,
    pub from: TableRef,
    pub joins: Vec<Join>,
    pub filter: Option<Predicate>,
    pub binds: Binds,
    pub order_by: Vec<OrderBy>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

impl SelectQuery {
    #[must_use]
    pub fn new(table: TableRef) -> Self {
        Self {
            columns: Vec::new(),
            from: table,
            joins: Vec::new(),
            filter: None,
            binds: Binds::new(),
            order_by: Vec::new(),
            limit: None,
            offset: None,
        }
    }
}

///
/// InsertQuery
///
/// `returning` columns come back as a single row keyed by column name.
///

#[derive(Clone, Debug, PartialEq)]
pub struct InsertQuery {
    pub table: String,
    pub values: Vec<(String, Value)>,
    pub returning: Vec<String>,
}

///
/// UpdateQuery
///

#[derive(Clone, Debug, PartialEq)]
pub struct UpdateQuery {
    pub table: String,
    pub set: Vec<(String, Value)>,
    pub filter: Predicate,
    pub binds: Binds,
}

///
/// DeleteQuery
///

#[derive(Clone, Debug, PartialEq)]
pub struct DeleteQuery {
    pub table: String,
    pub filter: Predicate,
    pub binds: Binds,
}

///
/// Query
///

#[derive(Clone, Debug, PartialEq)]
pub enum Query {
    Select(SelectQuery),
    Insert(InsertQuery),
    Update(UpdateQuery),
    Delete(DeleteQuery),
}

impl Query {
    #[must_use]
    pub const fn kind(&self) -> StatementKind {
        match self {
            Self::Select(_) => StatementKind::Select,
            Self::Insert(_) => StatementKind::Insert,
            Self::Update(_) => StatementKind::Update,
            Self::Delete(_) => StatementKind::Delete,
        }
    }

    /// Primary table the statement targets.
    #[must_use]
    pub fn table(&self) -> &str {
        match self {
            Self::Select(query) => &query.from.table,
            Self::Insert(query) => &query.table,
            Self::Update(query) => &query.table,
            Self::Delete(query) => &query.table,
        }
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Select(query) => {
                let columns = query
                    .columns
                    .iter()
                    .map(|c| format!("{} AS {}", c.column, c.label))
                    .collect::<Vec<_>>()
                    .join(", ");
                write!(f, "SELECT {columns} FROM {}", query.from)?;

                for join in &query.joins {
                    write!(f, " LEFT JOIN {} ON {}", join.table, join.on)?;
                }
                if let Some(filter) = &query.filter {
                    write!(f, " WHERE {filter}")?;
                }
                if !query.order_by.is_empty() {
                    let order = query
                        .order_by
                        .iter()
                        .map(|o| format!("{} {}", o.column, o.direction))
                        .collect::<Vec<_>>()
                        .join(", ");
                    write!(f, " ORDER BY {order}")?;
                }
                if let Some(limit) = query.limit {
                    write!(f, " LIMIT {limit}")?;
                }
                if let Some(offset) = query.offset {
                    write!(f, " OFFSET {offset}")?;
                }

                Ok(())
            }

            Self::Insert(query) => {
                let columns: Vec<_> = query.values.iter().map(|(c, _)| c.as_str()).collect();
                let placeholders: Vec<_> = columns.iter().map(|c| format!(":{c}")).collect();
                write!(
                    f,
                    "INSERT INTO {} ({}) VALUES ({})",
                    query.table,
                    columns.join(", "),
                    placeholders.join(", ")
                )?;
                if !query.returning.is_empty() {
                    write!(f, " RETURNING {}", query.returning.join(", "))?;
                }

                Ok(())
            }

            Self::Update(query) => {
                let set = query
                    .set
                    .iter()
                    .map(|(c, _)| format!("{c} = :{c}"))
                    .collect::<Vec<_>>()
                    .join(", ");
                write!(f, "UPDATE {} SET {set} WHERE {}", query.table, query.filter)
            }

            Self::Delete(query) => {
                write!(f, "DELETE FROM {} WHERE {}", query.table, query.filter)
            }
        }
    }
}
