//! Module: db::engine
//! Responsibility: the query engine boundary.
//! Does not own: statement construction (repositories build `Query` values).

mod memory;


pub use memory::MemoryEngine;

use crate::{db::query::Query, value::Value};
use std::collections::BTreeMap;
use thiserror::Error as ThisError;

///
/// Row
/// One result row keyed by select label (or column name for RETURNING).
///

pub type Row = BTreeMap<String, Value>;

///
/// QueryResult
///

#[derive(Clone, Debug, Default, PartialEq)]
pub struct QueryResult {
    pub rows: Vec<Row>,
    pub affected: u64,
}

///
/// EngineError
///

#[derive(Debug, ThisError)]
pub enum EngineError {
    #[error("query on '{table}' failed: {message}")]
    Query { table: String, message: String },

    #[error("unsupported by this engine: {0}")]
    Unsupported(String),

    #[error("transaction error: {0}")]
    Transaction(String),
}

///
/// QueryEngine
///
/// Executes structured statements. Transactions are flat: `begin` while a
/// transaction is open is an error.
///

pub trait QueryEngine {
    fn execute(&mut self, query: &Query) -> Result<QueryResult, EngineError>;

    fn begin(&mut self) -> Result<(), EngineError>;

    fn commit(&mut self) -> Result<(), EngineError>;

    fn rollback(&mut self) -> Result<(), EngineError>;
}
