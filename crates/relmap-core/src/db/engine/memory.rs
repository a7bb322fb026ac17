use crate::{
    db::{
        engine::{EngineError, QueryEngine, QueryResult, Row},
        query::{
            Binds, ColumnRef, CompareOp, DeleteQuery, InsertQuery, Operand, OrderBy,
            OrderDirection, Predicate, Query, SelectQuery, UpdateQuery,
        },
    },
    obs::StatementKind,
    value::Value,
};
use std::{
    cmp::Ordering,
    collections::BTreeMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

///
/// Table
///

#[derive(Clone, Debug, Default)]
struct Table {
    rows: Vec<Row>,
    serial: Option<String>,
    next_serial: i64,
}

impl Table {
    fn assign_serial(&mut self, row: &mut Row) {
        let Some(column) = &self.serial else {
            return;
        };

        match row.get(column).and_then(Value::as_int) {
            Some(given) => self.next_serial = self.next_serial.max(given),
            None => {
                self.next_serial += 1;
                row.insert(column.clone(), Value::Int(self.next_serial));
            }
        }
    }
}

///
/// State
///

#[derive(Debug, Default)]
struct State {
    tables: BTreeMap<String, Table>,
    snapshot: Option<BTreeMap<String, Table>>,
    log: Vec<Query>,
    failures: Vec<(StatementKind, String)>,
}

impl State {
    fn table(&self, name: &str) -> Result<&Table, EngineError> {
        self.tables.get(name).ok_or_else(|| no_such_table(name))
    }

    fn table_mut(&mut self, name: &str) -> Result<&mut Table, EngineError> {
        self.tables.get_mut(name).ok_or_else(|| no_such_table(name))
    }
}

fn no_such_table(name: &str) -> EngineError {
    EngineError::Query {
        table: name.to_string(),
        message: "no such table".to_string(),
    }
}

///
/// MemoryEngine
///
/// In-process engine evaluating structured statements over row maps.
/// Clones share state, so a test can keep a handle after giving one to an
/// entity manager.
///
/// Raw `Predicate::Fragment` filters are not evaluated.
///

#[derive(Clone, Debug, Default)]
pub struct MemoryEngine {
    state: Arc<Mutex<State>>,
}

impl MemoryEngine {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create (or reset) a table; `serial` names a generated key column.
    pub fn create_table(&self, table: &str, serial: Option<&str>) {
        self.state().tables.insert(
            table.to_string(),
            Table {
                serial: serial.map(str::to_string),
                ..Table::default()
            },
        );
    }

    /// Seed a row without logging a statement.
    pub fn insert_row(&self, table: &str, mut row: Row) -> Result<(), EngineError> {
        let mut state = self.state();
        let table = state.table_mut(table)?;
        table.assign_serial(&mut row);
        table.rows.push(row);

        Ok(())
    }

    #[must_use]
    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.state()
            .tables
            .get(table)
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }

    /// Every statement executed so far, including failed ones.
    #[must_use]
    pub fn statements(&self) -> Vec<Query> {
        self.state().log.clone()
    }

    #[must_use]
    pub fn statement_count(&self, kind: StatementKind) -> usize {
        self.state().log.iter().filter(|q| q.kind() == kind).count()
    }

    pub fn clear_log(&self) {
        self.state().log.clear();
    }

    /// Fail every later statement of `kind` against `table`.
    pub fn fail_on(&self, kind: StatementKind, table: &str) {
        self.state().failures.push((kind, table.to_string()));
    }

    pub fn clear_failures(&self) {
        self.state().failures.clear();
    }

    #[must_use]
    pub fn in_transaction(&self) -> bool {
        self.state().snapshot.is_some()
    }
}

impl QueryEngine for MemoryEngine {
    fn execute(&mut self, query: &Query) -> Result<QueryResult, EngineError> {
        let mut state = self.state();
        state.log.push(query.clone());

        let injected = state
            .failures
            .iter()
            .any(|(kind, table)| *kind == query.kind() && table == query.table());
        if injected {
            return Err(EngineError::Query {
                table: query.table().to_string(),
                message: "injected failure".to_string(),
            });
        }

        match query {
            Query::Select(select) => run_select(&state, select),
            Query::Insert(insert) => run_insert(&mut state, insert),
            Query::Update(update) => run_update(&mut state, update),
            Query::Delete(delete) => run_delete(&mut state, delete),
        }
    }

    fn begin(&mut self) -> Result<(), EngineError> {
        let mut state = self.state();
        if state.snapshot.is_some() {
            return Err(EngineError::Transaction(
                "transaction already open".to_string(),
            ));
        }
        state.snapshot = Some(state.tables.clone());

        Ok(())
    }

    fn commit(&mut self) -> Result<(), EngineError> {
        self.state()
            .snapshot
            .take()
            .map(|_| ())
            .ok_or_else(|| EngineError::Transaction("no open transaction".to_string()))
    }

    fn rollback(&mut self) -> Result<(), EngineError> {
        let mut state = self.state();
        let snapshot = state
            .snapshot
            .take()
            .ok_or_else(|| EngineError::Transaction("no open transaction".to_string()))?;
        state.tables = snapshot;

        Ok(())
    }
}

///
/// Scope
/// Joined row keyed by `qualifier.column`.
///

type Scope = BTreeMap<String, Value>;

struct Context<'a> {
    binds: &'a Binds,
    root: &'a str,
}

impl Context<'_> {
    fn lookup(&self, scope: &Scope, column: &ColumnRef) -> Value {
        let qualifier = column.alias.as_deref().unwrap_or(self.root);

        scope
            .get(&format!("{qualifier}.{}", column.column))
            .cloned()
            .unwrap_or_default()
    }

    fn operand(&self, scope: &Scope, operand: &Operand) -> Result<Value, EngineError> {
        match operand {
            Operand::Column(column) => Ok(self.lookup(scope, column)),
            Operand::Bind(name) => {
                self.binds
                    .get(name)
                    .cloned()
                    .ok_or_else(|| EngineError::Query {
                        table: self.root.to_string(),
                        message: format!("missing bind ':{name}'"),
                    })
            }
        }
    }

    // Null never satisfies a comparison.
    fn eval(&self, scope: &Scope, predicate: &Predicate) -> Result<bool, EngineError> {
        match predicate {
            Predicate::And(parts) => {
                for part in parts {
                    if !self.eval(scope, part)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Predicate::Or(parts) => {
                for part in parts {
                    if self.eval(scope, part)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Predicate::Compare { left, op, right } => {
                let left = self.lookup(scope, left);
                let right = self.operand(scope, right)?;
                if left.is_null() || right.is_null() {
                    return Ok(false);
                }

                Ok(match op {
                    CompareOp::Eq => left.loose_eq(&right),
                    CompareOp::Ne => !left.loose_eq(&right),
                    CompareOp::Gt => left.loose_cmp(&right) == Some(Ordering::Greater),
                    CompareOp::Gte => matches!(
                        left.loose_cmp(&right),
                        Some(Ordering::Greater | Ordering::Equal)
                    ),
                    CompareOp::Lt => left.loose_cmp(&right) == Some(Ordering::Less),
                    CompareOp::Lte => matches!(
                        left.loose_cmp(&right),
                        Some(Ordering::Less | Ordering::Equal)
                    ),
                })
            }
            Predicate::IsBool { column, value } => Ok(match self.lookup(scope, column) {
                Value::Bool(actual) => actual == *value,
                Value::Int(actual) => (actual != 0) == *value,
                _ => false,
            }),
            Predicate::IsNull { column, negated } => {
                Ok(self.lookup(scope, column).is_null() != *negated)
            }
            Predicate::Fragment(text) => Err(EngineError::Unsupported(format!(
                "raw predicate fragment '{text}'"
            ))),
        }
    }

    fn order(&self, a: &Scope, b: &Scope, order_by: &[OrderBy]) -> Ordering {
        for order in order_by {
            let (left, right) = (self.lookup(a, &order.column), self.lookup(b, &order.column));

            // nulls sort first
            let ordering = match (left.is_null(), right.is_null()) {
                (true, true) => Ordering::Equal,
                (true, false) => Ordering::Less,
                (false, true) => Ordering::Greater,
                (false, false) => left.loose_cmp(&right).unwrap_or(Ordering::Equal),
            };
            let ordering = match order.direction {
                OrderDirection::Asc => ordering,
                OrderDirection::Desc => ordering.reverse(),
            };

            if ordering != Ordering::Equal {
                return ordering;
            }
        }

        Ordering::Equal
    }
}

fn qualify(qualifier: &str, row: &Row) -> Scope {
    row.iter()
        .map(|(column, value)| (format!("{qualifier}.{column}"), value.clone()))
        .collect()
}

fn filter_rows(ctx: &Context<'_>, scopes: Vec<Scope>, filter: &Predicate) -> Result<Vec<Scope>, EngineError> {
    let mut kept = Vec::with_capacity(scopes.len());
    for scope in scopes {
        if ctx.eval(&scope, filter)? {
            kept.push(scope);
        }
    }

    Ok(kept)
}

fn run_select(state: &State, query: &SelectQuery) -> Result<QueryResult, EngineError> {
    let root = query.from.qualifier();
    let ctx = Context {
        binds: &query.binds,
        root,
    };

    let mut scopes: Vec<Scope> = state
        .table(&query.from.table)?
        .rows
        .iter()
        .map(|row| qualify(root, row))
        .collect();

    for join in &query.joins {
        let table = state.table(&join.table.table)?;
        let qualifier = join.table.qualifier();
        let mut joined = Vec::with_capacity(scopes.len());

        for scope in scopes {
            let mut matched = false;
            for row in &table.rows {
                let mut candidate = scope.clone();
                candidate.extend(qualify(qualifier, row));
                if ctx.eval(&candidate, &join.on)? {
                    joined.push(candidate);
                    matched = true;
                }
            }
            if !matched {
                joined.push(scope);
            }
        }
        scopes = joined;
    }

    if let Some(filter) = &query.filter {
        scopes = filter_rows(&ctx, scopes, filter)?;
    }

    if !query.order_by.is_empty() {
        scopes.sort_by(|a, b| ctx.order(a, b, &query.order_by));
    }

    let offset = query
        .offset
        .map_or(0, |n| usize::try_from(n).unwrap_or(usize::MAX));
    let limit = query
        .limit
        .map_or(usize::MAX, |n| usize::try_from(n).unwrap_or(usize::MAX));

    let rows: Vec<Row> = scopes
        .iter()
        .skip(offset)
        .take(limit)
        .map(|scope| {
            query
                .columns
                .iter()
                .map(|c| (c.label.clone(), ctx.lookup(scope, &c.column)))
                .collect()
        })
        .collect();

    Ok(QueryResult {
        affected: rows.len() as u64,
        rows,
    })
}

fn run_insert(state: &mut State, query: &InsertQuery) -> Result<QueryResult, EngineError> {
    let table = state.table_mut(&query.table)?;

    let mut row: Row = query.values.iter().cloned().collect();
    table.assign_serial(&mut row);

    let returned: Row = query
        .returning
        .iter()
        .map(|column| (column.clone(), row.get(column).cloned().unwrap_or_default()))
        .collect();
    table.rows.push(row);

    Ok(QueryResult {
        rows: if query.returning.is_empty() {
            Vec::new()
        } else {
            vec![returned]
        },
        affected: 1,
    })
}

// Matches rows of a single table against a bare-column filter.
fn matching(
    table_name: &str,
    rows: &[Row],
    filter: &Predicate,
    binds: &Binds,
) -> Result<Vec<bool>, EngineError> {
    let ctx = Context {
        binds,
        root: table_name,
    };

    rows.iter()
        .map(|row| ctx.eval(&qualify(table_name, row), filter))
        .collect()
}

fn run_update(state: &mut State, query: &UpdateQuery) -> Result<QueryResult, EngineError> {
    let table = state.table_mut(&query.table)?;
    let hits = matching(&query.table, &table.rows, &query.filter, &query.binds)?;

    let mut affected = 0;
    for (row, hit) in table.rows.iter_mut().zip(hits) {
        if hit {
            for (column, value) in &query.set {
                row.insert(column.clone(), value.clone());
            }
            affected += 1;
        }
    }

    Ok(QueryResult {
        rows: Vec::new(),
        affected,
    })
}

fn run_delete(state: &mut State, query: &DeleteQuery) -> Result<QueryResult, EngineError> {
    let table = state.table_mut(&query.table)?;
    let hits = matching(&query.table, &table.rows, &query.filter, &query.binds)?;

    let before = table.rows.len();
    let mut hits = hits.into_iter();
    table.rows.retain(|_| !hits.next().unwrap_or(false));

    Ok(QueryResult {
        rows: Vec::new(),
        affected: (before - table.rows.len()) as u64,
    })
}
