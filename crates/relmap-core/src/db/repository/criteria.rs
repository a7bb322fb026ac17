use crate::{
    db::query::{CompareOp, OrderDirection, Predicate},
    value::Value,
};

///
/// Condition
///
/// Value      → equality; text may carry an operator prefix (`>=`, `<=`,
///              `>`, `<`, `!`), booleans test truth, null tests IS NULL
/// AnyOf      → any of the values (OR); an empty list matches nothing
///

#[derive(Clone, Debug, PartialEq)]
pub enum Condition {
    Value(Value),
    AnyOf(Vec<Value>),
}

impl From<Value> for Condition {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

impl From<&str> for Condition {
    fn from(value: &str) -> Self {
        Self::Value(value.into())
    }
}

impl From<String> for Condition {
    fn from(value: String) -> Self {
        Self::Value(value.into())
    }
}

impl From<i64> for Condition {
    fn from(value: i64) -> Self {
        Self::Value(value.into())
    }
}

impl From<i32> for Condition {
    fn from(value: i32) -> Self {
        Self::Value(value.into())
    }
}

impl From<bool> for Condition {
    fn from(value: bool) -> Self {
        Self::Value(value.into())
    }
}

impl From<Vec<Value>> for Condition {
    fn from(values: Vec<Value>) -> Self {
        Self::AnyOf(values)
    }
}

///
/// Criteria
///
/// Field conditions followed by structured predicates, all ANDed.
///

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Criteria {
    conditions: Vec<(String, Condition)>,
    predicates: Vec<Predicate>,
}

impl Criteria {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn field(mut self, field: impl Into<String>, condition: impl Into<Condition>) -> Self {
        self.conditions.push((field.into(), condition.into()));
        self
    }

    /// Structured predicate over root-aliased columns.
    #[must_use]
    pub fn predicate(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    pub fn conditions(&self) -> impl Iterator<Item = (&str, &Condition)> {
        self.conditions
            .iter()
            .map(|(field, condition)| (field.as_str(), condition))
    }

    pub fn predicates(&self) -> impl Iterator<Item = &Predicate> {
        self.predicates.iter()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty() && self.predicates.is_empty()
    }
}

///
/// FindOptions
///

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct FindOptions {
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    pub order_by: Vec<(String, OrderDirection)>,
}

impl FindOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    #[must_use]
    pub const fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    #[must_use]
    pub fn order_by(mut self, field: impl Into<String>, direction: OrderDirection) -> Self {
        self.order_by.push((field.into(), direction));
        self
    }
}

/// Split an operator-prefixed criterion such as `">= 10"` or `"!draft"`.
///
/// Two-character operators win over their one-character prefixes; one
/// optional space may follow the operator. An operator with nothing after
/// it is not an operator.
#[must_use]
pub fn parse_operator(text: &str) -> Option<(CompareOp, &str)> {
    const OPERATORS: [(&str, CompareOp); 5] = [
        (">=", CompareOp::Gte),
        ("<=", CompareOp::Lte),
        ("!", CompareOp::Ne),
        (">", CompareOp::Gt),
        ("<", CompareOp::Lt),
    ];

    OPERATORS.iter().find_map(|(prefix, op)| {
        let rest = text.strip_prefix(prefix)?;
        let rest = rest.strip_prefix(' ').unwrap_or(rest);

        (!rest.is_empty()).then_some((*op, rest))
    })
}
