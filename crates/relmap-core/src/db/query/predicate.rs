use std::fmt;

///
/// ColumnRef
///

#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct ColumnRef {
    pub alias: Option<String>,
    pub column: String,
}

impl ColumnRef {
    #[must_use]
    pub fn new(alias: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            alias: Some(alias.into()),
            column: column.into(),
        }
    }

    #[must_use]
    pub fn bare(column: impl Into<String>) -> Self {
        Self {
            alias: None,
            column: column.into(),
        }
    }
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.alias {
            Some(alias) => write!(f, "{alias}.{}", self.column),
            None => f.write_str(&self.column),
        }
    }
}

///
/// CompareOp
///

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum CompareOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl CompareOp {
    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "<>",
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::Lt => "<",
            Self::Lte => "<=",
        }
    }
}

///
/// Operand
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Operand {
    Bind(String),
    Column(ColumnRef),
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bind(name) => write!(f, ":{name}"),
            Self::Column(column) => write!(f, "{column}"),
        }
    }
}

///
/// Predicate
///
/// Fragment → raw SQL text, passed through verbatim (engine permitting)
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Predicate {
    And(Vec<Self>),
    Or(Vec<Self>),
    Compare {
        left: ColumnRef,
        op: CompareOp,
        right: Operand,
    },
    IsBool {
        column: ColumnRef,
        value: bool,
    },
    IsNull {
        column: ColumnRef,
        negated: bool,
    },
    Fragment(String),
}

impl Predicate {
    #[must_use]
    pub fn compare(left: ColumnRef, op: CompareOp, bind: impl Into<String>) -> Self {
        Self::Compare {
            left,
            op,
            right: Operand::Bind(bind.into()),
        }
    }

    #[must_use]
    pub const fn columns_eq(left: ColumnRef, right: ColumnRef) -> Self {
        Self::Compare {
            left,
            op: CompareOp::Eq,
            right: Operand::Column(right),
        }
    }

    /// Conjunction that collapses single-element lists.
    #[must_use]
    pub fn and(mut parts: Vec<Self>) -> Self {
        if parts.len() == 1 {
            return parts.swap_remove(0);
        }

        Self::And(parts)
    }

    /// Disjunction that collapses single-element lists.
    #[must_use]
    pub fn or(mut parts: Vec<Self>) -> Self {
        if parts.len() == 1 {
            return parts.swap_remove(0);
        }

        Self::Or(parts)
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let join = |f: &mut fmt::Formatter<'_>, parts: &[Self], sep: &str| -> fmt::Result {
            f.write_str("(")?;
            for (i, part) in parts.iter().enumerate() {
                if i > 0 {
                    f.write_str(sep)?;
                }
                write!(f, "{part}")?;
            }
            f.write_str(")")
        };

        match self {
            Self::And(parts) => join(f, parts, " AND "),
            Self::Or(parts) => join(f, parts, " OR "),
            Self::Compare { left, op, right } => write!(f, "{left} {} {right}", op.symbol()),
            Self::IsBool { column, value } => {
                write!(f, "{column} IS {}", if *value { "TRUE" } else { "FALSE" })
            }
            Self::IsNull { column, negated } => {
                write!(f, "{column} IS {}NULL", if *negated { "NOT " } else { "" })
            }
            Self::Fragment(text) => write!(f, "({text})"),
        }
    }
}
