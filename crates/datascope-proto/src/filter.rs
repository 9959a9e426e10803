//! Filter expression AST shared by the storage hook and the scope engine.
//!
//! Unlike a flat wire filter, this tree nests freely: the scope engine relies
//! on explicit [`FilterExpr::Group`] nodes to keep each role's conditions
//! together when they are joined with other roles.

use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareOp {
    /// Equal (`=`).
    Eq,
    /// Not equal (`!=`, `<>`).
    Ne,
    /// Less than (`<`).
    Lt,
    /// Less than or equal (`<=`).
    Le,
    /// Greater than (`>`).
    Gt,
    /// Greater than or equal (`>=`).
    Ge,
}

impl CompareOp {
    fn symbol(self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "!=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        }
    }
}

/// Boolean connective used to join several conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinOperator {
    /// Every condition must hold.
    And,
    /// At least one condition must hold.
    Or,
}

impl fmt::Display for JoinOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JoinOperator::And => write!(f, "AND"),
            JoinOperator::Or => write!(f, "OR"),
        }
    }
}

/// One side of a predicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Operand {
    /// A (possibly qualified) column reference.
    Column(String),
    /// A literal value.
    Literal(Value),
}

impl Operand {
    /// Create a column operand.
    pub fn column(name: impl Into<String>) -> Self {
        Operand::Column(name.into())
    }

    /// Create a literal operand.
    pub fn literal(value: impl Into<Value>) -> Self {
        Operand::Literal(value.into())
    }

    fn resolve(&self, row: &[(String, Value)]) -> Value {
        match self {
            Operand::Literal(v) => v.clone(),
            Operand::Column(name) => lookup_column(row, name).cloned().unwrap_or(Value::Null),
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Column(name) => write!(f, "{name}"),
            Operand::Literal(v) => write!(f, "{v}"),
        }
    }
}

/// Filter expression for a statement's `WHERE` clause.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FilterExpr {
    /// Binary comparison.
    Compare {
        left: Operand,
        op: CompareOp,
        right: Operand,
    },
    /// Set membership: `operand [NOT] IN (values)`.
    In {
        operand: Operand,
        values: Vec<Operand>,
        negated: bool,
    },
    /// `operand IS [NOT] NULL`.
    IsNull { operand: Operand, negated: bool },
    /// `operand [NOT] LIKE 'pattern'`.
    Like {
        operand: Operand,
        pattern: String,
        negated: bool,
    },
    /// All conditions must be true.
    And(Vec<FilterExpr>),
    /// At least one condition must be true.
    Or(Vec<FilterExpr>),
    /// Logical negation.
    Not(Box<FilterExpr>),
    /// An explicit parenthesis group. Never flattened into its parent.
    Group(Box<FilterExpr>),
    /// Always true (`1 = 1`).
    True,
    /// Always false (`1 = 0`).
    False,
}

impl FilterExpr {
    /// Create a comparison between two operands.
    pub fn compare(left: Operand, op: CompareOp, right: Operand) -> Self {
        FilterExpr::Compare { left, op, right }
    }

    /// Create a `column = value` filter.
    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        FilterExpr::compare(Operand::column(column), CompareOp::Eq, Operand::literal(value))
    }

    /// Create a `column != value` filter.
    pub fn ne(column: impl Into<String>, value: impl Into<Value>) -> Self {
        FilterExpr::compare(Operand::column(column), CompareOp::Ne, Operand::literal(value))
    }

    /// Create a `column IN (values)` filter.
    pub fn in_values(column: impl Into<String>, values: Vec<Value>) -> Self {
        FilterExpr::In {
            operand: Operand::column(column),
            values: values.into_iter().map(Operand::Literal).collect(),
            negated: false,
        }
    }

    /// Create an `IS NULL` filter.
    pub fn is_null(column: impl Into<String>) -> Self {
        FilterExpr::IsNull {
            operand: Operand::column(column),
            negated: false,
        }
    }

    /// Create an `IS NOT NULL` filter.
    pub fn is_not_null(column: impl Into<String>) -> Self {
        FilterExpr::IsNull {
            operand: Operand::column(column),
            negated: true,
        }
    }

    /// Create a `LIKE` filter.
    pub fn like(column: impl Into<String>, pattern: impl Into<String>) -> Self {
        FilterExpr::Like {
            operand: Operand::column(column),
            pattern: pattern.into(),
            negated: false,
        }
    }

    /// Create an AND of conditions.
    pub fn and(exprs: Vec<FilterExpr>) -> Self {
        FilterExpr::And(exprs)
    }

    /// Create an OR of conditions.
    pub fn or(exprs: Vec<FilterExpr>) -> Self {
        FilterExpr::Or(exprs)
    }

    /// Wrap an expression in its own parenthesis group.
    pub fn group(expr: FilterExpr) -> Self {
        FilterExpr::Group(Box::new(expr))
    }

    /// Negate an expression.
    #[allow(clippy::should_implement_trait)]
    pub fn not(expr: FilterExpr) -> Self {
        FilterExpr::Not(Box::new(expr))
    }

    /// Join conditions with the given operator.
    ///
    /// Returns `None` for an empty list and the single element unchanged for
    /// a one-element list.
    pub fn join(op: JoinOperator, mut exprs: Vec<FilterExpr>) -> Option<FilterExpr> {
        match exprs.len() {
            0 => None,
            1 => exprs.pop(),
            _ => Some(match op {
                JoinOperator::And => FilterExpr::And(exprs),
                JoinOperator::Or => FilterExpr::Or(exprs),
            }),
        }
    }

    /// Check if this is a parenthesis group.
    pub fn is_group(&self) -> bool {
        matches!(self, FilterExpr::Group(_))
    }

    /// Evaluate the expression against a row using SQL three-valued logic.
    ///
    /// Returns `Some(true)`/`Some(false)` for a definite result and `None`
    /// for unknown. A `WHERE` clause keeps a row only on `Some(true)`.
    /// Columns absent from the row evaluate as `NULL`.
    pub fn evaluate(&self, row: &[(String, Value)]) -> Option<bool> {
        match self {
            FilterExpr::True => Some(true),
            FilterExpr::False => Some(false),
            FilterExpr::Compare { left, op, right } => {
                let l = left.resolve(row);
                let r = right.resolve(row);
                if l.is_null() || r.is_null() {
                    return None;
                }
                match op {
                    CompareOp::Eq => l.sql_eq(&r),
                    CompareOp::Ne => l.sql_eq(&r).map(|eq| !eq),
                    CompareOp::Lt => l.sql_cmp(&r).map(|o| o.is_lt()),
                    CompareOp::Le => l.sql_cmp(&r).map(|o| o.is_le()),
                    CompareOp::Gt => l.sql_cmp(&r).map(|o| o.is_gt()),
                    CompareOp::Ge => l.sql_cmp(&r).map(|o| o.is_ge()),
                }
            }
            FilterExpr::In {
                operand,
                values,
                negated,
            } => {
                let needle = operand.resolve(row);
                if needle.is_null() {
                    return None;
                }
                let mut saw_unknown = false;
                let mut found = false;
                for candidate in values {
                    for element in candidate.resolve(row).elements() {
                        match needle.sql_eq(&element) {
                            Some(true) => found = true,
                            Some(false) => {}
                            None => saw_unknown = true,
                        }
                    }
                }
                let result = if found {
                    Some(true)
                } else if saw_unknown {
                    None
                } else {
                    Some(false)
                };
                if *negated {
                    result.map(|b| !b)
                } else {
                    result
                }
            }
            FilterExpr::IsNull { operand, negated } => {
                let is_null = operand.resolve(row).is_null();
                Some(is_null != *negated)
            }
            FilterExpr::Like {
                operand,
                pattern,
                negated,
            } => match operand.resolve(row) {
                Value::Null => None,
                Value::String(s) => Some(like_match(&s, pattern) != *negated),
                other => Some(like_match(&other.to_string(), pattern) != *negated),
            },
            FilterExpr::And(exprs) => {
                let mut result = Some(true);
                for e in exprs {
                    match e.evaluate(row) {
                        Some(false) => return Some(false),
                        None => result = None,
                        Some(true) => {}
                    }
                }
                result
            }
            FilterExpr::Or(exprs) => {
                let mut result = Some(false);
                for e in exprs {
                    match e.evaluate(row) {
                        Some(true) => return Some(true),
                        None => result = None,
                        Some(false) => {}
                    }
                }
                result
            }
            FilterExpr::Not(inner) => inner.evaluate(row).map(|b| !b),
            FilterExpr::Group(inner) => inner.evaluate(row),
        }
    }

    /// Check whether a row passes this expression as a `WHERE` clause.
    pub fn matches(&self, row: &[(String, Value)]) -> bool {
        self.evaluate(row) == Some(true)
    }

    fn needs_parens_under(&self, parent: JoinOperator) -> bool {
        match (self, parent) {
            (FilterExpr::Or(_), JoinOperator::And) => true,
            (FilterExpr::And(_), JoinOperator::Or) => false,
            _ => false,
        }
    }

    fn write_joined(
        f: &mut fmt::Formatter<'_>,
        op: JoinOperator,
        exprs: &[FilterExpr],
    ) -> fmt::Result {
        if exprs.is_empty() {
            // Empty AND is vacuously true, empty OR is false.
            return match op {
                JoinOperator::And => write!(f, "{}", FilterExpr::True),
                JoinOperator::Or => write!(f, "{}", FilterExpr::False),
            };
        }
        for (i, e) in exprs.iter().enumerate() {
            if i > 0 {
                write!(f, " {op} ")?;
            }
            if e.needs_parens_under(op) {
                write!(f, "({e})")?;
            } else {
                write!(f, "{e}")?;
            }
        }
        Ok(())
    }
}

/// Renders the expression as SQL text that the fragment parser accepts.
impl fmt::Display for FilterExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterExpr::Compare { left, op, right } => {
                write!(f, "{left} {} {right}", op.symbol())
            }
            FilterExpr::In {
                operand,
                values,
                negated,
            } => {
                let not = if *negated { "NOT " } else { "" };
                let list: Vec<String> = values.iter().map(|v| v.to_string()).collect();
                write!(f, "{operand} {not}IN ({})", list.join(", "))
            }
            FilterExpr::IsNull { operand, negated } => {
                let not = if *negated { "NOT " } else { "" };
                write!(f, "{operand} IS {not}NULL")
            }
            FilterExpr::Like {
                operand,
                pattern,
                negated,
            } => {
                let not = if *negated { "NOT " } else { "" };
                write!(f, "{operand} {not}LIKE {}", Value::String(pattern.clone()))
            }
            FilterExpr::And(exprs) => Self::write_joined(f, JoinOperator::And, exprs),
            FilterExpr::Or(exprs) => Self::write_joined(f, JoinOperator::Or, exprs),
            FilterExpr::Not(inner) => match inner.as_ref() {
                FilterExpr::And(_) | FilterExpr::Or(_) => write!(f, "NOT ({inner})"),
                _ => write!(f, "NOT {inner}"),
            },
            FilterExpr::Group(inner) => write!(f, "({inner})"),
            FilterExpr::True => write!(f, "1 = 1"),
            FilterExpr::False => write!(f, "1 = 0"),
        }
    }
}

fn lookup_column<'a>(row: &'a [(String, Value)], column: &str) -> Option<&'a Value> {
    if let Some((_, v)) = row.iter().find(|(name, _)| name == column) {
        return Some(v);
    }
    // Qualified references (`d.dept_id`) fall back to the bare column name.
    let bare = column.rsplit('.').next()?;
    row.iter().find(|(name, _)| name == bare).map(|(_, v)| v)
}

/// Match a string against a SQL LIKE pattern (`%` any run, `_` one char).
pub fn like_match(value: &str, pattern: &str) -> bool {
    let v: Vec<char> = value.chars().collect();
    let p: Vec<char> = pattern.chars().collect();
    // dp[j]: pattern prefix of length j matches the value prefix processed so far
    let mut dp = vec![false; p.len() + 1];
    dp[0] = true;
    for j in 1..=p.len() {
        dp[j] = dp[j - 1] && p[j - 1] == '%';
    }
    for c in &v {
        let mut next = vec![false; p.len() + 1];
        for j in 1..=p.len() {
            next[j] = match p[j - 1] {
                '%' => next[j - 1] || dp[j],
                '_' => dp[j - 1],
                pc => dp[j - 1] && pc == *c,
            };
        }
        dp = next;
    }
    dp[p.len()]
}
