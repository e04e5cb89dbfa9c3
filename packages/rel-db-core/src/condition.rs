//! Closed predicate representation and its typed evaluator.
//!
//! Conditions arrive already parsed, as `column OP literal` or
//! `column OP column`. They are resolved once per operation against the
//! table schema; unknown columns and uncomparable type pairings are
//! rejected up front with `MalformedCondition`.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{DbError, Result};
use crate::table::Table;
use crate::value::Value;

/// Comparison operator of a condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operator {
    Lt,
    Le,
    Eq,
    Ge,
    Gt,
}

impl Operator {
    /// Whether an ordering outcome satisfies this operator.
    pub fn matches(&self, ord: Ordering) -> bool {
        match self {
            Operator::Lt => ord == Ordering::Less,
            Operator::Le => ord != Ordering::Greater,
            Operator::Eq => ord == Ordering::Equal,
            Operator::Ge => ord != Ordering::Less,
            Operator::Gt => ord == Ordering::Greater,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Operator::Lt => "<",
            Operator::Le => "<=",
            Operator::Eq => "=",
            Operator::Ge => ">=",
            Operator::Gt => ">",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// A predicate over one table's rows, or over a pair of joined rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Condition {
    /// `column OP literal`
    Compare {
        column: String,
        op: Operator,
        literal: Value,
    },
    /// `left_column OP right_column`
    ColumnCompare {
        left: String,
        op: Operator,
        right: String,
    },
}

impl Condition {
    pub fn compare(column: impl Into<String>, op: Operator, literal: Value) -> Self {
        Condition::Compare {
            column: column.into(),
            op,
            literal,
        }
    }

    pub fn columns(left: impl Into<String>, op: Operator, right: impl Into<String>) -> Self {
        Condition::ColumnCompare {
            left: left.into(),
            op,
            right: right.into(),
        }
    }

    /// The literal of an equality comparison against the named column,
    /// if this condition is exactly that shape. Used to decide whether
    /// an index point lookup can replace a scan.
    pub fn equality_on(&self, column: &str) -> Option<&Value> {
        match self {
            Condition::Compare {
                column: own,
                op: Operator::Eq,
                literal,
            } if own == column => Some(literal),
            _ => None,
        }
    }

    /// Resolves column names against a table schema, producing an
    /// evaluator bound to column positions.
    pub(crate) fn resolve<'c>(&'c self, table: &Table) -> Result<ResolvedCondition<'c>> {
        let lookup = |name: &str| {
            table.column_index(name).ok_or_else(|| {
                DbError::MalformedCondition(format!(
                    "unknown column '{}' in condition over table '{}'",
                    name,
                    table.name()
                ))
            })
        };
        match self {
            Condition::Compare {
                column,
                op,
                literal,
            } => {
                let idx = lookup(column)?;
                let column_ty = table.columns()[idx].ty;
                if let Some(literal_ty) = literal.column_type() {
                    if !column_ty.comparable_with(literal_ty) {
                        return Err(DbError::MalformedCondition(format!(
                            "cannot compare column '{column}' of type {column_ty} with a {literal_ty} literal"
                        )));
                    }
                }
                Ok(ResolvedCondition::Literal {
                    column: idx,
                    op: *op,
                    literal,
                })
            }
            Condition::ColumnCompare { left, op, right } => {
                let li = lookup(left)?;
                let ri = lookup(right)?;
                let lt = table.columns()[li].ty;
                let rt = table.columns()[ri].ty;
                if !lt.comparable_with(rt) {
                    return Err(DbError::MalformedCondition(format!(
                        "cannot compare column '{left}' of type {lt} with column '{right}' of type {rt}"
                    )));
                }
                Ok(ResolvedCondition::Columns {
                    left: li,
                    op: *op,
                    right: ri,
                })
            }
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::Compare {
                column,
                op,
                literal,
            } => write!(f, "{column} {op} {literal}"),
            Condition::ColumnCompare { left, op, right } => {
                write!(f, "{left} {op} {right}")
            }
        }
    }
}

/// A condition bound to column positions of one table.
#[derive(Debug, Clone, Copy)]
pub(crate) enum ResolvedCondition<'c> {
    Literal {
        column: usize,
        op: Operator,
        literal: &'c Value,
    },
    Columns {
        left: usize,
        op: Operator,
        right: usize,
    },
}

impl ResolvedCondition<'_> {
    pub(crate) fn matches(&self, row: &[Value]) -> bool {
        let (outcome, op) = match self {
            ResolvedCondition::Literal {
                column,
                op,
                literal,
            } => (row[*column].compare(literal), op),
            ResolvedCondition::Columns { left, op, right } => {
                (row[*left].compare(&row[*right]), op)
            }
        };
        match outcome {
            Some(ord) => op.matches(ord),
            None => false,
        }
    }
}
