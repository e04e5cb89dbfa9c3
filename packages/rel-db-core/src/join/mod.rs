//! Join strategies over two tables.
//!
//! Every strategy consumes a `left_column OP right_column` condition and
//! emits rows of the left table's columns followed by the right table's,
//! with names qualified as `table.column`. Strategy choice is explicit:
//! an index-nested-loop join with no usable index fails rather than
//! silently degrading to a scan.

mod nested_loop;
mod sort_merge;


use std::fmt;

use crate::condition::{Condition, Operator};
use crate::error::{DbError, Result};
use crate::index::Index;
use crate::table::{Column, Row, Table};

/// Join strategy and flavor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinMode {
    Inner,
    Left,
    Right,
    Full,
    /// Index-nested-loop over an equality condition
    IndexNested,
    /// Merge of two inputs pre-sorted by the join columns
    SortMerge,
}

impl JoinMode {
    pub fn name(&self) -> &'static str {
        match self {
            JoinMode::Inner => "inner",
            JoinMode::Left => "left",
            JoinMode::Right => "right",
            JoinMode::Full => "full",
            JoinMode::IndexNested => "index-nested-loop",
            JoinMode::SortMerge => "sort-merge",
        }
    }
}

impl fmt::Display for JoinMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Which side of the join carries the index probed by an
/// index-nested-loop join.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinSide {
    Left,
    Right,
}

/// A join condition bound to column positions of both tables.
#[derive(Debug, Clone, Copy)]
pub(crate) struct JoinCondition {
    pub left: usize,
    pub op: Operator,
    pub right: usize,
}

/// Resolves a `left_column OP right_column` condition against the two
/// table schemas.
pub(crate) fn resolve(condition: &Condition, left: &Table, right: &Table) -> Result<JoinCondition> {
    match condition {
        Condition::ColumnCompare {
            left: left_column,
            op,
            right: right_column,
        } => {
            let li = left.column_index(left_column).ok_or_else(|| {
                DbError::MalformedCondition(format!(
                    "unknown column '{}' in table '{}'",
                    left_column,
                    left.name()
                ))
            })?;
            let ri = right.column_index(right_column).ok_or_else(|| {
                DbError::MalformedCondition(format!(
                    "unknown column '{}' in table '{}'",
                    right_column,
                    right.name()
                ))
            })?;
            let lt = left.columns()[li].ty;
            let rt = right.columns()[ri].ty;
            if !lt.comparable_with(rt) {
                return Err(DbError::MalformedCondition(format!(
                    "cannot join {lt} column '{left_column}' with {rt} column '{right_column}'"
                )));
            }
            Ok(JoinCondition {
                left: li,
                op: *op,
                right: ri,
            })
        }
        Condition::Compare { .. } => Err(DbError::MalformedCondition(
            "a join condition must compare a left-table column with a right-table column".into(),
        )),
    }
}

/// Output schema: left columns then right columns, qualified by table
/// name so that same-named columns stay distinguishable.
pub(crate) fn joined_columns(left: &Table, right: &Table) -> Vec<Column> {
    left.columns()
        .iter()
        .map(|c| Column::new(format!("{}.{}", left.name(), c.name), c.ty))
        .chain(
            right
                .columns()
                .iter()
                .map(|c| Column::new(format!("{}.{}", right.name(), c.name), c.ty)),
        )
        .collect()
}

pub(crate) fn joined_name(left: &Table, right: &Table) -> String {
    format!("{}_join_{}", left.name(), right.name())
}

pub(crate) fn concat_rows(left: &[crate::value::Value], right: &[crate::value::Value]) -> Row {
    left.iter().chain(right.iter()).cloned().collect()
}

/// Runs a join. `index` supplies the probed structure for
/// [`JoinMode::IndexNested`] together with the side it was built over;
/// the other modes ignore it.
pub fn join(
    mode: JoinMode,
    left: &Table,
    right: &Table,
    condition: &Condition,
    index: Option<(JoinSide, &Index)>,
) -> Result<Table> {
    let bound = resolve(condition, left, right)?;
    match mode {
        JoinMode::Inner | JoinMode::Left | JoinMode::Right | JoinMode::Full => {
            nested_loop::join(mode, left, right, &bound)
        }
        JoinMode::IndexNested => {
            if bound.op != Operator::Eq {
                return Err(DbError::UnsupportedJoinMode(format!(
                    "{mode} requires an equality condition, got '{}'",
                    bound.op
                )));
            }
            let (side, index) = index.ok_or_else(|| {
                DbError::IndexUnavailable(format!(
                    "no index on the join column of '{}' or '{}'",
                    left.name(),
                    right.name()
                ))
            })?;
            nested_loop::index_join(left, right, &bound, side, index)
        }
        JoinMode::SortMerge => {
            if bound.op != Operator::Eq {
                return Err(DbError::UnsupportedJoinMode(format!(
                    "{mode} requires an equality condition, got '{}'",
                    bound.op
                )));
            }
            sort_merge::join(left, right, &bound)
        }
    }
}
