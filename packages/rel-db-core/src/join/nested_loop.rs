//! Nested-loop joins: the naive quadratic strategies plus the
//! index-probing variant.

use crate::error::{DbError, Result};
use crate::index::Index;
use crate::table::{Row, Table};
use crate::value::Value;

use super::{concat_rows, joined_columns, joined_name, JoinCondition, JoinMode, JoinSide};

/// Naive join: every live pair is tested against the condition.
/// Left/right/full flavors pad the unmatched rows of the preserved
/// side(s) with nulls on the opposite side.
pub(crate) fn join(
    mode: JoinMode,
    left: &Table,
    right: &Table,
    condition: &JoinCondition,
) -> Result<Table> {
    let mut rows: Vec<Row> = Vec::new();
    let mut left_matched = vec![false; left.position_count()];
    let mut right_matched = vec![false; right.position_count()];

    for (lp, lrow) in left.live_rows() {
        for (rp, rrow) in right.live_rows() {
            if let Some(ord) = lrow[condition.left].compare(&rrow[condition.right]) {
                if condition.op.matches(ord) {
                    rows.push(concat_rows(lrow, rrow));
                    left_matched[lp] = true;
                    right_matched[rp] = true;
                }
            }
        }
    }

    let pad_left = vec![Value::Null; left.columns().len()];
    let pad_right = vec![Value::Null; right.columns().len()];
    let keep_left = matches!(mode, JoinMode::Left | JoinMode::Full);
    let keep_right = matches!(mode, JoinMode::Right | JoinMode::Full);
    if keep_left {
        for (lp, lrow) in left.live_rows() {
            if !left_matched[lp] {
                rows.push(concat_rows(lrow, &pad_right));
            }
        }
    }
    if keep_right {
        for (rp, rrow) in right.live_rows() {
            if !right_matched[rp] {
                rows.push(concat_rows(&pad_left, rrow));
            }
        }
    }
    if !keep_left && !keep_right && mode != JoinMode::Inner {
        return Err(DbError::UnsupportedJoinMode(mode.to_string()));
    }

    Ok(Table::from_rows(
        joined_name(left, right),
        joined_columns(left, right),
        rows,
    ))
}

/// Index-nested-loop join: iterate the side without the index, probe
/// the indexed side's structure for equality matches. Probes are
/// cross-checked against the indexed table, so entries left stale by
/// later deletes never reach the output.
pub(crate) fn index_join(
    left: &Table,
    right: &Table,
    condition: &JoinCondition,
    side: JoinSide,
    index: &Index,
) -> Result<Table> {
    let mut rows: Vec<Row> = Vec::new();
    match side {
        JoinSide::Right => {
            for (_, lrow) in left.live_rows() {
                let key = &lrow[condition.left];
                if key.is_null() {
                    continue;
                }
                for position in index.probe(right, condition.right, key) {
                    if let Some(rrow) = right.row(position) {
                        rows.push(concat_rows(lrow, rrow));
                    }
                }
            }
        }
        JoinSide::Left => {
            for (_, rrow) in right.live_rows() {
                let key = &rrow[condition.right];
                if key.is_null() {
                    continue;
                }
                for position in index.probe(left, condition.left, key) {
                    if let Some(lrow) = left.row(position) {
                        rows.push(concat_rows(lrow, rrow));
                    }
                }
            }
        }
    }
    Ok(Table::from_rows(
        joined_name(left, right),
        joined_columns(left, right),
        rows,
    ))
}
