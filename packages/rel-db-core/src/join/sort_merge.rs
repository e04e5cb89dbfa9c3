//! Sort-merge join over inputs already sorted by their join columns.
//!
//! The precondition is the caller's: both inputs must arrive ascending
//! on the join column. The merge does not verify it.

use crate::error::Result;
use crate::table::{Row, Table};

use super::{concat_rows, joined_columns, joined_name, JoinCondition};

/// Advances two cursors in step. Equal keys open a tied run on each
/// side and every combination within the two runs is emitted before
/// either cursor moves past its run; exhausting one side ends the merge.
pub(crate) fn join(left: &Table, right: &Table, condition: &JoinCondition) -> Result<Table> {
    let lrows: Vec<&Row> = left.live_rows().map(|(_, row)| row).collect();
    let rrows: Vec<&Row> = right.live_rows().map(|(_, row)| row).collect();

    let mut rows: Vec<Row> = Vec::new();
    let (mut li, mut ri) = (0, 0);
    while li < lrows.len() && ri < rrows.len() {
        let lkey = &lrows[li][condition.left];
        let rkey = &rrows[ri][condition.right];
        match lkey.compare(rkey) {
            Some(std::cmp::Ordering::Less) => li += 1,
            Some(std::cmp::Ordering::Greater) => ri += 1,
            Some(std::cmp::Ordering::Equal) => {
                let lend = run_end(&lrows, li, condition.left);
                let rend = run_end(&rrows, ri, condition.right);
                for lrow in &lrows[li..lend] {
                    for rrow in &rrows[ri..rend] {
                        rows.push(concat_rows(lrow, rrow));
                    }
                }
                li = lend;
                ri = rend;
            }
            // Null keys match nothing; step past whichever side holds one.
            None => {
                if lkey.is_null() {
                    li += 1;
                } else {
                    ri += 1;
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

/// One past the last row whose key equals the key at `start`.
fn run_end(rows: &[&Row], start: usize, column: usize) -> usize {
    let key = &rows[start][column];
    let mut end = start + 1;
    while end < rows.len()
        && rows[end][column].compare(key) == Some(std::cmp::Ordering::Equal)
    {
        end += 1;
    }
    end
}
