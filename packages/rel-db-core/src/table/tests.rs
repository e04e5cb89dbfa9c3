use super::*;
use crate::condition::{Condition, Operator};
use crate::error::{DbError, Result};
use crate::value::{ColumnType, Value};

fn int(n: i64) -> Value {
    Value::Int(n)
}

fn text(s: &str) -> Value {
    Value::Text(s.to_string())
}

fn people() -> Result<Table> {
    let mut table = Table::create(
        "people",
        vec![
            Column::new("id", ColumnType::Int),
            Column::new("name", ColumnType::Text),
            Column::new("age", ColumnType::Int),
        ],
        Some("id"),
        &["name"],
    )?;
    table.insert(vec![int(1), text("ada"), int(36)])?;
    table.insert(vec![int(2), text("grace"), int(45)])?;
    table.insert(vec![int(3), text("edsger"), int(40)])?;
    Ok(table)
}

#[test]
fn create_rejects_bad_schemas() {
    assert!(Table::create("t", vec![], None, &[]).is_err());
    assert!(Table::create(
        "t",
        vec![
            Column::new("a", ColumnType::Int),
            Column::new("a", ColumnType::Text),
        ],
        None,
        &[],
    )
    .is_err());
    assert!(Table::create(
        "t",
        vec![Column::new("a", ColumnType::Int)],
        Some("missing"),
        &[],
    )
    .is_err());
}

#[test]
fn insert_validates_arity_and_types() -> Result<()> {
    let mut table = people()?;
    assert!(matches!(
        table.insert(vec![int(4), text("tony")]),
        Err(DbError::SchemaMismatch(_))
    ));
    assert!(matches!(
        table.insert(vec![text("4"), text("tony"), int(50)]),
        Err(DbError::SchemaMismatch(_))
    ));
    // Failed inserts leave the row sequence untouched.
    assert_eq!(table.position_count(), 3);
    Ok(())
}

#[test]
fn duplicate_primary_key_is_rejected_without_mutation() -> Result<()> {
    let mut table = people()?;
    let before = table.rows().to_vec();
    assert!(matches!(
        table.insert(vec![int(2), text("tony"), int(50)]),
        Err(DbError::ConstraintViolation { .. })
    ));
    assert_eq!(table.rows(), before.as_slice());
    Ok(())
}

#[test]
fn duplicate_unique_column_is_rejected() -> Result<()> {
    let mut table = people()?;
    assert!(matches!(
        table.insert(vec![int(4), text("ada"), int(50)]),
        Err(DbError::ConstraintViolation { .. })
    ));
    Ok(())
}

#[test]
fn null_primary_key_is_rejected() -> Result<()> {
    let mut table = people()?;
    assert!(matches!(
        table.insert(vec![Value::Null, text("tony"), int(50)]),
        Err(DbError::ConstraintViolation { .. })
    ));
    Ok(())
}

#[test]
fn delete_frees_positions_and_insert_reuses_them() -> Result<()> {
    let mut table = Table::create(
        "t",
        vec![
            Column::new("id", ColumnType::Int),
            Column::new("name", ColumnType::Text),
        ],
        Some("id"),
        &[],
    )?;
    table.insert(vec![int(1), text("a")])?;
    table.insert(vec![int(2), text("b")])?;

    let freed = table.delete_rows(&Condition::compare("id", Operator::Eq, int(1)))?;
    assert_eq!(freed, vec![0]);
    assert_eq!(table.free_positions(), &[0]);
    assert!(Table::is_tombstone(&table.rows()[0]));

    // The freed position is reused before any append.
    let position = table.insert(vec![int(3), text("c")])?;
    assert_eq!(position, 0);
    assert_eq!(table.position_count(), 2);
    assert!(table.free_positions().is_empty());

    // Position order now reads (3,'c'), (2,'b').
    let rows: Vec<&Row> = table.live_rows().map(|(_, row)| row).collect();
    assert_eq!(rows[0], &vec![int(3), text("c")]);
    assert_eq!(rows[1], &vec![int(2), text("b")]);
    Ok(())
}

#[test]
fn select_filters_projects_and_orders() -> Result<()> {
    let table = people()?;
    let cond = Condition::compare("age", Operator::Ge, int(40));
    let result = table.select(
        Some(&["name", "age"]),
        &SelectOptions {
            condition: Some(&cond),
            order_by: Some("age"),
            descending: true,
            ..Default::default()
        },
        None,
    )?;
    assert_eq!(result.columns().len(), 2);
    assert_eq!(result.rows().len(), 2);
    assert_eq!(result.rows()[0], vec![text("grace"), int(45)]);
    assert_eq!(result.rows()[1], vec![text("edsger"), int(40)]);
    Ok(())
}

#[test]
fn select_distinct_and_limit() -> Result<()> {
    let mut table = Table::create(
        "t",
        vec![
            Column::new("id", ColumnType::Int),
            Column::new("city", ColumnType::Text),
        ],
        Some("id"),
        &[],
    )?;
    for (id, city) in [(1, "paris"), (2, "york"), (3, "paris"), (4, "york")] {
        table.insert(vec![int(id), text(city)])?;
    }
    let distinct = table.select(
        Some(&["city"]),
        &SelectOptions {
            distinct: true,
            ..Default::default()
        },
        None,
    )?;
    assert_eq!(distinct.rows().len(), 2);

    let limited = table.select(
        None,
        &SelectOptions {
            limit: Some(3),
            ..Default::default()
        },
        None,
    )?;
    assert_eq!(limited.rows().len(), 3);
    Ok(())
}

#[test]
fn select_via_index_hint_matches_scan() -> Result<()> {
    use crate::config::DbConfig;
    use crate::index::{Index, IndexKind};

    let table = people()?;
    let index = Index::build(IndexKind::BTree, &table, "id", &DbConfig::default())?;
    let cond = Condition::compare("id", Operator::Eq, int(2));
    let options = SelectOptions {
        condition: Some(&cond),
        ..Default::default()
    };
    let scanned = table.select(None, &options, None)?;
    let probed = table.select(None, &options, Some(("id", &index)))?;
    assert_eq!(scanned.rows(), probed.rows());
    Ok(())
}

#[test]
fn update_rewrites_matching_rows() -> Result<()> {
    let mut table = people()?;
    let updated = table.update_rows(
        int(50),
        "age",
        &Condition::compare("age", Operator::Gt, int(39)),
    )?;
    assert_eq!(updated, 2);
    let ages: Vec<&Value> = table.live_rows().map(|(_, row)| &row[2]).collect();
    assert_eq!(ages, vec![&int(36), &int(50), &int(50)]);
    Ok(())
}

#[test]
fn update_violation_keeps_earlier_mutations() -> Result<()> {
    let mut table = people()?;
    // Writing one shared name into every row trips the unique constraint
    // on the second row, after the first was already rewritten.
    let outcome = table.update_rows(
        text("someone"),
        "name",
        &Condition::compare("age", Operator::Gt, int(0)),
    );
    assert!(matches!(outcome, Err(DbError::ConstraintViolation { .. })));
    let names: Vec<&Value> = table.live_rows().map(|(_, row)| &row[1]).collect();
    assert_eq!(names, vec![&text("someone"), &text("grace"), &text("edsger")]);
    Ok(())
}

#[test]
fn sorted_copy_keeps_source_intact() -> Result<()> {
    let table = people()?;
    let sorted = table.sorted("age", false)?;
    let ages: Vec<&Value> = sorted.rows().iter().map(|row| &row[2]).collect();
    assert_eq!(ages, vec![&int(45), &int(40), &int(36)]);
    // Source order, and therefore every recorded position, is unchanged.
    assert_eq!(table.rows()[0][0], int(1));
    assert_eq!(table.rows()[1][0], int(2));
    Ok(())
}

#[test]
fn cast_is_all_or_nothing() -> Result<()> {
    let mut table = Table::create(
        "t",
        vec![
            Column::new("id", ColumnType::Int),
            Column::new("score", ColumnType::Text),
        ],
        Some("id"),
        &[],
    )?;
    table.insert(vec![int(1), text("10")])?;
    table.insert(vec![int(2), text("not a number")])?;

    let outcome = table.cast_column("score", ColumnType::Int);
    assert!(matches!(outcome, Err(DbError::SchemaMismatch(_))));
    // No value converted.
    assert_eq!(table.rows()[0][1], text("10"));
    assert_eq!(table.columns()[1].ty, ColumnType::Text);

    // After fixing the bad value the cast converts everything.
    table.update_rows(
        text("20"),
        "score",
        &Condition::compare("id", Operator::Eq, int(2)),
    )?;
    table.cast_column("score", ColumnType::Int)?;
    assert_eq!(table.columns()[1].ty, ColumnType::Int);
    assert_eq!(table.rows()[0][1], int(10));
    assert_eq!(table.rows()[1][1], int(20));
    Ok(())
}

#[test]
fn cast_skips_tombstones() -> Result<()> {
    let mut table = Table::create(
        "t",
        vec![
            Column::new("id", ColumnType::Int),
            Column::new("score", ColumnType::Text),
        ],
        Some("id"),
        &[],
    )?;
    table.insert(vec![int(1), text("10")])?;
    table.insert(vec![int(2), text("20")])?;
    table.delete_rows(&Condition::compare("id", Operator::Eq, int(2)))?;

    table.cast_column("score", ColumnType::Int)?;
    assert_eq!(table.rows()[0][1], int(10));
    assert!(Table::is_tombstone(&table.rows()[1]));
    Ok(())
}

#[test]
fn update_on_unknown_column_fails() -> Result<()> {
    let mut table = people()?;
    assert!(matches!(
        table.update_rows(
            int(1),
            "missing",
            &Condition::compare("id", Operator::Eq, int(1))
        ),
        Err(DbError::ColumnNotFound { .. })
    ));
    Ok(())
}
