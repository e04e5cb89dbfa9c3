use std::path::PathBuf;

use rel_db_core::condition::{Condition, Operator};
use rel_db_core::error::{DbError, Result};
use rel_db_core::lock::{LockManager, LOCKS_TABLE};
use rel_db_core::table::{Column, SelectOptions};
use rel_db_core::value::{ColumnType, Value};
use rel_db_core::{persistence, Database, DbConfig, IndexKind, JoinMode};

fn int(n: i64) -> Value {
    Value::Int(n)
}

fn text(s: &str) -> Value {
    Value::Text(s.to_string())
}

fn config_in(dir: &tempfile::TempDir) -> DbConfig {
    DbConfig {
        data_dir: PathBuf::from(dir.path()),
        ..DbConfig::default()
    }
}

fn open_with_people(dir: &tempfile::TempDir) -> Result<Database> {
    let mut db = Database::open_with_config("test", config_in(dir))?;
    db.create_table(
        "people",
        vec![
            Column::new("id", ColumnType::Int),
            Column::new("name", ColumnType::Text),
        ],
        Some("id"),
        &[],
    )?;
    db.insert("people", vec![int(1), text("a")])?;
    db.insert("people", vec![int(2), text("b")])?;
    Ok(db)
}

#[test]
fn delete_then_insert_reuses_the_freed_position() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let mut db = open_with_people(&dir)?;

    let deleted = db.delete("people", &Condition::compare("id", Operator::Eq, int(1)))?;
    assert_eq!(deleted, 1);
    assert_eq!(db.table("people")?.free_positions(), &[0]);

    let position = db.insert("people", vec![int(3), text("c")])?;
    assert_eq!(position, 0);

    // Position order reads (3,'c') then (2,'b').
    let result = db.select("people", None, &SelectOptions::default(), None)?;
    assert_eq!(result.rows()[0], vec![int(3), text("c")]);
    assert_eq!(result.rows()[1], vec![int(2), text("b")]);

    assert_eq!(db.row_count("people"), Some(2));
    Ok(())
}

#[test]
fn state_survives_reopening() -> Result<()> {
    let dir = tempfile::tempdir()?;
    {
        let mut db = open_with_people(&dir)?;
        db.delete("people", &Condition::compare("id", Operator::Eq, int(1)))?;
    }
    let mut db = Database::open_with_config("test", config_in(&dir))?;
    assert_eq!(db.table_names(), vec!["people".to_string()]);
    assert_eq!(db.table("people")?.free_positions(), &[0]);
    assert_eq!(db.row_count("people"), Some(1));

    // The reloaded free stack still feeds the next insert.
    let position = db.insert("people", vec![int(3), text("c")])?;
    assert_eq!(position, 0);
    Ok(())
}

#[test]
fn duplicate_primary_key_leaves_no_trace() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let mut db = open_with_people(&dir)?;
    let outcome = db.insert("people", vec![int(2), text("dup")]);
    assert!(matches!(outcome, Err(DbError::ConstraintViolation { .. })));

    // Nothing was persisted: a fresh context sees two rows.
    let mut db = Database::open_with_config("test", config_in(&dir))?;
    let result = db.select("people", None, &SelectOptions::default(), None)?;
    assert_eq!(result.rows().len(), 2);
    assert_eq!(db.row_count("people"), Some(2));
    Ok(())
}

#[test]
fn foreign_lock_blocks_mutation_until_forced() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let mut db = open_with_people(&dir)?;
    let foreign_pid = std::process::id() + 1;

    // Another process takes the lock through the shared artifact.
    let mut locks = persistence::load_table(db.path(), LOCKS_TABLE)?;
    let foreign = LockManager::with_pid(foreign_pid);
    assert!(foreign.acquire(&mut locks, "people")?);
    persistence::save_table(db.path(), &locks)?;

    assert!(db.is_locked("people")?);
    match db.insert("people", vec![int(3), text("c")]) {
        Err(DbError::Locked { owner_pid, .. }) => assert_eq!(owner_pid, foreign_pid),
        other => panic!("expected Locked, got {other:?}"),
    }
    match db.select("people", None, &SelectOptions::default(), None) {
        Err(DbError::Locked { .. }) => {}
        other => panic!("expected Locked, got {other:?}"),
    }

    // A plain release by the wrong pid is refused; force clears it.
    assert!(db.unlock_table("people", false).is_err());
    db.unlock_table("people", true)?;
    db.insert("people", vec![int(3), text("c")])?;
    Ok(())
}

#[test]
fn lock_ownership_is_reentrant_for_one_pid() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let mut db = open_with_people(&dir)?;

    // Holding our own lock does not block our own operations, and they
    // do not release it on completion.
    assert!(db.lock_table("people")?);
    assert!(!db.is_locked("people")?);
    db.insert("people", vec![int(3), text("c")])?;

    let locks = persistence::load_table(db.path(), LOCKS_TABLE)?;
    assert_eq!(locks.live_len(), 1);

    db.unlock_table("people", false)?;
    let locks = persistence::load_table(db.path(), LOCKS_TABLE)?;
    assert_eq!(locks.live_len(), 0);
    Ok(())
}

#[test]
fn indexed_select_uses_point_lookup_results() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let mut db = Database::open_with_config("test", config_in(&dir))?;
    db.create_table(
        "accounts",
        vec![
            Column::new("id", ColumnType::Int),
            Column::new("balance", ColumnType::Int),
        ],
        Some("id"),
        &[],
    )?;
    for id in 1..=50 {
        db.insert("accounts", vec![int(id), int(id * 10)])?;
    }
    db.create_index("accounts_by_id", "accounts", "id", IndexKind::Hash)?;

    let cond = Condition::compare("id", Operator::Eq, int(37));
    let options = SelectOptions {
        condition: Some(&cond),
        ..Default::default()
    };
    let result = db.select("accounts", None, &options, None)?;
    assert_eq!(result.rows(), &[vec![int(37), int(370)]]);

    // Deleting after the build leaves a stale entry; the cross-check
    // keeps it out of results.
    db.delete("accounts", &cond)?;
    let result = db.select("accounts", None, &options, None)?;
    assert!(result.rows().is_empty());
    Ok(())
}

#[test]
fn index_creation_is_restricted_to_key_columns() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let mut db = Database::open_with_config("test", config_in(&dir))?;
    db.create_table(
        "accounts",
        vec![
            Column::new("id", ColumnType::Int),
            Column::new("balance", ColumnType::Int),
        ],
        Some("id"),
        &[],
    )?;
    assert!(matches!(
        db.create_index("by_balance", "accounts", "balance", IndexKind::BTree),
        Err(DbError::SchemaMismatch(_))
    ));

    db.create_index("by_id", "accounts", "id", IndexKind::BTree)?;
    assert!(matches!(
        db.create_index("by_id", "accounts", "id", IndexKind::Hash),
        Err(DbError::IndexAlreadyExists(_))
    ));
    Ok(())
}

#[test]
fn join_strategies_agree_via_database() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let mut db = Database::open_with_config("test", config_in(&dir))?;
    db.create_table(
        "employees",
        vec![
            Column::new("id", ColumnType::Int),
            Column::new("dept", ColumnType::Int),
        ],
        Some("id"),
        &[],
    )?;
    db.create_table(
        "departments",
        vec![
            Column::new("id", ColumnType::Int),
            Column::new("title", ColumnType::Text),
        ],
        Some("id"),
        &[],
    )?;
    for (id, dept) in [(1, 10), (2, 20), (3, 20), (4, 40)] {
        db.insert("employees", vec![int(id), int(dept)])?;
    }
    for (id, title) in [(10, "storage"), (20, "queries"), (30, "locks")] {
        db.insert("departments", vec![int(id), text(title)])?;
    }
    let on_dept = Condition::columns("dept", Operator::Eq, "id");

    // No index registered yet: the strategy fails instead of scanning.
    assert!(matches!(
        db.join(JoinMode::IndexNested, "employees", "departments", &on_dept, None),
        Err(DbError::IndexUnavailable(_))
    ));

    db.create_index("departments_by_id", "departments", "id", IndexKind::BTree)?;
    let naive = db.join(JoinMode::Inner, "employees", "departments", &on_dept, None)?;
    let probed = db.join(
        JoinMode::IndexNested,
        "employees",
        "departments",
        &on_dept,
        None,
    )?;
    assert_eq!(naive.rows().len(), 3);

    let canonical = |table: &rel_db_core::Table| {
        let mut rows = table.rows().to_vec();
        rows.sort_by(|a, b| format!("{a:?}").cmp(&format!("{b:?}")));
        rows
    };
    assert_eq!(canonical(&naive), canonical(&probed));

    // Qualified output schema.
    assert_eq!(naive.columns()[0].name, "employees.id");
    assert_eq!(naive.columns()[3].name, "departments.title");
    Ok(())
}

#[test]
fn joined_result_can_be_saved_as_a_table() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let mut db = Database::open_with_config("test", config_in(&dir))?;
    db.create_table(
        "l",
        vec![Column::new("k", ColumnType::Int)],
        Some("k"),
        &[],
    )?;
    db.create_table(
        "r",
        vec![Column::new("k", ColumnType::Int)],
        Some("k"),
        &[],
    )?;
    db.insert("l", vec![int(1)])?;
    db.insert("r", vec![int(1)])?;

    let cond = Condition::columns("k", Operator::Eq, "k");
    db.join(JoinMode::SortMerge, "l", "r", &cond, Some("matched"))?;

    let mut db = Database::open_with_config("test", config_in(&dir))?;
    let saved = db.select("matched", None, &SelectOptions::default(), None)?;
    assert_eq!(saved.rows(), &[vec![int(1), int(1)]]);
    assert_eq!(db.row_count("matched"), Some(1));
    Ok(())
}

#[test]
fn drop_table_cascades_over_indexes_and_locks() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let mut db = open_with_people(&dir)?;
    db.create_index("people_by_id", "people", "id", IndexKind::BTree)?;
    db.lock_table("people")?;

    db.drop_table("people")?;
    assert!(db.table("people").is_err());
    assert!(!persistence::table_path(db.path(), "people").exists());
    assert!(!persistence::index_path(db.path(), "people_by_id").exists());
    assert!(matches!(
        db.load_index("people_by_id"),
        Err(DbError::IndexNotFound(_))
    ));

    let locks = persistence::load_table(db.path(), LOCKS_TABLE)?;
    assert_eq!(locks.live_len(), 0);
    assert_eq!(db.row_count("people"), None);
    Ok(())
}

#[test]
fn system_table_names_are_reserved() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let mut db = Database::open_with_config("test", config_in(&dir))?;
    assert!(matches!(
        db.create_table(
            "meta_custom",
            vec![Column::new("a", ColumnType::Int)],
            None,
            &[],
        ),
        Err(DbError::SchemaMismatch(_))
    ));
    Ok(())
}

#[test]
fn update_violation_is_partially_durable() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let mut db = Database::open_with_config("test", config_in(&dir))?;
    db.create_table(
        "t",
        vec![
            Column::new("id", ColumnType::Int),
            Column::new("tag", ColumnType::Text),
        ],
        Some("id"),
        &["tag"],
    )?;
    db.insert("t", vec![int(1), text("a")])?;
    db.insert("t", vec![int(2), text("b")])?;

    let everything = Condition::compare("id", Operator::Gt, int(0));
    let outcome = db.update("t", text("same"), "tag", &everything);
    assert!(matches!(outcome, Err(DbError::ConstraintViolation { .. })));

    // The first row's mutation was persisted before the violation.
    let mut db = Database::open_with_config("test", config_in(&dir))?;
    let rows = db.select("t", None, &SelectOptions::default(), None)?;
    assert_eq!(rows.rows()[0][1], text("same"));
    assert_eq!(rows.rows()[1][1], text("b"));
    Ok(())
}

#[test]
fn cast_applies_to_whole_column_or_not_at_all() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let mut db = Database::open_with_config("test", config_in(&dir))?;
    db.create_table(
        "t",
        vec![
            Column::new("id", ColumnType::Int),
            Column::new("score", ColumnType::Text),
        ],
        Some("id"),
        &[],
    )?;
    db.insert("t", vec![int(1), text("12")])?;
    db.insert("t", vec![int(2), text("oops")])?;

    assert!(db.cast("t", "score", ColumnType::Int).is_err());
    assert_eq!(db.table("t")?.columns()[1].ty, ColumnType::Text);

    db.update(
        "t",
        text("34"),
        "score",
        &Condition::compare("id", Operator::Eq, int(2)),
    )?;
    db.cast("t", "score", ColumnType::Int)?;
    assert_eq!(db.table("t")?.columns()[1].ty, ColumnType::Int);

    let mut db = Database::open_with_config("test", config_in(&dir))?;
    let rows = db.select("t", None, &SelectOptions::default(), None)?;
    assert_eq!(rows.rows()[1], vec![int(2), int(34)]);
    Ok(())
}

#[test]
fn sort_returns_a_copy_and_preserves_positions() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let mut db = open_with_people(&dir)?;
    let sorted = db.sort("people", "name", false)?;
    assert_eq!(sorted.rows()[0][1], text("b"));

    // Stored order is untouched.
    assert_eq!(db.table("people")?.rows()[0][0], int(1));
    Ok(())
}

#[test]
fn csv_round_trip() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let mut db = open_with_people(&dir)?;

    let csv = dir.path().join("people.csv");
    db.export_csv("people", &csv)?;
    db.import_csv(
        "copies",
        &csv,
        &[ColumnType::Int, ColumnType::Text],
        Some("id"),
    )?;

    let original = db.select("people", None, &SelectOptions::default(), None)?;
    let imported = db.select("copies", None, &SelectOptions::default(), None)?;
    assert_eq!(original.rows(), imported.rows());
    assert_eq!(
        imported.columns().iter().map(|c| c.name.clone()).collect::<Vec<_>>(),
        vec!["id".to_string(), "name".to_string()]
    );
    assert_eq!(db.row_count("copies"), Some(2));
    Ok(())
}

#[test]
fn statistics_report_live_rows_and_distinct_counts() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let mut db = Database::open_with_config("test", config_in(&dir))?;
    db.create_table(
        "t",
        vec![
            Column::new("id", ColumnType::Int),
            Column::new("city", ColumnType::Text),
        ],
        Some("id"),
        &[],
    )?;
    for (id, city) in [(1, "paris"), (2, "york"), (3, "paris")] {
        db.insert("t", vec![int(id), text(city)])?;
    }
    db.delete("t", &Condition::compare("id", Operator::Eq, int(2)))?;

    let stats = db.statistics("t")?;
    assert_eq!(stats.row_count, 2);
    assert_eq!(stats.columns[0].distinct_values, 2);
    assert_eq!(stats.columns[1].distinct_values, 1);
    Ok(())
}
