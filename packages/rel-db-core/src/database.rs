//! Database context: owns the table registry and drives every operation
//! through the load, lock, mutate, persist lifecycle.
//!
//! There is no shared in-process state between two contexts opened on
//! the same directory. Every operation reloads the complete persisted
//! state before acting and writes the complete state back afterwards,
//! so visibility across processes is serialized per operation, with the
//! persisted lock table as the only mediator. Conflicting lock acquires
//! fail immediately; callers retry or abort.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use crate::catalog::{self, Catalog, IndexMeta};
use crate::condition::{Condition, Operator};
use crate::config::DbConfig;
use crate::error::{DbError, Result};
use crate::index::{Index, IndexKind};
use crate::join::{self, JoinMode, JoinSide};
use crate::lock::{self, LockManager};
use crate::persistence;
use crate::table::{Column, Row, SelectOptions, Table};
use crate::value::{ColumnType, Value};

/// Per-column statistics of one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnStatistics {
    pub name: String,
    pub distinct_values: usize,
}

/// On-demand statistics of one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableStatistics {
    pub table: String,
    pub row_count: usize,
    pub columns: Vec<ColumnStatistics>,
}

/// An open database: a directory of table and index artifacts plus the
/// in-memory registry loaded from it.
#[derive(Debug)]
pub struct Database {
    name: String,
    config: DbConfig,
    dir: PathBuf,
    tables: HashMap<String, Table>,
    catalog: Catalog,
    locks: Table,
    lock_manager: LockManager,
}

impl Database {
    /// Opens the named database under the default configuration,
    /// creating it on first use.
    pub fn open(name: &str) -> Result<Self> {
        Self::open_with_config(name, DbConfig::default())
    }

    /// Opens the named database under an explicit configuration.
    pub fn open_with_config(name: &str, config: DbConfig) -> Result<Self> {
        let dir = config.data_dir.join(format!("{name}_db"));
        let mut db = Self {
            name: name.to_string(),
            config,
            dir,
            tables: HashMap::new(),
            catalog: Catalog::bootstrap()?,
            locks: lock::locks_schema()?,
            lock_manager: LockManager::new(),
        };
        if persistence::table_path(&db.dir, catalog::LENGTHS_TABLE).exists() {
            db.reload()?;
            tracing::info!("Loaded database '{}'", db.name);
        } else {
            fs::create_dir_all(&db.dir)?;
            db.persist()?;
            tracing::info!("Created database '{}'", db.name);
        }
        Ok(db)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &DbConfig {
        &self.config
    }

    /// The directory holding this database's artifacts.
    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// Names of the user tables, sorted.
    pub fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.keys().cloned().collect();
        names.sort();
        names
    }

    /// A user table by name.
    pub fn table(&self, name: &str) -> Result<&Table> {
        self.tables
            .get(name)
            .ok_or_else(|| DbError::TableNotFound(name.to_string()))
    }

    fn table_mut(&mut self, name: &str) -> Result<&mut Table> {
        self.tables
            .get_mut(name)
            .ok_or_else(|| DbError::TableNotFound(name.to_string()))
    }

    /// Reads the complete persisted state back into memory.
    fn reload(&mut self) -> Result<()> {
        let mut user = HashMap::new();
        let mut lengths = None;
        let mut indexes = None;
        let mut locks = None;
        for name in persistence::list_tables(&self.dir)? {
            let table = persistence::load_table(&self.dir, &name)?;
            if name == catalog::LENGTHS_TABLE {
                lengths = Some(table);
            } else if name == catalog::INDEXES_TABLE {
                indexes = Some(table);
            } else if name == lock::LOCKS_TABLE {
                locks = Some(table);
            } else {
                user.insert(name, table);
            }
        }
        let missing =
            |name: &str| DbError::Corrupted(format!("missing system table '{name}'"));
        self.catalog = Catalog::from_tables(
            lengths.ok_or_else(|| missing(catalog::LENGTHS_TABLE))?,
            indexes.ok_or_else(|| missing(catalog::INDEXES_TABLE))?,
        );
        self.locks = locks.ok_or_else(|| missing(lock::LOCKS_TABLE))?;
        self.tables = user;
        tracing::debug!(
            "Reloaded database '{}' with {} user tables",
            self.name,
            self.tables.len()
        );
        Ok(())
    }

    /// Writes the complete in-memory state back to disk.
    fn persist(&self) -> Result<()> {
        for table in self.tables.values() {
            persistence::save_table(&self.dir, table)?;
        }
        persistence::save_table(&self.dir, self.catalog.lengths_table())?;
        persistence::save_table(&self.dir, self.catalog.indexes_table())?;
        persistence::save_table(&self.dir, &self.locks)?;
        Ok(())
    }

    fn release_if_owned(&mut self, table: &str, owned: bool) -> Result<()> {
        if owned {
            self.lock_manager.release(&mut self.locks, table, false)?;
        }
        Ok(())
    }

    /// Creates an empty user table. Names with the system prefix are
    /// reserved.
    pub fn create_table(
        &mut self,
        name: &str,
        columns: Vec<Column>,
        primary_key: Option<&str>,
        unique_columns: &[&str],
    ) -> Result<()> {
        if lock::is_system_table(name) {
            return Err(DbError::SchemaMismatch(format!(
                "table names beginning with 'meta_' are reserved, got '{name}'"
            )));
        }
        self.reload()?;
        if self.tables.contains_key(name) {
            return Err(DbError::TableAlreadyExists(name.to_string()));
        }
        let table = Table::create(name, columns, primary_key, unique_columns)?;
        let owned = self.lock_manager.acquire(&mut self.locks, name)?;
        self.tables.insert(name.to_string(), table);
        self.catalog.register_table(name)?;
        self.release_if_owned(name, owned)?;
        self.persist()?;
        tracing::info!("Created table '{name}'");
        Ok(())
    }

    /// Drops a user table, cascading over its indexes, its catalog
    /// rows, and its lock record.
    pub fn drop_table(&mut self, name: &str) -> Result<()> {
        self.reload()?;
        if !self.tables.contains_key(name) {
            return Err(DbError::TableNotFound(name.to_string()));
        }
        self.lock_manager.acquire(&mut self.locks, name)?;
        self.tables.remove(name);
        for meta in self.catalog.forget_table(name)? {
            persistence::remove_index(&self.dir, &meta.name)?;
        }
        // The table is gone; its lock record goes with it.
        self.lock_manager.release(&mut self.locks, name, true)?;
        persistence::remove_table(&self.dir, name)?;
        self.persist()?;
        tracing::info!("Dropped table '{name}'");
        Ok(())
    }

    /// Inserts a row. Nothing is persisted when validation or a
    /// constraint fails.
    pub fn insert(&mut self, table: &str, row: Row) -> Result<usize> {
        self.reload()?;
        self.table(table)?;
        let owned = self.lock_manager.acquire(&mut self.locks, table)?;
        let inserted = self.table_mut(table)?.insert(row);
        match inserted {
            Ok(position) => {
                self.catalog.note_insert(table)?;
                self.release_if_owned(table, owned)?;
                self.persist()?;
                Ok(position)
            }
            Err(err) => {
                self.release_if_owned(table, owned)?;
                Err(err)
            }
        }
    }

    /// Updates matching rows. A constraint violation mid-call stops
    /// further rows but keeps, and persists, the rows already written.
    pub fn update(
        &mut self,
        table: &str,
        value: Value,
        column: &str,
        condition: &Condition,
    ) -> Result<usize> {
        self.reload()?;
        self.table(table)?;
        let owned = self.lock_manager.acquire(&mut self.locks, table)?;
        let outcome = self.table_mut(table)?.update_rows(value, column, condition);
        match outcome {
            Ok(updated) => {
                self.release_if_owned(table, owned)?;
                self.persist()?;
                Ok(updated)
            }
            Err(err @ DbError::ConstraintViolation { .. }) => {
                // Earlier rows in this call were already mutated and are
                // not rolled back.
                self.release_if_owned(table, owned)?;
                self.persist()?;
                Err(err)
            }
            Err(err) => {
                self.release_if_owned(table, owned)?;
                Err(err)
            }
        }
    }

    /// Deletes matching rows, freeing their positions for reuse.
    /// Returns the number of rows deleted.
    pub fn delete(&mut self, table: &str, condition: &Condition) -> Result<usize> {
        self.reload()?;
        self.table(table)?;
        let owned = self.lock_manager.acquire(&mut self.locks, table)?;
        let outcome = self.table_mut(table)?.delete_rows(condition);
        match outcome {
            Ok(freed) => {
                self.catalog.note_delete(table, &freed)?;
                self.release_if_owned(table, owned)?;
                self.persist()?;
                Ok(freed.len())
            }
            Err(err) => {
                self.release_if_owned(table, owned)?;
                Err(err)
            }
        }
    }

    /// Selects from a table. When the condition is an equality over an
    /// indexed column, the registered index serves the lookup in place
    /// of a scan. `save_as` materializes the result as a new table.
    pub fn select(
        &mut self,
        table: &str,
        columns: Option<&[&str]>,
        options: &SelectOptions<'_>,
        save_as: Option<&str>,
    ) -> Result<Table> {
        self.reload()?;
        let source = self.table(table)?;
        self.lock_manager.ensure_unlocked(&self.locks, table)?;

        let hint_meta = match options.condition {
            Some(Condition::Compare {
                column,
                op: Operator::Eq,
                ..
            }) => self.catalog.index_on(table, column)?,
            _ => None,
        };
        let loaded;
        let hint = match &hint_meta {
            Some(meta) => {
                loaded = persistence::load_index(&self.dir, &meta.name)?;
                Some((meta.column.as_str(), &loaded))
            }
            None => None,
        };
        let result = source.select(columns, options, hint)?;
        if let Some(new_name) = save_as {
            self.materialize(result.clone(), new_name)?;
        }
        Ok(result)
    }

    /// Returns a copy of the table ordered by `column`. Stored rows keep
    /// their order and positions, so indexes built over the table stay
    /// valid.
    pub fn sort(&mut self, table: &str, column: &str, ascending: bool) -> Result<Table> {
        self.reload()?;
        self.table(table)?;
        let owned = self.lock_manager.acquire(&mut self.locks, table)?;
        let sorted = self.table(table)?.sorted(column, ascending);
        self.release_if_owned(table, owned)?;
        self.persist()?;
        sorted
    }

    /// Casts a column to a new type, all or nothing. Nothing is
    /// persisted when any value fails to convert.
    pub fn cast(&mut self, table: &str, column: &str, target: ColumnType) -> Result<()> {
        self.reload()?;
        self.table(table)?;
        let owned = self.lock_manager.acquire(&mut self.locks, table)?;
        let outcome = self.table_mut(table)?.cast_column(column, target);
        match outcome {
            Ok(()) => {
                self.release_if_owned(table, owned)?;
                self.persist()?;
                Ok(())
            }
            Err(err) => {
                self.release_if_owned(table, owned)?;
                Err(err)
            }
        }
    }

    /// Builds an index over a primary-key or unique column and registers
    /// it. The structure is populated by one full scan and is never
    /// updated afterwards; see the index module documentation for the
    /// staleness contract.
    pub fn create_index(
        &mut self,
        name: &str,
        table: &str,
        column: &str,
        kind: IndexKind,
    ) -> Result<()> {
        self.reload()?;
        let source = self.table(table)?;
        if source.column_index(column).is_none() {
            return Err(DbError::ColumnNotFound {
                table: table.to_string(),
                column: column.to_string(),
            });
        }
        if !source.is_unique_column(column) {
            return Err(DbError::SchemaMismatch(format!(
                "index '{name}' requires a primary key or unique column, \
                 and '{column}' of table '{table}' is neither"
            )));
        }
        let meta = IndexMeta {
            table: table.to_string(),
            column: column.to_string(),
            name: name.to_string(),
            kind,
        };
        let index = Index::build(kind, source, column, &self.config)?;
        self.catalog.register_index(&meta)?;
        persistence::save_index(&self.dir, name, &index)?;
        self.persist()?;
        tracing::info!("Created {kind} index '{name}' on '{table}.{column}'");
        Ok(())
    }

    /// Drops an index: its registration and its artifact.
    pub fn drop_index(&mut self, name: &str) -> Result<()> {
        self.reload()?;
        let meta = self.catalog.drop_index(name)?;
        persistence::remove_index(&self.dir, &meta.name)?;
        self.persist()?;
        tracing::info!("Dropped index '{name}'");
        Ok(())
    }

    /// Loads a registered index by name, handing the caller a structure
    /// usable as a select hint.
    pub fn load_index(&self, name: &str) -> Result<Index> {
        let meta = self
            .catalog
            .index_named(name)?
            .ok_or_else(|| DbError::IndexNotFound(name.to_string()))?;
        persistence::load_index(&self.dir, &meta.name)
    }

    /// Joins two tables. For [`JoinMode::IndexNested`] the registered
    /// indexes are consulted, right side first; with no index on either
    /// join column the join fails rather than degrading to a scan.
    pub fn join(
        &mut self,
        mode: JoinMode,
        left: &str,
        right: &str,
        condition: &Condition,
        save_as: Option<&str>,
    ) -> Result<Table> {
        self.reload()?;
        let left_table = self.table(left)?;
        let right_table = self.table(right)?;
        self.lock_manager.ensure_unlocked(&self.locks, left)?;
        self.lock_manager.ensure_unlocked(&self.locks, right)?;

        let probe = if mode == JoinMode::IndexNested {
            match condition {
                Condition::ColumnCompare {
                    left: left_column,
                    right: right_column,
                    ..
                } => {
                    if let Some(meta) = self.catalog.index_on(right, right_column)? {
                        Some((JoinSide::Right, persistence::load_index(&self.dir, &meta.name)?))
                    } else if let Some(meta) = self.catalog.index_on(left, left_column)? {
                        Some((JoinSide::Left, persistence::load_index(&self.dir, &meta.name)?))
                    } else {
                        None
                    }
                }
                Condition::Compare { .. } => None,
            }
        } else {
            None
        };

        let result = join::join(
            mode,
            left_table,
            right_table,
            condition,
            probe.as_ref().map(|(side, index)| (*side, index)),
        )?;
        if let Some(new_name) = save_as {
            self.materialize(result.clone(), new_name)?;
        }
        Ok(result)
    }

    /// Stores a result set as a new user table.
    fn materialize(&mut self, mut table: Table, name: &str) -> Result<()> {
        if lock::is_system_table(name) {
            return Err(DbError::SchemaMismatch(format!(
                "table names beginning with 'meta_' are reserved, got '{name}'"
            )));
        }
        if self.tables.contains_key(name) {
            return Err(DbError::TableAlreadyExists(name.to_string()));
        }
        table.set_name(name);
        let live = table.live_len() as i64;
        self.catalog.register_table(name)?;
        self.catalog.set_row_count(name, live)?;
        self.tables.insert(name.to_string(), table);
        self.persist()?;
        tracing::info!("Materialized result table '{name}'");
        Ok(())
    }

    /// Acquires the exclusive lock on a table and persists the lock
    /// state. Returns whether this call created the record.
    pub fn lock_table(&mut self, table: &str) -> Result<bool> {
        self.reload()?;
        self.table(table)?;
        let owned = self.lock_manager.acquire(&mut self.locks, table)?;
        self.persist()?;
        Ok(owned)
    }

    /// Releases the exclusive lock on a table and persists the lock
    /// state. `force` removes a record owned by any process.
    pub fn unlock_table(&mut self, table: &str, force: bool) -> Result<()> {
        self.reload()?;
        self.lock_manager.release(&mut self.locks, table, force)?;
        self.persist()?;
        Ok(())
    }

    /// Whether another process currently holds the lock on a table.
    pub fn is_locked(&mut self, table: &str) -> Result<bool> {
        self.reload()?;
        Ok(self.lock_manager.is_locked(&self.locks, table))
    }

    /// Tracked row count of a user table, from the catalog.
    pub fn row_count(&self, table: &str) -> Option<i64> {
        self.catalog.row_count(table)
    }

    /// Creates a table from a header-bearing CSV file and bulk-inserts
    /// its rows under a single lock acquisition. Empty fields load as
    /// nulls.
    pub fn import_csv(
        &mut self,
        table: &str,
        path: &Path,
        column_types: &[ColumnType],
        primary_key: Option<&str>,
    ) -> Result<()> {
        let contents = fs::read_to_string(path)?;
        let mut lines = contents.lines();
        let header = lines
            .next()
            .ok_or_else(|| DbError::SchemaMismatch(format!("'{}' is empty", path.display())))?;
        let names: Vec<&str> = header.split(',').map(str::trim).collect();
        if names.len() != column_types.len() {
            return Err(DbError::SchemaMismatch(format!(
                "'{}' declares {} columns, got {} types",
                path.display(),
                names.len(),
                column_types.len()
            )));
        }
        let columns = names
            .iter()
            .zip(column_types)
            .map(|(name, ty)| Column::new(*name, *ty))
            .collect();
        self.create_table(table, columns, primary_key, &[])?;

        let owned = self.lock_manager.acquire(&mut self.locks, table)?;
        let mut imported = 0usize;
        let mut failure = None;
        {
            let target = match self.tables.get_mut(table) {
                Some(target) => target,
                None => return Err(DbError::TableNotFound(table.to_string())),
            };
            for line in lines {
                if line.trim().is_empty() {
                    continue;
                }
                let fields: Vec<&str> = line.split(',').collect();
                if fields.len() != column_types.len() {
                    failure = Some(DbError::SchemaMismatch(format!(
                        "row {} of '{}' has {} fields, expected {}",
                        imported + 1,
                        path.display(),
                        fields.len(),
                        column_types.len()
                    )));
                    break;
                }
                let mut row = Vec::with_capacity(fields.len());
                for (field, ty) in fields.iter().zip(column_types) {
                    match Value::parse_text(field.trim(), *ty) {
                        Ok(value) => row.push(value),
                        Err(err) => {
                            failure = Some(err);
                            break;
                        }
                    }
                }
                if failure.is_some() {
                    break;
                }
                if let Err(err) = target.insert(row) {
                    failure = Some(err);
                    break;
                }
                imported += 1;
            }
        }
        if let Some(err) = failure {
            self.release_if_owned(table, owned)?;
            return Err(err);
        }
        self.catalog.set_row_count(table, imported as i64)?;
        self.release_if_owned(table, owned)?;
        self.persist()?;
        tracing::info!("Imported {imported} rows into '{table}'");
        Ok(())
    }

    /// Writes a table to CSV: header line, then one line per live row,
    /// with nulls as empty fields.
    pub fn export_csv(&self, table: &str, path: &Path) -> Result<()> {
        let source = self.table(table)?;
        let mut out = String::new();
        let header: Vec<&str> = source.columns().iter().map(|c| c.name.as_str()).collect();
        out.push_str(&header.join(","));
        out.push('\n');
        for (_, row) in source.live_rows() {
            let fields: Vec<String> = row.iter().map(csv_field).collect();
            out.push_str(&fields.join(","));
            out.push('\n');
        }
        fs::write(path, out)?;
        Ok(())
    }

    /// Live row count and per-column distinct counts, computed on
    /// demand.
    pub fn statistics(&self, table: &str) -> Result<TableStatistics> {
        let source = self.table(table)?;
        let mut columns = Vec::with_capacity(source.columns().len());
        for (idx, column) in source.columns().iter().enumerate() {
            let mut seen = HashSet::new();
            for (_, row) in source.live_rows() {
                let mut key = Vec::new();
                row[idx].encode_into(&mut key);
                seen.insert(key);
            }
            columns.push(ColumnStatistics {
                name: column.name.clone(),
                distinct_values: seen.len(),
            });
        }
        Ok(TableStatistics {
            table: table.to_string(),
            row_count: source.live_len(),
            columns,
        })
    }
}

fn csv_field(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
