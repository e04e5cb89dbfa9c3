//! Catalog of metadata tables.
//!
//! Row counts live in `meta_length` and the index registry in
//! `meta_indexes`, both ordinary tables persisted alongside user data.
//! The database notifies the catalog on every insert and delete so the
//! counts track live rows; free-slot bookkeeping lives inside each
//! table's own free-position stack and rides along with its artifact.

use crate::condition::{Condition, Operator};
use crate::error::{DbError, Result};
use crate::index::IndexKind;
use crate::table::{Column, Table};
use crate::value::{ColumnType, Value};

/// Name of the system table holding per-table row counts.
pub const LENGTHS_TABLE: &str = "meta_length";
/// Name of the system table registering indexes.
pub const INDEXES_TABLE: &str = "meta_indexes";

/// A registered index: which table and column it covers, under what
/// name, and which structure backs it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexMeta {
    pub table: String,
    pub column: String,
    pub name: String,
    pub kind: IndexKind,
}

/// Metadata layer over the system tables.
#[derive(Debug, Clone)]
pub struct Catalog {
    lengths: Table,
    indexes: Table,
}

impl Catalog {
    /// Fresh catalog with empty system tables.
    pub(crate) fn bootstrap() -> Result<Self> {
        let lengths = Table::create(
            LENGTHS_TABLE,
            vec![
                Column::new("table_name", ColumnType::Text),
                Column::new("row_count", ColumnType::Int),
            ],
            None,
            &["table_name"],
        )?;
        let indexes = Table::create(
            INDEXES_TABLE,
            vec![
                Column::new("table_name", ColumnType::Text),
                Column::new("column_name", ColumnType::Text),
                Column::new("index_name", ColumnType::Text),
                Column::new("index_type", ColumnType::Text),
            ],
            None,
            &["index_name"],
        )?;
        Ok(Self { lengths, indexes })
    }

    /// Catalog over system tables loaded from persistence.
    pub(crate) fn from_tables(lengths: Table, indexes: Table) -> Self {
        Self { lengths, indexes }
    }

    pub(crate) fn lengths_table(&self) -> &Table {
        &self.lengths
    }

    pub(crate) fn indexes_table(&self) -> &Table {
        &self.indexes
    }

    /// Starts tracking a table at zero rows.
    pub fn register_table(&mut self, table: &str) -> Result<()> {
        if self.row_count(table).is_none() {
            self.lengths
                .insert(vec![Value::Text(table.to_string()), Value::Int(0)])?;
        }
        Ok(())
    }

    /// Stops tracking a table; returns the index registrations that
    /// covered it so the caller can drop their artifacts.
    pub fn forget_table(&mut self, table: &str) -> Result<Vec<IndexMeta>> {
        let by_table = Condition::compare(
            "table_name",
            Operator::Eq,
            Value::Text(table.to_string()),
        );
        self.lengths.delete_rows(&by_table)?;
        let dropped = self.indexes_for(table)?;
        self.indexes.delete_rows(&by_table)?;
        Ok(dropped)
    }

    /// Notification hook: a row was inserted into the table.
    pub fn note_insert(&mut self, table: &str) -> Result<()> {
        let count = self.row_count(table).unwrap_or(0);
        self.set_row_count(table, count + 1)
    }

    /// Notification hook: rows were deleted and their positions freed.
    pub fn note_delete(&mut self, table: &str, freed: &[usize]) -> Result<()> {
        if freed.is_empty() {
            return Ok(());
        }
        let count = self.row_count(table).unwrap_or(0);
        self.set_row_count(table, count.saturating_sub(freed.len() as i64))
    }

    /// Tracked row count for a table, if it is tracked at all.
    pub fn row_count(&self, table: &str) -> Option<i64> {
        self.lengths
            .live_rows()
            .find(|(_, row)| matches!(&row[0], Value::Text(name) if name == table))
            .and_then(|(_, row)| match row[1] {
                Value::Int(count) => Some(count),
                _ => None,
            })
    }

    pub(crate) fn set_row_count(&mut self, table: &str, count: i64) -> Result<()> {
        let by_table = Condition::compare(
            "table_name",
            Operator::Eq,
            Value::Text(table.to_string()),
        );
        let updated = self
            .lengths
            .update_rows(Value::Int(count), "row_count", &by_table)?;
        if updated == 0 {
            self.lengths
                .insert(vec![Value::Text(table.to_string()), Value::Int(count)])?;
        }
        Ok(())
    }

    /// Registers an index. The name and the (table, column) pairing must
    /// both be free.
    pub fn register_index(&mut self, meta: &IndexMeta) -> Result<()> {
        if self.index_named(&meta.name)?.is_some() {
            return Err(DbError::IndexAlreadyExists(format!(
                "name '{}' is taken",
                meta.name
            )));
        }
        if self.index_on(&meta.table, &meta.column)?.is_some() {
            return Err(DbError::IndexAlreadyExists(format!(
                "column '{}' of table '{}' is already indexed",
                meta.column, meta.table
            )));
        }
        self.indexes.insert(vec![
            Value::Text(meta.table.clone()),
            Value::Text(meta.column.clone()),
            Value::Text(meta.name.clone()),
            Value::Text(meta.kind.name().to_string()),
        ])?;
        Ok(())
    }

    /// Unregisters an index by name, returning its registration.
    pub fn drop_index(&mut self, name: &str) -> Result<IndexMeta> {
        let meta = self
            .index_named(name)?
            .ok_or_else(|| DbError::IndexNotFound(name.to_string()))?;
        self.indexes.delete_rows(&Condition::compare(
            "index_name",
            Operator::Eq,
            Value::Text(name.to_string()),
        ))?;
        Ok(meta)
    }

    /// Registration lookup by index name.
    pub fn index_named(&self, name: &str) -> Result<Option<IndexMeta>> {
        self.indexes
            .live_rows()
            .find(|(_, row)| matches!(&row[2], Value::Text(own) if own == name))
            .map(|(_, row)| Self::meta_from_row(row))
            .transpose()
    }

    /// Registration lookup by indexed (table, column) pair.
    pub fn index_on(&self, table: &str, column: &str) -> Result<Option<IndexMeta>> {
        self.indexes
            .live_rows()
            .find(|(_, row)| {
                matches!(&row[0], Value::Text(t) if t == table)
                    && matches!(&row[1], Value::Text(c) if c == column)
            })
            .map(|(_, row)| Self::meta_from_row(row))
            .transpose()
    }

    /// Every registration covering a table.
    pub fn indexes_for(&self, table: &str) -> Result<Vec<IndexMeta>> {
        self.indexes
            .live_rows()
            .filter(|(_, row)| matches!(&row[0], Value::Text(t) if t == table))
            .map(|(_, row)| Self::meta_from_row(row))
            .collect()
    }

    pub fn has_index(&self, table: &str) -> bool {
        self.indexes
            .live_rows()
            .any(|(_, row)| matches!(&row[0], Value::Text(t) if t == table))
    }

    fn meta_from_row(row: &[Value]) -> Result<IndexMeta> {
        let text = |value: &Value| match value {
            Value::Text(s) => Ok(s.clone()),
            other => Err(DbError::Corrupted(format!(
                "malformed index registration cell: {other}"
            ))),
        };
        let kind_name = text(&row[3])?;
        let kind = IndexKind::from_name(&kind_name).ok_or_else(|| {
            DbError::Corrupted(format!("unknown index type '{kind_name}' in registry"))
        })?;
        Ok(IndexMeta {
            table: text(&row[0])?,
            column: text(&row[1])?,
            name: text(&row[2])?,
            kind,
        })
    }
}
