//! Record store: a dense row sequence with stable positions.
//!
//! Deleted rows become tombstones (every cell `Null`) and their positions
//! go onto a free stack; the next insert reuses a freed position before
//! appending. Row positions are therefore stable for as long as they are
//! live, which is what lets secondary indexes address rows by position.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::condition::Condition;
use crate::error::{DbError, Result};
use crate::index::Index;
use crate::value::{ColumnType, Value};

/// A column declaration: name plus type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub ty: ColumnType,
}

impl Column {
    pub fn new(name: impl Into<String>, ty: ColumnType) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

/// One stored row, in declared column order.
pub type Row = Vec<Value>;

/// Options for [`Table::select`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SelectOptions<'a> {
    /// Row filter; `None` keeps every live row
    pub condition: Option<&'a Condition>,
    /// Deduplicate projected rows
    pub distinct: bool,
    /// Stable sort of the result by this column
    pub order_by: Option<&'a str>,
    /// Sort descending instead of ascending
    pub descending: bool,
    /// Keep at most this many rows
    pub limit: Option<usize>,
}

/// Typed table: schema, constraints, dense row sequence, free-position stack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    name: String,
    columns: Vec<Column>,
    primary_key: Option<usize>,
    unique: Vec<usize>,
    rows: Vec<Row>,
    free_positions: Vec<usize>,
}

impl Table {
    /// Creates an empty table. The primary key and every unique column
    /// must name a declared column; column names must not repeat.
    pub fn create(
        name: impl Into<String>,
        columns: Vec<Column>,
        primary_key: Option<&str>,
        unique_columns: &[&str],
    ) -> Result<Self> {
        let name = name.into();
        if columns.is_empty() {
            return Err(DbError::SchemaMismatch(format!(
                "table '{name}' must declare at least one column"
            )));
        }
        let mut seen = HashSet::new();
        for column in &columns {
            if !seen.insert(column.name.as_str()) {
                return Err(DbError::SchemaMismatch(format!(
                    "duplicate column '{}' in table '{name}'",
                    column.name
                )));
            }
        }
        let index_of = |wanted: &str| {
            columns
                .iter()
                .position(|c| c.name == wanted)
                .ok_or_else(|| DbError::ColumnNotFound {
                    table: name.clone(),
                    column: wanted.to_string(),
                })
        };
        let primary_key = primary_key.map(index_of).transpose()?;
        let mut unique = Vec::new();
        for wanted in unique_columns {
            let idx = index_of(wanted)?;
            if Some(idx) != primary_key && !unique.contains(&idx) {
                unique.push(idx);
            }
        }
        Ok(Self {
            name,
            columns,
            primary_key,
            unique,
            rows: Vec::new(),
            free_positions: Vec::new(),
        })
    }

    /// Builds a result-set table: no constraints, no free positions.
    pub(crate) fn from_rows(name: impl Into<String>, columns: Vec<Column>, rows: Vec<Row>) -> Self {
        Self {
            name: name.into(),
            columns,
            primary_key: None,
            unique: Vec::new(),
            rows,
            free_positions: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn primary_key(&self) -> Option<&str> {
        self.primary_key.map(|idx| self.columns[idx].name.as_str())
    }

    /// Whether the named column is the primary key or declared unique.
    pub fn is_unique_column(&self, column: &str) -> bool {
        match self.column_index(column) {
            Some(idx) => self.primary_key == Some(idx) || self.unique.contains(&idx),
            None => false,
        }
    }

    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == column)
    }

    /// Number of live (non-tombstone) rows.
    pub fn live_len(&self) -> usize {
        self.live_rows().count()
    }

    /// Number of occupied positions, tombstones included.
    pub fn position_count(&self) -> usize {
        self.rows.len()
    }

    pub fn free_positions(&self) -> &[usize] {
        &self.free_positions
    }

    /// The row at a position, tombstones included.
    pub fn row(&self, position: usize) -> Option<&Row> {
        self.rows.get(position)
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn is_tombstone(row: &[Value]) -> bool {
        row.iter().all(Value::is_null)
    }

    /// Iterates live rows with their positions, in position order.
    pub fn live_rows(&self) -> impl Iterator<Item = (usize, &Row)> {
        self.rows
            .iter()
            .enumerate()
            .filter(|(_, row)| !Table::is_tombstone(row))
    }

    /// Live, non-null values of one column with their row positions.
    /// This is the scan an index build consumes.
    pub fn column_values(&self, column: &str) -> Result<Vec<(usize, &Value)>> {
        let idx = self.require_column(column)?;
        Ok(self
            .live_rows()
            .filter(|(_, row)| !row[idx].is_null())
            .map(|(position, row)| (position, &row[idx]))
            .collect())
    }

    fn require_column(&self, column: &str) -> Result<usize> {
        self.column_index(column).ok_or_else(|| DbError::ColumnNotFound {
            table: self.name.clone(),
            column: column.to_string(),
        })
    }

    /// Inserts a row, reusing a freed position when one exists.
    /// Returns the position written. Validation and constraint checks
    /// run before any mutation, so a failed insert changes nothing.
    pub fn insert(&mut self, row: Row) -> Result<usize> {
        if row.len() != self.columns.len() {
            return Err(DbError::SchemaMismatch(format!(
                "table '{}' expects {} values, got {}",
                self.name,
                self.columns.len(),
                row.len()
            )));
        }
        for (value, column) in row.iter().zip(&self.columns) {
            if !value.matches(column.ty) {
                return Err(DbError::SchemaMismatch(format!(
                    "column '{}' of table '{}' holds {}, got {}",
                    column.name, self.name, column.ty, value
                )));
            }
        }
        if Table::is_tombstone(&row) {
            return Err(DbError::SchemaMismatch(format!(
                "cannot insert an all-null row into table '{}'",
                self.name
            )));
        }
        for idx in self.constrained_columns() {
            let value = &row[idx];
            if value.is_null() {
                if self.primary_key == Some(idx) {
                    return Err(self.constraint_violation(idx, value));
                }
                continue;
            }
            if self.has_live_value(idx, value, None) {
                return Err(self.constraint_violation(idx, value));
            }
        }

        let position = match self.free_positions.pop() {
            Some(free) => {
                self.rows[free] = row;
                free
            }
            None => {
                self.rows.push(row);
                self.rows.len() - 1
            }
        };
        Ok(position)
    }

    fn constrained_columns(&self) -> Vec<usize> {
        self.primary_key
            .into_iter()
            .chain(self.unique.iter().copied())
            .collect()
    }

    fn has_live_value(&self, column: usize, value: &Value, skip: Option<usize>) -> bool {
        self.live_rows().any(|(position, row)| {
            Some(position) != skip
                && row[column].compare(value) == Some(std::cmp::Ordering::Equal)
        })
    }

    fn constraint_violation(&self, column: usize, value: &Value) -> DbError {
        DbError::ConstraintViolation {
            table: self.name.clone(),
            column: self.columns[column].name.clone(),
            value: value.to_string(),
        }
    }

    /// Scans, filters, projects, deduplicates, orders, and truncates.
    ///
    /// `columns` of `None` keeps every column. When `index_hint` names
    /// the column of an equality condition, a point lookup replaces the
    /// scan; positions coming back from the index are cross-checked
    /// against live rows, so a hint built before later deletes cannot
    /// surface tombstoned data.
    pub fn select(
        &self,
        columns: Option<&[&str]>,
        options: &SelectOptions<'_>,
        index_hint: Option<(&str, &Index)>,
    ) -> Result<Table> {
        let resolved = options
            .condition
            .map(|condition| condition.resolve(self))
            .transpose()?;

        let mut picked: Vec<Row> = Vec::new();
        let mut served_by_index = false;
        if let (Some((hint_column, index)), Some(condition)) = (index_hint, options.condition) {
            if let Some(literal) = condition.equality_on(hint_column) {
                let column = self.require_column(hint_column)?;
                for position in index.probe(self, column, literal) {
                    picked.push(self.rows[position].clone());
                }
                served_by_index = true;
            }
        }
        if !served_by_index {
            for (_, row) in self.live_rows() {
                let keep = match &resolved {
                    Some(condition) => condition.matches(row),
                    None => true,
                };
                if keep {
                    picked.push(row.clone());
                }
            }
        }

        let (projected_columns, projection): (Vec<Column>, Vec<usize>) = match columns {
            None => (self.columns.clone(), (0..self.columns.len()).collect()),
            Some(names) => {
                let mut cols = Vec::with_capacity(names.len());
                let mut indices = Vec::with_capacity(names.len());
                for name in names {
                    let idx = self.require_column(name)?;
                    cols.push(self.columns[idx].clone());
                    indices.push(idx);
                }
                (cols, indices)
            }
        };
        let mut rows: Vec<Row> = picked
            .into_iter()
            .map(|row| projection.iter().map(|&idx| row[idx].clone()).collect())
            .collect();

        if options.distinct {
            let mut seen = HashSet::new();
            rows.retain(|row| {
                let mut key = Vec::new();
                for value in row {
                    value.encode_into(&mut key);
                }
                seen.insert(key)
            });
        }

        if let Some(order_column) = options.order_by {
            let idx = projected_columns
                .iter()
                .position(|c| c.name == order_column)
                .ok_or_else(|| DbError::ColumnNotFound {
                    table: self.name.clone(),
                    column: order_column.to_string(),
                })?;
            if options.descending {
                rows.sort_by(|a, b| b[idx].sort_cmp(&a[idx]));
            } else {
                rows.sort_by(|a, b| a[idx].sort_cmp(&b[idx]));
            }
        }

        if let Some(limit) = options.limit {
            rows.truncate(limit);
        }

        Ok(Table::from_rows(self.name.clone(), projected_columns, rows))
    }

    /// Writes `value` into `column` for every row matching the condition.
    ///
    /// Uniqueness constraints are re-checked per row; the first violation
    /// stops the operation, and rows already written in this call stay
    /// written. Returns the number of rows updated.
    pub fn update_rows(
        &mut self,
        value: Value,
        column: &str,
        condition: &Condition,
    ) -> Result<usize> {
        let idx = self.require_column(column)?;
        if !value.matches(self.columns[idx].ty) {
            return Err(DbError::SchemaMismatch(format!(
                "column '{}' of table '{}' holds {}, got {}",
                column, self.name, self.columns[idx].ty, value
            )));
        }
        let targets: Vec<usize> = {
            let resolved = condition.resolve(self)?;
            self.live_rows()
                .filter(|(_, row)| resolved.matches(row))
                .map(|(position, _)| position)
                .collect()
        };
        let constrained = self.primary_key == Some(idx) || self.unique.contains(&idx);

        let mut updated = 0;
        for position in targets {
            if constrained {
                if value.is_null() && self.primary_key == Some(idx) {
                    return Err(self.constraint_violation(idx, &value));
                }
                if !value.is_null() && self.has_live_value(idx, &value, Some(position)) {
                    return Err(self.constraint_violation(idx, &value));
                }
            }
            self.rows[position][idx] = value.clone();
            updated += 1;
        }
        Ok(updated)
    }

    /// Tombstones every matching row and returns the freed positions,
    /// already pushed onto the free stack in match order.
    pub fn delete_rows(&mut self, condition: &Condition) -> Result<Vec<usize>> {
        let targets: Vec<usize> = {
            let resolved = condition.resolve(self)?;
            self.live_rows()
                .filter(|(_, row)| resolved.matches(row))
                .map(|(position, _)| position)
                .collect()
        };
        let width = self.columns.len();
        for &position in &targets {
            self.rows[position] = vec![Value::Null; width];
            self.free_positions.push(position);
        }
        Ok(targets)
    }

    /// Returns a copy of the live rows ordered by `column`. The stored
    /// table keeps its row order, so positions recorded by any index
    /// remain valid against this table.
    pub fn sorted(&self, column: &str, ascending: bool) -> Result<Table> {
        let idx = self.require_column(column)?;
        let mut rows: Vec<Row> = self.live_rows().map(|(_, row)| row.clone()).collect();
        if ascending {
            rows.sort_by(|a, b| a[idx].sort_cmp(&b[idx]));
        } else {
            rows.sort_by(|a, b| b[idx].sort_cmp(&a[idx]));
        }
        Ok(Self {
            name: self.name.clone(),
            columns: self.columns.clone(),
            primary_key: self.primary_key,
            unique: self.unique.clone(),
            rows,
            free_positions: Vec::new(),
        })
    }

    /// Converts every value in `column` to the target type, all or
    /// nothing: a single unconvertible value fails the whole cast with
    /// no mutation.
    pub fn cast_column(&mut self, column: &str, target: ColumnType) -> Result<()> {
        let idx = self.require_column(column)?;
        let mut converted = Vec::with_capacity(self.rows.len());
        for row in &self.rows {
            converted.push(row[idx].cast(target)?);
        }
        for (row, value) in self.rows.iter_mut().zip(converted) {
            row[idx] = value;
        }
        self.columns[idx].ty = target;
        Ok(())
    }
}
