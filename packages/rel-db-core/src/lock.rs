//! Cross-process exclusive table locking.
//!
//! Lock state is ordinary rows in the `meta_locks` system table, one per
//! locked table, persisted like any other table. A conflicting acquire
//! fails immediately; there is no blocking, queueing, or timeout. A
//! crashed process leaves its record behind, and the only remedy is a
//! forced release.

use crate::condition::{Condition, Operator};
use crate::error::{DbError, Result};
use crate::table::{Column, Table};
use crate::value::{ColumnType, Value};

/// Name of the system table holding lock records.
pub const LOCKS_TABLE: &str = "meta_locks";

const EXCLUSIVE: &str = "exclusive";

/// Whether a table is internal. System tables are exempt from locking.
pub fn is_system_table(name: &str) -> bool {
    name.starts_with("meta_")
}

/// Schema of the lock table: (table_name, pid, mode).
pub(crate) fn locks_schema() -> Result<Table> {
    Table::create(
        LOCKS_TABLE,
        vec![
            Column::new("table_name", ColumnType::Text),
            Column::new("pid", ColumnType::Int),
            Column::new("mode", ColumnType::Text),
        ],
        None,
        &["table_name"],
    )
}

/// Exclusive-only lock protocol, keyed by process id.
#[derive(Debug, Clone)]
pub struct LockManager {
    pid: u32,
}

impl LockManager {
    /// Manager acting on behalf of the current process.
    pub fn new() -> Self {
        Self {
            pid: std::process::id(),
        }
    }

    /// Manager acting on behalf of an explicit pid. Useful for cleanup
    /// tooling and for exercising cross-process conflicts in tests.
    pub fn with_pid(pid: u32) -> Self {
        Self { pid }
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Acquires the exclusive lock on a table.
    ///
    /// Returns `true` when this call created the lock record and the
    /// caller therefore owes a release, `false` when the lock was
    /// already held by this pid (or the table is exempt). A record
    /// owned by another pid fails with `Locked`.
    pub fn acquire(&self, locks: &mut Table, table: &str) -> Result<bool> {
        if is_system_table(table) {
            return Ok(false);
        }
        match Self::owner(locks, table) {
            Some(pid) if pid == self.pid => Ok(false),
            Some(pid) => Err(DbError::Locked {
                table: table.to_string(),
                owner_pid: pid,
            }),
            None => {
                locks.insert(vec![
                    Value::Text(table.to_string()),
                    Value::Int(i64::from(self.pid)),
                    Value::Text(EXCLUSIVE.to_string()),
                ])?;
                tracing::debug!("Process {} locked table '{}'", self.pid, table);
                Ok(true)
            }
        }
    }

    /// Removes the lock record for a table. Without `force`, only the
    /// owning pid may release; `force` removes any record, which is the
    /// documented escape hatch for records orphaned by a crashed
    /// process.
    pub fn release(&self, locks: &mut Table, table: &str, force: bool) -> Result<()> {
        if is_system_table(table) {
            return Ok(());
        }
        match Self::owner(locks, table) {
            None => Ok(()),
            Some(pid) if force || pid == self.pid => {
                locks.delete_rows(&Self::record_of(table))?;
                tracing::debug!("Process {} released table '{}'", self.pid, table);
                Ok(())
            }
            Some(pid) => Err(DbError::Locked {
                table: table.to_string(),
                owner_pid: pid,
            }),
        }
    }

    /// Whether another process holds the lock. A record owned by the
    /// calling pid reads as unlocked to its owner.
    pub fn is_locked(&self, locks: &Table, table: &str) -> bool {
        if is_system_table(table) {
            return false;
        }
        matches!(Self::owner(locks, table), Some(pid) if pid != self.pid)
    }

    /// Fails with `Locked` when another process holds the lock.
    pub fn ensure_unlocked(&self, locks: &Table, table: &str) -> Result<()> {
        if is_system_table(table) {
            return Ok(());
        }
        match Self::owner(locks, table) {
            Some(pid) if pid != self.pid => Err(DbError::Locked {
                table: table.to_string(),
                owner_pid: pid,
            }),
            _ => Ok(()),
        }
    }

    fn owner(locks: &Table, table: &str) -> Option<u32> {
        locks
            .live_rows()
            .find(|(_, row)| matches!(&row[0], Value::Text(name) if name == table))
            .and_then(|(_, row)| match row[1] {
                Value::Int(pid) => Some(pid as u32),
                _ => None,
            })
    }

    fn record_of(table: &str) -> Condition {
        Condition::compare("table_name", Operator::Eq, Value::Text(table.to_string()))
    }
}

impl Default for LockManager {
    fn default() -> Self {
        Self::new()
    }
}
