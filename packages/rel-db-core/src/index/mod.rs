//! Secondary index structures and their shared handle.
//!
//! Indexes are built once, by a full scan of a column, and are
//! append-only from then on: row deletions and updates in the source
//! table are never reflected back. A position obtained from a raw
//! [`Index`] may therefore be stale. In-crate consumers go through
//! [`Index::probe`], which re-validates every position against the live
//! table; external holders of an `Index` handle carry that obligation
//! themselves.

mod btree;
mod hash;


use std::fmt;

use serde::{Deserialize, Serialize};

pub use btree::BTreeIndex;
pub use hash::HashIndex;

use crate::config::DbConfig;
use crate::error::Result;
use crate::table::Table;
use crate::value::Value;

/// The two supported index structures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexKind {
    BTree,
    Hash,
}

impl IndexKind {
    pub fn name(&self) -> &'static str {
        match self {
            IndexKind::BTree => "btree",
            IndexKind::Hash => "hash",
        }
    }

    pub fn from_name(name: &str) -> Option<IndexKind> {
        match name {
            "btree" => Some(IndexKind::BTree),
            "hash" => Some(IndexKind::Hash),
            _ => None,
        }
    }
}

impl fmt::Display for IndexKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A built index over one column of one table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Index {
    BTree(BTreeIndex),
    Hash(HashIndex),
}

impl Index {
    /// Builds an index by scanning the live, non-null values of the
    /// column. Sizing knobs come from the configuration.
    pub fn build(kind: IndexKind, table: &Table, column: &str, config: &DbConfig) -> Result<Index> {
        let values = table.column_values(column)?;
        let entries = values.len();
        let index = match kind {
            IndexKind::BTree => {
                let mut btree = BTreeIndex::new(config.btree_order);
                for (position, value) in values {
                    btree.insert(value.clone(), position);
                }
                Index::BTree(btree)
            }
            IndexKind::Hash => {
                let mut hash = HashIndex::new(config.hash_global_depth, config.hash_bucket_capacity);
                for (position, value) in values {
                    hash.add(value.clone(), position);
                }
                Index::Hash(hash)
            }
        };
        tracing::debug!(
            "Built {} index over '{}.{}' with {} entries",
            kind,
            table.name(),
            column,
            entries
        );
        Ok(index)
    }

    pub fn kind(&self) -> IndexKind {
        match self {
            Index::BTree(_) => IndexKind::BTree,
            Index::Hash(_) => IndexKind::Hash,
        }
    }

    /// Raw point lookup. Positions may be stale with respect to later
    /// table mutation; see the module documentation.
    pub fn lookup(&self, key: &Value) -> Vec<usize> {
        match self {
            Index::BTree(btree) => btree.lookup(key).into_iter().collect(),
            Index::Hash(hash) => hash.lookup(key),
        }
    }

    /// Point lookup cross-checked against the table: only positions
    /// whose row is live and still carries the probed key survive.
    pub fn probe(&self, table: &Table, column: usize, key: &Value) -> Vec<usize> {
        self.lookup(key)
            .into_iter()
            .filter(|&position| match table.row(position) {
                Some(row) => {
                    !Table::is_tombstone(row)
                        && row[column].compare(key) == Some(std::cmp::Ordering::Equal)
                }
                None => false,
            })
            .collect()
    }
}
