//! Database configuration.

use std::path::PathBuf;

/// Database configuration.
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Root directory holding one subdirectory per database
    pub data_dir: PathBuf,
    /// B-tree order (maximum children per node) for new indexes
    pub btree_order: usize,
    /// Initial global depth of new extendible-hash indexes
    pub hash_global_depth: u32,
    /// Bucket capacity of new extendible-hash indexes
    pub hash_bucket_capacity: usize,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./dbdata"),
            btree_order: 3,
            hash_global_depth: 1,
            hash_bucket_capacity: 4,
        }
    }
}
