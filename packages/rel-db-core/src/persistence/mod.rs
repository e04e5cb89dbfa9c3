//! On-disk artifacts: one file per table, one per index.
//!
//! Layout under the database directory:
//!
//! ```text
//! <data_dir>/<name>_db/
//!   <table>.tbl           table artifact (system tables included)
//!   indexes/<index>.idx   index artifact
//! ```
//!
//! Each artifact is a 16-byte header (magic, format version, CRC32 of
//! the payload) followed by a bincode payload. Artifacts round-trip the
//! full structure: rows, schema, constraints, and free-position stack
//! for tables; node, directory, and bucket structure for indexes.

use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{DbError, Result};
use crate::index::Index;
use crate::table::Table;

const TABLE_MAGIC: [u8; 8] = *b"RDBTBL\x00\x01";
const INDEX_MAGIC: [u8; 8] = *b"RDBIDX\x00\x01";
const FORMAT_VERSION: u32 = 1;
const HEADER_LEN: usize = 16;

/// File extension of table artifacts.
pub const TABLE_EXT: &str = "tbl";
/// File extension of index artifacts.
pub const INDEX_EXT: &str = "idx";
/// Subdirectory holding index artifacts.
pub const INDEX_DIR: &str = "indexes";

/// Path of a table artifact inside a database directory.
pub fn table_path(dir: &Path, table: &str) -> PathBuf {
    dir.join(format!("{table}.{TABLE_EXT}"))
}

/// Path of an index artifact inside a database directory.
pub fn index_path(dir: &Path, index: &str) -> PathBuf {
    dir.join(INDEX_DIR).join(format!("{index}.{INDEX_EXT}"))
}

fn write_artifact<T: Serialize>(path: &Path, magic: [u8; 8], value: &T) -> Result<()> {
    let payload = bincode::serialize(value)?;
    let checksum = crc32fast::hash(&payload);
    let mut buf = Vec::with_capacity(HEADER_LEN + payload.len());
    buf.extend_from_slice(&magic);
    buf.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    buf.extend_from_slice(&checksum.to_le_bytes());
    buf.extend_from_slice(&payload);
    fs::write(path, buf)?;
    Ok(())
}

fn read_artifact<T: DeserializeOwned>(path: &Path, magic: [u8; 8]) -> Result<T> {
    let data = fs::read(path)?;
    if data.len() < HEADER_LEN || data[..8] != magic {
        return Err(DbError::Corrupted(format!(
            "'{}' is not a recognized artifact",
            path.display()
        )));
    }
    let version = u32::from_le_bytes([data[8], data[9], data[10], data[11]]);
    if version != FORMAT_VERSION {
        return Err(DbError::Corrupted(format!(
            "'{}' has unsupported format version {version}",
            path.display()
        )));
    }
    let checksum = u32::from_le_bytes([data[12], data[13], data[14], data[15]]);
    let payload = &data[HEADER_LEN..];
    if crc32fast::hash(payload) != checksum {
        return Err(DbError::Corrupted(format!(
            "checksum mismatch in '{}'",
            path.display()
        )));
    }
    Ok(bincode::deserialize(payload)?)
}

/// Writes a table artifact, replacing any previous one.
pub fn save_table(dir: &Path, table: &Table) -> Result<()> {
    write_artifact(&table_path(dir, table.name()), TABLE_MAGIC, table)
}

/// Reads a table artifact.
pub fn load_table(dir: &Path, table: &str) -> Result<Table> {
    read_artifact(&table_path(dir, table), TABLE_MAGIC)
}

/// Deletes a table artifact. A missing file is logged, not fatal.
pub fn remove_table(dir: &Path, table: &str) -> Result<()> {
    let path = table_path(dir, table);
    match fs::remove_file(&path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::warn!("Table artifact '{}' was already gone", path.display());
            Ok(())
        }
        Err(err) => Err(err.into()),
    }
}

/// Writes an index artifact, creating the index directory on first use.
pub fn save_index(dir: &Path, name: &str, index: &Index) -> Result<()> {
    fs::create_dir_all(dir.join(INDEX_DIR))?;
    write_artifact(&index_path(dir, name), INDEX_MAGIC, index)
}

/// Reads an index artifact.
pub fn load_index(dir: &Path, name: &str) -> Result<Index> {
    read_artifact(&index_path(dir, name), INDEX_MAGIC)
}

/// Deletes an index artifact. A missing file is logged, not fatal.
pub fn remove_index(dir: &Path, name: &str) -> Result<()> {
    let path = index_path(dir, name);
    match fs::remove_file(&path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::warn!("Index artifact '{}' was already gone", path.display());
            Ok(())
        }
        Err(err) => Err(err.into()),
    }
}

/// Names of every table artifact in a database directory.
pub fn list_tables(dir: &Path) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let is_table = path.extension().and_then(|ext| ext.to_str()) == Some(TABLE_EXT);
        if is_table {
            if let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) {
                names.push(stem.to_string());
            }
        }
    }
    names.sort();
    Ok(names)
}
