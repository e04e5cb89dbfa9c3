//! Extendible hashing: a doubling directory over splittable buckets.
//!
//! The directory holds `2^d` slots (`d` = global depth) addressed by the
//! low `d` bits of the key hash. Buckets carry a local depth no greater
//! than `d`; when a bucket overflows, the directory doubles if needed and
//! the bucket splits along the next hash bit. Insert-only.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use xxhash_rust::xxh64::xxh64;

use crate::value::Value;

/// Ceiling on local depth growth. Identical keys hash identically and can
/// never be separated by splitting, so past this depth the bucket is
/// allowed to overflow instead of doubling the directory forever.
const MAX_DEPTH: u32 = 32;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Bucket {
    local_depth: u32,
    entries: Vec<(Value, usize)>,
}

/// Directory-based dynamic hash structure mapping column values to row
/// positions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HashIndex {
    global_depth: u32,
    bucket_capacity: usize,
    /// `2^global_depth` slots holding bucket ids; several slots may share
    /// a bucket whose local depth is below the global depth.
    directory: Vec<usize>,
    buckets: Vec<Bucket>,
}

impl HashIndex {
    pub fn new(global_depth: u32, bucket_capacity: usize) -> Self {
        let global_depth = global_depth.min(MAX_DEPTH);
        let slots = 1usize << global_depth;
        let buckets = (0..slots)
            .map(|_| Bucket {
                local_depth: global_depth,
                entries: Vec::new(),
            })
            .collect();
        Self {
            global_depth,
            bucket_capacity: bucket_capacity.max(1),
            directory: (0..slots).collect(),
            buckets,
        }
    }

    pub fn global_depth(&self) -> u32 {
        self.global_depth
    }

    pub fn bucket_capacity(&self) -> usize {
        self.bucket_capacity
    }

    pub fn directory_len(&self) -> usize {
        self.directory.len()
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Local depths of every bucket, in allocation order.
    pub fn local_depths(&self) -> impl Iterator<Item = u32> + '_ {
        self.buckets.iter().map(|bucket| bucket.local_depth)
    }

    pub fn len(&self) -> usize {
        self.buckets.iter().map(|bucket| bucket.entries.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn hash_key(key: &Value) -> u64 {
        let mut encoded = Vec::new();
        key.encode_into(&mut encoded);
        xxh64(&encoded, 0)
    }

    fn slot(&self, hash: u64) -> usize {
        (hash & ((1u64 << self.global_depth) - 1)) as usize
    }

    /// Inserts a (key, position) entry, doubling the directory and
    /// splitting buckets until the addressed bucket has room.
    pub fn add(&mut self, key: Value, position: usize) {
        let hash = Self::hash_key(&key);
        loop {
            let bucket = self.directory[self.slot(hash)];
            let full = self.buckets[bucket].entries.len() >= self.bucket_capacity;
            if !full || self.buckets[bucket].local_depth >= MAX_DEPTH {
                self.buckets[bucket].entries.push((key, position));
                return;
            }
            if self.buckets[bucket].local_depth == self.global_depth {
                self.double_directory();
            }
            self.split_bucket(bucket);
        }
    }

    /// Doubles the directory, duplicating every pointer: slot `j` and
    /// slot `j + 2^d` address the same bucket until a split separates
    /// them.
    fn double_directory(&mut self) {
        let mirror = self.directory.clone();
        self.directory.extend(mirror);
        self.global_depth += 1;
    }

    /// Splits a bucket along its next hash bit: a sibling bucket takes
    /// the directory slots with that bit set, then the entries rehash
    /// between the two.
    fn split_bucket(&mut self, bucket: usize) {
        let old_depth = self.buckets[bucket].local_depth;
        let entries = std::mem::take(&mut self.buckets[bucket].entries);
        self.buckets[bucket].local_depth = old_depth + 1;

        let sibling = self.buckets.len();
        self.buckets.push(Bucket {
            local_depth: old_depth + 1,
            entries: Vec::new(),
        });

        let bit = 1usize << old_depth;
        for slot in 0..self.directory.len() {
            if self.directory[slot] == bucket && slot & bit != 0 {
                self.directory[slot] = sibling;
            }
        }

        for (key, position) in entries {
            let target = self.directory[self.slot(Self::hash_key(&key))];
            self.buckets[target].entries.push((key, position));
        }
    }

    /// Positions recorded for the key: a linear scan of the addressed
    /// bucket. Indexed columns are unique in practice, so this returns
    /// at most one position unless the index was built over duplicates.
    pub fn lookup(&self, key: &Value) -> Vec<usize> {
        let bucket = self.directory[self.slot(Self::hash_key(key))];
        self.buckets[bucket]
            .entries
            .iter()
            .filter(|(stored, _)| stored.compare(key) == Some(Ordering::Equal))
            .map(|(_, position)| *position)
            .collect()
    }
}
