//! Sharded binary-fuse filter adapter.
//!
//! Wraps the `xorf` binary-fuse filters (zero false negatives, small known
//! false-positive rate) behind the same lookup shape as the flat-file
//! database, answering presence only. Keys are the first 8 hash bytes,
//! big-endian; the top byte of the key selects one of 256 shards so each
//! query touches a single filter.

use crate::constants::FILTER_SHARD_BITS;
use crate::error::DbError;
use anyhow::Result;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::Path;
use xorf::{BinaryFuse16, BinaryFuse8, Filter};

/// One shard of a sharded filter. Implemented for the 8- and 16-bit
/// fingerprint variants.
pub trait FuseShard: Filter<u64> + Serialize + DeserializeOwned {
    const NAME: &'static str;

    fn construct(keys: &[u64]) -> Result<Self, &'static str>
    where
        Self: Sized;
}

impl FuseShard for BinaryFuse8 {
    const NAME: &'static str = "binfuse8";

    fn construct(keys: &[u64]) -> Result<Self, &'static str> {
        BinaryFuse8::try_from(keys)
    }
}

impl FuseShard for BinaryFuse16 {
    const NAME: &'static str = "binfuse16";

    fn construct(keys: &[u64]) -> Result<Self, &'static str> {
        BinaryFuse16::try_from(keys)
    }
}

#[derive(Serialize, Deserialize)]
pub struct ShardedFilter<F> {
    shard_bits: u8,
    // A shard with no keys is stored as None and answers "absent".
    shards: Vec<Option<F>>,
}

pub type FuseFilter8 = ShardedFilter<BinaryFuse8>;
pub type FuseFilter16 = ShardedFilter<BinaryFuse16>;

impl<F: FuseShard> ShardedFilter<F> {
    /// Build from a sorted, deduplicated key stream. Keys are partitioned
    /// by their top byte into 2^FILTER_SHARD_BITS shards.
    pub fn build_from_keys(keys: &[u64]) -> Result<Self> {
        let shard_count = 1usize << FILTER_SHARD_BITS;
        let mut shards = Vec::with_capacity(shard_count);
        let mut rest = keys;
        for shard in 0..shard_count as u64 {
            let end = rest.partition_point(|&k| k >> (64 - FILTER_SHARD_BITS) <= shard);
            let (chunk, tail) = rest.split_at(end);
            if chunk.is_empty() {
                shards.push(None);
            } else {
                shards.push(Some(F::construct(chunk).map_err(|e| {
                    anyhow::anyhow!("building {} shard {}: {}", F::NAME, shard, e)
                })?));
            }
            rest = tail;
        }
        Ok(Self {
            shard_bits: FILTER_SHARD_BITS,
            shards,
        })
    }

    /// Approximate membership: false positives possible, false negatives not.
    pub fn contains(&self, key: u64) -> bool {
        let shard = (key >> (64 - self.shard_bits)) as usize;
        match &self.shards[shard] {
            Some(filter) => filter.contains(&key),
            None => false,
        }
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    pub fn load(path: &Path) -> Result<Self, DbError> {
        let data = std::fs::read(path).map_err(|source| DbError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        let filter: Self = bincode::deserialize(&data)
            .map_err(|e| DbError::format(path, format!("not a {} filter file: {}", F::NAME, e)))?;
        if filter.shards.len() != 1usize << filter.shard_bits {
            return Err(DbError::format(
                path,
                format!(
                    "{} shards for a {}-bit shard index",
                    filter.shards.len(),
                    filter.shard_bits
                ),
            ));
        }
        Ok(filter)
    }

    pub fn save(&self, path: &Path) -> Result<(), DbError> {
        let data = bincode::serialize(self)
            .map_err(|e| DbError::format(path, format!("serializing filter: {}", e)))?;
        std::fs::write(path, data)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_keys() -> Vec<u64> {
        let mut keys: Vec<u64> = (0..5000u64)
            .map(|i| i.wrapping_mul(0xD6E8_FEB8_6659_FD93).rotate_left(31))
            .collect();
        keys.sort_unstable();
        keys.dedup();
        keys
    }

    #[test]
    fn test_no_false_negatives() {
        let keys = sample_keys();
        let filter = FuseFilter8::build_from_keys(&keys).unwrap();
        assert_eq!(filter.shard_count(), 256);
        for k in &keys {
            assert!(filter.contains(*k));
        }
    }

    #[test]
    fn test_false_positive_rate_is_small() {
        let keys = sample_keys();
        let filter = FuseFilter16::build_from_keys(&keys).unwrap();
        let members: std::collections::HashSet<u64> = keys.iter().copied().collect();
        let false_positives = (0..2000u64)
            .map(|i| i.wrapping_mul(0xA24B_AED4_963E_E407).rotate_left(7))
            .filter(|k| !members.contains(k))
            .filter(|k| filter.contains(*k))
            .count();
        // fuse16 has a ~0.002% false-positive rate; 1% here is a wide margin
        assert!(false_positives < 20, "{} false positives", false_positives);
    }

    #[test]
    fn test_save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.binfuse8");
        let keys = sample_keys();
        let filter = FuseFilter8::build_from_keys(&keys).unwrap();
        filter.save(&path).unwrap();

        let loaded = FuseFilter8::load(&path).unwrap();
        for k in keys.iter().step_by(17) {
            assert_eq!(loaded.contains(*k), filter.contains(*k));
        }
    }

    #[test]
    fn test_load_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("garbage.binfuse8");
        std::fs::write(&path, b"not a filter").unwrap();
        assert!(matches!(
            FuseFilter8::load(&path),
            Err(DbError::Format { .. })
        ));
    }
}
