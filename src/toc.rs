//! Table-of-contents sidecar index.
//!
//! For a chosen prefix width `bits`, the TOC maps every `bits`-bit hash
//! prefix to the half-open record range `[lo, hi)` covering it, bounding
//! binary searches to one bucket. Sidecar layout: magic `TOC1`, one `bits`
//! byte, padding to 8 bytes, then 2^bits little-endian `(u64 lo, u64 hi)`
//! pairs. Magic or size mismatch is fatal.

use crate::constants::{self, TOC_MAGIC};
use crate::error::DbError;
use crate::flat_file::FlatFileDb;
use std::io::Write;
use std::path::{Path, PathBuf};

pub struct Toc {
    bits: u8,
    // Bucket boundaries: bucket p covers [starts[p], starts[p + 1]).
    starts: Vec<u64>,
}

/// Sidecar filename: `<db-path>.<bits>.toc`.
pub fn toc_path(db_path: &Path, bits: u8) -> PathBuf {
    PathBuf::from(format!("{}.{}.toc", db_path.display(), bits))
}

/// The top `bits` bits of a hash, as a bucket index.
pub fn prefix_bits(hash: &[u8], bits: u8) -> u32 {
    let word = u32::from_be_bytes([hash[0], hash[1], hash[2], hash[3]]);
    word >> (32 - bits as u32)
}

impl Toc {
    pub fn bits(&self) -> u8 {
        self.bits
    }

    pub fn bucket_count(&self) -> usize {
        self.starts.len() - 1
    }

    /// Number of records the TOC was built over.
    pub fn record_count(&self) -> u64 {
        *self.starts.last().unwrap()
    }

    /// Record range `[lo, hi)` of bucket `prefix`.
    pub fn bucket(&self, prefix: u32) -> (u64, u64) {
        (
            self.starts[prefix as usize],
            self.starts[prefix as usize + 1],
        )
    }

    /// Build the table in one linear pass over a sorted database.
    pub fn build<const N: usize>(db: &FlatFileDb<N>, bits: u8) -> Self {
        assert!(
            (constants::TOC_BITS_MIN..=constants::TOC_BITS_MAX).contains(&bits),
            "toc bits out of range"
        );
        let buckets = 1usize << bits;
        let mut starts = vec![0u64; buckets + 1];
        let mut next_bucket = 0usize;
        for i in 0..db.len() {
            let p = prefix_bits(db.hash_at(i), bits) as usize;
            while next_bucket <= p {
                starts[next_bucket] = i as u64;
                next_bucket += 1;
            }
        }
        while next_bucket <= buckets {
            starts[next_bucket] = db.len() as u64;
            next_bucket += 1;
        }
        Self { bits, starts }
    }

    /// Bounded lookup: restrict the search to the needle's bucket. An empty
    /// bucket is an immediate miss.
    pub fn lookup<const N: usize>(&self, db: &FlatFileDb<N>, needle: &[u8; N]) -> Option<u32> {
        let (lo, hi) = self.bucket(prefix_bits(needle, self.bits));
        if lo == hi {
            return None;
        }
        db.lookup_in(needle, lo as usize, hi as usize)
    }

    /// Write the sidecar atomically (temp file in the same directory, then
    /// rename over the target).
    pub fn save(&self, path: &Path) -> Result<(), DbError> {
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        {
            let out = tmp.as_file_mut();
            let mut header = [0u8; 8];
            header[..4].copy_from_slice(&TOC_MAGIC);
            header[4] = self.bits;
            out.write_all(&header)?;
            let mut buf = Vec::with_capacity(self.bucket_count() * 16);
            for p in 0..self.bucket_count() {
                buf.extend_from_slice(&self.starts[p].to_le_bytes());
                buf.extend_from_slice(&self.starts[p + 1].to_le_bytes());
            }
            out.write_all(&buf)?;
        }
        tmp.persist(path).map_err(|e| DbError::Io(e.error))?;
        Ok(())
    }

    /// Load and validate a sidecar written by `save`.
    pub fn load(path: &Path, bits: u8) -> Result<Self, DbError> {
        let data = std::fs::read(path).map_err(|source| DbError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        let buckets = 1usize << bits;
        let expected = 8 + buckets * 16;
        if data.len() != expected {
            return Err(DbError::format(
                path,
                format!("size {} does not match {} buckets", data.len(), buckets),
            ));
        }
        if data[..4] != TOC_MAGIC {
            return Err(DbError::format(path, "bad magic"));
        }
        if data[4] != bits {
            return Err(DbError::format(
                path,
                format!("prefix width {} does not match configured {}", data[4], bits),
            ));
        }

        let mut starts = vec![0u64; buckets + 1];
        let mut prev_hi = 0u64;
        for p in 0..buckets {
            let off = 8 + p * 16;
            let lo = u64::from_le_bytes(data[off..off + 8].try_into().unwrap());
            let hi = u64::from_le_bytes(data[off + 8..off + 16].try_into().unwrap());
            if lo > hi || (p == 0 && lo != 0) || (p > 0 && lo != prev_hi) {
                return Err(DbError::format(
                    path,
                    format!("bucket {} range [{}, {}) is not contiguous", p, lo, hi),
                ));
            }
            starts[p] = lo;
            starts[p + 1] = hi;
            prev_hi = hi;
        }
        Ok(Self { bits, starts })
    }

    /// Load the sidecar for `db`, building and persisting it if absent. A
    /// sidecar that does not cover exactly the database's records is stale
    /// and refused.
    pub fn build_or_load<const N: usize>(db: &FlatFileDb<N>, bits: u8) -> Result<Self, DbError> {
        let sidecar = toc_path(db.path(), bits);
        let toc = if sidecar.exists() {
            Self::load(&sidecar, bits)?
        } else {
            log::info!(
                "building {}-bit TOC for {} ({} records)",
                bits,
                db.path().display(),
                db.len()
            );
            let toc = Self::build(db, bits);
            toc.save(&sidecar)?;
            toc
        };
        if toc.record_count() != db.len() as u64 {
            return Err(DbError::format(
                &sidecar,
                format!(
                    "covers {} records but the database has {}; delete the sidecar to rebuild",
                    toc.record_count(),
                    db.len()
                ),
            ));
        }
        Ok(toc)
    }
}
