//! Memory-mapped flat-file database of sorted fixed-width records.
//!
//! The file is a raw concatenation of records, strictly ascending by hash
//! with no duplicates, no header and no footer. Any file length that is not
//! a whole number of records is a format error, never silently truncated.

use crate::constants;
use crate::error::DbError;
use crate::record::PwRecord;
use memmap2::Mmap;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Read-only view over a sorted record file. The whole file is mapped once
/// and pages are faulted in on demand; record views borrow from the mapping.
#[derive(Debug)]
pub struct FlatFileDb<const N: usize> {
    path: PathBuf,
    mmap: Option<Mmap>,
    len: usize,
}

pub type Sha1Db = FlatFileDb<20>;
pub type NtlmDb = FlatFileDb<16>;
pub type Sha1t64Db = FlatFileDb<8>;

impl<const N: usize> FlatFileDb<N> {
    const WIDTH: usize = PwRecord::<N>::WIDTH;

    pub fn open(path: impl AsRef<Path>) -> Result<Self, DbError> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).map_err(|source| DbError::Open {
            path: path.clone(),
            source,
        })?;
        let byte_len = file.metadata()?.len() as usize;
        if byte_len % Self::WIDTH != 0 {
            return Err(DbError::format(
                &path,
                format!(
                    "length {} is not a multiple of the record width {}",
                    byte_len,
                    Self::WIDTH
                ),
            ));
        }
        // A zero-length mapping is rejected by the OS; an empty database is
        // still a valid (if useless) file.
        let mmap = if byte_len == 0 {
            None
        } else {
            Some(unsafe { Mmap::map(&file)? })
        };
        Ok(Self {
            path,
            mmap,
            len: byte_len / Self::WIDTH,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn data(&self) -> &[u8] {
        self.mmap.as_deref().unwrap_or(&[])
    }

    /// Hash bytes of record `index`, borrowed from the mapping.
    pub fn hash_at(&self, index: usize) -> &[u8] {
        &self.data()[index * Self::WIDTH..index * Self::WIDTH + N]
    }

    /// Record `index`, decoded. Panics if out of range.
    pub fn get(&self, index: usize) -> PwRecord<N> {
        PwRecord::read_from(&self.data()[index * Self::WIDTH..(index + 1) * Self::WIDTH])
    }

    /// Ordered iterator over all records.
    pub fn records(&self) -> impl Iterator<Item = PwRecord<N>> + '_ {
        (0..self.len).map(move |i| self.get(i))
    }

    /// First index whose record hash is >= `needle`; `len()` if none is.
    pub fn lower_bound(&self, needle: &[u8; N]) -> usize {
        self.lower_bound_in(needle, 0, self.len)
    }

    /// `lower_bound` restricted to the half-open index range `[lo, hi)`.
    pub fn lower_bound_in(&self, needle: &[u8; N], lo: usize, hi: usize) -> usize {
        let mut lo = lo;
        let mut hi = hi;
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            if self.hash_at(mid) < needle.as_slice() {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        lo
    }

    /// Count for `needle`, or `None` if absent.
    pub fn lookup(&self, needle: &[u8; N]) -> Option<u32> {
        self.lookup_in(needle, 0, self.len)
    }

    /// `lookup` restricted to `[lo, hi)` (used by the TOC fast path).
    pub fn lookup_in(&self, needle: &[u8; N], lo: usize, hi: usize) -> Option<u32> {
        let idx = self.lower_bound_in(needle, lo, hi);
        if idx < hi && self.hash_at(idx) == needle.as_slice() {
            Some(self.get(idx).count)
        } else {
            None
        }
    }
}

/// Buffered append writer producing a sorted record file. Flushes in units
/// of roughly 1 MiB, rounded down to whole records, and rejects any push
/// that would break the strictly-ascending invariant.
pub struct RecordWriter<const N: usize> {
    out: BufWriter<File>,
    path: PathBuf,
    last: Option<[u8; N]>,
    records: u64,
}

impl<const N: usize> RecordWriter<N> {
    const WIDTH: usize = PwRecord::<N>::WIDTH;

    fn buffer_capacity() -> usize {
        (constants::FLUSH_TARGET_BYTES / Self::WIDTH) * Self::WIDTH
    }

    /// Create (or truncate) `path` for a fresh build.
    pub fn create(path: impl AsRef<Path>) -> Result<Self, DbError> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path).map_err(|source| DbError::Open {
            path: path.clone(),
            source,
        })?;
        Ok(Self {
            out: BufWriter::with_capacity(Self::buffer_capacity(), file),
            path,
            last: None,
            records: 0,
        })
    }

    /// Open `path` for appending, seeding the order check from the last
    /// record already on disk. The existing length must be a whole number
    /// of records.
    pub fn append(path: impl AsRef<Path>) -> Result<Self, DbError> {
        let path = path.as_ref().to_path_buf();
        let mut file = OpenOptions::new()
            .read(true)
            .append(true)
            .open(&path)
            .map_err(|source| DbError::Open {
                path: path.clone(),
                source,
            })?;
        let byte_len = file.metadata()?.len();
        if byte_len % Self::WIDTH as u64 != 0 {
            return Err(DbError::format(
                &path,
                format!(
                    "length {} is not a multiple of the record width {}",
                    byte_len,
                    Self::WIDTH
                ),
            ));
        }
        let last = if byte_len == 0 {
            None
        } else {
            file.seek(SeekFrom::End(-(Self::WIDTH as i64)))?;
            let mut buf = vec![0u8; Self::WIDTH];
            file.read_exact(&mut buf)?;
            let mut hash = [0u8; N];
            hash.copy_from_slice(&buf[..N]);
            Some(hash)
        };
        Ok(Self {
            out: BufWriter::with_capacity(Self::buffer_capacity(), file),
            path,
            last,
            records: byte_len / Self::WIDTH as u64,
        })
    }

    /// Append one record. The hash must be strictly greater than the
    /// previously written one.
    pub fn push(&mut self, rec: &PwRecord<N>) -> Result<(), DbError> {
        if let Some(prev) = &self.last {
            if rec.hash.as_slice() <= prev.as_slice() {
                return Err(DbError::format(
                    &self.path,
                    format!(
                        "record {} is not strictly greater than its predecessor",
                        rec
                    ),
                ));
            }
        }
        self.out.write_all(&rec.hash)?;
        self.out.write_all(&rec.count.to_le_bytes())?;
        self.last = Some(rec.hash);
        self.records += 1;
        Ok(())
    }

    /// Total records in the file, including any pre-existing ones.
    pub fn records_written(&self) -> u64 {
        self.records
    }

    /// Flush buffered records to disk.
    pub fn flush(&mut self) -> Result<(), DbError> {
        self.out.flush()?;
        Ok(())
    }

    /// Flush and close the file.
    pub fn finish(mut self) -> Result<u64, DbError> {
        self.out.flush()?;
        Ok(self.records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Sha1t64Record;

    fn rec(n: u64, count: u32) -> Sha1t64Record {
        Sha1t64Record::new(n.to_be_bytes(), count)
    }

    fn build_db(dir: &tempfile::TempDir, keys: &[u64]) -> std::path::PathBuf {
        let path = dir.path().join("test.bin");
        let mut w = RecordWriter::<8>::create(&path).unwrap();
        for (i, k) in keys.iter().enumerate() {
            w.push(&rec(*k, i as u32 + 1)).unwrap();
        }
        w.finish().unwrap();
        path
    }

    #[test]
    fn test_write_then_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = build_db(&dir, &[1, 5, 9, 1000]);

        let db = FlatFileDb::<8>::open(&path).unwrap();
        assert_eq!(db.len(), 4);
        assert_eq!(db.get(0), rec(1, 0));
        assert_eq!(db.get(0).count, 1);
        assert_eq!(db.get(3).count, 4);

        let all: Vec<_> = db.records().collect();
        assert_eq!(all.len(), 4);
        assert!(all.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_open_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = build_db(&dir, &[]);
        let db = FlatFileDb::<8>::open(&path).unwrap();
        assert!(db.is_empty());
        assert_eq!(db.lower_bound(&[0u8; 8]), 0);
        assert_eq!(db.lookup(&[0u8; 8]), None);
    }

    #[test]
    fn test_open_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = FlatFileDb::<8>::open(dir.path().join("nope.bin")).unwrap_err();
        assert!(matches!(err, DbError::Open { .. }));
    }

    #[test]
    fn test_truncated_file_is_format_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = build_db(&dir, &[1, 2, 3]);
        let len = std::fs::metadata(&path).unwrap().len();
        let file = OpenOptions::new().write(true).open(&path).unwrap();
        file.set_len(len - 1).unwrap();

        let err = FlatFileDb::<8>::open(&path).unwrap_err();
        assert!(matches!(err, DbError::Format { .. }));
    }

    #[test]
    fn test_lower_bound() {
        let dir = tempfile::tempdir().unwrap();
        let path = build_db(&dir, &[10, 20, 30]);
        let db = FlatFileDb::<8>::open(&path).unwrap();

        assert_eq!(db.lower_bound(&0u64.to_be_bytes()), 0);
        assert_eq!(db.lower_bound(&10u64.to_be_bytes()), 0);
        assert_eq!(db.lower_bound(&11u64.to_be_bytes()), 1);
        assert_eq!(db.lower_bound(&20u64.to_be_bytes()), 1);
        // past the end
        assert_eq!(db.lower_bound(&u64::MAX.to_be_bytes()), db.len());
    }

    #[test]
    fn test_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let path = build_db(&dir, &[7, 8, 9]);
        let db = FlatFileDb::<8>::open(&path).unwrap();
        assert_eq!(db.lookup(&8u64.to_be_bytes()), Some(2));
        assert_eq!(db.lookup(&6u64.to_be_bytes()), None);
        assert_eq!(db.lookup(&10u64.to_be_bytes()), None);
    }

    #[test]
    fn test_push_rejects_out_of_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.bin");
        let mut w = RecordWriter::<8>::create(&path).unwrap();
        w.push(&rec(5, 1)).unwrap();
        assert!(w.push(&rec(5, 2)).is_err()); // duplicate
        assert!(w.push(&rec(4, 1)).is_err()); // descending
        w.push(&rec(6, 1)).unwrap();
    }

    #[test]
    fn test_append_seeds_order_check() {
        let dir = tempfile::tempdir().unwrap();
        let path = build_db(&dir, &[1, 2]);
        let mut w = RecordWriter::<8>::append(&path).unwrap();
        assert_eq!(w.records_written(), 2);
        assert!(w.push(&rec(2, 9)).is_err());
        w.push(&rec(3, 9)).unwrap();
        w.finish().unwrap();

        let db = FlatFileDb::<8>::open(&path).unwrap();
        assert_eq!(db.len(), 3);
        assert_eq!(db.lookup(&3u64.to_be_bytes()), Some(9));
    }
}
