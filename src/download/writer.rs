//! Writer side of the download pipeline.
//!
//! Runs on the calling thread. Each cycle: wait (bounded by the stall
//! timeout) for the transport to yield, move completed tasks off the front
//! of the download queue, refill it with fresh prefixes, hand control back,
//! then do the slow text-to-binary conversion and disk append outside the
//! lock. Because only completed front tasks are taken, records land on disk
//! in prefix order and the file is sorted by construction.

use crate::constants;
use crate::download::task::{DownloadTask, Handshake, Phase};
use crate::error::DownloadError;
use crate::flat_file::RecordWriter;
use crate::record::{parse_range_line, prefix_hex};
use std::time::Duration;

/// Per-shard progress callback: (shards done, records, bytes).
pub type ProgressFn<'a> = &'a mut dyn FnMut(u64, u64, u64);

#[derive(Debug, Default)]
pub struct WriterStats {
    pub shards: u64,
    pub records: u64,
    pub bytes: u64,
    /// The transport reported a failure; its error carries the cause.
    pub aborted: bool,
    /// A graceful stop was requested; the file ends at a shard boundary.
    pub interrupted: bool,
}

pub fn run_writer<const N: usize>(
    shared: &Handshake,
    writer: &mut RecordWriter<N>,
    parallel_max: usize,
    mut progress: Option<ProgressFn<'_>>,
) -> Result<WriterStats, DownloadError> {
    let mut stats = WriterStats::default();
    let stall = Duration::from_secs(constants::HANDSHAKE_TIMEOUT_SECS);

    loop {
        let mut batch: Vec<DownloadTask> = Vec::new();
        let mut interrupted = false;
        {
            let st = shared.state.lock().unwrap();
            if st.download_queue.is_empty() {
                break;
            }
            let (mut st, timeout) = shared
                .cv
                .wait_timeout_while(st, stall, |s| s.phase != Phase::ProcessQueues && !s.failed)
                .unwrap();
            if st.failed {
                stats.aborted = true;
                break;
            }
            if timeout.timed_out() {
                drop(st);
                shared.fail();
                return Err(DownloadError::Stall(stall, "transport"));
            }

            // Completed tasks leave the queue strictly from the front, so
            // the on-disk prefix order is monotonic.
            while st.download_queue.front().is_some_and(|t| t.complete) {
                batch.push(st.download_queue.pop_front().unwrap());
            }
            if st.shutdown {
                // Stop at a shard boundary: keep what is already complete,
                // destroy the rest of the in-flight tasks. Everything
                // written stays valid and --resume can continue from it.
                st.download_queue.clear();
                interrupted = true;
            } else {
                st.fill_queue(parallel_max);
            }
            st.phase = Phase::HandleRequests;
        }
        shared.cv.notify_all();

        // Slow work happens outside the lock while the transport runs.
        for task in &batch {
            match write_shard(writer, task) {
                Ok(records) => {
                    stats.shards += 1;
                    stats.records += records;
                    stats.bytes += task.buffer.len() as u64;
                    if let Some(cb) = progress.as_mut() {
                        cb(stats.shards, stats.records, stats.bytes);
                    }
                }
                Err(e) => {
                    shared.fail();
                    return Err(e);
                }
            }
        }
        if interrupted {
            stats.interrupted = true;
            break;
        }
    }

    writer.flush()?;
    Ok(stats)
}

/// Convert one shard's response body into records and append them. Lines
/// are `<suffix-hex>:<count>`; `str::lines` strips the trailing `\r` and
/// blank lines are skipped. Anything else is a fatal format error.
fn write_shard<const N: usize>(
    writer: &mut RecordWriter<N>,
    task: &DownloadTask,
) -> Result<u64, DownloadError> {
    let text = std::str::from_utf8(&task.buffer).map_err(|_| DownloadError::BadLine {
        prefix: task.prefix,
        line: "<response is not UTF-8>".into(),
    })?;

    let mut records = 0u64;
    for line in text.lines() {
        if line.is_empty() {
            continue;
        }
        let record = parse_range_line::<N>(task.prefix, line).ok_or_else(|| {
            DownloadError::BadLine {
                prefix: task.prefix,
                line: line.to_string(),
            }
        })?;
        writer.push(&record)?;
        records += 1;
    }
    log::debug!(
        "[Download] wrote shard {} ({} records)",
        prefix_hex(task.prefix),
        records
    );
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flat_file::FlatFileDb;

    fn task_with(prefix: u32, body: &str) -> DownloadTask {
        let mut t = DownloadTask::new(prefix);
        t.buffer = body.as_bytes().to_vec();
        t.complete = true;
        t
    }

    #[test]
    fn test_write_shard_parses_crlf_and_blank_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shard.bin");
        let mut w = RecordWriter::<20>::create(&path).unwrap();

        let body = "0000000000000000000000000000000000A:10\r\n\
                    0000000000000000000000000000000000B:20\r\n\
                    \r\n";
        let n = write_shard(&mut w, &task_with(0x00000, body)).unwrap();
        assert_eq!(n, 2);
        w.finish().unwrap();

        let db = FlatFileDb::<20>::open(&path).unwrap();
        assert_eq!(db.len(), 2);
        assert_eq!(db.get(0).count, 10);
        assert_eq!(db.get(1).count, 20);
    }

    #[test]
    fn test_write_shard_rejects_malformed_line() {
        let dir = tempfile::tempdir().unwrap();
        let mut w = RecordWriter::<20>::create(dir.path().join("bad.bin")).unwrap();
        let err = write_shard(&mut w, &task_with(0, "garbage:1\n")).unwrap_err();
        assert!(matches!(err, DownloadError::BadLine { .. }));
    }

    #[test]
    fn test_write_shard_preserves_prefix_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ordered.bin");
        let mut w = RecordWriter::<20>::create(&path).unwrap();

        write_shard(
            &mut w,
            &task_with(0x00000, "FFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFF:1\n"),
        )
        .unwrap();
        write_shard(
            &mut w,
            &task_with(0x00001, "00000000000000000000000000000000000:2\n"),
        )
        .unwrap();
        w.finish().unwrap();

        let db = FlatFileDb::<20>::open(&path).unwrap();
        assert_eq!(db.len(), 2);
        assert!(db.hash_at(0) < db.hash_at(1));
    }
}
