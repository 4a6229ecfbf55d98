//! Range downloader: fetches every 5-hex-digit shard of the upstream
//! dataset and streams it into one sorted binary flat file.
//!
//! Two threads cooperate: the transport thread drives concurrent HTTPS
//! fetches, the writer thread (the caller's) converts responses and appends
//! to disk. See `task` for the handshake that serializes their access to
//! the queue.

mod task;
mod transport;
mod writer;

pub use task::{DownloadTask, Handshake, Phase, PipelineState};
pub use writer::{ProgressFn, WriterStats};

use crate::constants;
use crate::error::{DbError, DownloadError};
use crate::flat_file::RecordWriter;
use crate::record::{prefix20, prefix_hex, PwRecord};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct DownloadConfig {
    /// Output database file.
    pub output: PathBuf,
    /// Base URL of the range API.
    pub base_url: String,
    /// Maximum concurrent in-flight fetches.
    pub parallel_max: usize,
    /// Exclusive upper prefix bound.
    pub prefix_limit: u32,
    /// Continue an existing output file.
    pub resume: bool,
    /// Fetch NTLM hashes instead of SHA-1.
    pub ntlm: bool,
    /// Install a SIGINT handler for graceful stops.
    pub handle_signals: bool,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            output: PathBuf::from("hibp.bin"),
            base_url: constants::DEFAULT_RANGE_URL.to_string(),
            parallel_max: constants::DEFAULT_PARALLEL_MAX,
            prefix_limit: constants::PREFIX_SPACE,
            resume: false,
            ntlm: false,
            handle_signals: true,
        }
    }
}

#[derive(Debug, Default)]
pub struct DownloadStats {
    pub shards: u64,
    pub records: u64,
    pub bytes: u64,
    pub elapsed: Duration,
    pub interrupted: bool,
}

/// Run a download to completion (or graceful interruption).
pub fn run(
    config: &DownloadConfig,
    progress: Option<ProgressFn<'_>>,
) -> Result<DownloadStats, DownloadError> {
    if config.ntlm {
        run_typed::<16>(config, progress)
    } else {
        run_typed::<20>(config, progress)
    }
}

fn run_typed<const N: usize>(
    config: &DownloadConfig,
    progress: Option<ProgressFn<'_>>,
) -> Result<DownloadStats, DownloadError> {
    let start_time = Instant::now();

    let (mut record_writer, start_prefix) = if config.resume && config.output.exists() {
        let start = resume_prefix::<N>(&config.output)?;
        log::info!(
            "[Download] resuming {} at prefix {}",
            config.output.display(),
            prefix_hex(start)
        );
        (RecordWriter::<N>::append(&config.output)?, start)
    } else {
        if config.output.exists() {
            return Err(DownloadError::OutputExists {
                path: config.output.clone(),
            });
        }
        (RecordWriter::<N>::create(&config.output)?, 0)
    };

    if start_prefix >= config.prefix_limit {
        log::info!("[Download] nothing to do, output already covers the range");
        return Ok(DownloadStats::default());
    }

    let shared = Arc::new(Handshake::new(start_prefix, config.prefix_limit));
    shared
        .state
        .lock()
        .unwrap()
        .fill_queue(config.parallel_max);

    // Transport on its own thread; the writer loop runs here. Matching the
    // join protocol below, each side records its own failure.
    let transport_shared = Arc::clone(&shared);
    let transport_config = transport::TransportConfig {
        base_url: config.base_url.clone(),
        ntlm: config.ntlm,
        handle_signals: config.handle_signals,
    };
    let transport_thread = std::thread::Builder::new()
        .name("transport".into())
        .spawn(move || transport::run(transport_shared, transport_config))?;

    let writer_result = writer::run_writer(&shared, &mut record_writer, config.parallel_max, progress);

    let transport_result = match transport_thread.join() {
        Ok(r) => r,
        Err(_) => {
            shared.fail();
            Err(DownloadError::Stall(
                Duration::from_secs(constants::HANDSHAKE_TIMEOUT_SECS),
                "transport (panicked)",
            ))
        }
    };

    // Both threads may have failed; report both before raising either.
    let transport_err = transport_result.err();
    let (writer_err, stats) = match writer_result {
        Ok(stats) => (None, Some(stats)),
        Err(e) => (Some(e), None),
    };
    if let Some(e) = &transport_err {
        log::error!("[transport] {}", e);
    }
    if let Some(e) = &writer_err {
        log::error!("[writer] {}", e);
    }
    if let Some(e) = transport_err {
        return Err(e);
    }
    if let Some(e) = writer_err {
        return Err(e);
    }
    let stats = stats.unwrap_or_default();
    if stats.aborted {
        // The transport thread signalled failure but returned no error; do
        // not report a clean run.
        return Err(DownloadError::Stall(
            Duration::from_secs(constants::HANDSHAKE_TIMEOUT_SECS),
            "transport (failed without error)",
        ));
    }

    record_writer.finish()?;
    Ok(DownloadStats {
        shards: stats.shards,
        records: stats.records,
        bytes: stats.bytes,
        elapsed: start_time.elapsed(),
        interrupted: stats.interrupted,
    })
}

/// Derive the resume prefix from an existing output file: the prefix after
/// the one of the last record on disk. The file length must be a whole
/// number of records; anything else means torn output and is refused.
fn resume_prefix<const N: usize>(path: &Path) -> Result<u32, DownloadError> {
    let width = PwRecord::<N>::WIDTH as u64;
    let mut file = File::open(path).map_err(|source| DbError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    let len = file.metadata().map_err(DbError::Io)?.len();
    if len % width != 0 {
        return Err(DbError::format(
            path,
            format!("length {} is not a multiple of the record width {}", len, width),
        )
        .into());
    }
    if len == 0 {
        return Ok(0);
    }
    file.seek(SeekFrom::End(-(width as i64))).map_err(DbError::Io)?;
    let mut buf = vec![0u8; width as usize];
    file.read_exact(&mut buf).map_err(DbError::Io)?;
    Ok(prefix20(&buf[..N]) + 1)
}
