// Download command - build a binary database from the range API
use super::progress::DownloadProgress;
use anyhow::Result;
use clap::Args;
use hibpdb::constants;
use hibpdb::download::{self, DownloadConfig};
use hibpdb::format::{format_bytes, format_bytes_per_sec, format_duration_compact, format_number};
use std::path::PathBuf;

fn parse_prefix(s: &str) -> Result<u32, String> {
    let value = u32::from_str_radix(s.trim_start_matches("0x"), 16)
        .map_err(|e| format!("not a hex prefix: {}", e))?;
    if value > constants::PREFIX_SPACE {
        return Err(format!("prefix bound above {:X}", constants::PREFIX_SPACE));
    }
    Ok(value)
}

#[derive(Args)]
#[command(about = "Download the breach corpus into a sorted binary database")]
pub struct DownloadCommand {
    /// Output database file
    #[arg(long, short = 'o')]
    pub output: PathBuf,

    /// Maximum concurrent range fetches
    #[arg(long, default_value_t = constants::DEFAULT_PARALLEL_MAX)]
    pub parallel_max: usize,

    /// Exclusive upper prefix bound, in hex (default: the whole range)
    #[arg(long, value_parser = parse_prefix, default_value = "100000")]
    pub prefix_limit: u32,

    /// Resume an interrupted download from the existing output file
    #[arg(long)]
    pub resume: bool,

    /// Show a progress bar on stderr
    #[arg(long)]
    pub progress: bool,

    /// Fetch NTLM hashes instead of SHA-1
    #[arg(long)]
    pub ntlm: bool,

    /// Base URL of the range API
    #[arg(long, default_value = constants::DEFAULT_RANGE_URL, hide = true)]
    pub api_url: String,
}

pub fn run(cmd: DownloadCommand, quiet: bool) -> Result<()> {
    let config = DownloadConfig {
        output: cmd.output,
        base_url: cmd.api_url,
        parallel_max: cmd.parallel_max.max(1),
        prefix_limit: cmd.prefix_limit,
        resume: cmd.resume,
        ntlm: cmd.ntlm,
        handle_signals: true,
    };

    let bar = (cmd.progress && !quiet).then(|| {
        // total is unknown on resume until the pipeline derives the start
        // prefix; the bar tracks shards written this run
        DownloadProgress::new(u64::from(config.prefix_limit))
    });
    let mut update = |shards: u64, _records: u64, bytes: u64| {
        if let Some(bar) = &bar {
            bar.update(shards, bytes);
        }
    };

    let stats = download::run(&config, Some(&mut update))?;
    if let Some(bar) = &bar {
        bar.finish();
    }

    if !quiet {
        let secs = stats.elapsed.as_secs_f64().max(0.001);
        eprintln!(
            "[Download] {} {} shards | {} records | {} | {} | {}",
            if stats.interrupted { "interrupted after" } else { "fetched" },
            format_number(stats.shards),
            format_number(stats.records),
            format_bytes(stats.bytes),
            format_bytes_per_sec(stats.bytes as f64 / secs),
            format_duration_compact(stats.elapsed)
        );
        if stats.interrupted {
            eprintln!("[Download] rerun with --resume to continue");
        }
    }
    Ok(())
}
