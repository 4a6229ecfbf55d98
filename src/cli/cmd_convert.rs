// Convert command - derive secondary lookup artifacts from a SHA-1 database
use anyhow::{Context, Result};
use clap::Args;
use hibpdb::filter::{FuseFilter16, FuseFilter8};
use hibpdb::flat_file::{RecordWriter, Sha1Db};
use hibpdb::format::format_number;
use hibpdb::record::{key64, Sha1t64Record};
use std::path::PathBuf;

#[derive(Args)]
#[command(
    about = "Derive truncated databases and fuse filters from a SHA-1 database",
    long_about = "Stream a sorted SHA-1 database and derive smaller lookup
artifacts from it: a truncated 64-bit database (--sha1t64) and sharded
binary-fuse filter files (--binfuse8 / --binfuse16). Hashes that collide
after truncation are merged into one record with their counts summed."
)]
pub struct ConvertCommand {
    /// Source SHA-1 database
    #[arg(long, value_name = "PATH")]
    pub from: PathBuf,

    /// Write a truncated-SHA1 (64-bit) database here
    #[arg(long, value_name = "PATH")]
    pub sha1t64: Option<PathBuf>,

    /// Write a binary fuse8 filter file here
    #[arg(long, value_name = "PATH")]
    pub binfuse8: Option<PathBuf>,

    /// Write a binary fuse16 filter file here
    #[arg(long, value_name = "PATH")]
    pub binfuse16: Option<PathBuf>,
}

pub fn run(cmd: ConvertCommand, quiet: bool) -> Result<()> {
    if cmd.sha1t64.is_none() && cmd.binfuse8.is_none() && cmd.binfuse16.is_none() {
        eprintln!("error: pass at least one of --sha1t64, --binfuse8, --binfuse16");
        std::process::exit(2);
    }

    let db = Sha1Db::open(&cmd.from)?;
    if !quiet {
        eprintln!(
            "[Convert] source {} ({} records)",
            cmd.from.display(),
            format_number(db.len())
        );
    }

    if let Some(out) = &cmd.sha1t64 {
        let mut writer = RecordWriter::<8>::create(out)?;
        let mut pending: Option<Sha1t64Record> = None;
        for record in db.records() {
            let mut hash = [0u8; 8];
            hash.copy_from_slice(&record.hash[..8]);
            match pending.as_mut() {
                // Truncation can collide; merged records keep the summed
                // count, capped to the signed-32 on-disk range.
                Some(prev) if prev.hash == hash => {
                    prev.count = prev
                        .count
                        .saturating_add(record.count)
                        .min(i32::MAX as u32);
                }
                _ => {
                    if let Some(prev) = pending.take() {
                        writer.push(&prev)?;
                    }
                    pending = Some(Sha1t64Record::new(hash, record.count));
                }
            }
        }
        if let Some(prev) = pending.take() {
            writer.push(&prev)?;
        }
        let written = writer.finish()?;
        if !quiet {
            eprintln!(
                "[Convert] wrote {} ({} records)",
                out.display(),
                format_number(written)
            );
        }
    }

    if cmd.binfuse8.is_some() || cmd.binfuse16.is_some() {
        let mut keys: Vec<u64> = db.records().map(|r| key64(&r.hash)).collect();
        keys.dedup();
        if let Some(out) = &cmd.binfuse8 {
            let filter = FuseFilter8::build_from_keys(&keys).context("building fuse8 filter")?;
            filter.save(out)?;
            if !quiet {
                eprintln!("[Convert] wrote {} ({} keys)", out.display(), format_number(keys.len()));
            }
        }
        if let Some(out) = &cmd.binfuse16 {
            let filter = FuseFilter16::build_from_keys(&keys).context("building fuse16 filter")?;
            filter.save(out)?;
            if !quiet {
                eprintln!("[Convert] wrote {} ({} keys)", out.display(), format_number(keys.len()));
            }
        }
    }

    Ok(())
}
