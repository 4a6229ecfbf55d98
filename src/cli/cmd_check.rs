// Check command - one-shot local lookup against a database file
use anyhow::Result;
use clap::Args;
use hibpdb::flat_file::Sha1Db;
use hibpdb::record::encode_hex;
use sha1::{Digest, Sha1};
use std::path::PathBuf;
use std::time::Instant;

#[derive(Args)]
#[command(about = "Check a password against a local SHA-1 database")]
pub struct CheckCommand {
    /// SHA-1 database file
    #[arg(long, value_name = "PATH")]
    pub sha1_db: PathBuf,

    /// Password to check
    pub password: String,
}

pub fn run(cmd: CheckCommand, quiet: bool) -> Result<()> {
    let db = Sha1Db::open(&cmd.sha1_db)?;

    let mut hasher = Sha1::new();
    hasher.update(cmd.password.as_bytes());
    let needle: [u8; 20] = hasher.finalize().into();

    let search_start = Instant::now();
    let result = db.lookup(&needle);
    let elapsed = search_start.elapsed();

    if !quiet {
        eprintln!("needle = {}", encode_hex(&needle));
        eprintln!("search took {:?}", elapsed);
    }
    match result {
        Some(count) => println!("{}:{}", encode_hex(&needle), count),
        None => println!("not found"),
    }
    Ok(())
}
