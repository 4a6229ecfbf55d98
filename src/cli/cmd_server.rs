// Server command - start the HTTP lookup server
use anyhow::Result;
use clap::Args;
use hibpdb::constants;
use hibpdb::lookup::BackendPaths;
use hibpdb::server::{self, ServerConfig};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Args)]
#[command(
    about = "Start the HTTP lookup server",
    long_about = "Start an HTTP server answering breach lookups at
/check/<backend>/<query>. Backends are binary databases produced by
'download' or 'convert' (--sha1-db, --ntlm-db, --sha1t64-db) and prebuilt
binary-fuse filters (--binfuse8-filter, --binfuse16-filter). At least one
backend must be configured; every file is opened and validated before the
listener starts."
)]
pub struct ServerCommand {
    /// SHA-1 database, used for /check/sha1/... and /check/plain/...
    #[arg(long, value_name = "PATH")]
    pub sha1_db: Option<PathBuf>,

    /// NTLM database, used for /check/ntlm/...
    #[arg(long, value_name = "PATH")]
    pub ntlm_db: Option<PathBuf>,

    /// Truncated-SHA1 database, used for /check/sha1t64/...
    #[arg(long, value_name = "PATH")]
    pub sha1t64_db: Option<PathBuf>,

    /// Binary fuse8 filter file, used for /check/binfuse8/...
    #[arg(long, value_name = "PATH")]
    pub binfuse8_filter: Option<PathBuf>,

    /// Binary fuse16 filter file, used for /check/binfuse16/...
    #[arg(long, value_name = "PATH")]
    pub binfuse16_filter: Option<PathBuf>,

    /// The IPv4 address the server binds to
    #[arg(long, default_value = constants::DEFAULT_BIND_ADDRESS)]
    pub bind_address: String,

    /// The port the server binds to
    #[arg(long, default_value_t = constants::DEFAULT_PORT)]
    pub port: u16,

    /// Worker threads (default: one per CPU)
    #[arg(long)]
    pub threads: Option<usize>,

    /// Respond with JSON bodies instead of plain text
    #[arg(long)]
    pub json: bool,

    /// Perturb every query to defeat the cache (benchmarking only; the
    /// results are wrong)
    #[arg(long)]
    pub perf_test: bool,

    /// Build or load a table of contents per database for faster lookups
    #[arg(long)]
    pub toc: bool,

    /// TOC prefix width in bits
    #[arg(long, default_value_t = constants::DEFAULT_TOC_BITS,
          value_parser = clap::value_parser!(u8).range(constants::TOC_BITS_MIN as i64..=constants::TOC_BITS_MAX as i64))]
    pub toc_bits: u8,

    /// Result cache bound, in entries
    #[arg(long, default_value_t = constants::DEFAULT_CACHE_CAPACITY)]
    pub cache_capacity: usize,

    /// Per-request timeout in seconds
    #[arg(long, default_value_t = constants::REQUEST_TIMEOUT_SECS)]
    pub request_timeout: u64,
}

pub fn run(cmd: ServerCommand) -> Result<()> {
    let paths = BackendPaths {
        sha1_db: cmd.sha1_db,
        ntlm_db: cmd.ntlm_db,
        sha1t64_db: cmd.sha1t64_db,
        binfuse8_filter: cmd.binfuse8_filter,
        binfuse16_filter: cmd.binfuse16_filter,
    };
    if !paths.any_configured() {
        eprintln!(
            "error: no backend configured; pass at least one of --sha1-db, --ntlm-db, \
             --sha1t64-db, --binfuse8-filter, --binfuse16-filter"
        );
        std::process::exit(2);
    }

    let threads = cmd
        .threads
        .unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        })
        .max(1);

    let config = ServerConfig {
        bind_address: cmd.bind_address,
        port: cmd.port,
        threads,
        json: cmd.json,
        perf_test: cmd.perf_test,
        toc: cmd.toc,
        toc_bits: cmd.toc_bits,
        cache_capacity: cmd.cache_capacity,
        request_timeout: Duration::from_secs(cmd.request_timeout),
    };

    // TOC builds happen here, before any request is accepted; the cost is
    // paid once and the tables stay resident for the process lifetime.
    let backends = server::prepare_backends(&paths, &config)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(threads)
        .enable_all()
        .build()?;
    runtime.block_on(server::serve(backends, config))
}
