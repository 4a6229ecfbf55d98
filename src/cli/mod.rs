use anyhow::Result;
use clap::{Parser, Subcommand};

// CLI Commands (cmd_ prefix)
mod cmd_check;
mod cmd_convert;
mod cmd_download;
mod cmd_server;

// Helper modules
mod logger;
mod progress;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(name = "hibpdb")]
#[command(version = VERSION)]
#[command(about = concat!("hibpdb v", env!("CARGO_PKG_VERSION"), " - Have I Been Pwned breach database"))]
#[command(long_about = concat!(
    "hibpdb v", env!("CARGO_PKG_VERSION"), " - Have I Been Pwned breach database\n\n",
    "Downloads the HIBP range dataset into a sorted binary flat file and\n",
    "answers breach lookups over a CLI and an HTTP API."
))]
#[command(propagate_version = true)]
struct Cli {
    /// Suppress progress output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    Download(cmd_download::DownloadCommand),
    Server(cmd_server::ServerCommand),
    Check(cmd_check::CheckCommand),
    Convert(cmd_convert::ConvertCommand),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    logger::init_logger(cli.verbose, cli.quiet);

    match cli.command {
        Commands::Download(cmd) => cmd_download::run(cmd, cli.quiet)?,
        Commands::Server(cmd) => cmd_server::run(cmd)?,
        Commands::Check(cmd) => cmd_check::run(cmd, cli.quiet)?,
        Commands::Convert(cmd) => cmd_convert::run(cmd, cli.quiet)?,
    }

    Ok(())
}
