//! NodeStore CLI
//!
//! Runs a storage volume and inspects its record log.
//!
//! # Commands
//!
//! - `serve` - Run a volume: I/O controller, worker pool and TCP front end
//! - `inspect` - Display record log statistics
//! - `dump` - Dump record log entries for debugging
//! - `destroy` - Write a tombstone for a key into an offline record log
//!
//! Worker processes read `NODESTORE_NODE_NAME` and `NODESTORE_LOG_DIR` once at
//! startup. With a log directory each worker logs to its own file.

mod commands;
mod logging;

use clap::{Parser, Subcommand};
use commands::serve::ServeOptions;
use commands::VolumePaths;
use logging::WorkerLogFiles;
use nodestore_server::{
    DEFAULT_COMPLETED_REQUEST_CAPACITY, DEFAULT_MAX_ACTIVE_TRANSFERS, DEFAULT_MAX_SEGMENT_SIZE,
};
use std::net::SocketAddr;
use std::path::PathBuf;

/// NodeStore storage node tools.
#[derive(Parser)]
#[command(name = "nodestore")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Directory holding one subdirectory per volume
    #[arg(global = true, short, long, default_value = ".")]
    data_dir: PathBuf,

    /// Volume name
    #[arg(global = true, long, default_value = "default")]
    volume: String,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a volume until Ctrl-C
    Serve {
        /// Address to listen on
        #[arg(short, long, default_value = "127.0.0.1:7400")]
        listen: SocketAddr,

        /// Number of I/O workers
        #[arg(short, long, default_value = "4")]
        workers: u32,

        /// Largest number of queued I/O requests
        #[arg(long, default_value = "1024")]
        max_pending: usize,

        /// Finished request-ids remembered for duplicate detection
        #[arg(long, default_value_t = DEFAULT_COMPLETED_REQUEST_CAPACITY)]
        completed_capacity: usize,

        /// Transfers followed at once before the idlest is dropped
        #[arg(long, default_value_t = DEFAULT_MAX_ACTIVE_TRANSFERS)]
        max_active: usize,

        /// Largest accepted segment payload in bytes
        #[arg(long, default_value_t = DEFAULT_MAX_SEGMENT_SIZE)]
        max_segment_size: usize,
    },

    /// Display record log statistics
    Inspect {
        /// Show per-key details
        #[arg(short, long)]
        keys: bool,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Dump record log entries for debugging
    Dump {
        /// Maximum number of entries to dump
        #[arg(short, long)]
        limit: Option<usize>,

        /// Start from this log offset
        #[arg(short, long, default_value = "0")]
        offset: u64,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Write a tombstone for a key into an offline record log
    Destroy {
        /// Key to destroy
        key: String,

        /// Tombstone timestamp (defaults to now, in Unix seconds)
        #[arg(short, long)]
        timestamp: Option<u64>,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let paths = VolumePaths::new(&cli.data_dir, &cli.volume);

    match cli.command {
        Commands::Serve {
            listen,
            workers,
            max_pending,
            completed_capacity,
            max_active,
            max_segment_size,
        } => {
            let configs = commands::serve::worker_configs(&cli.volume, workers);
            logging::init(cli.verbose, WorkerLogFiles::open(&configs)?);
            let options = ServeOptions {
                volume: cli.volume,
                data_dir: cli.data_dir,
                listen,
                max_pending,
                completed_capacity,
                max_active,
                max_segment_size,
            };
            let exit_code = commands::serve::run(options, configs)?;
            if exit_code != 0 {
                std::process::exit(exit_code);
            }
        }
        Commands::Inspect { keys, format } => {
            logging::init(cli.verbose, WorkerLogFiles::default());
            commands::inspect::run(&paths, &cli.volume, keys, &format)?;
        }
        Commands::Dump {
            limit,
            offset,
            format,
        } => {
            logging::init(cli.verbose, WorkerLogFiles::default());
            commands::dump::run(&paths, limit, offset, &format)?;
        }
        Commands::Destroy { key, timestamp } => {
            logging::init(cli.verbose, WorkerLogFiles::default());
            commands::destroy::run(&paths, &key, timestamp)?;
        }
        Commands::Version => {
            println!("NodeStore CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
