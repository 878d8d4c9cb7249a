//! StrataKV CLI
//!
//! Maintenance tool operating directly on a local data directory.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use stratakv::{Config, Engine, Result};
use tracing_subscriber::{fmt, EnvFilter};

/// StrataKV CLI
#[derive(Parser, Debug)]
#[command(name = "stratakv-cli")]
#[command(about = "Inspect and maintain a StrataKV data directory")]
#[command(version)]
struct Args {
    /// Data directory
    #[arg(short, long, default_value = "./stratakv_data")]
    data_dir: PathBuf,

    /// MemTable size limit in MB before flush
    #[arg(short = 'm', long, default_value = "64")]
    memtable_mb: usize,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Get a value by key
    Get {
        /// The key to get
        key: String,
    },

    /// Set a key-value pair
    Put {
        /// The key to set
        key: String,

        /// The value to set
        value: String,
    },

    /// Delete a key
    Del {
        /// The key to delete
        key: String,
    },

    /// Print live entries in [from, to)
    Scan {
        /// Inclusive lower bound
        #[arg(long)]
        from: Option<String>,

        /// Exclusive upper bound
        #[arg(long)]
        to: Option<String>,

        /// Stop after this many entries
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Write the memtable to an SSTable
    Flush,

    /// Merge all SSTables into one
    Compact,

    /// Show engine statistics
    Stats,
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,stratakv=info"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config = Config::builder()
        .data_dir(&args.data_dir)
        .memtable_size_limit(args.memtable_mb * 1024 * 1024)
        .build();

    let engine = match Engine::open(config) {
        Ok(e) => e,
        Err(e) => {
            tracing::error!("Failed to open engine: {}", e);
            process::exit(1);
        }
    };

    let outcome = execute(&engine, args.command).and_then(|_| engine.close());
    if let Err(e) = outcome {
        tracing::error!("{}", e);
        process::exit(1);
    }
}

fn execute(engine: &Engine, command: Commands) -> Result<()> {
    match command {
        Commands::Get { key } => match engine.get(key.as_bytes())? {
            Some(value) => println!("{}", String::from_utf8_lossy(&value)),
            None => println!("(nil)"),
        },
        Commands::Put { key, value } => {
            engine.put(key.as_bytes(), value.as_bytes())?;
            println!("OK");
        }
        Commands::Del { key } => {
            engine.delete(key.as_bytes())?;
            println!("OK");
        }
        Commands::Scan { from, to, limit } => {
            let scan = engine.range(
                from.as_deref().map(str::as_bytes),
                to.as_deref().map(str::as_bytes),
            )?;
            for entry in scan.take(limit.unwrap_or(usize::MAX)) {
                let value = entry.value().map(|v| v.to_vec()).unwrap_or_default();
                println!(
                    "{}\t{}",
                    String::from_utf8_lossy(entry.key()),
                    String::from_utf8_lossy(&value)
                );
            }
        }
        Commands::Flush => {
            let written = engine.flush()?;
            println!("{}", if written { "flushed" } else { "nothing to flush" });
        }
        Commands::Compact => {
            let compacted = engine.compact()?;
            println!("{}", if compacted { "compacted" } else { "nothing to compact" });
        }
        Commands::Stats => {
            println!("version:        {}", stratakv::VERSION);
            println!("data dir:       {}", engine.data_dir().display());
            println!("sstables:       {}", engine.sstable_count());
            println!("memtable bytes: {}", engine.memtable_size());
            println!("memtable keys:  {}", engine.memtable_entry_count());
            println!("pending flush:  {}", engine.has_pending_flush());
        }
    }
    Ok(())
}
