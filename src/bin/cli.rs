//! LodeKV CLI
//!
//! Command-line interface for inspecting and editing a local LodeKV directory.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use lodekv::{Engine, IteratorMode, Options};
use tracing_subscriber::{fmt, EnvFilter};

/// LodeKV CLI
#[derive(Parser, Debug)]
#[command(name = "lodekv")]
#[command(about = "CLI for a local LodeKV engine directory")]
#[command(version)]
struct Args {
    /// Engine directory
    #[arg(short, long, default_value = "./lodekv_data")]
    data_dir: PathBuf,

    /// Run flushes and compactions on the calling thread
    #[arg(long)]
    no_background: bool,

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
    Set {
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

    /// Print key-value pairs in order
    Scan {
        /// Start from this key instead of the first
        #[arg(long)]
        from: Option<String>,

        /// Iterate from the end backwards
        #[arg(long)]
        reverse: bool,

        /// Stop after this many pairs
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Flush the memtable to an SSTable
    Flush,

    /// Merge every table into the bottom level
    Compact,

    /// Create a backup under the given directory
    Backup {
        backup_dir: PathBuf,

        /// Keep only this many newest backups afterwards
        #[arg(long)]
        keep: Option<usize>,
    },

    /// Restore the newest backup into the data directory
    Restore { backup_dir: PathBuf },

    /// Delete every engine file in the data directory
    Destroy,

    /// Print engine statistics
    Stats,
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,lodekv=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    tracing::debug!("LodeKV CLI v{}", lodekv::VERSION);

    if let Err(e) = run(args) {
        tracing::error!("{}", e);
        process::exit(1);
    }
}

fn run(args: Args) -> lodekv::Result<()> {
    let options = Options::builder().background_jobs(!args.no_background).build();

    match &args.command {
        Commands::Restore { backup_dir } => {
            let info = Engine::restore_latest_backup(backup_dir, &args.data_dir)?;
            println!(
                "restored backup {} ({} files, {} bytes)",
                info.id, info.num_files, info.size
            );
            return Ok(());
        }
        Commands::Destroy => {
            Engine::destroy(&args.data_dir, &options)?;
            println!("destroyed {}", args.data_dir.display());
            return Ok(());
        }
        _ => {}
    }

    let engine = Engine::open(&args.data_dir, options)?;
    match args.command {
        Commands::Get { key } => match engine.get(&key)? {
            Some(value) => println!("{}", String::from_utf8_lossy(&value)),
            None => println!("(nil)"),
        },
        Commands::Set { key, value } => {
            engine.set(&key, &value)?;
            println!("OK");
        }
        Commands::Del { key } => {
            engine.delete(&key)?;
            println!("OK");
        }
        Commands::Scan { from, reverse, limit } => {
            let direction = if reverse {
                lodekv::Direction::Reverse
            } else {
                lodekv::Direction::Forward
            };
            let mode = match (&from, reverse) {
                (Some(key), _) => IteratorMode::From(key.as_bytes(), direction),
                (None, false) => IteratorMode::Start,
                (None, true) => IteratorMode::End,
            };
            let mut iter = engine.iterator(mode)?;
            let mut printed = 0;
            while limit.map_or(true, |l| printed < l) {
                let Some(pair) = iter.next() else {
                    break;
                };
                let (key, value) = pair?;
                println!(
                    "{} = {}",
                    String::from_utf8_lossy(&key),
                    String::from_utf8_lossy(&value)
                );
                printed += 1;
            }
        }
        Commands::Flush => {
            engine.flush()?;
            println!("OK");
        }
        Commands::Compact => match engine.compact_all()? {
            Some(stats) => println!(
                "compacted {} tables into {} ({} entries written, {} versions dropped)",
                stats.input_tables, stats.output_tables, stats.entries_written, stats.versions_dropped
            ),
            None => println!("nothing to compact"),
        },
        Commands::Backup { backup_dir, keep } => {
            let info = engine.create_backup(&backup_dir)?;
            println!(
                "created backup {} ({} files, {} bytes)",
                info.id, info.num_files, info.size
            );
            if let Some(keep) = keep {
                let purged = lodekv::BackupEngine::open(&backup_dir)?.purge_old_backups(keep)?;
                println!("purged {} old backups", purged);
            }
        }
        Commands::Stats => {
            let stats = engine.stats()?;
            println!("last_sequence:       {}", stats.last_sequence);
            println!("manifest_version:    {}", stats.manifest_version);
            println!("memtable_bytes:      {}", stats.memtable_bytes);
            println!("immutable_memtables: {}", stats.immutable_memtables);
            for (level, (tables, bytes)) in stats
                .tables_per_level
                .iter()
                .zip(&stats.bytes_per_level)
                .enumerate()
            {
                if *tables > 0 {
                    println!("L{}: {} tables, {} bytes", level, tables, bytes);
                }
            }
        }
        Commands::Restore { .. } | Commands::Destroy => {}
    }

    engine.close()
}
