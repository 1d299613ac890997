//! bloomkv CLI - command line access to a bloomkv store file
//!
//! Every invocation opens the store, runs one operation against the selected
//! bucket and exits.

use anyhow::{Context, Result};
use bloomkv_common::Config;
use bloomkv_store::{StorageBackend, StoreError};
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;
use tracing::debug;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "bloomkv-cli")]
#[command(about = "bloomkv store CLI")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "bloomkv.toml")]
    config: PathBuf,

    /// Store file (overrides [store].path)
    #[arg(long, env = "BLOOMKV_DB")]
    db: Option<PathBuf>,

    /// Bucket to operate on (overrides [store].bucket)
    #[arg(short, long)]
    bucket: Option<String>,

    /// Log level (overrides [logging].level)
    #[arg(long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create the store file and the bucket if they do not exist
    Init,
    #[command(flatten)]
    Op(Operation),
}

/// Commands that run against an opened store
#[derive(Subcommand, Debug)]
enum Operation {
    /// Print the value of a key
    Get { key: String },
    /// Store a value unconditionally
    Set { key: String, value: String },
    /// Store a value only if the key is absent
    Add { key: String, value: String },
    /// Store a value only if the key is present
    Replace { key: String, value: String },
    /// Delete a key
    Delete {
        key: String,
        /// Report "not deleted" instead of succeeding when the key is absent
        #[arg(long)]
        only_if_exists: bool,
    },
    /// Increment a numeric value
    Incr {
        key: String,
        #[arg(default_value = "1")]
        delta: u64,
        /// Create the key when it does not exist
        #[arg(long)]
        create: bool,
    },
    /// Decrement a numeric value (stops at zero)
    Decr {
        key: String,
        #[arg(default_value = "1")]
        delta: u64,
        /// Create the key when it does not exist
        #[arg(long)]
        create: bool,
    },
    /// Drop every key of the bucket
    Flush,
    /// Print backend statistics as JSON
    Stats,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = Config::load(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    if let Some(db) = args.db {
        config.store.path = db;
    }
    if let Some(bucket) = args.bucket {
        config.store.bucket = bucket;
    }
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }
    config.validate()?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    debug!("Using store {} bucket '{}'", config.store.path.display(), config.store.bucket);

    run(&config, args.command)
}

fn run(config: &Config, command: Commands) -> Result<()> {
    match command {
        Commands::Init => {
            StorageBackend::create_bucket(&config.store.path, &config.store.bucket)?;
            println!("OK");
        }
        Commands::Op(op) => {
            let backend = StorageBackend::from_config(config).with_context(|| {
                format!(
                    "opening {} (run `bloomkv-cli init` to create bucket '{}')",
                    config.store.path.display(),
                    config.store.bucket
                )
            })?;
            execute(&backend, op)?;
            backend.close();
        }
    }
    Ok(())
}

fn execute(backend: &StorageBackend, op: Operation) -> Result<()> {
    match op {
        Operation::Get { key } => match backend.get(key.as_bytes())? {
            Some(value) => {
                let mut out = std::io::stdout().lock();
                out.write_all(&value)?;
                out.write_all(b"\n")?;
            }
            None => println!("(not found)"),
        },
        Operation::Set { key, value } => {
            backend.set(key.as_bytes(), value.as_bytes())?;
            println!("STORED");
        }
        Operation::Add { key, value } => {
            report_store(backend.add(key.as_bytes(), value.as_bytes()))?;
        }
        Operation::Replace { key, value } => {
            report_store(backend.replace(key.as_bytes(), value.as_bytes()))?;
        }
        Operation::Delete {
            key,
            only_if_exists,
        } => {
            if backend.delete(key.as_bytes(), only_if_exists)? {
                println!("DELETED");
            } else {
                println!("NOT_FOUND");
            }
        }
        Operation::Incr { key, delta, create } => {
            println!("{}", backend.increment(key.as_bytes(), delta, create)?);
        }
        Operation::Decr { key, delta, create } => {
            println!("{}", backend.decrement(key.as_bytes(), delta, create)?);
        }
        Operation::Flush => {
            backend.flush()?;
            println!("OK");
        }
        Operation::Stats => {
            println!("{}", serde_json::to_string_pretty(&backend.stats()?)?);
        }
    }
    Ok(())
}

/// Precondition failures of add/replace are answers, not errors.
fn report_store(result: Result<(), StoreError>) -> Result<()> {
    match result {
        Ok(()) => println!("STORED"),
        Err(StoreError::KeyExists { .. } | StoreError::KeyNotFound { .. }) => {
            println!("NOT_STORED");
        }
        Err(e) => return Err(e.into()),
    }
    Ok(())
}
