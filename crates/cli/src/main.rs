//! permrs CLI
//!
//! Usage:
//!   permrs --data perms.toml check 8f14e45f-ceea-467f-a0e6-35b7e4a5e2b1 cmd.ban --server lobby
//!   permrs --data perms.toml prefix group:admin --debug
//!   permrs --data perms.toml --json list group:admin

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use permrs_core::{EngineConfig, PermissionEngine};
use permrs_store::{Dataset, MemoryStore};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TOML dataset of groups and users
    #[arg(short, long)]
    data: PathBuf,

    /// Engine config file (defaults are used when omitted)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

/// Scope arguments shared by permission queries
#[derive(clap::Args, Debug, Clone, Default)]
pub struct ScopeArgs {
    #[arg(short, long)]
    pub server: Option<String>,

    /// Requires --server
    #[arg(short, long)]
    pub world: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Resolve one permission
    Check {
        /// Player UUID, `user:<uuid>` or `group:<name>`
        entity: String,
        permission: String,
        #[command(flatten)]
        scope: ScopeArgs,
        /// Print the resolution tree
        #[arg(long)]
        debug: bool,
    },
    /// Evaluate a permission expression such as `cmd.ban && !cmd.stop`
    Expr {
        entity: String,
        expression: String,
        #[command(flatten)]
        scope: ScopeArgs,
    },
    /// Effective prefix
    Prefix {
        entity: String,
        #[arg(long)]
        debug: bool,
    },
    /// Effective suffix
    Suffix {
        entity: String,
        #[arg(long)]
        debug: bool,
    },
    /// Every permission with a definite answer
    List {
        entity: String,
        #[command(flatten)]
        scope: ScopeArgs,
    },
    /// Known groups and inheritance cycles
    Groups,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => EngineConfig::load_from(path)
            .with_context(|| format!("Failed to load config from {:?}", path))?,
        None => EngineConfig::default(),
    };

    let default_level = if config.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let dataset = Dataset::load(&args.data)
        .with_context(|| format!("Failed to load dataset from {:?}", args.data))?;
    let store = Arc::new(MemoryStore::from_dataset(&dataset)?);
    info!("Loaded {} rows from {:?}", store.len(), args.data);

    let engine = PermissionEngine::new(store, config);
    engine.init()?;

    commands::run(&engine, args.command, args.json)
}
