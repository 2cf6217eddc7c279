//! CLI argument definitions using clap derive

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// stepcache - skip CI build steps whose inputs have not changed
///
/// Each step declares a command, its input files and its outputs. When the
/// inputs match a cached run, the outputs are restored instead of running
/// the command again.
#[derive(Parser, Debug)]
#[command(name = "stepcache")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file path
    #[arg(short, long, global = true, env = "STEPCACHE_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a step unless its cached outputs can be restored
    RunIfNeeded(StepArgs),

    /// Print a step's cache key
    Key(StepArgs),

    /// Print the manifest of a step's current inputs
    Manifest(StepArgs),

    /// Show every step with its disposition on the current branch
    Status,

    /// Inspect and clean up the cache store
    Cache(CacheArgs),
}

/// Arguments for commands acting on one step
#[derive(Parser, Debug)]
pub struct StepArgs {
    /// Step name as declared in the config
    pub step: String,
}

/// Output format for listings
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table
    Table,
    /// JSON output
    Json,
    /// Simple text (one per line)
    Plain,
}

/// Arguments for the cache command
#[derive(Parser, Debug)]
pub struct CacheArgs {
    /// Subcommand for cache
    #[command(subcommand)]
    pub action: CacheAction,
}

/// Cache subcommands
#[derive(Subcommand, Debug)]
pub enum CacheAction {
    /// List stored objects
    List {
        /// Output format
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },

    /// Delete this repository's objects that no configured step uses
    Prune {
        /// Dry run - show what would be removed
        #[arg(long)]
        dry_run: bool,
    },

    /// Delete one object
    Delete {
        /// Object key
        key: String,
    },
}
