//! stepcache - CI build-step caching
//!
//! CLI entry point that dispatches to subcommands.

use clap::Parser;
use console::style;
use stepcache::cli::{commands, Cli, Commands, Context};
use stepcache::config::{ConfigManager, Environment};
use stepcache::error::{StepCacheError, StepCacheResult};
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("∙ ERROR ∙").red().bold(), e);
            if let Some(detail) = e.detail() {
                eprintln!("{}", detail.trim_end());
            }
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::from(e.exit_code().clamp(1, 255) as u8)
        }
    }
}

async fn run() -> StepCacheResult<()> {
    let cli = Cli::parse();

    // 0 = warn, 1 = info, 2+ = debug; stdout belongs to the step command
    let filter = match cli.verbose {
        0 => EnvFilter::new("stepcache=warn"),
        1 => EnvFilter::new("stepcache=info"),
        _ => EnvFilter::new("stepcache=debug"),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    let config_manager = match cli.config {
        Some(ref path) => ConfigManager::with_path(path.clone()),
        None => ConfigManager::new(),
    };
    let config = config_manager.load().await?;
    debug!("Loaded {} step(s) for {}", config.steps.len(), config.repo_id);

    let workdir = std::env::current_dir()
        .map_err(|e| StepCacheError::io("getting current directory", e))?;
    let ctx = Context::new(config, Environment::capture(), workdir);

    match cli.command {
        Commands::RunIfNeeded(args) => commands::run_if_needed(args, &ctx).await,
        Commands::Key(args) => commands::key(args, &ctx).await,
        Commands::Manifest(args) => commands::manifest(args, &ctx).await,
        Commands::Status => commands::status(&ctx).await,
        Commands::Cache(args) => commands::cache(args, &ctx).await,
    }
}
