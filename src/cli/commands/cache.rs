//! Cache command - inspect and clean up the cache store

use super::Context;
use crate::cli::args::{CacheAction, CacheArgs, OutputFormat};
use crate::error::StepCacheResult;
use crate::store::{CacheStore, ObjectInfo};
use crate::ui::format_size;
use console::style;
use std::collections::HashSet;
use tracing::debug;

/// Suffixes of objects written by `run-if-needed`
const OBJECT_SUFFIXES: [&str; 3] = ["-manifest.json", "-artifacts.tar.gz", "-caches.tar.gz"];

/// Execute the cache command
pub async fn execute(args: CacheArgs, ctx: &Context) -> StepCacheResult<()> {
    let store = ctx.store()?;
    debug!("Using {} cache store", store.backend_name());

    match args.action {
        CacheAction::List { format } => list_objects(store.as_ref(), format).await,
        CacheAction::Prune { dry_run } => prune(store.as_ref(), ctx, dry_run).await,
        CacheAction::Delete { key } => {
            store.delete_object(&key).await?;
            println!("{} Deleted {}", style("✓").green(), key);
            Ok(())
        }
    }
}

async fn list_objects(store: &dyn CacheStore, format: OutputFormat) -> StepCacheResult<()> {
    let objects = store.list_objects().await?;

    match format {
        OutputFormat::Table => print_object_table(&objects),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&objects)?),
        OutputFormat::Plain => {
            for object in &objects {
                println!("{}", object.key);
            }
        }
    }
    Ok(())
}

fn print_object_table(objects: &[ObjectInfo]) {
    if objects.is_empty() {
        println!("No cached objects found.");
        return;
    }

    println!("{:<100} {:>10}", "KEY", "SIZE");
    println!("{}", "-".repeat(111));
    for object in objects {
        println!("{:<100} {:>10}", object.key, format_size(object.size));
    }

    let total: u64 = objects.iter().map(|o| o.size).sum();
    println!();
    println!("Total: {} object(s), {}", objects.len(), format_size(total));
}

async fn prune(store: &dyn CacheStore, ctx: &Context, dry_run: bool) -> StepCacheResult<()> {
    let objects = store.list_objects().await?;
    let live = ctx.live_keys()?;
    let stale = prune_candidates(&objects, &ctx.config.repo_id, &live);

    if stale.is_empty() {
        println!("No stale objects for {}.", ctx.config.repo_id);
        return Ok(());
    }

    let freed: u64 = stale.iter().map(|o| o.size).sum();
    if dry_run {
        println!("Would remove {} object(s) ({}):", stale.len(), format_size(freed));
        for object in &stale {
            println!("  {}", object.key);
        }
        return Ok(());
    }

    for object in &stale {
        store.delete_object(&object.key).await?;
        println!("  {} Removed {}", style("✓").green(), object.key);
    }
    println!();
    println!("Removed {} object(s), freed {}", stale.len(), format_size(freed));
    Ok(())
}

/// Objects of `repo_id` that no configured step addresses any more
fn prune_candidates<'a>(
    objects: &'a [ObjectInfo],
    repo_id: &str,
    live: &HashSet<String>,
) -> Vec<&'a ObjectInfo> {
    let prefix = format!("{}-", repo_id);
    objects
        .iter()
        .filter(|o| o.key.starts_with(&prefix))
        .filter(|o| OBJECT_SUFFIXES.iter().any(|s| o.key.ends_with(s)))
        .filter(|o| !live.contains(&o.key))
        .collect()
}
