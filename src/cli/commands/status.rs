//! Status command - list steps with their disposition on this branch

use super::Context;
use crate::error::StepCacheResult;
use crate::step::{disposition, slugify, Disposition, StepKeys};
use console::style;

/// Execute the status command
pub async fn execute(ctx: &Context) -> StepCacheResult<()> {
    let branch = ctx.branch().await?;

    println!("{}", style("stepcache status").bold().cyan());
    println!();
    println!("  Repository: {}", ctx.config.repo_id);
    println!("  Version:    {}", ctx.config.cache_version);
    println!("  Branch:     {}", branch);
    println!("  Primary:    {}", ctx.config.primary_branch);
    println!();

    if ctx.config.steps.is_empty() {
        println!("No steps configured.");
        return Ok(());
    }

    println!("{:<24} {:<24} {:<12} KEY", "STEP", "SLUG", "DISPOSITION");
    println!("{}", "-".repeat(80));

    for (name, step) in &ctx.config.steps {
        let keys = StepKeys::resolve(name, step, &ctx.config.repo_id, &ctx.config.cache_version)?;
        let disposition = disposition(&step.branches, &branch);
        let shown = match disposition {
            Disposition::Skip => style(format!("{:<12}", disposition)).dim(),
            Disposition::AlwaysRun => style(format!("{:<12}", disposition)).yellow(),
            Disposition::Conditional => style(format!("{:<12}", disposition)).green(),
        };

        println!("{:<24} {:<24} {} {}", name, slugify(name), shown, keys.key);
    }

    println!();
    println!("Total: {} step(s)", ctx.config.steps.len());
    Ok(())
}
