//! Key command - print a step's cache key

use super::Context;
use crate::cli::args::StepArgs;
use crate::error::StepCacheResult;
use crate::step::StepKeys;

/// Execute the key command
pub async fn execute(args: StepArgs, ctx: &Context) -> StepCacheResult<()> {
    let step = ctx.config.step(&args.step)?;
    let keys = StepKeys::resolve(
        &args.step,
        step,
        &ctx.config.repo_id,
        &ctx.config.cache_version,
    )?;

    println!("{}", keys.key);
    Ok(())
}
