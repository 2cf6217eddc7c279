//! Manifest command - print the manifest of a step's current inputs

use super::Context;
use crate::cli::args::StepArgs;
use crate::error::StepCacheResult;
use crate::manifest::build_manifest;

/// Execute the manifest command
pub async fn execute(args: StepArgs, ctx: &Context) -> StepCacheResult<()> {
    let step = ctx.config.step(&args.step)?;
    let manifest =
        build_manifest(step, &ctx.workdir, &[ctx.config.manifest_dir.clone()]).await?;

    println!("{}", manifest.to_json()?);
    Ok(())
}
