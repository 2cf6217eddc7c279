//! Run-if-needed command - the CI entry point

use super::Context;
use crate::cli::args::StepArgs;
use crate::error::StepCacheResult;
use crate::runner::Runner;
use crate::ui::Reporter;
use tracing::debug;

/// Execute the run-if-needed command
pub async fn execute(args: StepArgs, ctx: &Context) -> StepCacheResult<()> {
    // Unknown steps fail before git or the store are touched
    ctx.config.step(&args.step)?;

    let branch = ctx.branch().await?;
    debug!("Running on branch {}", branch);

    let reporter = Reporter::stdout();
    let runner = Runner::new(
        &ctx.config,
        Box::new(|| ctx.store()),
        &reporter,
        ctx.workdir.clone(),
        ctx.env.temp_root(),
        branch,
    );

    let outcome = runner.run_if_needed(&args.step).await?;
    debug!("Step '{}' finished: {:?}", args.step, outcome);
    Ok(())
}
