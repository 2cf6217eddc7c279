//! Branch filtering
//!
//! `never` and `only` are evaluated before `always`: a branch excluded by
//! either is skipped even when `always` also names it.

use crate::config::{BranchRules, Environment};
use crate::error::{StepCacheError, StepCacheResult};
use std::fmt;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

/// What to do with a step on the current branch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Don't run the step at all
    Skip,
    /// Run the step even if its inputs are unchanged
    AlwaysRun,
    /// Run the step only if its inputs changed or nothing is cached
    Conditional,
}

impl fmt::Display for Disposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Skip => "skip",
            Self::AlwaysRun => "always-run",
            Self::Conditional => "conditional",
        };
        write!(f, "{}", name)
    }
}

/// Decide a step's disposition on `branch`
pub fn disposition(rules: &BranchRules, branch: &str) -> Disposition {
    let named = |list: &[String]| list.iter().any(|b| b == branch);

    let excluded_by_only = rules.only.as_deref().is_some_and(|only| !named(only));
    if named(&rules.never) || excluded_by_only {
        return Disposition::Skip;
    }

    if named(&rules.always) {
        return Disposition::AlwaysRun;
    }

    Disposition::Conditional
}

/// Resolve the current branch: config override, then CI variables, then git
pub async fn resolve_current_branch(
    override_branch: Option<&str>,
    env: &Environment,
    workdir: &Path,
) -> StepCacheResult<String> {
    if let Some(branch) = override_branch.filter(|b| !b.is_empty()) {
        debug!("Using configured branch {}", branch);
        return Ok(branch.to_string());
    }

    if let Some(branch) = env.ci_branch() {
        debug!("Using CI branch {}", branch);
        return Ok(branch.to_string());
    }

    git_current_branch(workdir).await
}

async fn git_current_branch(workdir: &Path) -> StepCacheResult<String> {
    let output = Command::new("git")
        .args(["rev-parse", "--abbrev-ref", "HEAD"])
        .current_dir(workdir)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| StepCacheError::BranchUnresolved(format!("failed to run git: {}", e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(StepCacheError::BranchUnresolved(stderr.trim().to_string()));
    }

    let branch = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if branch.is_empty() {
        return Err(StepCacheError::BranchUnresolved(
            "git reported an empty branch name".to_string(),
        ));
    }

    debug!("Using git branch {}", branch);
    Ok(branch)
}
