//! CLI command implementations

pub mod cache;
pub mod key;
pub mod manifest;
pub mod run_if_needed;
pub mod status;

pub use cache::execute as cache;
pub use key::execute as key;
pub use manifest::execute as manifest;
pub use run_if_needed::execute as run_if_needed;
pub use status::execute as status;

use crate::config::{Config, Environment};
use crate::error::StepCacheResult;
use crate::step::{resolve_current_branch, StepKeys};
use crate::store::{create_store, CacheStore};
use std::collections::HashSet;
use std::path::PathBuf;

/// State shared by every command of one invocation
pub struct Context {
    pub config: Config,
    pub env: Environment,
    /// Working tree the config applies to
    pub workdir: PathBuf,
}

impl Context {
    pub fn new(config: Config, env: Environment, workdir: PathBuf) -> Self {
        Self {
            config,
            env,
            workdir,
        }
    }

    /// Construct the configured cache store
    pub fn store(&self) -> StepCacheResult<Box<dyn CacheStore>> {
        create_store(&self.config.store, &self.env)
    }

    /// Resolve the branch this invocation runs on
    pub async fn branch(&self) -> StepCacheResult<String> {
        resolve_current_branch(
            self.config.current_branch.as_deref(),
            &self.env,
            &self.workdir,
        )
        .await
    }

    /// Every object key the configured steps currently address
    pub fn live_keys(&self) -> StepCacheResult<HashSet<String>> {
        let mut live = HashSet::new();
        for (name, step) in &self.config.steps {
            let keys = StepKeys::resolve(
                name,
                step,
                &self.config.repo_id,
                &self.config.cache_version,
            )?;
            live.extend(keys.objects().iter().map(|k| k.to_string()));
        }
        Ok(live)
    }
}
