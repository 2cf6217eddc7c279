//! Configuration management for stepcache

pub mod env;
pub mod schema;

pub use env::Environment;
pub use schema::{
    BackendChoice, BranchRules, Config, FileInputs, S3Settings, StepDefinition, StepInputs,
    StoreConfig,
};

use crate::error::{StepCacheError, StepCacheResult};
use crate::step::slugify;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// Default config file name, looked up in the working directory
pub const CONFIG_FILE_NAME: &str = "stepcache.toml";

/// Configuration manager
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Create a new config manager with default path
    pub fn new() -> Self {
        Self {
            config_path: PathBuf::from(CONFIG_FILE_NAME),
        }
    }

    /// Create a config manager with a custom path
    pub fn with_path(path: PathBuf) -> Self {
        Self { config_path: path }
    }

    /// Load and validate the configuration
    pub async fn load(&self) -> StepCacheResult<Config> {
        if !self.config_path.exists() {
            return Err(StepCacheError::ConfigNotFound(self.config_path.clone()));
        }

        debug!("Loading config from {}", self.config_path.display());
        let content = fs::read_to_string(&self.config_path).await.map_err(|e| {
            StepCacheError::io(
                format!("reading config from {}", self.config_path.display()),
                e,
            )
        })?;

        Self::parse(&content, &self.config_path)
    }

    /// Parse and validate configuration text
    pub fn parse(content: &str, path: &Path) -> StepCacheResult<Config> {
        let config: Config = toml::from_str(content).map_err(|e| StepCacheError::ConfigInvalid {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        if config.repo_id.trim().is_empty() {
            return Err(StepCacheError::ConfigInvalid {
                path: path.to_path_buf(),
                reason: "repo_id must not be empty".to_string(),
            });
        }

        check_step_names_dont_clash(&config)?;
        Ok(config)
    }

    /// Get the config file path
    pub fn path(&self) -> &Path {
        &self.config_path
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    /// Look up a step by name
    pub fn step(&self, name: &str) -> StepCacheResult<&StepDefinition> {
        self.steps
            .get(name)
            .ok_or_else(|| StepCacheError::UnknownStep(name.to_string()))
    }
}

/// Two step names that slugify identically would share cache keys
fn check_step_names_dont_clash(config: &Config) -> StepCacheResult<()> {
    let mut seen: HashMap<String, &str> = HashMap::new();
    for name in config.steps.keys() {
        let slug = slugify(name);
        if let Some(previous) = seen.get(&slug) {
            return Err(StepCacheError::StepSlugClash {
                first: name.clone(),
                second: previous.to_string(),
                slug,
            });
        }
        seen.insert(slug, name);
    }
    Ok(())
}
