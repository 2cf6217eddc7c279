//! Configuration schema for stepcache
//!
//! Configuration is read from `stepcache.toml` in the working tree.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Repository identity, first component of every cache key
    pub repo_id: String,

    /// Cache format version; bump to invalidate every entry at once
    #[serde(default = "default_cache_version", deserialize_with = "string_or_number")]
    pub cache_version: String,

    /// Primary branch name
    #[serde(default = "default_primary_branch")]
    pub primary_branch: String,

    /// Explicit current branch, bypassing CI variables and git
    #[serde(default)]
    pub current_branch: Option<String>,

    /// Directory (relative to the working tree) for local manifest copies
    #[serde(default = "default_manifest_dir")]
    pub manifest_dir: PathBuf,

    /// Cache store settings
    #[serde(default)]
    pub store: StoreConfig,

    /// Step definitions keyed by step name
    #[serde(default)]
    pub steps: BTreeMap<String, StepDefinition>,
}

fn default_cache_version() -> String {
    "1".to_string()
}

fn default_primary_branch() -> String {
    "master".to_string()
}

fn default_manifest_dir() -> PathBuf {
    PathBuf::from(".stepcache-manifests")
}

/// Accept `cache_version = 2` as well as `cache_version = "2"`
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Version {
        Text(String),
        Number(i64),
    }

    Ok(match Version::deserialize(deserializer)? {
        Version::Text(s) => s,
        Version::Number(n) => n.to_string(),
    })
}

/// A single cacheable step
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StepDefinition {
    /// Shell command to execute
    pub command: String,

    /// Inputs whose content decides whether the step must run
    #[serde(default, skip_serializing_if = "StepInputs::is_empty")]
    pub inputs: StepInputs,

    /// Paths produced by the command
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub output_files: Vec<String>,

    /// Paths kept as a long-lived cache across definition changes
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub caches: Vec<String>,

    /// Branch filters
    #[serde(default, skip_serializing_if = "BranchRules::is_empty")]
    pub branches: BranchRules,
}

/// Step inputs
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StepInputs {
    /// File globs
    #[serde(default, skip_serializing_if = "FileInputs::is_empty")]
    pub files: FileInputs,

    /// Commands whose stdout is part of the manifest (e.g. `node --version`)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub commands: Vec<String>,
}

impl StepInputs {
    pub fn is_empty(&self) -> bool {
        self.files.is_empty() && self.commands.is_empty()
    }
}

/// Include/exclude globs relative to the working tree
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileInputs {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub include: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclude: Vec<String>,
}

impl FileInputs {
    pub fn is_empty(&self) -> bool {
        self.include.is_empty() && self.exclude.is_empty()
    }
}

/// Branch filters. `only` distinguishes "unset" from "empty".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BranchRules {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub only: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub never: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub always: Vec<String>,
}

impl BranchRules {
    pub fn is_empty(&self) -> bool {
        self.only.is_none() && self.never.is_empty() && self.always.is_empty()
    }
}

/// Which cache store implementation to use
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendChoice {
    /// S3 on CI, local directory elsewhere
    #[default]
    Auto,
    S3,
    Local,
}

/// Cache store configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: BackendChoice,

    /// Directory for the local backend (defaults to the user cache dir)
    pub local_dir: Option<PathBuf>,

    /// S3 settings; unset fields fall back to environment variables
    pub s3: S3Settings,
}

/// S3 bucket settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct S3Settings {
    pub bucket: Option<String>,

    pub region: Option<String>,

    /// Base URL of an S3-compatible service; switches to path-style addressing
    pub endpoint: Option<String>,
}
