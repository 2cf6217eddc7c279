//! Cache keys
//!
//! A step's cache key covers the repository, the cache format version, the
//! step's slug and a digest of its whole definition. Editing anything in the
//! step's config produces a new key, so stale entries are never consulted.

use super::slug::slugify;
use crate::config::StepDefinition;
use crate::error::StepCacheResult;
use crate::hash::hash_bytes;

/// Canonical JSON for a step definition.
///
/// Going through `serde_json::Value` sorts object keys, and empty optional
/// collections are skipped during serialization, so neither declaration
/// order nor spelled-out defaults affect the output.
pub fn canonical_definition(step: &StepDefinition) -> StepCacheResult<String> {
    let value = serde_json::to_value(step)?;
    Ok(serde_json::to_string(&value)?)
}

/// Derive the cache key for a step
pub fn resolve_key(
    name: &str,
    step: &StepDefinition,
    repo_id: &str,
    cache_version: &str,
) -> StepCacheResult<String> {
    let step_hash = hash_bytes(canonical_definition(step)?);
    Ok([repo_id, cache_version, &slugify(name), &step_hash].join("-"))
}

/// Object keys addressed in the cache store for one step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepKeys {
    /// The step's cache key
    pub key: String,
    /// Serialized manifest of the run that produced the artifacts
    pub manifest: String,
    /// Archive of `output_files` and `caches`
    pub artifacts: String,
    /// Archive of `caches` only, shared across definition changes
    pub caches: String,
}

impl StepKeys {
    /// Resolve every object key for a step
    pub fn resolve(
        name: &str,
        step: &StepDefinition,
        repo_id: &str,
        cache_version: &str,
    ) -> StepCacheResult<Self> {
        let key = resolve_key(name, step, repo_id, cache_version)?;
        Ok(Self {
            manifest: format!("{key}-manifest.json"),
            artifacts: format!("{key}-artifacts.tar.gz"),
            caches: format!(
                "{}-{}-{}-caches.tar.gz",
                repo_id,
                cache_version,
                slugify(name)
            ),
            key,
        })
    }

    /// All object keys, for liveness checks
    pub fn objects(&self) -> [&str; 3] {
        [&self.manifest, &self.artifacts, &self.caches]
    }
}

/// Paths that go into the artifact archive: `output_files ∪ caches`
pub fn archive_paths(step: &StepDefinition) -> Vec<String> {
    let mut paths: Vec<String> = Vec::new();
    for path in step.output_files.iter().chain(step.caches.iter()) {
        if !paths.contains(path) {
            paths.push(path.clone());
        }
    }
    paths
}
