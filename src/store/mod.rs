//! Cache stores
//!
//! A cache store is a flat key → blob object store. Two backends exist:
//! - [`S3Store`]: S3-compatible HTTP API with SigV4-signed requests
//! - [`LocalStore`]: a directory on this machine
//!
//! The backend is picked once at startup from the config and the captured
//! environment, then handed around as `&dyn CacheStore`.

mod local;
pub mod s3;

pub use local::LocalStore;
pub use s3::{S3Credentials, S3Store};

use crate::config::{BackendChoice, Environment, StoreConfig};
use crate::error::StepCacheResult;
use async_trait::async_trait;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::debug;

/// A stored object as reported by a listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObjectInfo {
    pub key: String,
    pub size: u64,
}

/// Abstract key/blob store
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Download `key` to `destination`.
    ///
    /// Returns `false` (and writes nothing) when the object does not exist.
    async fn get_object(&self, key: &str, destination: &Path) -> StepCacheResult<bool>;

    /// Upload the file at `source` as `key`, replacing any existing object
    async fn put_object(&self, key: &str, source: &Path) -> StepCacheResult<()>;

    /// List every object in the store
    async fn list_objects(&self) -> StepCacheResult<Vec<ObjectInfo>>;

    /// Delete `key`; deleting a missing object is not an error
    async fn delete_object(&self, key: &str) -> StepCacheResult<()>;

    /// Get the human-readable backend name for display
    fn backend_name(&self) -> &'static str;
}

/// Which backend to construct
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    S3,
    Local,
}

/// Pick the backend: an explicit choice wins, `auto` means S3 on CI only
pub fn select_backend(config: &StoreConfig, env: &Environment) -> BackendKind {
    match config.backend {
        BackendChoice::S3 => BackendKind::S3,
        BackendChoice::Local => BackendKind::Local,
        BackendChoice::Auto if env.is_ci() => BackendKind::S3,
        BackendChoice::Auto => BackendKind::Local,
    }
}

/// Default directory for the local backend
pub fn default_local_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("stepcache")
}

/// Create the cache store selected by config and environment
pub fn create_store(config: &StoreConfig, env: &Environment) -> StepCacheResult<Box<dyn CacheStore>> {
    match select_backend(config, env) {
        BackendKind::S3 => {
            let store = S3Store::from_config(&config.s3, env)?;
            debug!("Using S3 cache store at {}", store.base_url());
            Ok(Box::new(store))
        }
        BackendKind::Local => {
            let dir = config.local_dir.clone().unwrap_or_else(default_local_dir);
            debug!("Using local cache store at {}", dir.display());
            Ok(Box::new(LocalStore::new(dir)))
        }
    }
}
