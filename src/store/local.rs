//! Directory-backed cache store for machines without the remote store

use super::{CacheStore, ObjectInfo};
use crate::error::{StepCacheError, StepCacheResult};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// Cache store backed by a local directory
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Path of an object, rejecting keys that would escape the store
    fn object_path(&self, key: &str) -> StepCacheResult<PathBuf> {
        if key.is_empty() || key.contains(['/', '\\']) || key == "." || key == ".." {
            return Err(StepCacheError::InvalidObjectKey(key.to_string()));
        }
        Ok(self.root.join(key))
    }
}

#[async_trait]
impl CacheStore for LocalStore {
    async fn get_object(&self, key: &str, destination: &Path) -> StepCacheResult<bool> {
        let path = self.object_path(key)?;
        if !fs::try_exists(&path).await.unwrap_or(false) {
            debug!("Local cache miss for {}", key);
            return Ok(false);
        }

        fs::copy(&path, destination).await.map_err(|e| {
            StepCacheError::io(
                format!("copying {} to {}", path.display(), destination.display()),
                e,
            )
        })?;
        Ok(true)
    }

    async fn put_object(&self, key: &str, source: &Path) -> StepCacheResult<()> {
        let path = self.object_path(key)?;
        fs::create_dir_all(&self.root).await.map_err(|e| {
            StepCacheError::io(format!("creating directory {}", self.root.display()), e)
        })?;

        // Readers never observe a half-written object
        let partial = self.root.join(format!(".{key}.partial"));
        fs::copy(source, &partial).await.map_err(|e| {
            StepCacheError::io(format!("copying {} into cache", source.display()), e)
        })?;
        fs::rename(&partial, &path)
            .await
            .map_err(|e| StepCacheError::io(format!("storing {}", path.display()), e))?;

        debug!("Stored {} in local cache", key);
        Ok(())
    }

    async fn list_objects(&self) -> StepCacheResult<Vec<ObjectInfo>> {
        let mut entries = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(StepCacheError::io(
                    format!("listing {}", self.root.display()),
                    e,
                ))
            }
        };

        let mut objects = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StepCacheError::io(format!("listing {}", self.root.display()), e))?
        {
            let key = entry.file_name().to_string_lossy().to_string();
            if key.starts_with('.') {
                continue;
            }
            let metadata = entry
                .metadata()
                .await
                .map_err(|e| StepCacheError::io(format!("reading {}", key), e))?;
            if metadata.is_file() {
                objects.push(ObjectInfo {
                    key,
                    size: metadata.len(),
                });
            }
        }

        objects.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(objects)
    }

    async fn delete_object(&self, key: &str) -> StepCacheResult<()> {
        let path = self.object_path(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StepCacheError::io(format!("deleting {}", path.display()), e)),
        }
    }

    fn backend_name(&self) -> &'static str {
        "local"
    }
}
