//! Run-if-needed orchestration
//!
//! Composes the pieces for one step: branch disposition, cache keys, the
//! input manifest, a lookup in the cache store and, on a miss, running the
//! command and persisting what it produced. Objects are uploaded artifacts
//! first and manifest last, so a stored manifest never points at an archive
//! that isn't there.

use crate::archive;
use crate::config::{Config, StepDefinition};
use crate::error::{StepCacheError, StepCacheResult};
use crate::manifest::{build_manifest, diff, Manifest, ManifestDiff};
use crate::step::{archive_paths, disposition, slugify, Disposition, StepKeys};
use crate::store::CacheStore;
use crate::ui::{format_size, Reporter};
use console::style;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tokio::process::Command;
use tracing::{debug, info};

/// Changed paths listed before the rest are summarized
const MAX_LISTED_CHANGES: usize = 10;

/// What `run_if_needed` did with a step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Excluded on this branch
    Skipped,
    /// Inputs unchanged; outputs restored from the cache
    Restored,
    /// Command ran and its results were stored
    Executed,
}

/// Opens the cache store once a step is known to need it
pub type OpenStore<'a> = Box<dyn Fn() -> StepCacheResult<Box<dyn CacheStore>> + 'a>;

/// Everything needed to run steps from one config
pub struct Runner<'a> {
    config: &'a Config,
    open_store: OpenStore<'a>,
    reporter: &'a Reporter,
    workdir: PathBuf,
    scratch_root: PathBuf,
    branch: String,
}

impl<'a> Runner<'a> {
    pub fn new(
        config: &'a Config,
        open_store: OpenStore<'a>,
        reporter: &'a Reporter,
        workdir: PathBuf,
        scratch_root: PathBuf,
        branch: String,
    ) -> Self {
        Self {
            config,
            open_store,
            reporter,
            workdir,
            scratch_root,
            branch,
        }
    }

    /// Run `step_name` unless its cached outputs can be reused
    pub async fn run_if_needed(&self, step_name: &str) -> StepCacheResult<Outcome> {
        let step = self.config.step(step_name)?;
        let disposition = disposition(&step.branches, &self.branch);
        debug!("Step '{}' is {} on {}", step_name, disposition, self.branch);

        if disposition == Disposition::Skip {
            self.reporter.info(&format!(
                "Skipping '{}' because this is the {} branch",
                step_name, self.branch
            ));
            return Ok(Outcome::Skipped);
        }

        // Only steps that will run open the store
        let opened = (self.open_store)()?;
        let store = opened.as_ref();
        debug!("Using {} cache store", store.backend_name());

        let timer = self.reporter.timed_task(&format!("Step '{}'", step_name));
        let keys = StepKeys::resolve(
            step_name,
            step,
            &self.config.repo_id,
            &self.config.cache_version,
        )?;
        self.reporter
            .substep(&format!("cache key {}", style(&keys.key).cyan()));

        let scratch = tempfile::Builder::new()
            .prefix("stepcache-")
            .tempdir_in(&self.scratch_root)
            .map_err(|e| {
                StepCacheError::io(
                    format!("creating scratch directory in {}", self.scratch_root.display()),
                    e,
                )
            })?;

        let skip_dirs = [self.config.manifest_dir.clone()];
        let manifest = self
            .reporter
            .timed_step(
                "Hashing inputs",
                build_manifest(step, &self.workdir, &skip_dirs),
            )
            .await?;
        self.reporter.substep(&format!(
            "{} inputs, digest {}",
            manifest.files.len(),
            short_digest(&manifest.hash)
        ));

        match disposition {
            Disposition::Conditional => {
                if self.try_restore(store, step, &keys, &manifest, &scratch).await? {
                    timer.finish(self.reporter);
                    return Ok(Outcome::Restored);
                }
            }
            _ => self.reporter.step(&format!(
                "Always running on the {} branch",
                self.branch
            )),
        }

        if !step.caches.is_empty() {
            self.restore_persistent_caches(store, &keys, &scratch).await?;
        }

        self.execute(step).await?;
        self.persist(store, step_name, step, &keys, &manifest, &scratch)
            .await?;

        timer.finish(self.reporter);
        Ok(Outcome::Executed)
    }

    /// Restore outputs if the stored manifest matches; `false` means run
    async fn try_restore(
        &self,
        store: &dyn CacheStore,
        step: &StepDefinition,
        keys: &StepKeys,
        current: &Manifest,
        scratch: &TempDir,
    ) -> StepCacheResult<bool> {
        let manifest_path = scratch.path().join("previous-manifest.json");
        let found = self
            .reporter
            .timed_step(
                "Fetching cached manifest",
                store.get_object(&keys.manifest, &manifest_path),
            )
            .await?;
        let previous = if found {
            Manifest::read_if_valid(&manifest_path).await?
        } else {
            None
        };

        let changes = diff(previous.as_ref(), current);
        if changes.is_changed() {
            self.report_changes(&changes);
            return Ok(false);
        }

        let paths = archive_paths(step);
        if paths.is_empty() {
            self.reporter.step("Inputs unchanged, nothing to restore");
            return Ok(true);
        }

        let archive_path = scratch.path().join("artifacts.tar.gz");
        let found = self
            .reporter
            .timed_step(
                "Fetching cached outputs",
                store.get_object(&keys.artifacts, &archive_path),
            )
            .await?;
        if !found {
            self.reporter
                .step("Inputs unchanged but the output archive is missing");
            return Ok(false);
        }

        self.reporter
            .timed_step(
                "Restoring outputs",
                archive::unpack(&archive_path, &self.workdir),
            )
            .await?;
        for path in &paths {
            self.reporter.substep(path);
        }
        info!("Restored {} from {}", keys.key, store.backend_name());
        Ok(true)
    }

    async fn restore_persistent_caches(
        &self,
        store: &dyn CacheStore,
        keys: &StepKeys,
        scratch: &TempDir,
    ) -> StepCacheResult<()> {
        let archive_path = scratch.path().join("caches.tar.gz");
        let found = self
            .reporter
            .timed_step(
                "Fetching persistent caches",
                store.get_object(&keys.caches, &archive_path),
            )
            .await?;

        if found {
            self.reporter
                .timed_step(
                    "Restoring persistent caches",
                    archive::unpack(&archive_path, &self.workdir),
                )
                .await?;
        } else {
            self.reporter.substep("no persistent caches stored yet");
        }
        Ok(())
    }

    /// Run the step command with the terminal attached
    async fn execute(&self, step: &StepDefinition) -> StepCacheResult<()> {
        self.reporter
            .step(&format!("Running {}", style(&step.command).bold()));

        let status = Command::new("sh")
            .arg("-c")
            .arg(&step.command)
            .current_dir(&self.workdir)
            .status()
            .await
            .map_err(|e| StepCacheError::CommandSpawn {
                command: step.command.clone(),
                source: e,
            })?;

        if !status.success() {
            return Err(StepCacheError::CommandFailed {
                command: step.command.clone(),
                code: status.code().unwrap_or(1),
            });
        }
        Ok(())
    }

    async fn persist(
        &self,
        store: &dyn CacheStore,
        step_name: &str,
        step: &StepDefinition,
        keys: &StepKeys,
        manifest: &Manifest,
        scratch: &TempDir,
    ) -> StepCacheResult<()> {
        let paths = archive_paths(step);
        if !paths.is_empty() {
            let archive_path = scratch.path().join("artifacts.tar.gz");
            self.upload_archive(store, &paths, &archive_path, &keys.artifacts, "outputs")
                .await?;
        }

        if !step.caches.is_empty() {
            let archive_path = scratch.path().join("caches.tar.gz");
            self.upload_archive(
                store,
                &step.caches,
                &archive_path,
                &keys.caches,
                "persistent caches",
            )
            .await?;
        }

        let manifest_path = scratch.path().join("manifest.json");
        manifest.write(&manifest_path).await?;
        self.reporter
            .timed_step(
                "Uploading manifest",
                store.put_object(&keys.manifest, &manifest_path),
            )
            .await?;

        let local_copy = self
            .workdir
            .join(&self.config.manifest_dir)
            .join(slugify(step_name));
        manifest.write(&local_copy).await?;
        debug!("Wrote manifest copy to {}", local_copy.display());
        Ok(())
    }

    async fn upload_archive(
        &self,
        store: &dyn CacheStore,
        paths: &[String],
        archive_path: &Path,
        key: &str,
        what: &str,
    ) -> StepCacheResult<()> {
        let reporter = self.reporter;
        reporter
            .timed_step(&format!("Saving {}", what), async {
                let size = reporter
                    .timed_substep(
                        "packing",
                        archive::pack(&self.workdir, paths, archive_path),
                    )
                    .await?;
                reporter
                    .timed_substep(
                        &format!("uploading {}", format_size(size)),
                        store.put_object(key, archive_path),
                    )
                    .await
            })
            .await
    }

    fn report_changes(&self, changes: &ManifestDiff) {
        if changes.previous_missing {
            self.reporter.step("No cached manifest for these inputs");
            return;
        }

        self.reporter.step("Inputs changed since the cached run");
        let listed = changes
            .added
            .iter()
            .map(|p| format!("+ {}", p))
            .chain(changes.removed.iter().map(|p| format!("- {}", p)))
            .chain(changes.modified.iter().map(|p| format!("~ {}", p)));

        let total = changes.added.len() + changes.removed.len() + changes.modified.len();
        for line in listed.take(MAX_LISTED_CHANGES) {
            self.reporter.substep(&line);
        }
        if total > MAX_LISTED_CHANGES {
            self.reporter
                .substep(&format!("... and {} more", total - MAX_LISTED_CHANGES));
        }
    }
}

fn short_digest(hash: &str) -> &str {
    hash.get(..12).unwrap_or(hash)
}
