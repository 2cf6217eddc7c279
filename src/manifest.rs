//! Input manifests
//!
//! A manifest is the sorted list of a step's input files with their content
//! hashes, plus an aggregate hash. The manifest stored next to a cache entry
//! is compared with a freshly built one to decide whether the step's inputs
//! changed. Only paths and content take part; mtimes and owners never do.

use crate::config::{FileInputs, StepDefinition};
use crate::error::{StepCacheError, StepCacheResult};
use crate::hash::{hash_bytes, hash_file, hash_of_sequence};
use futures_util::stream::{self, StreamExt, TryStreamExt};
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

/// Files hashed at once
const HASH_CONCURRENCY: usize = 8;

/// Prefix marking a manifest entry that records a command's output
const COMMAND_PREFIX: &str = "$ ";

/// One hashed input
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub path: String,
    pub hash: String,
}

/// Hashed snapshot of a step's inputs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    /// Aggregate hash over every entry
    pub hash: String,
    /// Entries sorted by path
    pub files: Vec<ManifestEntry>,
}

impl Manifest {
    /// Assemble a manifest from entries in any order
    pub fn from_entries(mut files: Vec<ManifestEntry>) -> Self {
        files.sort_by(|a, b| a.path.cmp(&b.path));
        let pairs: Vec<(&str, &str)> = files
            .iter()
            .map(|e| (e.path.as_str(), e.hash.as_str()))
            .collect();
        Self {
            hash: hash_of_sequence(&pairs),
            files,
        }
    }

    /// Parse a stored manifest
    pub fn from_json(bytes: &[u8]) -> StepCacheResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Serialize in the stored, human-readable form
    pub fn to_json(&self) -> StepCacheResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Read a manifest file, returning `None` if it is missing or unreadable.
    ///
    /// A manifest that cannot be parsed is treated like a missing one, which
    /// forces the step to run rather than risk a false cache hit.
    pub async fn read_if_valid(path: &Path) -> StepCacheResult<Option<Self>> {
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(StepCacheError::io(
                    format!("reading manifest {}", path.display()),
                    e,
                ))
            }
        };

        match Self::from_json(&bytes) {
            Ok(manifest) => Ok(Some(manifest)),
            Err(e) => {
                tracing::warn!("Ignoring unreadable manifest {}: {}", path.display(), e);
                Ok(None)
            }
        }
    }

    /// Write the manifest to `path`, creating parent directories
    pub async fn write(&self, path: &Path) -> StepCacheResult<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                StepCacheError::io(format!("creating directory {}", parent.display()), e)
            })?;
        }
        tokio::fs::write(path, self.to_json()?)
            .await
            .map_err(|e| StepCacheError::io(format!("writing manifest {}", path.display()), e))
    }
}

/// Result of comparing a stored manifest with a fresh one
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManifestDiff {
    /// No stored manifest to compare against
    pub previous_missing: bool,
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub modified: Vec<String>,
    changed: bool,
}

impl ManifestDiff {
    /// Whether the step's inputs changed
    pub fn is_changed(&self) -> bool {
        self.changed
    }
}

/// Compare a previous manifest (if any) with the current one
pub fn diff(previous: Option<&Manifest>, current: &Manifest) -> ManifestDiff {
    let Some(previous) = previous else {
        return ManifestDiff {
            previous_missing: true,
            added: current.files.iter().map(|e| e.path.clone()).collect(),
            changed: true,
            ..Default::default()
        };
    };

    let old: BTreeMap<&str, &str> = previous
        .files
        .iter()
        .map(|e| (e.path.as_str(), e.hash.as_str()))
        .collect();
    let new: BTreeMap<&str, &str> = current
        .files
        .iter()
        .map(|e| (e.path.as_str(), e.hash.as_str()))
        .collect();

    let mut result = ManifestDiff {
        changed: previous != current,
        ..Default::default()
    };
    for (path, hash) in &new {
        match old.get(path) {
            None => result.added.push(path.to_string()),
            Some(old_hash) if old_hash != hash => result.modified.push(path.to_string()),
            Some(_) => {}
        }
    }
    result.removed = old
        .keys()
        .filter(|path| !new.contains_key(*path))
        .map(|path| path.to_string())
        .collect();

    result
}

/// Build the manifest for a step's current inputs.
///
/// `skip_dirs` are paths relative to `root` that are never walked (the
/// local manifest directory, for instance). `.git` is always skipped.
pub async fn build_manifest(
    step: &StepDefinition,
    root: &Path,
    skip_dirs: &[PathBuf],
) -> StepCacheResult<Manifest> {
    let matcher = InputMatcher::new(&step.inputs.files)?;

    let paths = if matcher.is_empty() {
        Vec::new()
    } else {
        let walk_root = root.to_path_buf();
        let skip = skip_dirs.to_vec();
        tokio::task::spawn_blocking(move || matcher.collect(&walk_root, &skip))
            .await
            .map_err(|e| StepCacheError::Internal(format!("input walk panicked: {}", e)))??
    };
    debug!("Matched {} input files", paths.len());

    let mut entries: Vec<ManifestEntry> = stream::iter(paths)
        .map(|rel| async move {
            let hash = hash_file(&root.join(&rel)).await?;
            Ok::<_, StepCacheError>(ManifestEntry { path: rel, hash })
        })
        .buffered(HASH_CONCURRENCY)
        .try_collect()
        .await?;

    for command in &step.inputs.commands {
        let stdout = command_output(command, root).await?;
        entries.push(ManifestEntry {
            path: format!("{COMMAND_PREFIX}{command}"),
            hash: hash_bytes(stdout),
        });
    }

    Ok(Manifest::from_entries(entries))
}

async fn command_output(command: &str, root: &Path) -> StepCacheResult<Vec<u8>> {
    let output = Command::new("sh")
        .arg("-c")
        .arg(command)
        .current_dir(root)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .output()
        .await
        .map_err(|e| StepCacheError::CommandSpawn {
            command: command.to_string(),
            source: e,
        })?;

    if !output.status.success() {
        return Err(StepCacheError::CommandFailed {
            command: command.to_string(),
            code: output.status.code().unwrap_or(1),
        });
    }
    Ok(output.stdout)
}

/// Compiled include/exclude globs
struct InputMatcher {
    include: GlobSet,
    exclude: GlobSet,
}

impl InputMatcher {
    fn new(files: &FileInputs) -> StepCacheResult<Self> {
        Ok(Self {
            include: compile(&files.include)?,
            exclude: compile(&files.exclude)?,
        })
    }

    fn is_empty(&self) -> bool {
        self.include.is_empty()
    }

    fn matches(&self, rel: &str) -> bool {
        self.include.is_match(rel) && !self.exclude.is_match(rel)
    }

    /// Walk `root` and return matching files as sorted `/`-separated paths
    fn collect(&self, root: &Path, skip_dirs: &[PathBuf]) -> StepCacheResult<Vec<String>> {
        let skip: Vec<PathBuf> = skip_dirs.iter().map(|d| root.join(d)).collect();
        let walker = walkdir::WalkDir::new(root)
            .into_iter()
            .filter_entry(|entry| {
                let path = entry.path();
                !(entry.file_type().is_dir()
                    && (entry.file_name() == ".git" || skip.iter().any(|s| s == path)))
            });

        let mut paths = Vec::new();
        for entry in walker {
            let entry = entry.map_err(|e| {
                StepCacheError::io(format!("walking {}", root.display()), e.into())
            })?;
            let is_file = entry.file_type().is_file()
                || (entry.file_type().is_symlink() && entry.path().is_file());
            if !is_file {
                continue;
            }

            let Ok(rel) = entry.path().strip_prefix(root) else {
                continue;
            };
            let rel = to_slash_path(rel);
            if self.matches(&rel) {
                paths.push(rel);
            }
        }

        paths.sort();
        Ok(paths)
    }
}

fn to_slash_path(rel: &Path) -> String {
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Compile patterns; a pattern naming a directory also matches its contents
fn compile(patterns: &[String]) -> StepCacheResult<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let normalized = pattern.trim_start_matches("./").trim_end_matches('/');
        for candidate in [normalized.to_string(), format!("{normalized}/**")] {
            let glob = GlobBuilder::new(&candidate)
                .literal_separator(true)
                .build()
                .map_err(|e| StepCacheError::InvalidGlob {
                    pattern: pattern.clone(),
                    reason: e.to_string(),
                })?;
            builder.add(glob);
        }
    }
    builder.build().map_err(|e| StepCacheError::InvalidGlob {
        pattern: patterns.join(", "),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn step(include: &[&str], exclude: &[&str]) -> StepDefinition {
        let mut step = StepDefinition {
            command: "true".to_string(),
            ..Default::default()
        };
        step.inputs.files.include = include.iter().map(|s| s.to_string()).collect();
        step.inputs.files.exclude = exclude.iter().map(|s| s.to_string()).collect();
        step
    }

    fn tree() -> TempDir {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("src/nested")).unwrap();
        fs::create_dir_all(root.join(".git")).unwrap();
        fs::write(root.join("input.txt"), "hello_1\n").unwrap();
        fs::write(root.join("src/b.ts"), "b").unwrap();
        fs::write(root.join("src/a.ts"), "a").unwrap();
        fs::write(root.join("src/a.snap"), "snap").unwrap();
        fs::write(root.join("src/nested/c.ts"), "c").unwrap();
        fs::write(root.join(".git/HEAD"), "ref").unwrap();
        dir
    }

    fn paths(m: &Manifest) -> Vec<&str> {
        m.files.iter().map(|e| e.path.as_str()).collect()
    }

    #[tokio::test]
    async fn include_and_exclude_are_applied() {
        let dir = tree();
        let m = build_manifest(&step(&["src/**"], &["**/*.snap"]), dir.path(), &[])
            .await
            .unwrap();
        assert_eq!(paths(&m), vec!["src/a.ts", "src/b.ts", "src/nested/c.ts"]);
    }

    #[tokio::test]
    async fn single_star_does_not_cross_directories() {
        let dir = tree();
        let m = build_manifest(&step(&["src/*.ts"], &[]), dir.path(), &[])
            .await
            .unwrap();
        assert_eq!(paths(&m), vec!["src/a.ts", "src/b.ts"]);
    }

    #[tokio::test]
    async fn directory_pattern_matches_contents() {
        let dir = tree();
        let m = build_manifest(&step(&["./src/nested"], &[]), dir.path(), &[])
            .await
            .unwrap();
        assert_eq!(paths(&m), vec!["src/nested/c.ts"]);
    }

    #[tokio::test]
    async fn git_and_skipped_dirs_are_never_walked() {
        let dir = tree();
        fs::create_dir_all(dir.path().join(".stepcache-manifests")).unwrap();
        fs::write(dir.path().join(".stepcache-manifests/x"), "{}").unwrap();

        let m = build_manifest(
            &step(&["**"], &[]),
            dir.path(),
            &[PathBuf::from(".stepcache-manifests")],
        )
        .await
        .unwrap();
        assert!(!paths(&m).iter().any(|p| p.starts_with(".git/")));
        assert!(!paths(&m).iter().any(|p| p.starts_with(".stepcache-manifests")));
        assert!(paths(&m).contains(&"input.txt"));
    }

    #[tokio::test]
    async fn no_matches_is_an_empty_manifest() {
        let dir = tree();
        let m = build_manifest(&step(&["*.rs"], &[]), dir.path(), &[])
            .await
            .unwrap();
        assert!(m.files.is_empty());

        let none = build_manifest(&step(&[], &[]), dir.path(), &[])
            .await
            .unwrap();
        assert_eq!(m, none);
    }

    #[tokio::test]
    async fn invalid_glob_is_reported() {
        let dir = tree();
        let err = build_manifest(&step(&["src/[a"], &[]), dir.path(), &[])
            .await
            .unwrap_err();
        assert!(matches!(err, StepCacheError::InvalidGlob { .. }));
    }

    #[tokio::test]
    async fn content_change_changes_manifest() {
        let dir = tree();
        let s = step(&["input.txt"], &[]);
        let first = build_manifest(&s, dir.path(), &[]).await.unwrap();
        let again = build_manifest(&s, dir.path(), &[]).await.unwrap();
        assert_eq!(first, again);
        assert!(!diff(Some(&first), &again).is_changed());

        fs::write(dir.path().join("input.txt"), "hello_2\n").unwrap();
        let second = build_manifest(&s, dir.path(), &[]).await.unwrap();
        let d = diff(Some(&first), &second);
        assert!(d.is_changed());
        assert_eq!(d.modified, vec!["input.txt"]);
        assert_ne!(first.hash, second.hash);
    }

    #[tokio::test]
    async fn command_inputs_are_recorded() {
        let dir = tree();
        let mut s = step(&["input.txt"], &[]);
        s.inputs.commands = vec!["echo v1".to_string()];
        let m = build_manifest(&s, dir.path(), &[]).await.unwrap();
        assert_eq!(paths(&m), vec!["$ echo v1", "input.txt"]);
        assert_eq!(m.files[0].hash, hash_bytes("v1\n"));
    }

    #[tokio::test]
    async fn failing_command_input_is_an_error() {
        let dir = tree();
        let mut s = step(&[], &[]);
        s.inputs.commands = vec!["exit 4".to_string()];
        let err = build_manifest(&s, dir.path(), &[]).await.unwrap_err();
        assert!(matches!(err, StepCacheError::CommandFailed { code: 4, .. }));
    }

    #[test]
    fn entries_are_sorted_regardless_of_input_order() {
        let entry = |p: &str, h: &str| ManifestEntry {
            path: p.to_string(),
            hash: h.to_string(),
        };
        let a = Manifest::from_entries(vec![entry("b", "2"), entry("a", "1")]);
        let b = Manifest::from_entries(vec![entry("a", "1"), entry("b", "2")]);
        assert_eq!(a, b);
        assert_eq!(paths(&a), vec!["a", "b"]);
    }

    #[test]
    fn diff_against_itself_is_unchanged() {
        let m = Manifest::from_entries(vec![ManifestEntry {
            path: "a".into(),
            hash: "1".into(),
        }]);
        let d = diff(Some(&m), &m);
        assert!(!d.is_changed());
        assert!(d.added.is_empty() && d.removed.is_empty() && d.modified.is_empty());
    }

    #[test]
    fn diff_against_absent_is_changed() {
        let empty = Manifest::from_entries(vec![]);
        let d = diff(None, &empty);
        assert!(d.is_changed());
        assert!(d.previous_missing);
    }

    #[test]
    fn diff_reports_added_and_removed() {
        let entry = |p: &str| ManifestEntry {
            path: p.to_string(),
            hash: "h".to_string(),
        };
        let old = Manifest::from_entries(vec![entry("a"), entry("b")]);
        let new = Manifest::from_entries(vec![entry("b"), entry("c")]);
        let d = diff(Some(&old), &new);
        assert!(d.is_changed());
        assert_eq!(d.added, vec!["c"]);
        assert_eq!(d.removed, vec!["a"]);
    }

    #[tokio::test]
    async fn stored_manifest_roundtrip_and_corruption() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("m/step");
        let m = Manifest::from_entries(vec![ManifestEntry {
            path: "a".into(),
            hash: "1".into(),
        }]);

        assert!(Manifest::read_if_valid(&path).await.unwrap().is_none());
        m.write(&path).await.unwrap();
        assert_eq!(Manifest::read_if_valid(&path).await.unwrap(), Some(m));

        fs::write(&path, "not json").unwrap();
        assert!(Manifest::read_if_valid(&path).await.unwrap().is_none());
    }
}
