//! Artifact archives
//!
//! Declared paths are written as a tar stream straight into a gzip encoder
//! over the destination file, so no uncompressed copy ever hits the disk.
//! Restoring reverses the pipeline under the working tree root.

use crate::error::{StepCacheError, StepCacheResult};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Pack `paths` (relative to `root`, directories recursively) into a
/// gzip-compressed tarball at `destination`. Returns the archive size.
pub async fn pack(root: &Path, paths: &[String], destination: &Path) -> StepCacheResult<u64> {
    let root = root.to_path_buf();
    let paths = paths.to_vec();
    let destination = destination.to_path_buf();

    tokio::task::spawn_blocking(move || pack_blocking(&root, &paths, &destination))
        .await
        .map_err(|e| StepCacheError::Internal(format!("archive task panicked: {}", e)))?
}

/// Extract a tarball produced by [`pack`] under `root`, overwriting files
pub async fn unpack(archive: &Path, root: &Path) -> StepCacheResult<()> {
    let archive = archive.to_path_buf();
    let root = root.to_path_buf();

    tokio::task::spawn_blocking(move || unpack_blocking(&archive, &root))
        .await
        .map_err(|e| StepCacheError::Internal(format!("extract task panicked: {}", e)))?
}

fn pack_blocking(root: &Path, paths: &[String], destination: &Path) -> StepCacheResult<u64> {
    let file = File::create(destination).map_err(|e| {
        StepCacheError::io(format!("creating archive {}", destination.display()), e)
    })?;
    let encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
    let mut builder = tar::Builder::new(encoder);
    builder.follow_symlinks(false);

    for declared in paths {
        let rel = normalize(declared);
        let source = root.join(&rel);
        let metadata = match fs::symlink_metadata(&source) {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StepCacheError::ArchivePathMissing(rel));
            }
            Err(e) => {
                return Err(StepCacheError::io(
                    format!("reading metadata of {}", source.display()),
                    e,
                ))
            }
        };

        debug!("Adding {} to archive", rel.display());
        let appended = if metadata.is_dir() {
            builder.append_dir_all(&rel, &source)
        } else {
            builder.append_path_with_name(&source, &rel)
        };
        appended.map_err(|e| StepCacheError::archive(format!("adding {}", rel.display()), e))?;
    }

    let encoder = builder
        .into_inner()
        .map_err(|e| StepCacheError::archive("finishing tar stream", e))?;
    let mut writer = encoder
        .finish()
        .map_err(|e| StepCacheError::archive("finishing gzip stream", e))?;
    writer
        .flush()
        .map_err(|e| StepCacheError::io(format!("writing {}", destination.display()), e))?;

    let size = fs::metadata(destination)
        .map_err(|e| StepCacheError::io(format!("reading {}", destination.display()), e))?
        .len();
    Ok(size)
}

fn unpack_blocking(archive: &Path, root: &Path) -> StepCacheResult<()> {
    let file = File::open(archive)
        .map_err(|e| StepCacheError::io(format!("opening archive {}", archive.display()), e))?;
    let mut tarball = tar::Archive::new(GzDecoder::new(BufReader::new(file)));
    tarball.set_overwrite(true);
    tarball.set_preserve_mtime(true);
    tarball.set_preserve_permissions(true);

    tarball
        .unpack(root)
        .map_err(|e| StepCacheError::archive(format!("extracting into {}", root.display()), e))
}

/// Strip `./` prefixes and trailing slashes from a declared path
fn normalize(declared: &str) -> PathBuf {
    let trimmed = declared.trim_end_matches('/');
    let trimmed = trimmed.strip_prefix("./").unwrap_or(trimmed);
    PathBuf::from(trimmed)
}
