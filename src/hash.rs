//! Content hashing
//!
//! SHA-256 digests, hex encoded. File digests are computed from streamed
//! chunks so large artifacts never have to fit in memory.

use crate::error::{StepCacheError, StepCacheResult};
use sha2::{Digest, Sha256};
use std::path::Path;
use tokio::fs::File;
use tokio::io::AsyncReadExt;

const READ_CHUNK: usize = 64 * 1024;

/// Digest of the empty byte string
pub const EMPTY_DIGEST: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

/// Hash a file's contents
pub async fn hash_file(path: &Path) -> StepCacheResult<String> {
    let mut file = File::open(path)
        .await
        .map_err(|e| StepCacheError::io(format!("opening {}", path.display()), e))?;

    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; READ_CHUNK];
    loop {
        let n = file
            .read(&mut buf)
            .await
            .map_err(|e| StepCacheError::io(format!("reading {}", path.display()), e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Hash an in-memory byte string
pub fn hash_bytes(bytes: impl AsRef<[u8]>) -> String {
    hex::encode(Sha256::digest(bytes.as_ref()))
}

/// Hash a sequence of `(path, digest)` pairs.
///
/// Entries are sorted by path and serialized as a JSON array of pairs before
/// hashing, so the result depends only on the set of entries.
pub fn hash_of_sequence<P, D>(entries: &[(P, D)]) -> String
where
    P: AsRef<str>,
    D: AsRef<str>,
{
    let mut pairs: Vec<(&str, &str)> = entries
        .iter()
        .map(|(p, d)| (p.as_ref(), d.as_ref()))
        .collect();
    pairs.sort();

    // Serializing a slice of string tuples cannot fail
    let canonical = serde_json::to_vec(&pairs).unwrap_or_default();
    hash_bytes(canonical)
}
