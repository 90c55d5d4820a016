//! Content-addressed file store.
//!
//! Uploaded files are stored once under their SHA-256 hex digest, sharded
//! into two levels of single-character directories to keep directory fanout
//! bounded. Rows reference files by hash only; saving the same content twice
//! is a no-op that returns the same hash.

use regex::Regex;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("The source file {0} does not exist")]
    SourceNotFound(String),
    #[error("{0}")]
    Io(String),
}

pub struct ContentStore {
    base: PathBuf,
    hash_re: Regex,
}

impl ContentStore {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        ContentStore {
            base: base.into(),
            // SHA-256, lowercase hex. Anything else never maps to a path.
            hash_re: Regex::new("^[0-9a-f]{64}$").unwrap(),
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base
    }

    /// Move `source` into the store and return its content hash. Idempotent:
    /// if the content already exists the source is dropped and the existing
    /// hash returned.
    pub fn save(&self, source: &Path) -> Result<String, StorageError> {
        if !source.exists() {
            return Err(StorageError::SourceNotFound(source.display().to_string()));
        }
        let hash = hash_file(source)?;
        // hash_file only produces well-formed digests.
        let dest = match self.hash_to_path(&hash) {
            Some(dest) => dest,
            None => return Err(StorageError::Io(format!("Invalid content hash {hash}"))),
        };
        if dest.exists() {
            let _ = std::fs::remove_file(source);
            return Ok(hash);
        }
        if let Some(dir) = dest.parent() {
            std::fs::create_dir_all(dir).map_err(|e| {
                StorageError::Io(format!("Could not create parent directory {}: {e}", dir.display()))
            })?;
        }
        if let Err(e) = std::fs::rename(source, &dest) {
            // A concurrent save of the same content may have won the race.
            if dest.exists() {
                let _ = std::fs::remove_file(source);
                return Ok(hash);
            }
            return Err(StorageError::Io(format!(
                "Could not save file as {}: {e}",
                dest.display()
            )));
        }
        Ok(hash)
    }

    /// True when a blob with this hash exists. Malformed hashes are simply
    /// absent; they never touch the filesystem.
    pub fn exists(&self, hash: &str) -> bool {
        self.hash_to_path(hash).map(|p| p.exists()).unwrap_or(false)
    }

    pub fn is_content_hash(&self, hash: &str) -> bool {
        self.hash_re.is_match(hash)
    }

    /// Sharded path for a hash: `base/h[0]/h[1]/hash`. `None` for anything
    /// that is not a well-formed content hash, so path traversal via a crafted
    /// "hash" is impossible.
    pub fn hash_to_path(&self, hash: &str) -> Option<PathBuf> {
        if !self.is_content_hash(hash) {
            return None;
        }
        let mut chars = hash.chars();
        let first = chars.next()?;
        let second = chars.next()?;
        Some(self.base.join(first.to_string()).join(second.to_string()).join(hash))
    }
}

fn hash_file(path: &Path) -> Result<String, StorageError> {
    let mut file = File::open(path)
        .map_err(|e| StorageError::Io(format!("Could not open {}: {e}", path.display())))?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file
            .read(&mut buf)
            .map_err(|e| StorageError::Io(format!("Could not read {}: {e}", path.display())))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_hashes_never_map_to_paths() {
        let store = ContentStore::new("/tmp/blobs");
        assert!(store.hash_to_path("../../etc/passwd").is_none());
        assert!(store.hash_to_path("short").is_none());
        assert!(store.hash_to_path(&"A".repeat(64)).is_none());
        assert!(!store.exists("../../etc/passwd"));
    }

    #[test]
    fn hash_shards_into_two_levels() {
        let store = ContentStore::new("/tmp/blobs");
        let hash = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";
        let path = store.hash_to_path(hash).unwrap();
        assert_eq!(path, PathBuf::from(format!("/tmp/blobs/e/3/{hash}")));
    }
}
