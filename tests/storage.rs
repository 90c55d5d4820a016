//! Content store behavior against a real temporary directory.

use restdb::{ContentStore, StorageError};
use std::path::PathBuf;

// sha256("hello world")
const HELLO_HASH: &str = "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9";

fn write_source(dir: &std::path::Path, name: &str, content: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, content).unwrap();
    path
}

#[test]
fn save_moves_content_to_sharded_path() {
    let tmp = tempfile::tempdir().unwrap();
    let store = ContentStore::new(tmp.path().join("blobs"));
    let source = write_source(tmp.path(), "upload", b"hello world");

    let hash = store.save(&source).unwrap();
    assert_eq!(hash, HELLO_HASH);
    assert!(!source.exists(), "source is moved, not copied");

    let blob = tmp.path().join("blobs").join("b").join("9").join(HELLO_HASH);
    assert!(blob.exists());
    assert_eq!(std::fs::read(&blob).unwrap(), b"hello world");
    assert!(store.exists(&hash));
}

#[test]
fn save_is_idempotent_for_identical_content() {
    let tmp = tempfile::tempdir().unwrap();
    let store = ContentStore::new(tmp.path().join("blobs"));

    let first = write_source(tmp.path(), "a", b"hello world");
    let second = write_source(tmp.path(), "b", b"hello world");

    assert_eq!(store.save(&first).unwrap(), HELLO_HASH);
    assert_eq!(store.save(&second).unwrap(), HELLO_HASH);
    assert!(!second.exists(), "duplicate source is consumed");

    // Exactly one blob on disk.
    let blob_dir = tmp.path().join("blobs").join("b").join("9");
    assert_eq!(std::fs::read_dir(&blob_dir).unwrap().count(), 1);
}

#[test]
fn missing_source_is_an_error() {
    let tmp = tempfile::tempdir().unwrap();
    let store = ContentStore::new(tmp.path().join("blobs"));
    let missing = tmp.path().join("nope");

    let err = store.save(&missing).unwrap_err();
    assert!(matches!(err, StorageError::SourceNotFound(_)));
    assert_eq!(
        err.to_string(),
        format!("The source file {} does not exist", missing.display())
    );
}

#[test]
fn malformed_hashes_do_not_exist() {
    let tmp = tempfile::tempdir().unwrap();
    let store = ContentStore::new(tmp.path());
    for bad in ["", "xyz", "../../etc/passwd", &HELLO_HASH.to_uppercase()] {
        assert!(!store.exists(bad), "{bad:?} must not resolve");
        assert!(store.hash_to_path(bad).is_none());
    }
    assert!(store.is_content_hash(HELLO_HASH));
}
