//! Atomic JSON documents.
//!
//! Documents are written with the write-to-temp-then-rename pattern:
//! 1. Write to `<path>.tmp`
//! 2. fsync the temp file
//! 3. Rename to `<path>`
//! 4. fsync the parent directory
//!
//! Readers therefore see either the previous document or the new one, never a
//! torn write, even if the process is killed between any two steps.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

use super::fsync::{fsync_dir, fsync_file};

/// Errors from reading or writing persisted documents.
#[derive(Debug, Error)]
pub enum PersistError {
    /// IO error during file operations.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Schema version mismatch.
    #[error("schema version mismatch in {path}: expected {expected}, got {got}")]
    SchemaMismatch {
        path: PathBuf,
        expected: u32,
        got: u32,
    },
}

/// Result type for persistence operations.
pub type Result<T> = std::result::Result<T, PersistError>;

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Serializes `value` as JSON and writes it atomically to `path`.
///
/// Creates parent directories as needed.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let tmp = tmp_path(path);
    let bytes = serde_json::to_vec(value)?;

    {
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp)?;
        file.write_all(&bytes)?;
        fsync_file(&file)?;
    }

    fs::rename(&tmp, path)?;

    if let Some(parent) = path.parent() {
        fsync_dir(parent)?;
    }

    Ok(())
}

/// Reads a JSON document, returning `None` if the file doesn't exist.
///
/// Other errors (malformed JSON, IO failures) are propagated.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    Ok(Some(serde_json::from_slice(&bytes)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::tempdir;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Doc {
        n: u32,
        label: String,
    }

    #[test]
    fn write_then_read_returns_document() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("doc.json");
        let doc = Doc {
            n: 3,
            label: "three".into(),
        };

        write_json_atomic(&path, &doc).unwrap();
        assert_eq!(read_json::<Doc>(&path).unwrap(), Some(doc));
    }

    #[test]
    fn temp_file_is_cleaned_up() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("doc.json");
        write_json_atomic(&path, &Doc { n: 1, label: "a".into() }).unwrap();

        assert!(path.exists());
        assert!(!tmp_path(&path).exists());
    }

    #[test]
    fn overwrite_replaces_previous_document() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("doc.json");
        write_json_atomic(&path, &Doc { n: 1, label: "a".into() }).unwrap();
        write_json_atomic(&path, &Doc { n: 2, label: "b".into() }).unwrap();

        assert_eq!(read_json::<Doc>(&path).unwrap().unwrap().n, 2);
    }

    #[test]
    fn missing_file_reads_as_none() {
        let dir = tempdir().unwrap();
        assert!(read_json::<Doc>(&dir.path().join("missing.json")).unwrap().is_none());
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("doc.json");
        fs::write(&path, "{\"n\": 1, \"lab").unwrap();

        assert!(matches!(read_json::<Doc>(&path), Err(PersistError::Json(_))));
    }

    #[test]
    fn creates_parent_directories() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested/account/doc.json");
        write_json_atomic(&path, &Doc { n: 1, label: "a".into() }).unwrap();
        assert!(path.exists());
    }
}
