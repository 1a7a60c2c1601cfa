//! Low-level durability primitives.
//!
//! A cache write only counts as crash-safe once both the file contents and the
//! directory entry that names it have reached the disk. Creating, renaming or
//! unlinking a file changes the parent directory, so each of those operations
//! is followed by a directory sync.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::Path;

/// Syncs a file's contents and metadata to disk.
pub fn fsync_file(file: &File) -> io::Result<()> {
    file.sync_all()
}

/// Syncs a directory so that entries created, renamed or removed in it persist.
///
/// # Errors
///
/// Returns an error if the path doesn't exist or if the sync fails.
pub fn fsync_dir(dir_path: &Path) -> io::Result<()> {
    let dir = OpenOptions::new().read(true).open(dir_path)?;
    dir.sync_all()
}

/// Removes a file and syncs its parent directory.
///
/// A missing file is not an error: the postcondition (no file) already holds.
pub fn remove_file_durable(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    }
    if let Some(parent) = path.parent() {
        fsync_dir(parent)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn fsync_file_works() {
        let dir = tempdir().unwrap();
        let mut file = File::create(dir.path().join("entry.json")).unwrap();
        file.write_all(b"{}").unwrap();
        fsync_file(&file).unwrap();
    }

    #[test]
    fn fsync_dir_works() {
        let dir = tempdir().unwrap();
        File::create(dir.path().join("entry.json")).unwrap();
        fsync_dir(dir.path()).unwrap();
    }

    #[test]
    fn fsync_dir_fails_on_nonexistent() {
        assert!(fsync_dir(Path::new("/nonexistent/cache/dir")).is_err());
    }

    #[test]
    fn remove_file_durable_deletes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("entry.json");
        File::create(&path).unwrap();

        remove_file_durable(&path).unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn remove_file_durable_tolerates_missing_file() {
        let dir = tempdir().unwrap();
        remove_file_durable(&dir.path().join("missing.json")).unwrap();
    }
}
