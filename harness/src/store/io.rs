//! Atomic file writes.
//!
//! temp file + fsync, then either rename (replace) or hard link (no-clobber).
//! A reader never observes a partially written target.

use std::io::Write;
use std::path::{Path, PathBuf};

/// Write `bytes` to `target` atomically.
///
/// Without `overwrite`, fails with `ErrorKind::AlreadyExists` when the
/// target exists, even if another writer created it concurrently.
pub fn write_atomic(target: &Path, bytes: &[u8], overwrite: bool) -> std::io::Result<()> {
    let dir = target.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)?;

    let temp_path = temp_path_for(target);
    let result = write_temp(&temp_path, bytes).and_then(|()| {
        if overwrite {
            std::fs::rename(&temp_path, target)
        } else {
            std::fs::hard_link(&temp_path, target)
        }
    });

    if !overwrite || result.is_err() {
        // After a successful rename the temp path is gone already
        let _ = std::fs::remove_file(&temp_path);
    }
    result
}

fn write_temp(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}

fn temp_path_for(target: &Path) -> PathBuf {
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    target.with_file_name(format!(".{name}.{}.tmp", uuid::Uuid::new_v4().simple()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_clobber_write() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("nested").join("run.json");

        write_atomic(&target, b"first", false).unwrap();
        let err = write_atomic(&target, b"second", false).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::AlreadyExists);
        assert_eq!(std::fs::read(&target).unwrap(), b"first");

        write_atomic(&target, b"third", true).unwrap();
        assert_eq!(std::fs::read(&target).unwrap(), b"third");
    }

    #[test]
    fn test_no_temp_files_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("results.csv");
        write_atomic(&target, b"a", false).unwrap();
        let _ = write_atomic(&target, b"b", false);
        write_atomic(&target, b"c", true).unwrap();

        let names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["results.csv".to_string()]);
    }
}
