//! Durable exit-status marker.
//!
//! The marker is a plain-text decimal exit code in `<folder>/.exitcode`.
//! It is written to a temporary sibling and renamed into place, so readers
//! either see no marker or a complete one.

use crate::error::{StorageError, StorageResult};
use std::path::{Path, PathBuf};

/// Marker file name inside a work folder
pub const EXIT_MARKER: &str = ".exitcode";

/// What a work folder's marker says
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkerState {
    /// No marker: the folder is still being written, or was abandoned
    Absent,
    /// A recorded exit code
    Recorded(i32),
    /// Marker exists but does not hold a decimal integer
    Corrupt(String),
}

/// Exit marker reader/writer
pub struct ExitMarker;

impl ExitMarker {
    /// Marker path for a folder
    #[must_use]
    pub fn path(folder: &Path) -> PathBuf {
        folder.join(EXIT_MARKER)
    }

    /// Read the marker of `folder`
    ///
    /// # Errors
    ///
    /// Returns error on IO failures other than the marker being absent
    pub fn read(folder: &Path) -> StorageResult<MarkerState> {
        let path = Self::path(folder);
        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(MarkerState::Absent),
            Err(e) => return Err(StorageError::io(&path, e)),
        };

        let trimmed = text.trim();
        Ok(match trimmed.parse::<i32>() {
            Ok(code) => MarkerState::Recorded(code),
            Err(_) => MarkerState::Corrupt(trimmed.to_string()),
        })
    }

    /// Persist `code` as the marker of `folder`
    ///
    /// # Errors
    ///
    /// Returns error if the temporary file cannot be written or renamed
    pub fn write(folder: &Path, code: i32) -> StorageResult<()> {
        let path = Self::path(folder);
        let tmp = folder.join(format!("{}.{}.tmp", EXIT_MARKER, uuid::Uuid::new_v4().simple()));

        std::fs::write(&tmp, code.to_string()).map_err(|e| StorageError::io(&tmp, e))?;
        std::fs::rename(&tmp, &path).map_err(|e| {
            let _ = std::fs::remove_file(&tmp);
            StorageError::io(&path, e)
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absent_marker() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(ExitMarker::read(dir.path()).unwrap(), MarkerState::Absent);
    }

    #[test]
    fn test_write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        ExitMarker::write(dir.path(), 0).unwrap();
        assert_eq!(ExitMarker::read(dir.path()).unwrap(), MarkerState::Recorded(0));

        let text = std::fs::read_to_string(dir.path().join(EXIT_MARKER)).unwrap();
        assert_eq!(text, "0");
    }

    #[test]
    fn test_overwrite_marker() {
        let dir = tempfile::tempdir().unwrap();
        ExitMarker::write(dir.path(), 1).unwrap();
        ExitMarker::write(dir.path(), 137).unwrap();
        assert_eq!(ExitMarker::read(dir.path()).unwrap(), MarkerState::Recorded(137));
    }

    #[test]
    fn test_negative_and_whitespace() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(EXIT_MARKER), " -9\n").unwrap();
        assert_eq!(ExitMarker::read(dir.path()).unwrap(), MarkerState::Recorded(-9));
    }

    #[test]
    fn test_corrupt_marker() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(EXIT_MARKER), "done").unwrap();
        assert_eq!(
            ExitMarker::read(dir.path()).unwrap(),
            MarkerState::Corrupt("done".to_string())
        );
    }

    #[test]
    fn test_no_temporary_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        ExitMarker::write(dir.path(), 0).unwrap();
        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, vec![EXIT_MARKER.to_string()]);
    }
}
