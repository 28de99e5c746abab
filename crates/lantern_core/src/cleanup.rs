//! Removal of temporary files and directories created during a run.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

#[derive(Debug, Default)]
struct Registered {
    directories: Vec<PathBuf>,
    files: Vec<PathBuf>,
}

/// Tracks temporary paths and deletes them on request.
///
/// Clones share the same registrations. The CLI keeps one to remove what the
/// orchestrator registered when a second signal cuts the run short.
#[derive(Debug, Clone, Default)]
pub struct CleanupManager {
    registered: Arc<Mutex<Registered>>,
}

impl CleanupManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_directory(&self, path: impl Into<PathBuf>) {
        self.registered.lock().directories.push(path.into());
    }

    pub fn register_file(&self, path: impl Into<PathBuf>) {
        self.registered.lock().files.push(path.into());
    }

    pub fn pending(&self) -> usize {
        let registered = self.registered.lock();
        registered.directories.len() + registered.files.len()
    }

    /// Delete everything registered so far. Failures are logged and skipped.
    ///
    /// Each path is attempted once; later calls only see new registrations.
    pub fn cleanup(&self) {
        let Registered { directories, files } = std::mem::take(&mut *self.registered.lock());

        for dir in directories {
            if !dir.exists() {
                continue;
            }
            match fs::remove_dir_all(&dir) {
                Ok(()) => debug!("Removed directory {:?}", dir),
                Err(e) => warn!("Could not delete dir: {:?} because: {}", dir, e),
            }
        }

        for file in files {
            remove_file(&file);
        }
    }
}

fn remove_file(file: &Path) {
    if !file.exists() {
        return;
    }
    match fs::remove_file(file) {
        Ok(()) => debug!("Removed file {:?}", file),
        Err(e) => warn!("Could not delete file: {:?} because: {}", file, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cleanup_removes_registered_paths() {
        let root = tempfile::tempdir().unwrap();
        let session = root.path().join("session");
        fs::create_dir_all(session.join("nested")).unwrap();
        fs::write(session.join("nested").join("package.zip"), b"zip").unwrap();
        let stray = root.path().join("stray.log");
        fs::write(&stray, b"log").unwrap();
        let keep = root.path().join("keep.txt");
        fs::write(&keep, b"keep").unwrap();

        let manager = CleanupManager::new();
        manager.register_directory(&session);
        manager.register_file(&stray);
        manager.register_file(root.path().join("never-created.tmp"));
        assert_eq!(manager.pending(), 3);

        manager.clone().cleanup();

        assert!(!session.exists());
        assert!(!stray.exists());
        assert!(keep.exists());
        assert_eq!(manager.pending(), 0);

        // Nothing left to do.
        manager.cleanup();
    }
}
