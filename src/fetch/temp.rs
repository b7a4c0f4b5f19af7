//! Scoped temporary resources for one fetch.
//!
//! Each request gets a uniquely named artifact file plus extraction
//! directory. [`ScopedTemp`] removes both on drop — covering skip, error,
//! and mid-pipeline abandonment — unless the scope is adopted into a fetch
//! result via [`ScopedTemp::adopt`], which defers release to the result's
//! cleanup handle.

use crate::fetch::result::CleanupHandle;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::warn;

static SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// RAII pair of a temp artifact file and a temp extraction directory.
///
/// Intentionally not `Clone`: exactly one owner decides whether the paths
/// are released here or handed off to a [`CleanupHandle`].
#[derive(Debug)]
pub struct ScopedTemp {
    file: PathBuf,
    dir: PathBuf,
    armed: bool,
}

impl ScopedTemp {
    /// Acquires a fresh scope under the system temp directory.
    ///
    /// `artifact_name` becomes the suffix of the temp file so that
    /// extension-based archive dispatch sees the real file name.
    pub fn acquire(prefix: &str, artifact_name: &str) -> std::io::Result<Self> {
        Self::acquire_in(&std::env::temp_dir(), prefix, artifact_name)
    }

    /// Acquires a fresh scope under `root` (created if missing).
    pub fn acquire_in(root: &Path, prefix: &str, artifact_name: &str) -> std::io::Result<Self> {
        std::fs::create_dir_all(root)?;

        let unique = format!(
            "{}_{}_{}",
            prefix,
            std::process::id(),
            SEQUENCE.fetch_add(1, Ordering::Relaxed)
        );
        let dir = root.join(format!("{unique}.d"));
        std::fs::create_dir(&dir)?;
        let file = root.join(format!("{unique}-{artifact_name}"));

        Ok(Self {
            file,
            dir,
            armed: true,
        })
    }

    /// Path reserved for the downloaded artifact.
    pub fn file(&self) -> &Path {
        &self.file
    }

    /// Directory reserved for extracted contents.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Disarms the scope and transfers both paths to a cleanup handle.
    ///
    /// After adoption this scope's `Drop` is a no-op; release happens
    /// exactly once via the handle.
    pub fn adopt(mut self) -> CleanupHandle {
        self.armed = false;
        CleanupHandle::new(vec![self.file.clone(), self.dir.clone()])
    }
}

impl Drop for ScopedTemp {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if self.file.exists() {
            if let Err(e) = std::fs::remove_file(&self.file) {
                warn!(path = %self.file.display(), error = %e, "Failed to remove temp file");
            }
        }
        if self.dir.exists() {
            if let Err(e) = std::fs::remove_dir_all(&self.dir) {
                warn!(path = %self.dir.display(), error = %e, "Failed to remove temp dir");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_creates_unique_scopes() {
        let root = tempfile::tempdir().unwrap();
        let a = ScopedTemp::acquire_in(root.path(), "fetch", "pkg.tar.bz2").unwrap();
        let b = ScopedTemp::acquire_in(root.path(), "fetch", "pkg.tar.bz2").unwrap();
        assert_ne!(a.file(), b.file());
        assert_ne!(a.dir(), b.dir());
        assert!(a.dir().is_dir());
        assert!(a
            .file()
            .to_string_lossy()
            .ends_with("pkg.tar.bz2"));
    }

    #[test]
    fn test_drop_removes_resources() {
        let root = tempfile::tempdir().unwrap();
        let (file, dir) = {
            let temp = ScopedTemp::acquire_in(root.path(), "fetch", "pkg.tar.gz").unwrap();
            std::fs::write(temp.file(), b"partial").unwrap();
            std::fs::write(temp.dir().join("inner.txt"), b"x").unwrap();
            (temp.file().to_path_buf(), temp.dir().to_path_buf())
        };
        assert!(!file.exists());
        assert!(!dir.exists());
    }

    #[test]
    fn test_adopt_defers_release_to_handle() {
        let root = tempfile::tempdir().unwrap();
        let temp = ScopedTemp::acquire_in(root.path(), "fetch", "pkg.zip").unwrap();
        std::fs::write(temp.file(), b"artifact").unwrap();
        let file = temp.file().to_path_buf();
        let dir = temp.dir().to_path_buf();

        let handle = temp.adopt();
        // Still present after the scope is gone
        assert!(file.exists());
        assert!(dir.exists());

        handle.release();
        assert!(!file.exists());
        assert!(!dir.exists());

        // Idempotent, safe after the paths are already gone
        handle.release();
    }
}
