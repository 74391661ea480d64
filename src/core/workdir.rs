//! Scoped working-directory changes
//!
//! The external publisher capability is invoked with the process working
//! directory set to the package root. The working directory is
//! process-global state, so the change is modeled as a guard: acquired
//! immediately before the call, restored unconditionally on drop, including
//! on error and panic paths. Concurrent use from multiple threads must be
//! externally serialized.

use std::io;
use std::path::{Path, PathBuf};

/// RAII guard restoring the previous working directory on drop
pub struct WorkdirGuard {
    previous: PathBuf,
}

impl WorkdirGuard {
    /// Change the process working directory, remembering the previous one
    ///
    /// # Arguments
    ///
    /// * `dir` - Absolute directory to change into
    pub fn change_to<P: AsRef<Path>>(dir: P) -> io::Result<Self> {
        let previous = std::env::current_dir()?;
        std::env::set_current_dir(dir.as_ref())?;
        Ok(Self { previous })
    }
}

impl Drop for WorkdirGuard {
    fn drop(&mut self) {
        // Restoration is best-effort; the previous directory may have been
        // removed while the guard was held.
        let _ = std::env::set_current_dir(&self.previous);
    }
}

// The working directory is process-global; every test that changes it must
// hold this lock, across modules.
#[cfg(test)]
pub(crate) static CWD_TEST_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_guard_changes_and_restores() {
        let _lock = CWD_TEST_LOCK.lock().unwrap();
        let temp_dir = TempDir::new().unwrap();
        let before = std::env::current_dir().unwrap();

        {
            let _guard = WorkdirGuard::change_to(temp_dir.path()).unwrap();
            let inside = std::env::current_dir().unwrap();
            assert_eq!(
                inside.canonicalize().unwrap(),
                temp_dir.path().canonicalize().unwrap()
            );
        }

        assert_eq!(std::env::current_dir().unwrap(), before);
    }

    #[test]
    fn test_guard_restores_on_panic() {
        let _lock = CWD_TEST_LOCK.lock().unwrap();
        let temp_dir = TempDir::new().unwrap();
        let before = std::env::current_dir().unwrap();

        let result = std::panic::catch_unwind(|| {
            let _guard = WorkdirGuard::change_to(temp_dir.path()).unwrap();
            panic!("boom");
        });

        assert!(result.is_err());
        assert_eq!(std::env::current_dir().unwrap(), before);
    }

    #[test]
    fn test_guard_rejects_missing_directory() {
        let _lock = CWD_TEST_LOCK.lock().unwrap();
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("does-not-exist");

        assert!(WorkdirGuard::change_to(&missing).is_err());
    }
}
