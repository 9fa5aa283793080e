use std::fs::OpenOptions;
use std::io::ErrorKind;
use std::path::Path;

use crate::error::AppError;

/// Creates the single-instance lockfile. Fails with `LockHeld` when another
/// run left it in place.
pub fn acquire(path: &Path) -> Result<(), AppError> {
    match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
            Err(AppError::LockHeld(path.display().to_string()))
        }
        Err(e) => Err(AppError::LockError(format!(
            "cannot create lockfile {}: {}",
            path.display(),
            e
        ))),
    }
}

pub fn release(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        log::warn!("cannot remove lockfile {}: {}", path.display(), e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn acquire_creates_empty_file() {
        let tmp = TempDir::new().unwrap();
        let lock = tmp.path().join("rsnap.lock");
        acquire(&lock).unwrap();
        assert_eq!(std::fs::metadata(&lock).unwrap().len(), 0);
    }

    #[test]
    fn second_acquire_reports_held() {
        let tmp = TempDir::new().unwrap();
        let lock = tmp.path().join("rsnap.lock");
        acquire(&lock).unwrap();
        assert!(matches!(acquire(&lock), Err(AppError::LockHeld(_))));
    }

    #[test]
    fn release_allows_reacquire() {
        let tmp = TempDir::new().unwrap();
        let lock = tmp.path().join("rsnap.lock");
        acquire(&lock).unwrap();
        release(&lock);
        acquire(&lock).unwrap();
    }
}
