use std::path::{Path, PathBuf};

use crate::error::AppError;

const MEMO_DIR: &str = ".rsnap";

fn memo_path(host_dir: &Path, part: &str) -> PathBuf {
    host_dir.join(MEMO_DIR).join(part.replace('/', "_"))
}

/// Duration of the last successful run of `part`, seconds. Absent or
/// unreadable memos read as 0.
pub fn get_last_duration(host_dir: &Path, part: &str) -> u64 {
    std::fs::read_to_string(memo_path(host_dir, part))
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(0)
}

/// Records the duration of a successful run for the next run's
/// longest-job-first ordering.
pub fn store_last_duration(host_dir: &Path, part: &str, secs: u64) -> Result<(), AppError> {
    std::fs::create_dir_all(host_dir.join(MEMO_DIR))?;
    std::fs::write(memo_path(host_dir, part), format!("{}\n", secs))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn roundtrip() {
        let dir = TempDir::new().unwrap();
        store_last_duration(dir.path(), "full", 1234).unwrap();
        assert_eq!(get_last_duration(dir.path(), "full"), 1234);
    }

    #[test]
    fn absent_memo_reads_zero() {
        let dir = TempDir::new().unwrap();
        assert_eq!(get_last_duration(dir.path(), "full"), 0);
    }

    #[test]
    fn garbage_memo_reads_zero() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join(MEMO_DIR)).unwrap();
        std::fs::write(dir.path().join(MEMO_DIR).join("full"), "soon").unwrap();
        assert_eq!(get_last_duration(dir.path(), "full"), 0);
    }

    #[test]
    fn overwrites_previous_value() {
        let dir = TempDir::new().unwrap();
        store_last_duration(dir.path(), "rest", 10).unwrap();
        store_last_duration(dir.path(), "rest", 20).unwrap();
        assert_eq!(get_last_duration(dir.path(), "rest"), 20);
    }

    #[test]
    fn parts_are_separate() {
        let dir = TempDir::new().unwrap();
        store_last_duration(dir.path(), "part-data_a", 5).unwrap();
        store_last_duration(dir.path(), "part-data_b", 9).unwrap();
        assert_eq!(get_last_duration(dir.path(), "part-data_a"), 5);
        assert_eq!(get_last_duration(dir.path(), "part-data_b"), 9);
    }
}
