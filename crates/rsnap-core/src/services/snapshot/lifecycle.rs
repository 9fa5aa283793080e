use std::path::{Path, PathBuf};

use chrono::Local;
use regex::Regex;

use crate::error::AppError;
use crate::models::host::Host;

/// Creates the working directories a host's sync subprocesses write into.
/// Called under the global lock when the host's first job is admitted.
pub fn initialize_host(host: &Host, simulate: bool) -> Result<(), AppError> {
    if simulate {
        return Ok(());
    }
    std::fs::create_dir_all(host.working_dir())?;
    std::fs::create_dir_all(host.items_dir())?;
    Ok(())
}

/// Promotes a host's working directory to a dated snapshot and rotates old
/// snapshots into the deletion staging directory. `after_promote` runs once
/// the new snapshot is in place (the per-host hook), before rotation.
/// Returns the new snapshot path.
pub fn finalize<F>(host: &Host, after_promote: F) -> Result<PathBuf, AppError>
where
    F: FnOnce(&Path),
{
    let date = Local::now().format("%Y%m%d").to_string();
    finalize_at(host, &date, after_promote)
}

pub fn finalize_at<F>(host: &Host, date: &str, after_promote: F) -> Result<PathBuf, AppError>
where
    F: FnOnce(&Path),
{
    let suffix = next_suffix(host, date);
    let snap_name = format!("{}.{}", host.archive, suffix);
    let items_name = format!("{}.items", snap_name);
    let snap_path = host.dir.join(&snap_name);

    std::fs::rename(host.working_dir(), &snap_path)?;
    if host.items_dir().exists() {
        std::fs::rename(host.items_dir(), host.dir.join(&items_name))?;
    }

    replace_symlink(&host.latest_link(), &snap_name)?;
    replace_symlink(&host.items_latest_link(), &items_name)?;

    after_promote(&snap_path);

    std::fs::create_dir_all(host.delete_dir())?;
    for name in rotated_out(host, &snap_name)? {
        stage_for_deletion(host, &name);
    }

    Ok(snap_path)
}

/// Next free `YYYYMMDD.NNN` suffix for today; the per-day counter allows
/// multiple runs on the same day.
fn next_suffix(host: &Host, date: &str) -> String {
    let prefix = format!("{}.{}.", host.archive, date);
    let mut max: i32 = -1;
    if let Ok(entries) = std::fs::read_dir(&host.dir) {
        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().into_owned();
            if let Some(num) = name.strip_prefix(&prefix) {
                if num.len() == 3 {
                    if let Ok(n) = num.parse::<i32>() {
                        max = max.max(n);
                    }
                }
            }
        }
    }
    format!("{}.{:03}", date, max + 1)
}

/// Dated snapshot entries in `host.dir`, ascending (lexicographic order is
/// chronological for the `YYYYMMDD.NNN` scheme).
pub fn dated_snapshots(host: &Host) -> Result<Vec<String>, AppError> {
    let pattern = Regex::new(&format!(r"^{}\.\d{{8}}\.\d{{3}}$", regex::escape(&host.archive)))
        .map_err(|e| AppError::IoError(e.to_string()))?;
    let mut names = Vec::new();
    for entry in std::fs::read_dir(&host.dir)?.flatten() {
        let name = entry.file_name().to_string_lossy().into_owned();
        if pattern.is_match(&name) {
            names.push(name);
        }
    }
    names.sort();
    Ok(names)
}

/// Snapshots beyond the newest `rotate` prior ones; the snapshot just
/// created (`current`) always stays.
fn rotated_out(host: &Host, current: &str) -> Result<Vec<String>, AppError> {
    let mut dated = dated_snapshots(host)?;
    dated.retain(|n| n != current);
    let keep = host.rotate as usize;
    if dated.len() > keep {
        dated.truncate(dated.len() - keep);
        Ok(dated)
    } else {
        Ok(Vec::new())
    }
}

fn stage_for_deletion(host: &Host, name: &str) {
    let from = host.dir.join(name);
    let to = host.delete_dir().join(name);
    if let Err(e) = std::fs::rename(&from, &to) {
        log::error!(
            "{}: cannot stage {} for deletion: {}",
            host.hostname,
            name,
            e
        );
        return;
    }
    let items = format!("{}.items", name);
    let items_from = host.dir.join(&items);
    if items_from.exists() {
        if let Err(e) = std::fs::rename(&items_from, host.delete_dir().join(&items)) {
            log::error!(
                "{}: cannot stage {} for deletion: {}",
                host.hostname,
                items,
                e
            );
        }
    }
}

fn replace_symlink(link: &Path, target: &str) -> Result<(), AppError> {
    if std::fs::symlink_metadata(link).is_ok() {
        std::fs::remove_file(link)?;
    }
    std::os::unix::fs::symlink(target, link)?;
    Ok(())
}
