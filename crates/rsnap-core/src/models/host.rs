use std::path::PathBuf;

use crate::config::{Config, HookConfig, HostConfig};
use crate::error::AppError;

/// Effective settings for one backup target, global defaults merged with the
/// host's overrides.
#[derive(Debug, Clone, PartialEq)]
pub struct Host {
    pub hostname: String,
    pub group: Option<String>,
    /// `snapshot_root [/ group] / hostname`
    pub dir: PathBuf,
    pub archive: String,
    pub exclude: String,
    pub rsync_options: String,
    pub rotate: u32,
    pub host_parallel: usize,
    pub parallel_paths: Vec<String>,
    pub weekdays: Option<Vec<u8>>,
    pub after_backup_hook: Option<HookConfig>,
}

impl Host {
    pub fn resolve(hostname: &str, cfg: &Config, overrides: &HostConfig) -> Result<Self, AppError> {
        let snapshot_root = overrides
            .snapshot_root
            .clone()
            .or_else(|| cfg.snapshot_root.clone())
            .ok_or_else(|| {
                AppError::ConfigError(format!("host {}: snapshot_root is not set", hostname))
            })?;

        let group = overrides.group.clone().filter(|g| !g.is_empty());
        let mut dir = PathBuf::from(&snapshot_root);
        if let Some(g) = &group {
            dir.push(g);
        }
        dir.push(hostname);

        Ok(Self {
            hostname: hostname.to_string(),
            group,
            dir,
            archive: overrides
                .archive_name
                .clone()
                .unwrap_or_else(|| cfg.archive_name.clone()),
            exclude: overrides
                .exclude
                .clone()
                .unwrap_or_else(|| cfg.exclude.clone()),
            rsync_options: overrides
                .rsync_options
                .clone()
                .unwrap_or_else(|| cfg.rsync_options.clone()),
            rotate: overrides.rotate.unwrap_or(cfg.rotate),
            host_parallel: overrides.host_parallel.unwrap_or(cfg.host_parallel),
            parallel_paths: overrides.parallel_paths.clone().unwrap_or_default(),
            weekdays: overrides.weekdays.clone(),
            after_backup_hook: overrides
                .after_host_backup_hook
                .clone()
                .or_else(|| cfg.after_host_backup_hook.clone()),
        })
    }

    /// Working directory an in-progress backup syncs into.
    pub fn working_dir(&self) -> PathBuf {
        self.dir.join(&self.archive)
    }

    /// Per-job text logs of the in-progress backup.
    pub fn items_dir(&self) -> PathBuf {
        self.dir.join(format!("{}.items", self.archive))
    }

    pub fn latest_link(&self) -> PathBuf {
        self.dir.join(format!("{}.latest", self.archive))
    }

    pub fn items_latest_link(&self) -> PathBuf {
        self.dir.join(format!("{}.items.latest", self.archive))
    }

    /// Staging area rotated-out snapshots are moved into before deletion.
    pub fn delete_dir(&self) -> PathBuf {
        self.dir.join(format!("{}.delete", self.archive))
    }
}

/// Runtime accounting for one scheduled host, mutated under the global lock.
#[derive(Debug, Clone, Default)]
pub struct HostState {
    /// Total job count for this host.
    pub jobs: usize,
    pub jobs_done: usize,
    /// Jobs currently owned by a worker.
    pub in_progress: usize,
    /// True once the first job of this host has been admitted.
    pub initialized: bool,
    pub errors: usize,
    pub error_messages: Vec<String>,
    pub files_total: u64,
    pub files_sent: u64,
    pub bytes_total_mb: u64,
    pub bytes_sent_mb: u64,
    /// Accumulated job wall time, seconds.
    pub duration: u64,
}
