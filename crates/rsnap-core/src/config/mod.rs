use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;

use serde::Deserialize;

use crate::error::AppError;

pub const DEFAULT_CONFIG_PATH: &str = "/etc/rsnap.conf";

/// A hook attached to a lifecycle point. `%h` and `%p` in `command`,
/// `progress` and `email_subject` are replaced with the hostname and the
/// snapshot path where applicable.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct HookConfig {
    pub command: String,
    #[serde(default)]
    pub progress: Option<String>,
    #[serde(default)]
    pub email_from: Option<String>,
    #[serde(default)]
    pub email_to: Option<String>,
    #[serde(default)]
    pub email_subject: Option<String>,
}

/// Per-host overrides. Any unset field falls back to the global value.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct HostConfig {
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default)]
    pub snapshot_root: Option<String>,
    #[serde(default)]
    pub archive_name: Option<String>,
    #[serde(default)]
    pub exclude: Option<String>,
    #[serde(default)]
    pub rsync_options: Option<String>,
    #[serde(default)]
    pub rotate: Option<u32>,
    #[serde(default)]
    pub host_parallel: Option<usize>,
    /// Weekdays (0 = Sunday) on which this host is backed up. Absent means
    /// every day.
    #[serde(default)]
    pub weekdays: Option<Vec<u8>>,
    /// Roots whose first-level subdirectories are backed up as separate jobs.
    #[serde(default)]
    pub parallel_paths: Option<Vec<String>>,
    #[serde(default)]
    pub after_host_backup_hook: Option<HookConfig>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    // Scheduling
    pub threads: usize,
    pub cleanup_threads: usize,
    pub host_parallel: usize,
    pub rotate: u32,
    /// Seconds between syslog progress lines; 0 disables.
    pub log_interval: u64,

    // Paths
    pub snapshot_root: Option<String>,
    pub archive_name: String,
    pub temp_dir: String,
    pub reports_dir: Option<String>,
    pub lockfile: String,
    pub fifo: String,
    pub okfile: Option<String>,

    // External programs
    pub rsh_program: String,
    pub rsync_program: String,
    pub rsync_options: String,
    pub rm_program: String,
    pub sendmail_program: String,

    // Sync behavior: passed through to rsync verbatim.
    pub exclude: String,

    // Notifications
    pub email_from: Option<String>,
    pub email_to: Option<String>,
    pub email_subject: String,

    // Hooks
    pub after_host_backup_hook: Option<HookConfig>,
    pub after_all_backup_hook: Option<HookConfig>,
    pub during_all_cleanup_hook: Option<HookConfig>,
    pub after_all_cleanup_hook: Option<HookConfig>,

    pub hosts: BTreeMap<String, HostConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            threads: 4,
            cleanup_threads: 2,
            host_parallel: 1,
            rotate: 7,
            log_interval: 300,
            snapshot_root: None,
            archive_name: "snapshot".to_string(),
            temp_dir: "/tmp".to_string(),
            reports_dir: None,
            lockfile: "/var/run/rsnap.lock".to_string(),
            fifo: "/var/run/rsnap.fifo".to_string(),
            okfile: None,
            rsh_program: "ssh".to_string(),
            rsync_program: "rsync".to_string(),
            rsync_options: String::new(),
            rm_program: "rm".to_string(),
            sendmail_program: "/usr/sbin/sendmail".to_string(),
            exclude: String::new(),
            email_from: None,
            email_to: None,
            email_subject: "rsnap backup report".to_string(),
            after_host_backup_hook: None,
            after_all_backup_hook: None,
            during_all_cleanup_hook: None,
            after_all_cleanup_hook: None,
            hosts: BTreeMap::new(),
        }
    }
}

pub fn load(path: &Path) -> Result<Config, AppError> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| AppError::ConfigError(format!("cannot read {}: {}", path.display(), e)))?;
    parse(&text)
}

pub fn parse(text: &str) -> Result<Config, AppError> {
    toml::from_str(text).map_err(|e| AppError::ConfigError(e.to_string()))
}

impl Config {
    /// Applies a `-o KEY=VALUE` command line override to a global key.
    pub fn apply_override(&mut self, key: &str, value: &str) -> Result<(), AppError> {
        match key {
            "threads" => self.threads = parse_value(key, value)?,
            "cleanup_threads" => self.cleanup_threads = parse_value(key, value)?,
            "host_parallel" => self.host_parallel = parse_value(key, value)?,
            "rotate" => self.rotate = parse_value(key, value)?,
            "log_interval" => self.log_interval = parse_value(key, value)?,
            "snapshot_root" => self.snapshot_root = Some(value.to_string()),
            "archive_name" => self.archive_name = value.to_string(),
            "temp_dir" => self.temp_dir = value.to_string(),
            "reports_dir" => self.reports_dir = Some(value.to_string()),
            "lockfile" => self.lockfile = value.to_string(),
            "fifo" => self.fifo = value.to_string(),
            "okfile" => self.okfile = Some(value.to_string()),
            "rsh_program" => self.rsh_program = value.to_string(),
            "rsync_program" => self.rsync_program = value.to_string(),
            "rsync_options" => self.rsync_options = value.to_string(),
            "rm_program" => self.rm_program = value.to_string(),
            "sendmail_program" => self.sendmail_program = value.to_string(),
            "exclude" => self.exclude = value.to_string(),
            "email_from" => self.email_from = Some(value.to_string()),
            "email_to" => self.email_to = Some(value.to_string()),
            "email_subject" => self.email_subject = value.to_string(),
            _ => {
                return Err(AppError::ConfigError(format!(
                    "unknown config key: {}",
                    key
                )))
            }
        }
        Ok(())
    }
}

fn parse_value<T>(key: &str, value: &str) -> Result<T, AppError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e| AppError::ConfigError(format!("invalid value for {}: {}", key, e)))
}
