use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use crate::config::{Config, HostConfig};
use crate::models::host::Host;

/// A stats block matching the numbers used throughout the scenario tests:
/// 100 files, 10 transferred, 1000 MiB total, 10 MiB sent.
pub const FAKE_STATS: &str = r#"echo "Number of files: 100"
echo "Number of files transferred: 10"
echo "Total file size: 1048576000 bytes"
echo "Total transferred file size: 10485760 bytes""#;

/// Writes an executable shell script standing in for the sync program.
pub fn write_fake_sync(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    let mut perms = std::fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).unwrap();
    path
}

pub fn config_rooted(root: &Path) -> Config {
    let mut cfg = Config::default();
    cfg.snapshot_root = Some(root.display().to_string());
    cfg
}

pub fn resolve_host(root: &Path, name: &str, overrides: HostConfig) -> Host {
    Host::resolve(name, &config_rooted(root), &overrides).unwrap()
}
