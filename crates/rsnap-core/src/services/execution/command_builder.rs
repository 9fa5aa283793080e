use std::path::Path;

use crate::error::AppError;
use crate::models::host::Host;

/// Builds the rsync argv for one job against `host` (the program name is not
/// included). `filter_file` carries the part's include/exclude rules;
/// `use_link_dest` is set when the previous snapshot exists and unchanged
/// files can be hard-linked against it.
pub fn build_sync_args(
    host: &Host,
    rsh_program: &str,
    filter_file: Option<&Path>,
    use_link_dest: bool,
) -> Result<Vec<String>, AppError> {
    let mut args = shell_words::split(&host.rsync_options).map_err(|e| {
        AppError::ConfigError(format!("{}: bad rsync_options: {}", host.hostname, e))
    })?;

    args.push("--archive".to_string());
    args.push("--delete".to_string());
    args.push("--numeric-ids".to_string());
    args.push("--stats".to_string());
    args.push("--itemize-changes".to_string());
    args.push(format!("--rsh={}", rsh_program));

    args.extend(
        shell_words::split(&host.exclude)
            .map_err(|e| AppError::ConfigError(format!("{}: bad exclude: {}", host.hostname, e)))?,
    );

    if let Some(path) = filter_file {
        args.push(format!("--filter=. {}", path.display()));
    }
    if use_link_dest {
        args.push(format!("--link-dest={}/", host.latest_link().display()));
    }

    args.push(format!("{}:/", host.hostname));
    args.push(format!("{}/", host.working_dir().display()));

    Ok(args)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, HostConfig};

    fn test_host() -> Host {
        let mut cfg = Config::default();
        cfg.snapshot_root = Some("/backup".to_string());
        Host::resolve("web1", &cfg, &HostConfig::default()).unwrap()
    }

    #[test]
    fn fixed_flags_and_endpoints() {
        let args = build_sync_args(&test_host(), "ssh", None, false).unwrap();
        assert_eq!(
            args,
            vec![
                "--archive",
                "--delete",
                "--numeric-ids",
                "--stats",
                "--itemize-changes",
                "--rsh=ssh",
                "web1:/",
                "/backup/web1/snapshot/",
            ]
        );
    }

    #[test]
    fn exclude_string_is_split() {
        let mut host = test_host();
        host.exclude = "--exclude /proc --exclude /sys".to_string();
        let args = build_sync_args(&host, "ssh", None, false).unwrap();
        let pos = args.iter().position(|a| a == "--exclude").unwrap();
        assert_eq!(args[pos + 1], "/proc");
        assert!(args.contains(&"/sys".to_string()));
    }

    #[test]
    fn rsync_options_come_first() {
        let mut host = test_host();
        host.rsync_options = "--bwlimit=1000 --one-file-system".to_string();
        let args = build_sync_args(&host, "ssh", None, false).unwrap();
        assert_eq!(args[0], "--bwlimit=1000");
        assert_eq!(args[1], "--one-file-system");
        assert_eq!(args[2], "--archive");
    }

    #[test]
    fn filter_file_referenced_as_merge_rule() {
        let args =
            build_sync_args(&test_host(), "ssh", Some(Path::new("/tmp/w0/filter")), false).unwrap();
        assert!(args.contains(&"--filter=. /tmp/w0/filter".to_string()));
    }

    #[test]
    fn link_dest_points_at_latest() {
        let args = build_sync_args(&test_host(), "ssh", None, true).unwrap();
        assert!(args.contains(&"--link-dest=/backup/web1/snapshot.latest/".to_string()));
    }

    #[test]
    fn quoted_rsh_program_survives() {
        let args = build_sync_args(&test_host(), "ssh -p 2222", None, false).unwrap();
        assert!(args.contains(&"--rsh=ssh -p 2222".to_string()));
    }

    #[test]
    fn unbalanced_quotes_rejected() {
        let mut host = test_host();
        host.rsync_options = "--foo='bar".to_string();
        assert!(build_sync_args(&host, "ssh", None, false).is_err());
    }
}
