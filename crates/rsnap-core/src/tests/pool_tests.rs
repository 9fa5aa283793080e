use std::path::Path;
use std::sync::Arc;

use tempfile::TempDir;

use crate::config::HostConfig;
use crate::models::job::Job;
use crate::services::execution::worker::{run_backup_pool, BackupSettings};
use crate::services::scheduling::coordinator::Coordinator;
use crate::services::snapshot::lifecycle;
use crate::tests::test_helpers::{resolve_host, write_fake_sync, FAKE_STATS};

fn settings(tmp: &TempDir, sync_program: &Path) -> BackupSettings {
    BackupSettings {
        temp_dir: tmp.path().join("tmp"),
        rsync_program: sync_program.display().to_string(),
        rsh_program: "ssh".to_string(),
    }
}

#[test]
fn single_full_job_success() {
    let tmp = TempDir::new().unwrap();
    let sync = write_fake_sync(tmp.path(), "fake-rsync", FAKE_STATS);
    let host = resolve_host(tmp.path(), "h1", HostConfig::default());
    let coordinator = Arc::new(Coordinator::new(
        vec![host.clone()],
        vec![Job::new("h1", "full", None)],
        false,
    ));

    run_backup_pool(&coordinator, &settings(&tmp, &sync), 2);

    let state = coordinator.host_state("h1").unwrap();
    assert_eq!(state.jobs_done, 1);
    assert_eq!(state.in_progress, 0);
    assert_eq!(state.errors, 0);
    assert_eq!(state.files_total, 100);
    assert_eq!(state.files_sent, 10);
    assert_eq!(state.bytes_total_mb, 1000);
    assert_eq!(state.bytes_sent_mb, 10);

    assert!(host.items_dir().join("full.txt").is_file());
    assert!(host.dir.join(".rsnap/full").is_file());

    let progress = coordinator.progress_snapshot();
    assert_eq!(progress.jobs_done, 1);
    assert_eq!(progress.hosts_done, 1);
}

#[test]
fn failing_job_records_error_and_skips_memo() {
    let tmp = TempDir::new().unwrap();
    let sync = write_fake_sync(tmp.path(), "fake-rsync", "exit 1");
    let host = resolve_host(tmp.path(), "h1", HostConfig::default());
    let coordinator = Arc::new(Coordinator::new(
        vec![host.clone()],
        vec![Job::new("h1", "full", None)],
        false,
    ));

    run_backup_pool(&coordinator, &settings(&tmp, &sync), 1);

    let state = coordinator.host_state("h1").unwrap();
    assert_eq!(state.errors, 1);
    assert_eq!(state.error_messages, vec!["full: rsync exited with code 1"]);
    assert!(!host.dir.join(".rsnap/full").exists());
    // The working directory stays for the next run to link against.
    assert!(host.working_dir().is_dir());
}

#[test]
fn vanished_files_exit_is_tolerated() {
    let tmp = TempDir::new().unwrap();
    let sync = write_fake_sync(tmp.path(), "fake-rsync", &format!("{}\nexit 24", FAKE_STATS));
    let host = resolve_host(tmp.path(), "h1", HostConfig::default());
    let coordinator = Arc::new(Coordinator::new(
        vec![host.clone()],
        vec![Job::new("h1", "full", None)],
        false,
    ));

    run_backup_pool(&coordinator, &settings(&tmp, &sync), 1);

    let state = coordinator.host_state("h1").unwrap();
    assert_eq!(state.errors, 0);
    assert_eq!(state.files_total, 100);
    assert!(host.dir.join(".rsnap/full").is_file());
}

#[test]
fn simulate_leaves_filesystem_untouched() {
    let tmp = TempDir::new().unwrap();
    let host = resolve_host(tmp.path(), "h1", HostConfig::default());
    let coordinator = Arc::new(Coordinator::new(
        vec![host.clone()],
        vec![Job::new("h1", "full", None)],
        true,
    ));

    let settings = BackupSettings {
        temp_dir: tmp.path().join("tmp"),
        rsync_program: "/nonexistent/rsync".to_string(),
        rsh_program: "ssh".to_string(),
    };
    run_backup_pool(&coordinator, &settings, 2);

    assert!(!host.dir.exists());
    assert!(!settings.temp_dir.exists());
    let progress = coordinator.progress_snapshot();
    assert_eq!(progress.jobs_done, 1);
    assert_eq!(progress.hosts_done, 1);
    assert_eq!(coordinator.host_state("h1").unwrap().errors, 0);
}

#[test]
fn queue_drains_across_hosts_and_parts() {
    let tmp = TempDir::new().unwrap();
    let sync = write_fake_sync(tmp.path(), "fake-rsync", FAKE_STATS);
    let h1 = resolve_host(
        tmp.path(),
        "h1",
        HostConfig {
            host_parallel: Some(2),
            ..HostConfig::default()
        },
    );
    let h2 = resolve_host(tmp.path(), "h2", HostConfig::default());

    let jobs = vec![
        Job::new("h1", "part-data_a", None),
        Job::new("h1", "part-data_b", None),
        Job::new("h1", "rest", None),
        Job::new("h2", "full", None),
    ];
    let coordinator = Arc::new(Coordinator::new(vec![h1.clone(), h2.clone()], jobs, false));

    run_backup_pool(&coordinator, &settings(&tmp, &sync), 4);

    for (host, parts) in [(&h1, 3u64), (&h2, 1u64)] {
        let state = coordinator.host_state(&host.hostname).unwrap();
        assert_eq!(state.jobs_done as u64, parts);
        assert_eq!(state.in_progress, 0);
        assert_eq!(state.errors, 0);
        assert_eq!(state.files_total, 100 * parts);
    }
    let progress = coordinator.progress_snapshot();
    assert_eq!(progress.jobs_done, 4);
    assert_eq!(progress.hosts_done, 2);
}

#[test]
fn filter_jobs_pass_rules_to_subprocess() {
    let tmp = TempDir::new().unwrap();
    // The fake sync program copies its filter file (last --filter argument)
    // into the host directory so the test can inspect what it was given.
    let out = tmp.path().join("seen-filter");
    let script = format!(
        r#"for arg in "$@"; do
  case "$arg" in
    --filter=*) cp "${{arg#--filter=. }}" {} ;;
  esac
done
{}"#,
        out.display(),
        FAKE_STATS
    );
    let sync = write_fake_sync(tmp.path(), "fake-rsync", &script);
    let host = resolve_host(tmp.path(), "h1", HostConfig::default());
    let rules = "+ /data/\n+ /data/a/\n- /data/*\n- /*\n";
    let coordinator = Arc::new(Coordinator::new(
        vec![host],
        vec![Job::new("h1", "part-data_a", Some(rules.to_string()))],
        false,
    ));

    run_backup_pool(&coordinator, &settings(&tmp, &sync), 1);

    assert_eq!(std::fs::read_to_string(out).unwrap(), rules);
}

#[test]
fn backup_then_finalize_creates_dated_snapshot() {
    let tmp = TempDir::new().unwrap();
    let sync = write_fake_sync(tmp.path(), "fake-rsync", FAKE_STATS);
    let host = resolve_host(tmp.path(), "h1", HostConfig::default());
    let coordinator = Arc::new(Coordinator::new(
        vec![host.clone()],
        vec![Job::new("h1", "full", None)],
        false,
    ));
    run_backup_pool(&coordinator, &settings(&tmp, &sync), 2);
    assert_eq!(coordinator.host_state("h1").unwrap().errors, 0);

    let snapshot = lifecycle::finalize(&host, |_| {}).unwrap();

    let today = chrono::Local::now().format("%Y%m%d").to_string();
    assert_eq!(snapshot, host.dir.join(format!("snapshot.{}.000", today)));
    assert!(snapshot.is_dir());
    let latest = std::fs::read_link(host.latest_link()).unwrap();
    assert_eq!(latest.to_string_lossy(), format!("snapshot.{}.000", today));
    assert!(!host.working_dir().exists());
}

#[test]
fn stale_worker_temp_dir_is_recreated() {
    let tmp = TempDir::new().unwrap();
    let sync = write_fake_sync(tmp.path(), "fake-rsync", FAKE_STATS);
    let host = resolve_host(tmp.path(), "h1", HostConfig::default());

    // Leftover from a crashed run.
    let stale = tmp.path().join("tmp").join("rsnap.thread.0");
    std::fs::create_dir_all(&stale).unwrap();
    std::fs::write(stale.join("filter"), "- /old\n").unwrap();

    let coordinator = Arc::new(Coordinator::new(
        vec![host],
        vec![Job::new("h1", "full", None)],
        false,
    ));
    run_backup_pool(&coordinator, &settings(&tmp, &sync), 1);

    assert_eq!(coordinator.host_state("h1").unwrap().jobs_done, 1);
    assert_eq!(coordinator.host_state("h1").unwrap().errors, 0);
}
