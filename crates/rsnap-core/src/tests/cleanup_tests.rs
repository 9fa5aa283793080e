use std::sync::Arc;

use tempfile::TempDir;

use crate::config::HostConfig;
use crate::services::scheduling::coordinator::Coordinator;
use crate::services::snapshot::cleanup::run_cleanup_pool;
use crate::tests::test_helpers::resolve_host;

#[test]
fn cleanup_removes_staged_directories() {
    let tmp = TempDir::new().unwrap();
    let h1 = resolve_host(tmp.path(), "h1", HostConfig::default());
    let h2 = resolve_host(tmp.path(), "h2", HostConfig::default());

    for host in [&h1, &h2] {
        let staged = host.delete_dir().join("snapshot.20240101.000");
        std::fs::create_dir_all(&staged).unwrap();
        std::fs::write(staged.join("file"), "old data").unwrap();
    }

    let coordinator = Arc::new(Coordinator::new(vec![h1.clone(), h2.clone()], vec![], false));
    coordinator.begin_cleanup(vec![h1.delete_dir(), h2.delete_dir()]);

    run_cleanup_pool(&coordinator, "rm", 2);

    assert!(!h1.delete_dir().exists());
    assert!(!h2.delete_dir().exists());
    assert_eq!(coordinator.phase_line(), "Cleaning up (done 2/2 hosts)");
}

#[test]
fn cleanup_skips_missing_staging_dirs() {
    let tmp = TempDir::new().unwrap();
    let h1 = resolve_host(tmp.path(), "h1", HostConfig::default());

    let coordinator = Arc::new(Coordinator::new(vec![h1.clone()], vec![], false));
    coordinator.begin_cleanup(vec![h1.delete_dir()]);

    run_cleanup_pool(&coordinator, "rm", 2);

    assert_eq!(coordinator.phase_line(), "Cleaning up (done 1/1 hosts)");
}
