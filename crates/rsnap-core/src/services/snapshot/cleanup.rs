use std::process::Command;
use std::sync::Arc;
use std::thread;

use crate::services::scheduling::coordinator::Coordinator;

/// Runs the deferred-deletion phase: `min(cleanup_threads, dirs)` workers
/// pop staging directories off the coordinator and remove them with the
/// configured rm program. Failures are only visible on the subprocess
/// stderr; nothing is retried.
pub fn run_cleanup_pool(coordinator: &Arc<Coordinator>, rm_program: &str, cleanup_threads: usize) {
    let count = cleanup_threads.min(coordinator.cleanup_dirs_len());
    let mut handles = Vec::with_capacity(count);

    for worker_id in 0..count {
        let coordinator = Arc::clone(coordinator);
        let rm_program = rm_program.to_string();
        let handle = thread::Builder::new()
            .name(format!("rsnap-cleanup-{}", worker_id))
            .spawn(move || {
                while let Some(dir) = coordinator.next_cleanup_dir() {
                    if dir.exists() {
                        log::debug!("cleanup {}: removing {}", worker_id, dir.display());
                        match Command::new(&rm_program).arg("-rf").arg(&dir).status() {
                            Ok(status) if !status.success() => {
                                log::warn!(
                                    "{} -rf {} exited with {:?}",
                                    rm_program,
                                    dir.display(),
                                    status.code()
                                );
                            }
                            Ok(_) => {}
                            Err(e) => {
                                log::error!("cannot run {}: {}", rm_program, e);
                            }
                        }
                    }
                    coordinator.cleanup_dir_done();
                }
            })
            .expect("failed to spawn cleanup worker");
        handles.push(handle);
    }

    for handle in handles {
        let _ = handle.join();
    }
}
