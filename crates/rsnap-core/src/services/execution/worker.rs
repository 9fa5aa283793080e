use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use crate::models::host::Host;
use crate::models::job::Job;
use crate::services::execution::command_builder::build_sync_args;
use crate::services::execution::stats_parser::{parse_stats_file, SyncStats};
use crate::services::scheduling::coordinator::Coordinator;

/// Settings a backup worker needs beyond what the coordinator holds.
#[derive(Debug, Clone)]
pub struct BackupSettings {
    pub temp_dir: PathBuf,
    pub rsync_program: String,
    pub rsh_program: String,
}

/// Runs the backup phase: `min(threads, jobs)` workers drain the queue,
/// each invoking one sync subprocess at a time. Returns when the queue is
/// empty and every worker has exited.
pub fn run_backup_pool(coordinator: &Arc<Coordinator>, settings: &BackupSettings, threads: usize) {
    let count = threads.min(coordinator.jobs_total());
    let mut handles = Vec::with_capacity(count);

    for worker_id in 0..count {
        let coordinator = Arc::clone(coordinator);
        let settings = settings.clone();
        let handle = thread::Builder::new()
            .name(format!("rsnap-worker-{}", worker_id))
            .spawn(move || worker_loop(worker_id, &coordinator, &settings))
            .expect("failed to spawn backup worker");
        handles.push(handle);
    }

    for handle in handles {
        let _ = handle.join();
    }
}

fn worker_loop(worker_id: usize, coordinator: &Coordinator, settings: &BackupSettings) {
    coordinator.register_worker(worker_id);

    let temp_dir = settings.temp_dir.join(format!("rsnap.thread.{}", worker_id));
    if !coordinator.simulate() {
        // A leftover from a crashed run must not idle this worker.
        if temp_dir.exists() {
            let _ = std::fs::remove_dir_all(&temp_dir);
        }
        if let Err(e) = std::fs::create_dir_all(&temp_dir) {
            log::error!(
                "worker {}: cannot create {}: {}",
                worker_id,
                temp_dir.display(),
                e
            );
            return;
        }
    }

    while let Some(job) = coordinator.next_job(worker_id) {
        coordinator.worker_started(worker_id, &job);
        let started = Instant::now();

        let (status, stats) = if coordinator.simulate() {
            log::debug!("simulate: would back up {} {}", job.hostname, job.part);
            (Some(0), SyncStats::default())
        } else {
            let host = coordinator
                .host(&job.hostname)
                .expect("job scheduled for unknown host");
            run_sync_job(&job, host, settings, &temp_dir)
        };

        let elapsed = started.elapsed();
        coordinator.job_done(&job, elapsed.as_secs(), status, stats);
        coordinator.worker_finished(worker_id, elapsed);
    }

    if !coordinator.simulate() {
        let _ = std::fs::remove_dir_all(&temp_dir);
    }
}

/// Invokes the sync subprocess for one job, output appended to the job's
/// items log, and parses the stats block out of that log afterwards.
fn run_sync_job(
    job: &Job,
    host: &Host,
    settings: &BackupSettings,
    temp_dir: &Path,
) -> (Option<i32>, SyncStats) {
    let filter_file = match &job.filter {
        Some(rules) => {
            let path = temp_dir.join("filter");
            if let Err(e) = std::fs::write(&path, rules) {
                log::error!(
                    "{} {}: cannot write filter file: {}",
                    job.hostname,
                    job.part,
                    e
                );
                return (None, SyncStats::default());
            }
            Some(path)
        }
        None => None,
    };

    let use_link_dest = host.latest_link().exists();
    let args = match build_sync_args(host, &settings.rsh_program, filter_file.as_deref(), use_link_dest)
    {
        Ok(args) => args,
        Err(e) => {
            log::error!("{} {}: {}", job.hostname, job.part, e);
            return (None, SyncStats::default());
        }
    };

    let log_path = host.items_dir().join(format!("{}.txt", job.part));
    let log_file = match OpenOptions::new().create(true).append(true).open(&log_path) {
        Ok(f) => f,
        Err(e) => {
            log::error!(
                "{} {}: cannot open items log {}: {}",
                job.hostname,
                job.part,
                log_path.display(),
                e
            );
            return (None, SyncStats::default());
        }
    };
    let log_file_err = match log_file.try_clone() {
        Ok(f) => f,
        Err(e) => {
            log::error!("{} {}: cannot clone items log handle: {}", job.hostname, job.part, e);
            return (None, SyncStats::default());
        }
    };

    log::debug!(
        "{} {}: {} {}",
        job.hostname,
        job.part,
        settings.rsync_program,
        shell_words::join(&args)
    );

    let status = Command::new(&settings.rsync_program)
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::from(log_file))
        .stderr(Stdio::from(log_file_err))
        .status();

    match status {
        Ok(status) => (status.code(), parse_stats_file(&log_path)),
        Err(e) => {
            log::error!(
                "{} {}: cannot run {}: {}",
                job.hostname,
                job.part,
                settings.rsync_program,
                e
            );
            (None, SyncStats::default())
        }
    }
}
