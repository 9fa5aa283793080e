use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::models::host::{Host, HostState};
use crate::models::job::Job;
use crate::models::progress::{Progress, WorkerStatus};
use crate::services::execution::stats_parser::SyncStats;
use crate::services::snapshot::{duration_memo, lifecycle};

/// Exit statuses of the sync subprocess that still count as success:
/// 23 is a partial transfer, 24 means source files vanished mid-run.
pub fn is_tolerated_status(status: Option<i32>) -> bool {
    matches!(status, Some(0) | Some(23) | Some(24))
}

/// Everything the run mutates, behind the one global lock.
struct RunState {
    queue: Vec<Job>,
    hosts: HashMap<String, HostState>,
    cleanup_dirs: Vec<PathBuf>,
    progress: Progress,
}

/// Shared run coordinator: owns the job queue, per-host runtime state, the
/// cleanup work list and the progress record. Workers and helper threads
/// share it by `Arc`; every read or write of the aggregate goes through one
/// mutex so progress readers always see a consistent picture.
pub struct Coordinator {
    state: Mutex<RunState>,
    hosts: Vec<Host>,
    host_index: HashMap<String, usize>,
    simulate: bool,
    quit: AtomicBool,
}

impl Coordinator {
    pub fn new(hosts: Vec<Host>, jobs: Vec<Job>, simulate: bool) -> Self {
        let mut host_states: HashMap<String, HostState> = hosts
            .iter()
            .map(|h| (h.hostname.clone(), HostState::default()))
            .collect();
        for job in &jobs {
            host_states
                .get_mut(&job.hostname)
                .expect("job scheduled for unknown host")
                .jobs += 1;
        }

        let host_index = hosts
            .iter()
            .enumerate()
            .map(|(i, h)| (h.hostname.clone(), i))
            .collect();
        let progress = Progress::new(hosts.len(), jobs.len());

        Self {
            state: Mutex::new(RunState {
                queue: jobs,
                hosts: host_states,
                cleanup_dirs: Vec::new(),
                progress,
            }),
            hosts,
            host_index,
            simulate,
            quit: AtomicBool::new(false),
        }
    }

    pub fn host(&self, hostname: &str) -> Option<&Host> {
        self.host_index.get(hostname).map(|i| &self.hosts[*i])
    }

    /// Scheduled hosts in configuration order.
    pub fn hosts(&self) -> &[Host] {
        &self.hosts
    }

    pub fn simulate(&self) -> bool {
        self.simulate
    }

    /// Hands out the next admissible job. The queue is sorted longest first;
    /// even workers scan from the front and odd workers from the tail so two
    /// workers starting together pick up two different large jobs instead of
    /// racing for the same host's capacity. Returns None when every queued
    /// job's host is at its parallelism cap (the worker then exits; jobs
    /// still in flight keep draining the queue).
    pub fn next_job(&self, worker_id: usize) -> Option<Job> {
        let mut st = self.state.lock().expect("lock poisoned");

        let len = st.queue.len();
        let order: Box<dyn Iterator<Item = usize>> = if worker_id % 2 == 0 {
            Box::new(0..len)
        } else {
            Box::new((0..len).rev())
        };

        let mut selected = None;
        for idx in order {
            let job = &st.queue[idx];
            let cap = self
                .host(&job.hostname)
                .map(|h| h.host_parallel)
                .unwrap_or(1);
            let state = &st.hosts[&job.hostname];
            if state.in_progress < cap {
                selected = Some(idx);
                break;
            }
        }
        let idx = selected?;

        let job = st.queue.remove(idx);
        let host = self
            .host(&job.hostname)
            .expect("job scheduled for unknown host");
        let state = st
            .hosts
            .get_mut(&job.hostname)
            .expect("job scheduled for unknown host");
        state.in_progress += 1;

        if !state.initialized {
            state.initialized = true;
            if let Err(e) = lifecycle::initialize_host(host, self.simulate) {
                log::error!("{}: cannot initialize backup directories: {}", host.hostname, e);
            }
        }

        log::debug!("worker {}: picked {} {}", worker_id, job.hostname, job.part);
        Some(job)
    }

    /// Records a finished job: capacity back, stats folded into the host,
    /// counters bumped, duration memoized on tolerated exit statuses.
    pub fn job_done(&self, job: &Job, duration_secs: u64, status: Option<i32>, stats: SyncStats) {
        let mut st = self.state.lock().expect("lock poisoned");

        let host_finished;
        {
            let state = st
                .hosts
                .get_mut(&job.hostname)
                .expect("job finished for unknown host");
            state.in_progress -= 1;
            state.jobs_done += 1;
            state.files_total += stats.files_total;
            state.files_sent += stats.files_sent;
            state.bytes_total_mb += stats.bytes_total_mb;
            state.bytes_sent_mb += stats.bytes_sent_mb;
            state.duration += duration_secs;
            host_finished = state.jobs_done == state.jobs;

            if is_tolerated_status(status) {
                if !self.simulate {
                    let host = &self.hosts[self.host_index[&job.hostname]];
                    if let Err(e) =
                        duration_memo::store_last_duration(&host.dir, &job.part, duration_secs)
                    {
                        log::warn!("{}: cannot store duration memo: {}", job.hostname, e);
                    }
                }
            } else {
                state.errors += 1;
                state.error_messages.push(match status {
                    Some(code) => format!("{}: rsync exited with code {}", job.part, code),
                    None => format!("{}: rsync killed by signal", job.part),
                });
            }
        }

        st.progress.jobs_done += 1;
        if host_finished {
            st.progress.hosts_done += 1;
        }
    }

    pub fn host_state(&self, hostname: &str) -> Option<HostState> {
        let st = self.state.lock().expect("lock poisoned");
        st.hosts.get(hostname).cloned()
    }

    /// Hosts paired with their final state, in configuration order.
    pub fn host_reports(&self) -> Vec<(Host, HostState)> {
        let st = self.state.lock().expect("lock poisoned");
        self.hosts
            .iter()
            .map(|h| (h.clone(), st.hosts[&h.hostname].clone()))
            .collect()
    }

    // --- cleanup phase ---

    /// Enters the cleanup phase: the staging directories become the work
    /// list and the hosts counters are reused to track cleanup progress.
    pub fn begin_cleanup(&self, dirs: Vec<PathBuf>) {
        let mut st = self.state.lock().expect("lock poisoned");
        st.progress.phase = "Cleaning up (done %a/%b hosts)".to_string();
        st.progress.hosts_total = dirs.len();
        st.progress.hosts_done = 0;
        st.cleanup_dirs = dirs;
    }

    pub fn next_cleanup_dir(&self) -> Option<PathBuf> {
        let mut st = self.state.lock().expect("lock poisoned");
        if st.cleanup_dirs.is_empty() {
            None
        } else {
            Some(st.cleanup_dirs.remove(0))
        }
    }

    pub fn cleanup_dir_done(&self) {
        let mut st = self.state.lock().expect("lock poisoned");
        st.progress.hosts_done += 1;
    }

    pub fn cleanup_dirs_len(&self) -> usize {
        self.state.lock().expect("lock poisoned").cleanup_dirs.len()
    }

    // --- progress ---

    pub fn set_phase(&self, template: &str) {
        let mut st = self.state.lock().expect("lock poisoned");
        st.progress.phase = template.to_string();
    }

    pub fn phase_line(&self) -> String {
        self.state.lock().expect("lock poisoned").progress.phase_line()
    }

    pub fn progress_snapshot(&self) -> Progress {
        self.state.lock().expect("lock poisoned").progress.clone()
    }

    pub fn jobs_total(&self) -> usize {
        self.state.lock().expect("lock poisoned").progress.jobs_total
    }

    pub fn register_worker(&self, worker_id: usize) {
        let mut st = self.state.lock().expect("lock poisoned");
        st.progress.workers.insert(worker_id, WorkerStatus::idle());
    }

    pub fn worker_started(&self, worker_id: usize, job: &Job) {
        let mut st = self.state.lock().expect("lock poisoned");
        let entry = st
            .progress
            .workers
            .entry(worker_id)
            .or_insert_with(WorkerStatus::idle);
        entry.state = format!("{} {}", job.hostname, job.part);
        entry.started = Some(Instant::now());
    }

    pub fn worker_finished(&self, worker_id: usize, duration: Duration) {
        let mut st = self.state.lock().expect("lock poisoned");
        let entry = st
            .progress
            .workers
            .entry(worker_id)
            .or_insert_with(WorkerStatus::idle);
        entry.state = "idle".to_string();
        entry.started = None;
        entry.last = Some(duration);
    }

    // --- cooperative shutdown ---

    pub fn request_quit(&self) {
        self.quit.store(true, Ordering::SeqCst);
    }

    pub fn should_quit(&self) -> bool {
        self.quit.load(Ordering::SeqCst)
    }
}
