use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use chrono::{DateTime, Local};

/// What one worker is doing right now, shown by the progress query channel.
#[derive(Debug, Clone)]
pub struct WorkerStatus {
    /// `idle` or `<hostname> <part>`.
    pub state: String,
    /// When the current job started; None while idle.
    pub started: Option<Instant>,
    /// Duration of the worker's last finished job.
    pub last: Option<Duration>,
}

impl WorkerStatus {
    pub fn idle() -> Self {
        Self {
            state: "idle".to_string(),
            started: None,
            last: None,
        }
    }
}

/// Process-wide progress record, mutated under the global lock.
#[derive(Debug, Clone)]
pub struct Progress {
    /// Template with `%a %b %c %d` placeholders for hosts done/total and
    /// jobs done/total.
    pub phase: String,
    pub hosts_total: usize,
    pub hosts_done: usize,
    pub jobs_total: usize,
    pub jobs_done: usize,
    pub workers: BTreeMap<usize, WorkerStatus>,
    pub started_at: DateTime<Local>,
}

impl Progress {
    pub fn new(hosts_total: usize, jobs_total: usize) -> Self {
        Self {
            phase: "Starting".to_string(),
            hosts_total,
            hosts_done: 0,
            jobs_total,
            jobs_done: 0,
            workers: BTreeMap::new(),
            started_at: Local::now(),
        }
    }

    /// The phase template with its placeholders interpolated.
    pub fn phase_line(&self) -> String {
        self.phase
            .replace("%a", &self.hosts_done.to_string())
            .replace("%b", &self.hosts_total.to_string())
            .replace("%c", &self.jobs_done.to_string())
            .replace("%d", &self.jobs_total.to_string())
    }
}

/// Formats seconds as `H:MM:SS`.
pub fn format_hms(secs: u64) -> String {
    format!("{}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_line_interpolates_all_placeholders() {
        let mut p = Progress::new(4, 10);
        p.phase = "Backing up (%a/%b hosts, %c/%d jobs done)".to_string();
        p.hosts_done = 1;
        p.jobs_done = 3;
        assert_eq!(p.phase_line(), "Backing up (1/4 hosts, 3/10 jobs done)");
    }

    #[test]
    fn phase_line_without_placeholders() {
        let mut p = Progress::new(0, 0);
        p.phase = "Sending report".to_string();
        assert_eq!(p.phase_line(), "Sending report");
    }

    #[test]
    fn hms_formatting() {
        assert_eq!(format_hms(0), "0:00:00");
        assert_eq!(format_hms(61), "0:01:01");
        assert_eq!(format_hms(3600), "1:00:00");
        assert_eq!(format_hms(7325), "2:02:05");
    }
}
