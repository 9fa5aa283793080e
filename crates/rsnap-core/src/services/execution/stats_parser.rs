use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

/// Totals extracted from one rsync `--stats` block, byte counts in MiB.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncStats {
    pub files_total: u64,
    pub files_sent: u64,
    pub bytes_total_mb: u64,
    pub bytes_sent_mb: u64,
}

// rsync --stats output (separators vary by version, so `,` and `.` are
// stripped before matching):
//     Number of files: 1,416 (reg: 1,108, dir: 308)
//     Number of regular files transferred: 24
//     Total file size: 1,048,576,000 bytes
//     Total transferred file size: 10,485,760 bytes
static FILES_TOTAL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^Number of files: (\d+)").expect("invalid files-total regex"));

static FILES_SENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^Number of (?:regular )?files transferred: (\d+)")
        .expect("invalid files-sent regex")
});

static BYTES_TOTAL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^Total file size: (\d+)").expect("invalid bytes-total regex"));

static BYTES_SENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^Total transferred file size: (\d+)").expect("invalid bytes-sent regex")
});

const BYTES_PER_MB: u64 = 1 << 20;

/// Scans the captured rsync output for its `--stats` summary lines.
/// Missing lines leave the corresponding field at zero.
pub fn parse_stats_text(text: &str) -> SyncStats {
    let mut stats = SyncStats::default();
    for raw in text.lines() {
        let line = raw.replace([',', '.'], "");
        if let Some(caps) = FILES_SENT_RE.captures(&line) {
            stats.files_sent = caps[1].parse().unwrap_or(0);
        } else if let Some(caps) = FILES_TOTAL_RE.captures(&line) {
            stats.files_total = caps[1].parse().unwrap_or(0);
        } else if let Some(caps) = BYTES_TOTAL_RE.captures(&line) {
            stats.bytes_total_mb = caps[1].parse::<u64>().unwrap_or(0) / BYTES_PER_MB;
        } else if let Some(caps) = BYTES_SENT_RE.captures(&line) {
            stats.bytes_sent_mb = caps[1].parse::<u64>().unwrap_or(0) / BYTES_PER_MB;
        }
    }
    stats
}

/// Reads and parses a job's items log. An unreadable log yields zeroed stats.
pub fn parse_stats_file(path: &Path) -> SyncStats {
    match std::fs::read_to_string(path) {
        Ok(text) => parse_stats_text(&text),
        Err(e) => {
            log::warn!("cannot read stats from {}: {}", path.display(), e);
            SyncStats::default()
        }
    }
}
