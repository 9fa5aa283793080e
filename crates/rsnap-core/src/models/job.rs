/// Part name of the single job covering a whole host.
pub const PART_FULL: &str = "full";
/// Part name of the job covering everything outside the parallel-path parts.
pub const PART_REST: &str = "rest";

/// One unit of work handed to a backup worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub hostname: String,
    /// `full`, `part-<encoded subpath>` or `rest`.
    pub part: String,
    /// Include/exclude rules consumed by rsync via a merge-filter file.
    pub filter: Option<String>,
    /// Duration of the last successful run of this part, seconds. 0 if unknown.
    pub last_duration: u64,
}

impl Job {
    pub fn new(hostname: &str, part: &str, filter: Option<String>) -> Self {
        Self {
            hostname: hostname.to_string(),
            part: part.to_string(),
            filter,
            last_duration: 0,
        }
    }
}

/// Encodes a parallel-path subdirectory into a part name: `/data/a` becomes
/// `part-data_a`.
pub fn encode_part(subpath: &str) -> String {
    format!("part-{}", subpath.trim_matches('/').replace('/', "_"))
}
