use crate::config::Config;
use crate::error::AppError;
use crate::models::host::Host;
use crate::models::job::{encode_part, Job, PART_FULL, PART_REST};
use crate::services::snapshot::duration_memo;

/// Which configured hosts a run covers.
#[derive(Debug, Clone, Default)]
pub struct Selection {
    pub all: bool,
    pub hostnames: Vec<String>,
    pub groups: Vec<String>,
}

/// Resolves the hosts a run covers: CLI selectors applied to the config,
/// then the per-host weekday filter against today. `today_weekday` counts
/// from Sunday = 0.
pub fn select_hosts(
    cfg: &Config,
    selection: &Selection,
    today_weekday: u8,
) -> Result<Vec<Host>, AppError> {
    for name in &selection.hostnames {
        if !cfg.hosts.contains_key(name) {
            return Err(AppError::SelectionError(format!("unknown host: {}", name)));
        }
    }

    let explicit = !selection.hostnames.is_empty() || !selection.groups.is_empty();
    if selection.all && explicit {
        log::warn!("--all ignored: explicit host or group selection wins");
    }
    let all = selection.all && !explicit;

    let mut hosts = Vec::new();
    for (name, overrides) in &cfg.hosts {
        let in_group = overrides
            .group
            .as_ref()
            .map(|g| selection.groups.contains(g))
            .unwrap_or(false);
        if !(all || selection.hostnames.contains(name) || in_group) {
            continue;
        }

        let host = Host::resolve(name, cfg, overrides)?;
        if let Some(weekdays) = &host.weekdays {
            if !weekdays.contains(&today_weekday) {
                log::debug!("{}: not scheduled on weekday {}", name, today_weekday);
                continue;
            }
        }
        hosts.push(host);
    }

    if hosts.is_empty() {
        return Err(AppError::SelectionError(
            "no hosts selected for backup".to_string(),
        ));
    }
    Ok(hosts)
}

/// Filter rules backing up only `subpath`: every ancestor is included, then
/// siblings are excluded level by level up to the root. rsync applies the
/// first matching rule per path.
pub fn subdir_filter(subpath: &str) -> String {
    let comps: Vec<&str> = subpath.trim_matches('/').split('/').collect();
    let mut lines = Vec::new();

    let mut prefix = String::new();
    for comp in &comps {
        prefix.push('/');
        prefix.push_str(comp);
        lines.push(format!("+ {}/", prefix));
    }
    for i in (1..comps.len()).rev() {
        let parent: String = comps[..i].iter().map(|c| format!("/{}", c)).collect();
        lines.push(format!("- {}/*", parent));
    }
    lines.push("- /*".to_string());

    let mut text = lines.join("\n");
    text.push('\n');
    text
}

/// Filter rules for the `rest` job: exclude every subdirectory already
/// covered by a part job.
pub fn rest_filter(subpaths: &[String]) -> String {
    subpaths
        .iter()
        .map(|p| format!("- {}/\n", p.trim_end_matches('/')))
        .collect()
}

/// Expands one host into its backup jobs. Hosts without parallel paths, or
/// without a previous snapshot to scan, get a single `full` job. Otherwise
/// every first-level subdirectory found under a parallel root in the
/// previous snapshot becomes a part job, and a trailing `rest` job covers
/// everything else.
pub fn expand_jobs(host: &Host) -> Vec<Job> {
    let latest = host.latest_link();
    if host.parallel_paths.is_empty() || !latest.exists() {
        return vec![Job::new(&host.hostname, PART_FULL, None)];
    }

    let mut jobs = Vec::new();
    let mut covered = Vec::new();
    for root in &host.parallel_paths {
        let trimmed = root.trim_matches('/');
        let scan = latest.join(trimmed);
        let entries = match std::fs::read_dir(&scan) {
            Ok(entries) => entries,
            Err(_) => continue,
        };
        let mut names: Vec<String> = entries
            .flatten()
            .filter(|e| e.path().is_dir())
            .filter_map(|e| e.file_name().into_string().ok())
            .collect();
        names.sort();
        for name in names {
            let subpath = format!("/{}/{}", trimmed, name);
            jobs.push(Job::new(
                &host.hostname,
                &encode_part(&subpath),
                Some(subdir_filter(&subpath)),
            ));
            covered.push(subpath);
        }
    }

    let rest_rules = if covered.is_empty() {
        None
    } else {
        Some(rest_filter(&covered))
    };
    jobs.push(Job::new(&host.hostname, PART_REST, rest_rules));
    jobs
}

/// Builds the run's job queue: selected hosts expanded into jobs, each job's
/// memoized duration looked up, the whole list sorted longest first.
pub fn schedule(
    cfg: &Config,
    selection: &Selection,
    today_weekday: u8,
) -> Result<(Vec<Host>, Vec<Job>), AppError> {
    let hosts = select_hosts(cfg, selection, today_weekday)?;

    let mut jobs = Vec::new();
    for host in &hosts {
        for mut job in expand_jobs(host) {
            job.last_duration = duration_memo::get_last_duration(&host.dir, &job.part);
            jobs.push(job);
        }
    }
    jobs.sort_by(|a, b| b.last_duration.cmp(&a.last_duration));

    log::debug!(
        "scheduled {} job(s) on {} host(s)",
        jobs.len(),
        hosts.len()
    );
    Ok((hosts, jobs))
}
