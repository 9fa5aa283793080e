use std::fmt::Write as _;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use chrono::Local;

use crate::error::AppError;
use crate::models::host::{Host, HostState};
use crate::models::progress::format_hms;

#[derive(Debug, Clone, Copy, Default)]
struct Totals {
    files_total: u64,
    files_sent: u64,
    bytes_total_mb: u64,
    bytes_sent_mb: u64,
    duration: u64,
}

impl Totals {
    fn add(&mut self, st: &HostState) {
        self.files_total += st.files_total;
        self.files_sent += st.files_sent;
        self.bytes_total_mb += st.bytes_total_mb;
        self.bytes_sent_mb += st.bytes_sent_mb;
        self.duration += st.duration;
    }
}

fn gb(mb: u64) -> String {
    format!("{:.2}", mb as f64 / 1024.0)
}

fn subtotal_label(group: &str) -> String {
    if group.is_empty() {
        "total".to_string()
    } else {
        format!("{} total", group)
    }
}

/// Builds the end-of-run report: failure blocks first, then a fixed-width
/// table ordered by (group, hostname) with a subtotal per group and a grand
/// total. Byte columns are rendered in GB, times as `H:MM:SS`.
pub fn build_report(rows: &[(Host, HostState)]) -> String {
    let mut rows: Vec<&(Host, HostState)> = rows.iter().collect();
    rows.sort_by(|a, b| {
        let ga = a.0.group.as_deref().unwrap_or("");
        let gb = b.0.group.as_deref().unwrap_or("");
        ga.cmp(gb).then_with(|| a.0.hostname.cmp(&b.0.hostname))
    });

    let mut out = String::new();

    let failed: Vec<&&(Host, HostState)> = rows.iter().filter(|(_, st)| st.errors > 0).collect();
    if !failed.is_empty() {
        out.push_str("rsnap errors:\n\n");
        for (host, st) in failed {
            if st.jobs > 1 {
                let _ = writeln!(
                    out,
                    "{} ({} of {} jobs failed):",
                    host.hostname, st.errors, st.jobs
                );
            } else {
                let _ = writeln!(out, "{}:", host.hostname);
            }
            for msg in &st.error_messages {
                let _ = writeln!(out, "  {}", msg);
            }
            out.push('\n');
        }
    }

    let host_width = rows
        .iter()
        .map(|(h, _)| h.hostname.len())
        .chain(
            rows.iter()
                .map(|(h, _)| subtotal_label(h.group.as_deref().unwrap_or("")).len()),
        )
        .chain(["Host".len(), "TOTAL".len()])
        .max()
        .unwrap_or(5);

    let row = |out: &mut String, name: &str, t: &Totals| {
        let _ = writeln!(
            out,
            "{:<width$}  {:>11}  {:>10}  {:>8}  {:>8}  {:>9}",
            name,
            t.files_total,
            t.files_sent,
            gb(t.bytes_total_mb),
            gb(t.bytes_sent_mb),
            format_hms(t.duration),
            width = host_width
        );
    };

    let _ = writeln!(
        out,
        "{:<width$}  {:>11}  {:>10}  {:>8}  {:>8}  {:>9}",
        "Host",
        "Files Total",
        "Files Sent",
        "GB Total",
        "GB Sent",
        "Time",
        width = host_width
    );

    let mut grand = Totals::default();
    let mut group_totals = Totals::default();
    let mut current_group: Option<String> = None;

    for (host, st) in &rows {
        let group = host.group.clone().unwrap_or_default();
        if let Some(current) = &current_group {
            if *current != group {
                row(&mut out, &subtotal_label(current), &group_totals);
                out.push('\n');
                group_totals = Totals::default();
            }
        }
        current_group = Some(group);

        let mut t = Totals::default();
        t.add(st);
        row(&mut out, &host.hostname, &t);
        group_totals.add(st);
        grand.add(st);
    }
    if let Some(current) = &current_group {
        row(&mut out, &subtotal_label(current), &group_totals);
        out.push('\n');
    }

    row(&mut out, "TOTAL", &grand);
    out
}

/// Writes the report into `reports_dir` as `rsnap.<YYYYMMDD-HHMMSS>.txt`.
/// A missing directory is not an error; the report is simply not persisted.
pub fn write_report_file(reports_dir: &Path, report: &str) -> Result<Option<PathBuf>, AppError> {
    if !reports_dir.is_dir() {
        log::warn!(
            "reports_dir {} does not exist, not writing report",
            reports_dir.display()
        );
        return Ok(None);
    }
    let path = reports_dir.join(format!(
        "rsnap.{}.txt",
        Local::now().format("%Y%m%d-%H%M%S")
    ));
    std::fs::write(&path, report)?;
    Ok(Some(path))
}

/// Hands a message to the sendmail program, headers and body on stdin.
pub fn send_email(
    sendmail_program: &str,
    from: Option<&str>,
    to: &str,
    subject: &str,
    body: &str,
) -> Result<(), AppError> {
    let mut message = String::new();
    if let Some(from) = from {
        let _ = writeln!(message, "From: {}", from);
    }
    let _ = writeln!(message, "To: {}", to);
    let _ = writeln!(message, "Subject: {}", subject);
    message.push('\n');
    message.push_str(body);

    let mut child = Command::new(sendmail_program)
        .arg("-t")
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| AppError::MailError(format!("cannot run {}: {}", sendmail_program, e)))?;

    child
        .stdin
        .take()
        .ok_or_else(|| AppError::MailError("cannot open sendmail stdin".to_string()))?
        .write_all(message.as_bytes())
        .map_err(|e| AppError::MailError(e.to_string()))?;

    let status = child
        .wait()
        .map_err(|e| AppError::MailError(e.to_string()))?;
    if !status.success() {
        return Err(AppError::MailError(format!(
            "{} exited with {:?}",
            sendmail_program,
            status.code()
        )));
    }
    Ok(())
}
