use std::ffi::CString;
use std::fmt::Write as _;
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::os::fd::AsRawFd;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;
use std::process::Command;
use std::time::{Duration, Instant};

use chrono::Local;

use crate::error::AppError;
use crate::models::progress::{format_hms, Progress};
use crate::services::scheduling::coordinator::Coordinator;

/// How long the server waits for fifo readability before rechecking the
/// quit flag.
const POLL_TIMEOUT_MS: i32 = 500;

/// Creates the progress fifo. Mode 0777 so queriers under any uid can write
/// requests; mkfifo is subject to the umask, so the mode is forced
/// afterwards.
pub fn create_fifo(path: &Path) -> Result<(), AppError> {
    let cpath = CString::new(path.as_os_str().as_bytes())
        .map_err(|e| AppError::IpcError(e.to_string()))?;
    let rc = unsafe { libc::mkfifo(cpath.as_ptr(), 0o777) };
    if rc != 0 {
        return Err(AppError::IpcError(format!(
            "mkfifo {}: {}",
            path.display(),
            std::io::Error::last_os_error()
        )));
    }
    unsafe { libc::chmod(cpath.as_ptr(), 0o777) };
    Ok(())
}

pub fn remove_fifo(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        log::warn!("cannot remove fifo {}: {}", path.display(), e);
    }
}

/// Serves progress queries over the fifo until the quit flag is set.
/// Opening read/write keeps the fifo alive across clients; requests are
/// newline-delimited, unknown verbs are ignored.
pub fn serve_fifo(coordinator: &Coordinator, path: &Path) {
    let mut fifo = match OpenOptions::new()
        .read(true)
        .write(true)
        .custom_flags(libc::O_NONBLOCK)
        .open(path)
    {
        Ok(f) => f,
        Err(e) => {
            log::error!("cannot open fifo {}: {}", path.display(), e);
            return;
        }
    };
    let fd = fifo.as_raw_fd();
    let mut pending = String::new();

    while !coordinator.should_quit() {
        let mut pollfd = libc::pollfd {
            fd,
            events: libc::POLLIN,
            revents: 0,
        };
        let ready = unsafe { libc::poll(&mut pollfd, 1, POLL_TIMEOUT_MS) };
        if ready <= 0 || pollfd.revents & libc::POLLIN == 0 {
            continue;
        }

        let mut buf = [0u8; 4096];
        let n = match fifo.read(&mut buf) {
            Ok(0) => continue,
            Ok(n) => n,
            Err(_) => continue,
        };
        pending.push_str(&String::from_utf8_lossy(&buf[..n]));

        while let Some(pos) = pending.find('\n') {
            let line = pending[..pos].trim().to_string();
            pending.drain(..=pos);
            handle_command(coordinator, &line);
        }
    }
}

fn handle_command(coordinator: &Coordinator, line: &str) {
    let mut words = line.split_whitespace();
    match words.next() {
        Some("progress") => {
            if let Some(reply_path) = words.next() {
                if let Some(mut reply) = open_reply(reply_path) {
                    let report = render_progress_report(&coordinator.progress_snapshot());
                    if let Err(e) = reply.write_all(report.as_bytes()) {
                        log::warn!("cannot write progress reply to {}: {}", reply_path, e);
                    }
                }
            }
        }
        Some(verb) => log::debug!("ignoring unknown fifo command: {}", verb),
        None => {}
    }
}

/// Opens the querier's response fifo for writing. Non-blocking with a short
/// retry loop so a vanished querier cannot wedge the server.
fn open_reply(path: &str) -> Option<File> {
    for _ in 0..40 {
        match OpenOptions::new()
            .write(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(path)
        {
            Ok(f) => return Some(f),
            Err(e) if e.raw_os_error() == Some(libc::ENXIO) => {
                std::thread::sleep(Duration::from_millis(50));
            }
            Err(e) => {
                log::warn!("cannot open progress reply fifo {}: {}", path, e);
                return None;
            }
        }
    }
    log::warn!("progress querier never opened {} for reading", path);
    None
}

/// Renders the free-form progress report sent to queriers.
pub fn render_progress_report(progress: &Progress) -> String {
    let elapsed = Local::now()
        .signed_duration_since(progress.started_at)
        .num_seconds()
        .max(0) as u64;

    let mut out = String::new();
    let _ = writeln!(
        out,
        "rsnap running since {}",
        progress.started_at.format("%Y-%m-%d %H:%M:%S")
    );
    let _ = writeln!(out, "Elapsed: {}", format_hms(elapsed));
    let _ = writeln!(out, "Phase: {}", progress.phase_line());
    for (id, worker) in &progress.workers {
        let current = worker
            .started
            .map(|s| format_hms(s.elapsed().as_secs()))
            .unwrap_or_else(|| "-".to_string());
        let last = worker
            .last
            .map(|d| format_hms(d.as_secs()))
            .unwrap_or_else(|| "-".to_string());
        let _ = writeln!(
            out,
            "worker {}: {} (current {}, last {})",
            id, worker.state, current, last
        );
    }
    out
}

/// Queries a running instance for progress: creates a private response
/// fifo, sends `progress <path>` and returns the reply.
pub fn query_progress(fifo: &Path) -> Result<String, AppError> {
    if !fifo.exists() {
        return Err(AppError::IpcError(format!(
            "no running rsnap instance ({} missing)",
            fifo.display()
        )));
    }

    let reply_path = std::env::temp_dir().join(format!("rsnap.progress.{}", std::process::id()));
    create_fifo(&reply_path)?;

    let result = (|| {
        let mut request = OpenOptions::new()
            .write(true)
            .open(fifo)
            .map_err(|e| AppError::IpcError(format!("cannot open {}: {}", fifo.display(), e)))?;
        request
            .write_all(format!("progress {}\n", reply_path.display()).as_bytes())
            .map_err(|e| AppError::IpcError(e.to_string()))?;
        drop(request);

        // Blocks until the server opens the reply fifo for writing.
        let mut reply = File::open(&reply_path)
            .map_err(|e| AppError::IpcError(format!("cannot read reply: {}", e)))?;
        let mut text = String::new();
        reply
            .read_to_string(&mut text)
            .map_err(|e| AppError::IpcError(e.to_string()))?;
        Ok(text)
    })();

    let _ = std::fs::remove_file(&reply_path);
    result
}

/// Emits the interpolated phase to the system log every `interval_secs`
/// until the quit flag is set. An interval of 0 disables the logger.
pub fn run_periodic_logger(coordinator: &Coordinator, interval_secs: u64) {
    if interval_secs == 0 {
        return;
    }
    let mut last = Instant::now();
    while !coordinator.should_quit() {
        std::thread::sleep(Duration::from_millis(250));
        if last.elapsed().as_secs() >= interval_secs {
            last = Instant::now();
            log_to_syslog(&coordinator.phase_line());
        }
    }
}

/// Hands one line to syslog, facility daemon, tag rsnap.
pub fn log_to_syslog(message: &str) {
    let result = Command::new("logger")
        .args(["-t", "rsnap", "-p", "daemon.info"])
        .arg(message)
        .status();
    if let Err(e) = result {
        log::debug!("logger invocation failed: {}", e);
    }
}
