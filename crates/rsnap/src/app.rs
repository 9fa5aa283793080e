use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chrono::Datelike;
use signal_hook::consts::signal::{SIGINT, SIGTERM};
use signal_hook::iterator::Signals;

use rsnap_core::config::{self, Config};
use rsnap_core::error::AppError;
use rsnap_core::services::coordinator::Coordinator;
use rsnap_core::services::scheduler::{self, Selection};
use rsnap_core::services::worker::{run_backup_pool, BackupSettings};
use rsnap_core::services::{cleanup, hooks, ipc, lifecycle, lockfile, report};

use crate::Cli;

pub fn run(cli: Cli) -> Result<(), AppError> {
    let mut cfg = config::load(Path::new(&cli.config))?;
    for entry in &cli.overrides {
        let (key, value) = entry.split_once('=').ok_or_else(|| {
            AppError::ConfigError(format!("invalid override '{}', expected KEY=VALUE", entry))
        })?;
        cfg.apply_override(key, value)?;
    }

    // Progress query mode: talk to the running instance and get out.
    if cli.progress {
        let reply = ipc::query_progress(Path::new(&cfg.fifo))?;
        print!("{}", reply);
        return Ok(());
    }

    let selection = Selection {
        all: cli.all,
        hostnames: cli.hostnames.clone(),
        groups: cli.groups.clone(),
    };
    let today = chrono::Local::now().weekday().num_days_from_sunday() as u8;
    let (hosts, jobs) = scheduler::schedule(&cfg, &selection, today)?;

    let lock_path = PathBuf::from(&cfg.lockfile);
    let locked = if cli.force || cli.simulate {
        false
    } else {
        match lockfile::acquire(&lock_path) {
            Ok(()) => true,
            Err(e) => {
                if matches!(e, AppError::LockHeld(_)) && cli.all {
                    alert_lock_held(&cfg, &e);
                }
                return Err(e);
            }
        }
    };

    let coordinator = Arc::new(Coordinator::new(hosts, jobs, cli.simulate));
    coordinator.set_phase("Backing up (%a/%b hosts, %c/%d jobs done)");

    let fifo_path = PathBuf::from(&cfg.fifo);
    let fifo_enabled = !cli.force && !cli.simulate;
    let mut helpers: Vec<JoinHandle<()>> = Vec::new();

    if fifo_enabled {
        if let Err(e) = ipc::create_fifo(&fifo_path) {
            if locked {
                lockfile::release(&lock_path);
            }
            return Err(e);
        }
        let coord = Arc::clone(&coordinator);
        let path = fifo_path.clone();
        helpers.push(
            thread::Builder::new()
                .name("rsnap-fifo".to_string())
                .spawn(move || ipc::serve_fifo(&coord, &path))
                .expect("failed to spawn fifo helper"),
        );
    }
    if !cli.simulate && cfg.log_interval > 0 {
        let coord = Arc::clone(&coordinator);
        let interval = cfg.log_interval;
        helpers.push(
            thread::Builder::new()
                .name("rsnap-syslog".to_string())
                .spawn(move || ipc::run_periodic_logger(&coord, interval))
                .expect("failed to spawn syslog helper"),
        );
    }

    install_signal_handler(
        Arc::clone(&coordinator),
        locked.then(|| lock_path.clone()),
        fifo_enabled.then(|| fifo_path.clone()),
    );

    let settings = BackupSettings {
        temp_dir: PathBuf::from(&cfg.temp_dir),
        rsync_program: cfg.rsync_program.clone(),
        rsh_program: cfg.rsh_program.clone(),
    };
    run_backup_pool(&coordinator, &settings, cfg.threads);

    // All workers joined; promote clean hosts to dated snapshots.
    coordinator.set_phase("Rotating snapshots");
    for host in coordinator.hosts().to_vec() {
        let state = coordinator.host_state(&host.hostname).unwrap_or_default();
        if state.errors > 0 {
            log::warn!(
                "{}: {} job(s) failed, keeping working directory",
                host.hostname,
                state.errors
            );
            continue;
        }
        if cli.simulate {
            continue;
        }
        let result = lifecycle::finalize(&host, |snapshot| {
            if let Some(hook) = &host.after_backup_hook {
                if let Some(progress) = &hook.progress {
                    coordinator.set_phase(&hooks::substitute(
                        progress,
                        Some(&host.hostname),
                        Some(snapshot),
                    ));
                }
                hooks::run_hook(hook, Some(&host.hostname), Some(snapshot), &cfg.sendmail_program);
            }
        });
        match result {
            Ok(snapshot) => log::debug!("{}: snapshot {}", host.hostname, snapshot.display()),
            Err(e) => log::error!("{}: finalize failed: {}", host.hostname, e),
        }
    }

    if !cli.simulate {
        if let Some(hook) = &cfg.after_all_backup_hook {
            if let Some(progress) = &hook.progress {
                coordinator.set_phase(progress);
            }
            hooks::run_hook(hook, None, None, &cfg.sendmail_program);
        }
    }

    coordinator.set_phase("Sending report");
    let text = report::build_report(&coordinator.host_reports());
    if cli.simulate {
        log::info!("simulated run, report follows:\n{}", text);
    } else {
        if let Some(dir) = &cfg.reports_dir {
            if let Err(e) = report::write_report_file(Path::new(dir), &text) {
                log::error!("cannot write report: {}", e);
            }
        }
        if let Some(to) = &cfg.email_to {
            if let Err(e) = report::send_email(
                &cfg.sendmail_program,
                cfg.email_from.as_deref(),
                to,
                &cfg.email_subject,
                &text,
            ) {
                log::error!("cannot mail report: {}", e);
            }
        }
    }

    if !cli.simulate && !cli.no_cleanup {
        let dirs = coordinator.hosts().iter().map(|h| h.delete_dir()).collect();
        coordinator.begin_cleanup(dirs);

        let during_hook = cfg.during_all_cleanup_hook.clone();
        let sendmail = cfg.sendmail_program.clone();
        let hook_thread = during_hook
            .map(|hook| thread::spawn(move || hooks::run_hook(&hook, None, None, &sendmail)));

        cleanup::run_cleanup_pool(&coordinator, &cfg.rm_program, cfg.cleanup_threads);

        if let Some(handle) = hook_thread {
            let _ = handle.join();
        }
        if let Some(hook) = &cfg.after_all_cleanup_hook {
            if let Some(progress) = &hook.progress {
                coordinator.set_phase(progress);
            }
            hooks::run_hook(hook, None, None, &cfg.sendmail_program);
        }
    }

    // Mark the run complete; consumers watch the okfile's mtime.
    if !cli.simulate {
        if let Some(okfile) = &cfg.okfile {
            if let Err(e) = std::fs::write(okfile, "") {
                log::error!("cannot touch okfile {}: {}", okfile, e);
            }
        }
    }

    coordinator.request_quit();
    for handle in helpers {
        let _ = handle.join();
    }
    if fifo_enabled {
        ipc::remove_fifo(&fifo_path);
    }
    if locked {
        lockfile::release(&lock_path);
    }
    Ok(())
}

/// A full backup was requested while the lockfile is in place; that usually
/// means a hung or runaway previous run, which is worth an alert.
fn alert_lock_held(cfg: &Config, error: &AppError) {
    let Some(to) = &cfg.email_to else {
        return;
    };
    let body = format!(
        "{}\n\nA full backup was requested but could not start.\n",
        error
    );
    if let Err(e) = report::send_email(
        &cfg.sendmail_program,
        cfg.email_from.as_deref(),
        to,
        "rsnap: lockfile held",
        &body,
    ) {
        log::error!("cannot send lockfile alert: {}", e);
    }
}

fn install_signal_handler(
    coordinator: Arc<Coordinator>,
    lock_path: Option<PathBuf>,
    fifo_path: Option<PathBuf>,
) {
    let mut signals = match Signals::new([SIGINT, SIGTERM]) {
        Ok(signals) => signals,
        Err(e) => {
            log::error!("cannot install signal handler: {}", e);
            return;
        }
    };
    thread::spawn(move || {
        if signals.forever().next().is_some() {
            log::error!("interrupted, shutting down");
            coordinator.request_quit();
            // One helper poll interval so the fifo server lets go of the pipe.
            thread::sleep(Duration::from_millis(750));
            if let Some(path) = &fifo_path {
                ipc::remove_fifo(path);
            }
            if let Some(path) = &lock_path {
                lockfile::release(path);
            }
            std::process::exit(1);
        }
    });
}
