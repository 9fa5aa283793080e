use std::path::Path;
use std::process::Command;

use crate::config::HookConfig;
use crate::services::report;

/// Replaces `%h` with the hostname and `%p` with the snapshot path, where
/// known.
pub fn substitute(template: &str, hostname: Option<&str>, snapshot_path: Option<&Path>) -> String {
    let mut out = template.to_string();
    if let Some(h) = hostname {
        out = out.replace("%h", h);
    }
    if let Some(p) = snapshot_path {
        out = out.replace("%p", &p.display().to_string());
    }
    out
}

/// Runs a hook command through the shell. The captured output is mailed when
/// the hook carries an `email_to`; failures are logged and never propagate.
pub fn run_hook(
    hook: &HookConfig,
    hostname: Option<&str>,
    snapshot_path: Option<&Path>,
    sendmail_program: &str,
) {
    let command = substitute(&hook.command, hostname, snapshot_path);
    log::debug!("running hook: {}", command);

    let output = match Command::new("sh").arg("-c").arg(&command).output() {
        Ok(output) => output,
        Err(e) => {
            log::error!("hook '{}' failed to start: {}", command, e);
            return;
        }
    };
    if !output.status.success() {
        log::error!(
            "hook '{}' exited with {:?}",
            command,
            output.status.code()
        );
    }

    if let Some(to) = &hook.email_to {
        let subject = substitute(
            hook.email_subject.as_deref().unwrap_or("rsnap hook"),
            hostname,
            snapshot_path,
        );
        let body = format!(
            "$ {}\n{}{}",
            command,
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        );
        if let Err(e) = report::send_email(
            sendmail_program,
            hook.email_from.as_deref(),
            to,
            &subject,
            &body,
        ) {
            log::error!("cannot mail hook output: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    #[test]
    fn substitutes_hostname_and_path() {
        let s = substitute(
            "archive %h at %p",
            Some("web1"),
            Some(Path::new("/backup/web1/snapshot.20240101.000")),
        );
        assert_eq!(s, "archive web1 at /backup/web1/snapshot.20240101.000");
    }

    #[test]
    fn unknown_tokens_left_alone() {
        assert_eq!(substitute("%h %p", None, None), "%h %p");
        assert_eq!(substitute("no tokens", Some("web1"), None), "no tokens");
    }

    #[test]
    fn hook_command_runs_with_substitution() {
        let tmp = TempDir::new().unwrap();
        let marker: PathBuf = tmp.path().join("web1.done");
        let hook = HookConfig {
            command: format!("touch {}/%h.done", tmp.path().display()),
            progress: None,
            email_from: None,
            email_to: None,
            email_subject: None,
        };
        run_hook(&hook, Some("web1"), None, "/usr/sbin/sendmail");
        assert!(marker.is_file());
    }

    #[test]
    fn failing_hook_does_not_panic() {
        let hook = HookConfig {
            command: "exit 3".to_string(),
            progress: None,
            email_from: None,
            email_to: None,
            email_subject: None,
        };
        run_hook(&hook, None, None, "/usr/sbin/sendmail");
    }
}
