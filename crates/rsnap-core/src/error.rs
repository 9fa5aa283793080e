use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("Selection error: {0}")]
    SelectionError(String),

    #[error("Lockfile {0} exists, another rsnap instance may be running")]
    LockHeld(String),

    #[error("Lock error: {0}")]
    LockError(String),

    #[error("I/O error: {0}")]
    IoError(String),

    #[error("IPC error: {0}")]
    IpcError(String),

    #[error("Mail error: {0}")]
    MailError(String),
}

impl From<std::io::Error> for AppError {
    fn from(e: std::io::Error) -> Self {
        AppError::IoError(e.to_string())
    }
}
