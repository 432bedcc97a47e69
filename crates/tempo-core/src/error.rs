use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Permission denied: {reason}")]
    PermissionDenied { reason: String },

    #[error("Unknown subject kind: {0}")]
    UnknownSubjectKind(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CoreError>;
