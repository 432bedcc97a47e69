use thiserror::Error;

use crate::assembler::AssemblyError;

/// Errors from the version ledger and function store.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Underlying SQLite / rusqlite error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Content-store failure inside a ledger transaction.
    #[error(transparent)]
    Content(#[from] tempo_content::ContentError),

    /// The subject has no versions at all.
    #[error("No versions recorded for {subject}")]
    NotFound { subject: String },

    /// The subject exists but the requested version number does not.
    #[error("Version {number} not found for {subject}")]
    VersionNotFound { subject: String, number: i64 },

    /// No live function row with that name under the job.
    #[error("Function not found: {name} on job {job_id}")]
    FunctionNotFound { job_id: String, name: String },

    /// The job assembler refused the rebuilt unit; the triggering mutation
    /// was rolled back.
    #[error(transparent)]
    Assembly(#[from] AssemblyError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Core(#[from] tempo_core::CoreError),
}

pub type Result<T> = std::result::Result<T, LedgerError>;
