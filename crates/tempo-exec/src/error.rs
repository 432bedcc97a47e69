use thiserror::Error;

/// Errors from the job and execution stores.
#[derive(Debug, Error)]
pub enum ExecError {
    /// Underlying SQLite / rusqlite error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Invalid schedule configuration, rejected at job-save time.
    #[error(transparent)]
    Schedule(#[from] tempo_schedule::ScheduleError),

    #[error("Job not found: {id}")]
    JobNotFound { id: String },

    #[error("Execution not found: {id}")]
    ExecutionNotFound { id: String },

    /// Renew or finish by a worker that no longer holds the lease. The
    /// caller must treat its own execution as abandoned.
    #[error("Lease lost on execution {id} (worker {worker})")]
    LeaseLost { id: String, worker: String },

    /// The row is not in a state that permits the operation.
    #[error("Execution {id} is {state}, cannot {operation}")]
    InvalidState {
        id: String,
        state: String,
        operation: String,
    },

    /// A cycle in the dependency or retry chain. Structural, so the
    /// affected execution is force-failed without retry.
    #[error("Dependency cycle detected involving {id}")]
    DependencyCycle { id: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Core(#[from] tempo_core::CoreError),
}

pub type Result<T> = std::result::Result<T, ExecError>;
