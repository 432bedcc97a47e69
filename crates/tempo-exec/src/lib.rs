//! `tempo-exec` — jobs, execution leasing and the polling engine.
//!
//! # Overview
//!
//! Jobs are persisted to a SQLite `jobs` table with their schedule and
//! retry policy. The [`engine::Engine`] polls every second, inserts a
//! `pending` execution for each due job and advances the job's next run.
//! Workers claim pending executions with a time-bounded lease
//! (`pending → running`), renew it while working, and finish with an
//! outcome (`completed`, `failed` or `timeout`). Failures retry per the
//! job's strategy; exhausted or repeated failures feed the dead-letter
//! controller, which quarantines the job until a human recovers it.
//!
//! # Execution states
//!
//! | State       | Meaning                                              |
//! |-------------|------------------------------------------------------|
//! | `pending`   | Waiting to be claimed once `next_run_at` arrives     |
//! | `running`   | Leased by exactly one worker (unless concurrent)     |
//! | `completed` | Finished successfully                                |
//! | `failed`    | Finished with an error (may have spawned a retry)    |
//! | `timeout`   | Worker exceeded its own deadline                      |
//! | `skipped`   | Dependency unsatisfied — terminal, never ran         |
//!
//! Cross-process invariants (one `running` per non-concurrent job, one
//! claim winner) are enforced with conditional UPDATEs against the shared
//! store, never with in-process locks.

pub mod db;
pub mod dlq;
pub mod engine;
pub mod error;
pub mod executions;
pub mod jobs;
pub mod stats;
pub mod types;

pub use engine::{Engine, EngineEvent};
pub use error::{ExecError, Result};
pub use executions::{ExecutionStore, ReapedLease};
pub use jobs::JobStore;
pub use stats::{DailyStat, ExecutionSummary, StatusCounts};
pub use types::{
    Execution, ExecutionOutcome, ExecutionStatus, FinishReport, Job, JobUpdate, NewJob,
    RetryStrategy,
};
