use serde::{Deserialize, Serialize};

use tempo_schedule::ScheduleConfig;

/// Lifecycle state of one execution attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// Waiting for its `next_run_at` and a worker claim.
    Pending,
    /// Leased by a worker.
    Running,
    /// Finished successfully.
    Completed,
    /// Finished with an error.
    Failed,
    /// Worker hit its own deadline (or the reaper expired the lease).
    Timeout,
    /// Dependency unsatisfied — terminal without ever running.
    Skipped,
}

impl ExecutionStatus {
    /// Terminal states accept no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecutionStatus::Completed
                | ExecutionStatus::Failed
                | ExecutionStatus::Timeout
                | ExecutionStatus::Skipped
        )
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ExecutionStatus::Pending => "pending",
            ExecutionStatus::Running => "running",
            ExecutionStatus::Completed => "completed",
            ExecutionStatus::Failed => "failed",
            ExecutionStatus::Timeout => "timeout",
            ExecutionStatus::Skipped => "skipped",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for ExecutionStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ExecutionStatus::Pending),
            "running" => Ok(ExecutionStatus::Running),
            "completed" => Ok(ExecutionStatus::Completed),
            "failed" => Ok(ExecutionStatus::Failed),
            "timeout" => Ok(ExecutionStatus::Timeout),
            "skipped" => Ok(ExecutionStatus::Skipped),
            other => Err(format!("unknown execution status: {other}")),
        }
    }
}

/// How a worker reports the end of its attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionOutcome {
    Completed,
    Failed,
    Timeout,
}

impl ExecutionOutcome {
    pub fn status(&self) -> ExecutionStatus {
        match self {
            ExecutionOutcome::Completed => ExecutionStatus::Completed,
            ExecutionOutcome::Failed => ExecutionStatus::Failed,
            ExecutionOutcome::Timeout => ExecutionStatus::Timeout,
        }
    }

    /// Failures and timeouts both feed retry and dead-letter accounting.
    pub fn is_failure(&self) -> bool {
        !matches!(self, ExecutionOutcome::Completed)
    }
}

/// Delay policy between retry attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryStrategy {
    /// Constant delay between attempts.
    Fixed,
    /// `retry_delay_seconds * 2^retry_count`.
    Exponential,
}

impl RetryStrategy {
    /// Delay before the attempt after `retry_count` failures.
    pub fn delay_secs(&self, base_secs: u32, retry_count: u32) -> u64 {
        match self {
            RetryStrategy::Fixed => base_secs as u64,
            RetryStrategy::Exponential => {
                (base_secs as u64).saturating_mul(2u64.saturating_pow(retry_count))
            }
        }
    }
}

impl std::fmt::Display for RetryStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RetryStrategy::Fixed => "fixed",
            RetryStrategy::Exponential => "exponential",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for RetryStrategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "fixed" => Ok(RetryStrategy::Fixed),
            "exponential" => Ok(RetryStrategy::Exponential),
            other => Err(format!("unknown retry strategy: {other}")),
        }
    }
}

/// A persisted job record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// UUIDv7 string — primary key.
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    /// Disabled jobs keep their state but never enqueue.
    pub enabled: bool,
    pub schedule: ScheduleConfig,
    /// ISO-8601 timestamp of the next planned cycle, if any.
    pub next_run_at: Option<String>,
    /// Deadline the worker is expected to enforce on itself.
    pub timeout_seconds: u32,
    pub max_retries: u32,
    pub retry_strategy: RetryStrategy,
    pub retry_delay_seconds: u32,
    /// When false, at most one execution may be running at a time.
    pub allow_concurrent: bool,
    /// Optional single upstream job gating each cycle.
    pub depends_on_job: Option<String>,
    /// Failure streak that triggers a notification event (not quarantine).
    pub notify_after_failures: Option<u32>,
    /// Failure streak that quarantines the job.
    pub dead_letter_threshold: u32,
    pub consecutive_failures: u32,
    pub in_dead_letter_queue: bool,
    pub dead_letter_reason: Option<String>,
    pub dead_letter_since: Option<String>,
    pub created_by: String,
    pub created_at: String,
    pub updated_at: String,
}

/// Parameters for creating a job. Everything but name and schedule has a
/// reasonable default.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub name: String,
    pub description: Option<String>,
    pub schedule: ScheduleConfig,
    pub timeout_seconds: u32,
    pub max_retries: u32,
    pub retry_strategy: RetryStrategy,
    pub retry_delay_seconds: u32,
    pub allow_concurrent: bool,
    pub depends_on_job: Option<String>,
    pub notify_after_failures: Option<u32>,
    /// Falls back to the engine default when `None`.
    pub dead_letter_threshold: Option<u32>,
}

impl NewJob {
    pub fn new(name: impl Into<String>, schedule: ScheduleConfig) -> Self {
        Self {
            name: name.into(),
            description: None,
            schedule,
            timeout_seconds: 300,
            max_retries: 0,
            retry_strategy: RetryStrategy::Fixed,
            retry_delay_seconds: 60,
            allow_concurrent: false,
            depends_on_job: None,
            notify_after_failures: None,
            dead_letter_threshold: None,
        }
    }
}

/// Partial update for a job; `None` fields are left unchanged. The nested
/// options distinguish "leave alone" from "clear".
#[derive(Debug, Clone, Default)]
pub struct JobUpdate {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub schedule: Option<ScheduleConfig>,
    pub timeout_seconds: Option<u32>,
    pub max_retries: Option<u32>,
    pub retry_strategy: Option<RetryStrategy>,
    pub retry_delay_seconds: Option<u32>,
    pub allow_concurrent: Option<bool>,
    pub depends_on_job: Option<Option<String>>,
    pub notify_after_failures: Option<Option<u32>>,
    pub dead_letter_threshold: Option<u32>,
}

/// One attempt of a job at a point in time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Execution {
    pub id: String,
    pub job_id: String,
    /// The scheduling cycle this attempt (and its retries) belongs to.
    pub scheduled_at: String,
    /// When the row becomes claimable — equals `scheduled_at` for first
    /// attempts, `now + retry delay` for retries.
    pub next_run_at: String,
    pub status: ExecutionStatus,
    pub locked_by: Option<String>,
    pub locked_at: Option<String>,
    pub locked_until: Option<String>,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
    pub duration_ms: Option<i64>,
    pub output: Option<String>,
    pub error: Option<String>,
    pub retry_count: u32,
    pub is_retry: bool,
    /// Link to the attempt this row retries, forming the retry chain.
    pub parent_execution: Option<String>,
    /// The upstream job's execution that must complete before this one
    /// may be claimed.
    pub dependency_execution: Option<String>,
    pub created_at: String,
}

/// Result of a `finish` call.
#[derive(Debug, Clone)]
pub struct FinishReport {
    /// Terminal status the execution landed in.
    pub status: ExecutionStatus,
    /// The retry row created by a failure, if any.
    pub retry: Option<Execution>,
    /// True when this failure pushed the job over its dead-letter threshold.
    pub entered_dead_letter: bool,
    /// The job's failure streak after this finish.
    pub consecutive_failures: u32,
    /// True when the call repeated an earlier finish and changed nothing.
    pub already_finished: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_roundtrip() {
        for status in [
            ExecutionStatus::Pending,
            ExecutionStatus::Running,
            ExecutionStatus::Completed,
            ExecutionStatus::Failed,
            ExecutionStatus::Timeout,
            ExecutionStatus::Skipped,
        ] {
            let parsed: ExecutionStatus = status.to_string().parse().expect("parse failed");
            assert_eq!(parsed, status);
        }
        assert!("paused".parse::<ExecutionStatus>().is_err());
    }

    #[test]
    fn terminal_states() {
        assert!(!ExecutionStatus::Pending.is_terminal());
        assert!(!ExecutionStatus::Running.is_terminal());
        assert!(ExecutionStatus::Completed.is_terminal());
        assert!(ExecutionStatus::Skipped.is_terminal());
    }

    #[test]
    fn exponential_delay_doubles_per_attempt() {
        let strategy = RetryStrategy::Exponential;
        assert_eq!(strategy.delay_secs(30, 0), 30);
        assert_eq!(strategy.delay_secs(30, 1), 60);
        assert_eq!(strategy.delay_secs(30, 2), 120);
        assert_eq!(strategy.delay_secs(30, 5), 960);
    }

    #[test]
    fn fixed_delay_is_constant() {
        let strategy = RetryStrategy::Fixed;
        assert_eq!(strategy.delay_secs(45, 0), 45);
        assert_eq!(strategy.delay_secs(45, 7), 45);
    }

    #[test]
    fn exponential_delay_saturates() {
        let strategy = RetryStrategy::Exponential;
        // Huge retry counts must not overflow.
        assert_eq!(strategy.delay_secs(u32::MAX, 64), u64::MAX);
    }
}
