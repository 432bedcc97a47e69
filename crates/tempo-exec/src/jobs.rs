use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use rusqlite::Connection;
use tracing::{info, instrument};
use uuid::Uuid;

use tempo_core::config::DEFAULT_DEAD_LETTER_THRESHOLD;
use tempo_core::{permissions, AccountId, Action, ActorId, Clock, PermissionGate};
use tempo_schedule::{next_run, validate, ScheduleConfig};

use crate::db::init_db;
use crate::error::{ExecError, Result};
use crate::types::{Job, JobUpdate, NewJob, RetryStrategy};

/// Thread-safe manager for job definitions.
///
/// Schedule configs are validated on every save, so a job that reaches the
/// scheduler always yields a computable next run. Jobs are soft-deleted
/// only — executions keep referencing them for audit.
pub struct JobStore {
    db: Mutex<Connection>,
    clock: Arc<dyn Clock>,
    gate: Arc<dyn PermissionGate>,
}

impl JobStore {
    /// Wrap a connection, initialising the schema if needed.
    pub fn new(
        conn: Connection,
        clock: Arc<dyn Clock>,
        gate: Arc<dyn PermissionGate>,
    ) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self {
            db: Mutex::new(conn),
            clock,
            gate,
        })
    }

    /// Create a job. Returns the fully populated record with its first
    /// `next_run_at` already computed.
    #[instrument(skip(self, new), fields(account = %account, name = %new.name))]
    pub fn create(&self, account: &AccountId, actor: &ActorId, new: NewJob) -> Result<Job> {
        permissions::ensure(self.gate.as_ref(), actor, Action::Edit, "jobs")?;
        validate(&new.schedule)?;

        let now = self.clock.now();
        let next = next_run(&new.schedule, now)?.to_rfc3339();
        let id = Uuid::now_v7().to_string();
        let now_str = now.to_rfc3339();
        let schedule_json = serde_json::to_string(&new.schedule)?;
        let threshold = new
            .dead_letter_threshold
            .unwrap_or(DEFAULT_DEAD_LETTER_THRESHOLD);

        let db = self.db.lock().unwrap();
        if let Some(dep) = &new.depends_on_job {
            check_dependency_chain(&db, account, &id, dep)?;
        }
        db.execute(
            "INSERT INTO jobs
             (id, account_id, name, description, enabled, schedule, next_run_at,
              timeout_seconds, max_retries, retry_strategy, retry_delay_seconds,
              allow_concurrent, depends_on_job, notify_after_failures,
              dead_letter_threshold, consecutive_failures, in_dead_letter_queue,
              created_by, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, 1, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14,
                     0, 0, ?15, ?16, ?16)",
            rusqlite::params![
                id,
                account.as_str(),
                new.name,
                new.description,
                schedule_json,
                next,
                new.timeout_seconds,
                new.max_retries,
                new.retry_strategy.to_string(),
                new.retry_delay_seconds,
                new.allow_concurrent as i64,
                new.depends_on_job,
                new.notify_after_failures,
                threshold,
                actor.as_str(),
                now_str
            ],
        )?;

        info!(job_id = %id, name = %new.name, "job created");
        drop(db);
        self.get(account, &id)
    }

    /// Retrieve a live job by id.
    pub fn get(&self, account: &AccountId, id: &str) -> Result<Job> {
        let db = self.db.lock().unwrap();
        db.query_row(
            &format!("{JOB_SELECT} WHERE account_id = ?1 AND id = ?2 AND deleted_at IS NULL"),
            rusqlite::params![account.as_str(), id],
            row_to_job,
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => ExecError::JobNotFound { id: id.to_string() },
            other => ExecError::Database(other),
        })
    }

    /// All live jobs for the account, oldest first.
    pub fn list(&self, account: &AccountId) -> Result<Vec<Job>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(&format!(
            "{JOB_SELECT} WHERE account_id = ?1 AND deleted_at IS NULL ORDER BY created_at"
        ))?;
        let rows = stmt.query_map(rusqlite::params![account.as_str()], row_to_job)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// Jobs currently quarantined in the dead-letter queue.
    pub fn list_dead_lettered(&self, account: &AccountId) -> Result<Vec<Job>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(&format!(
            "{JOB_SELECT} WHERE account_id = ?1 AND deleted_at IS NULL
             AND in_dead_letter_queue = 1 ORDER BY dead_letter_since"
        ))?;
        let rows = stmt.query_map(rusqlite::params![account.as_str()], row_to_job)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// Apply a partial update. A schedule change recomputes `next_run_at`.
    #[instrument(skip(self, update), fields(account = %account, id))]
    pub fn update(
        &self,
        account: &AccountId,
        actor: &ActorId,
        id: &str,
        update: JobUpdate,
    ) -> Result<Job> {
        permissions::ensure(self.gate.as_ref(), actor, Action::Edit, &format!("job:{id}"))?;

        let mut job = self.get(account, id)?;
        let now = self.clock.now();

        if let Some(name) = update.name {
            job.name = name;
        }
        if let Some(description) = update.description {
            job.description = description;
        }
        if let Some(schedule) = update.schedule {
            validate(&schedule)?;
            job.next_run_at = Some(next_run(&schedule, now)?.to_rfc3339());
            job.schedule = schedule;
        }
        if let Some(timeout) = update.timeout_seconds {
            job.timeout_seconds = timeout;
        }
        if let Some(max_retries) = update.max_retries {
            job.max_retries = max_retries;
        }
        if let Some(strategy) = update.retry_strategy {
            job.retry_strategy = strategy;
        }
        if let Some(delay) = update.retry_delay_seconds {
            job.retry_delay_seconds = delay;
        }
        if let Some(concurrent) = update.allow_concurrent {
            job.allow_concurrent = concurrent;
        }
        if let Some(depends) = update.depends_on_job {
            job.depends_on_job = depends;
        }
        if let Some(notify) = update.notify_after_failures {
            job.notify_after_failures = notify;
        }
        if let Some(threshold) = update.dead_letter_threshold {
            job.dead_letter_threshold = threshold;
        }

        let schedule_json = serde_json::to_string(&job.schedule)?;
        let now_str = now.to_rfc3339();

        let db = self.db.lock().unwrap();
        if let Some(dep) = &job.depends_on_job {
            check_dependency_chain(&db, account, id, dep)?;
        }
        let changed = db.execute(
            "UPDATE jobs SET name = ?1, description = ?2, schedule = ?3, next_run_at = ?4,
                 timeout_seconds = ?5, max_retries = ?6, retry_strategy = ?7,
                 retry_delay_seconds = ?8, allow_concurrent = ?9, depends_on_job = ?10,
                 notify_after_failures = ?11, dead_letter_threshold = ?12, updated_at = ?13
             WHERE account_id = ?14 AND id = ?15 AND deleted_at IS NULL",
            rusqlite::params![
                job.name,
                job.description,
                schedule_json,
                job.next_run_at,
                job.timeout_seconds,
                job.max_retries,
                job.retry_strategy.to_string(),
                job.retry_delay_seconds,
                job.allow_concurrent as i64,
                job.depends_on_job,
                job.notify_after_failures,
                job.dead_letter_threshold,
                now_str,
                account.as_str(),
                id
            ],
        )?;
        if changed == 0 {
            return Err(ExecError::JobNotFound { id: id.to_string() });
        }
        drop(db);

        info!(job_id = %id, "job updated");
        self.get(account, id)
    }

    /// Enable or disable scheduling without touching any other state.
    #[instrument(skip(self), fields(account = %account, id, enabled))]
    pub fn set_enabled(
        &self,
        account: &AccountId,
        actor: &ActorId,
        id: &str,
        enabled: bool,
    ) -> Result<()> {
        permissions::ensure(self.gate.as_ref(), actor, Action::Edit, &format!("job:{id}"))?;
        let now_str = self.clock.now().to_rfc3339();
        let db = self.db.lock().unwrap();
        let changed = db.execute(
            "UPDATE jobs SET enabled = ?1, updated_at = ?2
             WHERE account_id = ?3 AND id = ?4 AND deleted_at IS NULL",
            rusqlite::params![enabled as i64, now_str, account.as_str(), id],
        )?;
        if changed == 0 {
            return Err(ExecError::JobNotFound { id: id.to_string() });
        }
        info!(job_id = %id, enabled, "job toggled");
        Ok(())
    }

    /// Soft-delete a job. Execution rows stay for audit; the scheduler
    /// stops seeing the job immediately.
    #[instrument(skip(self), fields(account = %account, id))]
    pub fn soft_delete(&self, account: &AccountId, actor: &ActorId, id: &str) -> Result<()> {
        permissions::ensure(self.gate.as_ref(), actor, Action::Edit, &format!("job:{id}"))?;
        let now_str = self.clock.now().to_rfc3339();
        let db = self.db.lock().unwrap();
        let changed = db.execute(
            "UPDATE jobs SET deleted_at = ?1, updated_at = ?1
             WHERE account_id = ?2 AND id = ?3 AND deleted_at IS NULL",
            rusqlite::params![now_str, account.as_str(), id],
        )?;
        if changed == 0 {
            return Err(ExecError::JobNotFound { id: id.to_string() });
        }
        info!(job_id = %id, "job soft-deleted");
        Ok(())
    }

    /// Pull a job out of the dead-letter queue: clears the quarantine
    /// fields, resets the failure streak and re-enables scheduling.
    ///
    /// Always an explicit human action — nothing in the engine calls this.
    #[instrument(skip(self), fields(account = %account, id))]
    pub fn recover(&self, account: &AccountId, actor: &ActorId, id: &str) -> Result<Job> {
        permissions::ensure(
            self.gate.as_ref(),
            actor,
            Action::Recover,
            &format!("job:{id}"),
        )?;
        let now = self.clock.now();
        // Resume the schedule from now, not from the quarantine backlog.
        let job = self.get(account, id)?;
        let next = next_run(&job.schedule, now)?.to_rfc3339();
        let now_str = now.to_rfc3339();

        let db = self.db.lock().unwrap();
        let changed = db.execute(
            "UPDATE jobs SET in_dead_letter_queue = 0, dead_letter_reason = NULL,
                 dead_letter_since = NULL, consecutive_failures = 0, enabled = 1,
                 next_run_at = ?1, updated_at = ?2
             WHERE account_id = ?3 AND id = ?4 AND deleted_at IS NULL",
            rusqlite::params![next, now_str, account.as_str(), id],
        )?;
        if changed == 0 {
            return Err(ExecError::JobNotFound { id: id.to_string() });
        }
        drop(db);

        info!(job_id = %id, "job recovered from dead-letter queue");
        self.get(account, id)
    }
}

/// Column list shared by every job query, in `row_to_job` order.
const JOB_SELECT: &str = "SELECT id, name, description, enabled, schedule, next_run_at,
        timeout_seconds, max_retries, retry_strategy, retry_delay_seconds,
        allow_concurrent, depends_on_job, notify_after_failures,
        dead_letter_threshold, consecutive_failures, in_dead_letter_queue,
        dead_letter_reason, dead_letter_since, created_by, created_at, updated_at
 FROM jobs";

/// Map a SQLite row to a `Job`.
pub(crate) fn row_to_job(row: &rusqlite::Row<'_>) -> rusqlite::Result<Job> {
    let schedule_json: String = row.get(4)?;
    let schedule: ScheduleConfig = serde_json::from_str(&schedule_json).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let strategy_str: String = row.get(8)?;
    let retry_strategy = strategy_str.parse().unwrap_or(RetryStrategy::Fixed);

    Ok(Job {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        enabled: row.get::<_, i64>(3)? != 0,
        schedule,
        next_run_at: row.get(5)?,
        timeout_seconds: row.get::<_, i64>(6)? as u32,
        max_retries: row.get::<_, i64>(7)? as u32,
        retry_strategy,
        retry_delay_seconds: row.get::<_, i64>(9)? as u32,
        allow_concurrent: row.get::<_, i64>(10)? != 0,
        depends_on_job: row.get(11)?,
        notify_after_failures: row.get::<_, Option<i64>>(12)?.map(|n| n as u32),
        dead_letter_threshold: row.get::<_, i64>(13)? as u32,
        consecutive_failures: row.get::<_, i64>(14)? as u32,
        in_dead_letter_queue: row.get::<_, i64>(15)? != 0,
        dead_letter_reason: row.get(16)?,
        dead_letter_since: row.get(17)?,
        created_by: row.get(18)?,
        created_at: row.get(19)?,
        updated_at: row.get(20)?,
    })
}

/// Walk the upstream chain starting at `dep`; reaching `job_id` (or any
/// repeat) means the dependency graph would loop.
fn check_dependency_chain(
    conn: &Connection,
    account: &AccountId,
    job_id: &str,
    dep: &str,
) -> Result<()> {
    let mut visited: HashSet<String> = HashSet::new();
    let mut cursor = Some(dep.to_string());

    while let Some(current) = cursor {
        if current == job_id || !visited.insert(current.clone()) {
            return Err(ExecError::DependencyCycle { id: current });
        }
        cursor = match conn.query_row(
            "SELECT depends_on_job FROM jobs
             WHERE account_id = ?1 AND id = ?2 AND deleted_at IS NULL",
            rusqlite::params![account.as_str(), current],
            |row| row.get::<_, Option<String>>(0),
        ) {
            Ok(next) => next,
            Err(rusqlite::Error::QueryReturnedNoRows) => None,
            Err(e) => return Err(ExecError::Database(e)),
        };
    }
    Ok(())
}
