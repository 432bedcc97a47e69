use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use rusqlite::Connection;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use tempo_core::{AccountId, Clock};

use crate::db::init_db;
use crate::dlq;
use crate::error::{ExecError, Result};
use crate::types::{Execution, ExecutionOutcome, ExecutionStatus, FinishReport};

/// A lease the reaper forced to `failed`.
#[derive(Debug, Clone)]
pub struct ReapedLease {
    pub execution_id: String,
    pub job_id: String,
    /// The synthetic failure pushed the job into the dead-letter queue.
    pub entered_dead_letter: bool,
}

/// Thread-safe manager for execution attempts.
///
/// All state transitions are conditional UPDATEs keyed on the current
/// status (and lease holder), so concurrent schedulers and workers race
/// safely through the shared store: exactly one `claim` wins, a repeated
/// `finish` is a no-op, and a lost lease surfaces as `LeaseLost` instead of
/// corrupting a newer attempt.
pub struct ExecutionStore {
    pub(crate) db: Mutex<Connection>,
    clock: Arc<dyn Clock>,
}

impl ExecutionStore {
    /// Wrap a connection, initialising the schema if needed.
    pub fn new(conn: Connection, clock: Arc<dyn Clock>) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self {
            db: Mutex::new(conn),
            clock,
        })
    }

    /// Insert a `pending` execution for `job_id`'s cycle at `scheduled_at`.
    ///
    /// No-op (`Ok(None)`) when the job is disabled, soft-deleted or
    /// quarantined — those jobs must never produce new pending rows.
    #[instrument(skip(self), fields(account = %account, job_id))]
    pub fn enqueue(
        &self,
        account: &AccountId,
        job_id: &str,
        scheduled_at: DateTime<Utc>,
    ) -> Result<Option<Execution>> {
        let now = self.clock.now();
        let db = self.db.lock().unwrap();
        enqueue_in(&db, now, account, job_id, scheduled_at)
    }

    /// Pending executions whose `next_run_at` has arrived, oldest first.
    /// This is the worker poll: claim what it returns.
    pub fn due_pending(&self, account: &AccountId, limit: usize) -> Result<Vec<Execution>> {
        let now_str = self.clock.now().to_rfc3339();
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(&format!(
            "{EXEC_SELECT}
             WHERE account_id = ?1 AND status = 'pending' AND next_run_at <= ?2
               AND deleted_at IS NULL
             ORDER BY next_run_at
             LIMIT ?3"
        ))?;
        let rows = stmt.query_map(
            rusqlite::params![account.as_str(), now_str, limit as i64],
            row_to_execution,
        )?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// Atomically claim a pending execution for `worker_id`.
    ///
    /// Returns `false` on a lost race (the row was already claimed —
    /// expected and non-fatal, the caller just moves on) and when the
    /// dependency gate marks the row `skipped` instead.
    #[instrument(skip(self), fields(account = %account, execution_id, worker_id))]
    pub fn claim(
        &self,
        account: &AccountId,
        execution_id: &str,
        worker_id: &str,
        lease_secs: u64,
    ) -> Result<bool> {
        let now = self.clock.now();
        let db = self.db.lock().unwrap();
        claim_in(&db, now, account, execution_id, worker_id, lease_secs)
    }

    /// Extend the lease of a running execution.
    #[instrument(skip(self), fields(account = %account, execution_id, worker_id))]
    pub fn renew(
        &self,
        account: &AccountId,
        execution_id: &str,
        worker_id: &str,
        lease_secs: u64,
    ) -> Result<()> {
        let now = self.clock.now();
        let locked_until = (now + Duration::seconds(lease_secs as i64)).to_rfc3339();
        let db = self.db.lock().unwrap();
        let changed = db.execute(
            "UPDATE executions SET locked_until = ?1
             WHERE account_id = ?2 AND id = ?3 AND status = 'running' AND locked_by = ?4",
            rusqlite::params![locked_until, account.as_str(), execution_id, worker_id],
        )?;
        if changed == 0 {
            // Distinguish a vanished row from a stolen/expired lease.
            get_execution_in(&db, account, execution_id)?;
            return Err(ExecError::LeaseLost {
                id: execution_id.to_string(),
                worker: worker_id.to_string(),
            });
        }
        Ok(())
    }

    /// Finish a running execution with `outcome`.
    ///
    /// Idempotent: finishing an already-terminal row changes nothing and
    /// reports `already_finished`. Failures and timeouts feed the
    /// dead-letter accounting and, while retries remain, create exactly one
    /// new pending attempt linked through `parent_execution`.
    #[instrument(skip(self, output, error), fields(account = %account, execution_id, worker_id))]
    pub fn finish(
        &self,
        account: &AccountId,
        execution_id: &str,
        worker_id: &str,
        outcome: ExecutionOutcome,
        output: Option<&str>,
        error: Option<&str>,
    ) -> Result<FinishReport> {
        let now = self.clock.now();
        let mut conn = self.db.lock().unwrap();
        let tx = conn.transaction()?;
        let report = finish_in(&tx, now, account, execution_id, worker_id, outcome, output, error)?;
        tx.commit()?;
        Ok(report)
    }

    /// Force expired leases to `failed` with a synthetic error.
    ///
    /// Invoked by a scheduler tick, never automatically on read paths. The
    /// synthetic failure flows through the normal retry and dead-letter
    /// logic.
    #[instrument(skip(self), fields(account = %account))]
    pub fn reap_expired(&self, account: &AccountId) -> Result<Vec<ReapedLease>> {
        let now = self.clock.now();
        let mut conn = self.db.lock().unwrap();
        let tx = conn.transaction()?;
        let reaped = reap_expired_in(&tx, now, Some(account))?;
        tx.commit()?;
        Ok(reaped)
    }

    /// Retrieve one execution.
    pub fn get(&self, account: &AccountId, execution_id: &str) -> Result<Execution> {
        let db = self.db.lock().unwrap();
        get_execution_in(&db, account, execution_id)
    }

    /// Executions of a job, newest cycle first.
    pub fn list_for_job(
        &self,
        account: &AccountId,
        job_id: &str,
        limit: usize,
    ) -> Result<Vec<Execution>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(&format!(
            "{EXEC_SELECT}
             WHERE account_id = ?1 AND job_id = ?2 AND deleted_at IS NULL
             ORDER BY next_run_at DESC, created_at DESC
             LIMIT ?3"
        ))?;
        let rows = stmt.query_map(
            rusqlite::params![account.as_str(), job_id, limit as i64],
            row_to_execution,
        )?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// Walk the retry chain from `execution_id` back to the first attempt.
    ///
    /// A revisited id means the chain loops — structural corruption, so the
    /// walk aborts with `DependencyCycle` rather than spinning.
    pub fn retry_chain(&self, account: &AccountId, execution_id: &str) -> Result<Vec<Execution>> {
        let db = self.db.lock().unwrap();
        let mut chain = Vec::new();
        let mut visited: HashSet<String> = HashSet::new();
        let mut cursor = Some(execution_id.to_string());

        while let Some(id) = cursor {
            if !visited.insert(id.clone()) {
                return Err(ExecError::DependencyCycle { id });
            }
            let execution = get_execution_in(&db, account, &id)?;
            cursor = execution.parent_execution.clone();
            chain.push(execution);
        }
        Ok(chain)
    }
}

/// Column list shared by every execution query, in `row_to_execution` order.
const EXEC_SELECT: &str = "SELECT id, job_id, scheduled_at, next_run_at, status, locked_by,
        locked_at, locked_until, started_at, completed_at, duration_ms, output, error,
        retry_count, is_retry, parent_execution, dependency_execution, created_at
 FROM executions";

/// Map a SQLite row to an `Execution`.
fn row_to_execution(row: &rusqlite::Row<'_>) -> rusqlite::Result<Execution> {
    let status_str: String = row.get(4)?;
    let status = status_str.parse().unwrap_or(ExecutionStatus::Pending);

    Ok(Execution {
        id: row.get(0)?,
        job_id: row.get(1)?,
        scheduled_at: row.get(2)?,
        next_run_at: row.get(3)?,
        status,
        locked_by: row.get(5)?,
        locked_at: row.get(6)?,
        locked_until: row.get(7)?,
        started_at: row.get(8)?,
        completed_at: row.get(9)?,
        duration_ms: row.get(10)?,
        output: row.get(11)?,
        error: row.get(12)?,
        retry_count: row.get::<_, i64>(13)? as u32,
        is_retry: row.get::<_, i64>(14)? != 0,
        parent_execution: row.get(15)?,
        dependency_execution: row.get(16)?,
        created_at: row.get(17)?,
    })
}

pub(crate) fn get_execution_in(
    conn: &Connection,
    account: &AccountId,
    execution_id: &str,
) -> Result<Execution> {
    conn.query_row(
        &format!("{EXEC_SELECT} WHERE account_id = ?1 AND id = ?2"),
        rusqlite::params![account.as_str(), execution_id],
        row_to_execution,
    )
    .map_err(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => ExecError::ExecutionNotFound {
            id: execution_id.to_string(),
        },
        other => ExecError::Database(other),
    })
}

/// Insert a pending execution on the caller's connection. Shared with the
/// engine's due-job sweep.
pub(crate) fn enqueue_in(
    conn: &Connection,
    now: DateTime<Utc>,
    account: &AccountId,
    job_id: &str,
    scheduled_at: DateTime<Utc>,
) -> Result<Option<Execution>> {
    let (enabled, deleted, quarantined, depends_on): (bool, bool, bool, Option<String>) = conn
        .query_row(
            "SELECT enabled, deleted_at IS NOT NULL, in_dead_letter_queue, depends_on_job
             FROM jobs WHERE account_id = ?1 AND id = ?2",
            rusqlite::params![account.as_str(), job_id],
            |row| {
                Ok((
                    row.get::<_, i64>(0)? != 0,
                    row.get::<_, i64>(1)? != 0,
                    row.get::<_, i64>(2)? != 0,
                    row.get(3)?,
                ))
            },
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => ExecError::JobNotFound {
                id: job_id.to_string(),
            },
            other => ExecError::Database(other),
        })?;

    if !enabled || deleted || quarantined {
        debug!(job_id, enabled, deleted, quarantined, "enqueue suppressed");
        return Ok(None);
    }

    // Gate on the upstream job's attempt for this cycle: the most recent
    // execution it has produced so far.
    let dependency_execution: Option<String> = match depends_on {
        Some(upstream) => conn
            .query_row(
                "SELECT id FROM executions
                 WHERE account_id = ?1 AND job_id = ?2 AND deleted_at IS NULL
                 ORDER BY scheduled_at DESC, created_at DESC
                 LIMIT 1",
                rusqlite::params![account.as_str(), upstream],
                |row| row.get(0),
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(ExecError::Database(other)),
            })?,
        None => None,
    };

    let id = Uuid::now_v7().to_string();
    let scheduled_str = scheduled_at.to_rfc3339();
    let now_str = now.to_rfc3339();
    conn.execute(
        "INSERT INTO executions
         (id, account_id, job_id, scheduled_at, next_run_at, status, retry_count,
          is_retry, dependency_execution, created_at)
         VALUES (?1, ?2, ?3, ?4, ?4, 'pending', 0, 0, ?5, ?6)",
        rusqlite::params![
            id,
            account.as_str(),
            job_id,
            scheduled_str,
            dependency_execution,
            now_str
        ],
    )?;

    debug!(job_id, execution_id = %id, scheduled_at = %scheduled_str, "execution enqueued");

    Ok(Some(Execution {
        id,
        job_id: job_id.to_string(),
        scheduled_at: scheduled_str.clone(),
        next_run_at: scheduled_str,
        status: ExecutionStatus::Pending,
        locked_by: None,
        locked_at: None,
        locked_until: None,
        started_at: None,
        completed_at: None,
        duration_ms: None,
        output: None,
        error: None,
        retry_count: 0,
        is_retry: false,
        parent_execution: None,
        dependency_execution,
        created_at: now_str,
    }))
}

pub(crate) fn claim_in(
    conn: &Connection,
    now: DateTime<Utc>,
    account: &AccountId,
    execution_id: &str,
    worker_id: &str,
    lease_secs: u64,
) -> Result<bool> {
    let execution = get_execution_in(conn, account, execution_id)?;
    if execution.status != ExecutionStatus::Pending {
        return Ok(false);
    }

    let (allow_concurrent, depends_on): (bool, Option<String>) = conn
        .query_row(
            "SELECT allow_concurrent, depends_on_job FROM jobs
             WHERE account_id = ?1 AND id = ?2",
            rusqlite::params![account.as_str(), execution.job_id],
            |row| Ok((row.get::<_, i64>(0)? != 0, row.get(1)?)),
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => ExecError::JobNotFound {
                id: execution.job_id.clone(),
            },
            other => ExecError::Database(other),
        })?;

    // Dependency gate: the upstream attempt must have completed, otherwise
    // this row is skipped — terminal, it never reaches running.
    if depends_on.is_some() {
        let satisfied = match &execution.dependency_execution {
            Some(dep_id) => {
                let dep = get_execution_in(conn, account, dep_id)?;
                dep.status == ExecutionStatus::Completed
            }
            // Upstream never produced an attempt for this cycle.
            None => false,
        };
        if !satisfied {
            conn.execute(
                "UPDATE executions SET status = 'skipped', completed_at = ?1,
                     error = 'dependency not satisfied'
                 WHERE account_id = ?2 AND id = ?3 AND status = 'pending'",
                rusqlite::params![now.to_rfc3339(), account.as_str(), execution_id],
            )?;
            info!(execution_id, job_id = %execution.job_id, "execution skipped: dependency not satisfied");
            return Ok(false);
        }
    }

    let now_str = now.to_rfc3339();
    let locked_until = (now + Duration::seconds(lease_secs as i64)).to_rfc3339();

    // Compare-and-set on status; for single-flight jobs the claim also
    // fails while any sibling attempt is still running.
    let claimed = if allow_concurrent {
        conn.execute(
            "UPDATE executions
             SET status = 'running', locked_by = ?1, locked_at = ?2, locked_until = ?3,
                 started_at = ?2
             WHERE account_id = ?4 AND id = ?5 AND status = 'pending'",
            rusqlite::params![worker_id, now_str, locked_until, account.as_str(), execution_id],
        )?
    } else {
        conn.execute(
            "UPDATE executions
             SET status = 'running', locked_by = ?1, locked_at = ?2, locked_until = ?3,
                 started_at = ?2
             WHERE account_id = ?4 AND id = ?5 AND status = 'pending'
               AND NOT EXISTS (
                   SELECT 1 FROM executions running
                   WHERE running.account_id = ?4 AND running.job_id = ?6
                     AND running.status = 'running'
               )",
            rusqlite::params![
                worker_id,
                now_str,
                locked_until,
                account.as_str(),
                execution_id,
                execution.job_id
            ],
        )?
    };

    if claimed == 1 {
        debug!(execution_id, worker_id, %locked_until, "execution claimed");
        Ok(true)
    } else {
        debug!(execution_id, worker_id, "claim lost");
        Ok(false)
    }
}

/// The full finish flow on the caller's connection/transaction.
#[allow(clippy::too_many_arguments)]
pub(crate) fn finish_in(
    conn: &Connection,
    now: DateTime<Utc>,
    account: &AccountId,
    execution_id: &str,
    worker_id: &str,
    outcome: ExecutionOutcome,
    output: Option<&str>,
    error_message: Option<&str>,
) -> Result<FinishReport> {
    let execution = get_execution_in(conn, account, execution_id)?;

    // Idempotency: a resent finish for a settled row is a no-op.
    if execution.status.is_terminal() {
        let consecutive = job_streak_in(conn, account, &execution.job_id)?;
        return Ok(FinishReport {
            status: execution.status,
            retry: None,
            entered_dead_letter: false,
            consecutive_failures: consecutive,
            already_finished: true,
        });
    }

    if execution.status != ExecutionStatus::Running {
        return Err(ExecError::InvalidState {
            id: execution_id.to_string(),
            state: execution.status.to_string(),
            operation: "finish".to_string(),
        });
    }
    if execution.locked_by.as_deref() != Some(worker_id) {
        return Err(ExecError::LeaseLost {
            id: execution_id.to_string(),
            worker: worker_id.to_string(),
        });
    }

    let (max_retries, retry_strategy, retry_delay_seconds, notify_after): (
        u32,
        crate::types::RetryStrategy,
        u32,
        Option<u32>,
    ) = conn
        .query_row(
            "SELECT max_retries, retry_strategy, retry_delay_seconds, notify_after_failures
             FROM jobs WHERE account_id = ?1 AND id = ?2",
            rusqlite::params![account.as_str(), execution.job_id],
            |row| {
                let strategy: String = row.get(1)?;
                Ok((
                    row.get::<_, i64>(0)? as u32,
                    strategy.parse().unwrap_or(crate::types::RetryStrategy::Fixed),
                    row.get::<_, i64>(2)? as u32,
                    row.get::<_, Option<i64>>(3)?.map(|n| n as u32),
                ))
            },
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => ExecError::JobNotFound {
                id: execution.job_id.clone(),
            },
            other => ExecError::Database(other),
        })?;

    let duration_ms = execution
        .started_at
        .as_deref()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|started| (now - started.with_timezone(&Utc)).num_milliseconds());

    let final_status = outcome.status();
    let changed = conn.execute(
        "UPDATE executions
         SET status = ?1, completed_at = ?2, duration_ms = ?3, output = ?4, error = ?5,
             locked_until = NULL
         WHERE account_id = ?6 AND id = ?7 AND status = 'running' AND locked_by = ?8",
        rusqlite::params![
            final_status.to_string(),
            now.to_rfc3339(),
            duration_ms,
            output,
            error_message,
            account.as_str(),
            execution_id,
            worker_id
        ],
    )?;
    if changed == 0 {
        // Lost a race with the reaper or another caller between the read
        // and the write; settle on whatever the row says now.
        let current = get_execution_in(conn, account, execution_id)?;
        if current.status.is_terminal() {
            let consecutive = job_streak_in(conn, account, &execution.job_id)?;
            return Ok(FinishReport {
                status: current.status,
                retry: None,
                entered_dead_letter: false,
                consecutive_failures: consecutive,
                already_finished: true,
            });
        }
        return Err(ExecError::LeaseLost {
            id: execution_id.to_string(),
            worker: worker_id.to_string(),
        });
    }

    if !outcome.is_failure() {
        dlq::record_success_in(conn, now, account, &execution.job_id)?;
        info!(execution_id, job_id = %execution.job_id, ?duration_ms, "execution completed");
        return Ok(FinishReport {
            status: final_status,
            retry: None,
            entered_dead_letter: false,
            consecutive_failures: 0,
            already_finished: false,
        });
    }

    let reason = error_message.unwrap_or("execution failed");
    let accounting = dlq::record_failure_in(conn, now, account, &execution.job_id, reason)?;

    if let Some(threshold) = notify_after {
        if accounting.consecutive == threshold && !accounting.in_dead_letter {
            warn!(
                job_id = %execution.job_id,
                consecutive = accounting.consecutive,
                "job crossed its notification threshold"
            );
        }
    }

    let retry = if !accounting.in_dead_letter && execution.retry_count < max_retries {
        if chain_loops_in(conn, account, &execution)? {
            // Structural corruption: retrying cannot fix it.
            error!(execution_id, "retry chain loops; force-failing without retry");
            None
        } else {
            let delay = retry_strategy.delay_secs(retry_delay_seconds, execution.retry_count);
            Some(insert_retry_in(conn, now, account, &execution, delay)?)
        }
    } else {
        None
    };

    info!(
        execution_id,
        job_id = %execution.job_id,
        status = %final_status,
        retry_scheduled = retry.is_some(),
        consecutive = accounting.consecutive,
        "execution failed"
    );

    Ok(FinishReport {
        status: final_status,
        retry,
        entered_dead_letter: accounting.entered_now,
        consecutive_failures: accounting.consecutive,
        already_finished: false,
    })
}

/// Force expired leases to `failed`, feeding normal retry logic.
/// `account = None` sweeps every tenant (engine tick).
pub(crate) fn reap_expired_in(
    conn: &Connection,
    now: DateTime<Utc>,
    account: Option<&AccountId>,
) -> Result<Vec<ReapedLease>> {
    let now_str = now.to_rfc3339();
    let expired: Vec<(String, String, String, String)> = {
        let mut stmt = conn.prepare(
            "SELECT id, account_id, job_id, locked_by FROM executions
             WHERE status = 'running' AND locked_until IS NOT NULL AND locked_until < ?1
               AND (?2 IS NULL OR account_id = ?2)",
        )?;
        let rows: Vec<_> = stmt
            .query_map(
                rusqlite::params![now_str, account.map(|a| a.as_str())],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, Option<String>>(3)?.unwrap_or_default(),
                    ))
                },
            )?
            .filter_map(|r| r.ok())
            .collect();
        rows
    };

    let mut reaped = Vec::with_capacity(expired.len());
    for (execution_id, account_id, job_id, locked_by) in expired {
        let row_account = AccountId::new(account_id);
        let report = finish_in(
            conn,
            now,
            &row_account,
            &execution_id,
            &locked_by,
            ExecutionOutcome::Failed,
            None,
            Some("lease expired"),
        )?;
        warn!(execution_id = %execution_id, job_id = %job_id, "stale lease reaped");
        reaped.push(ReapedLease {
            execution_id,
            job_id,
            entered_dead_letter: report.entered_dead_letter,
        });
    }
    Ok(reaped)
}

fn job_streak_in(conn: &Connection, account: &AccountId, job_id: &str) -> Result<u32> {
    conn.query_row(
        "SELECT consecutive_failures FROM jobs WHERE account_id = ?1 AND id = ?2",
        rusqlite::params![account.as_str(), job_id],
        |row| row.get::<_, i64>(0).map(|n| n as u32),
    )
    .map_err(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => ExecError::JobNotFound {
            id: job_id.to_string(),
        },
        other => ExecError::Database(other),
    })
}

/// True when walking `parent_execution` from `execution` revisits a row.
fn chain_loops_in(conn: &Connection, account: &AccountId, execution: &Execution) -> Result<bool> {
    let mut visited: HashSet<String> = HashSet::new();
    visited.insert(execution.id.clone());
    let mut cursor = execution.parent_execution.clone();

    while let Some(id) = cursor {
        if !visited.insert(id.clone()) {
            return Ok(true);
        }
        cursor = match conn.query_row(
            "SELECT parent_execution FROM executions WHERE account_id = ?1 AND id = ?2",
            rusqlite::params![account.as_str(), id],
            |row| row.get::<_, Option<String>>(0),
        ) {
            Ok(parent) => parent,
            Err(rusqlite::Error::QueryReturnedNoRows) => None,
            Err(e) => return Err(ExecError::Database(e)),
        };
    }
    Ok(false)
}

fn insert_retry_in(
    conn: &Connection,
    now: DateTime<Utc>,
    account: &AccountId,
    failed: &Execution,
    delay_secs: u64,
) -> Result<Execution> {
    let id = Uuid::now_v7().to_string();
    let next_run_at = (now + Duration::seconds(delay_secs as i64)).to_rfc3339();
    let now_str = now.to_rfc3339();
    let retry_count = failed.retry_count + 1;

    conn.execute(
        "INSERT INTO executions
         (id, account_id, job_id, scheduled_at, next_run_at, status, retry_count,
          is_retry, parent_execution, dependency_execution, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, 'pending', ?6, 1, ?7, ?8, ?9)",
        rusqlite::params![
            id,
            account.as_str(),
            failed.job_id,
            failed.scheduled_at,
            next_run_at,
            retry_count,
            failed.id,
            failed.dependency_execution,
            now_str
        ],
    )?;

    debug!(
        parent = %failed.id,
        retry = %id,
        retry_count,
        delay_secs,
        "retry execution created"
    );

    Ok(Execution {
        id,
        job_id: failed.job_id.clone(),
        scheduled_at: failed.scheduled_at.clone(),
        next_run_at,
        status: ExecutionStatus::Pending,
        locked_by: None,
        locked_at: None,
        locked_until: None,
        started_at: None,
        completed_at: None,
        duration_ms: None,
        output: None,
        error: None,
        retry_count,
        is_retry: true,
        parent_execution: Some(failed.id.clone()),
        dependency_execution: failed.dependency_execution.clone(),
        created_at: now_str,
    })
}
