use rusqlite::Connection;

use crate::error::Result;

/// Initialise the jobs/executions schema in `conn`.
///
/// Indexes cover the three hot queries: the due-job sweep, the claimable
/// work poll and the single-flight check on claim.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS jobs (
            id                    TEXT    NOT NULL PRIMARY KEY,
            account_id            TEXT    NOT NULL,
            name                  TEXT    NOT NULL,
            description           TEXT,
            enabled               INTEGER NOT NULL DEFAULT 1,
            schedule              TEXT    NOT NULL,   -- JSON ScheduleConfig
            next_run_at           TEXT,               -- ISO-8601 or NULL
            timeout_seconds       INTEGER NOT NULL DEFAULT 300,
            max_retries           INTEGER NOT NULL DEFAULT 0,
            retry_strategy        TEXT    NOT NULL DEFAULT 'fixed',
            retry_delay_seconds   INTEGER NOT NULL DEFAULT 60,
            allow_concurrent      INTEGER NOT NULL DEFAULT 0,
            depends_on_job        TEXT,
            notify_after_failures INTEGER,
            dead_letter_threshold INTEGER NOT NULL DEFAULT 5,
            consecutive_failures  INTEGER NOT NULL DEFAULT 0,
            in_dead_letter_queue  INTEGER NOT NULL DEFAULT 0,
            dead_letter_reason    TEXT,
            dead_letter_since     TEXT,
            created_by            TEXT    NOT NULL,
            created_at            TEXT    NOT NULL,
            updated_at            TEXT    NOT NULL,
            deleted_at            TEXT
        ) STRICT;

        -- Due-job sweep: enabled, live, not quarantined, next_run_at <= now.
        CREATE INDEX IF NOT EXISTS idx_jobs_due
            ON jobs (account_id, next_run_at)
            WHERE enabled = 1 AND deleted_at IS NULL AND in_dead_letter_queue = 0;

        CREATE TABLE IF NOT EXISTS executions (
            id                   TEXT    NOT NULL PRIMARY KEY,
            account_id           TEXT    NOT NULL,
            job_id               TEXT    NOT NULL,
            scheduled_at         TEXT    NOT NULL,   -- the cycle this attempt belongs to
            next_run_at          TEXT    NOT NULL,   -- when it becomes claimable
            status               TEXT    NOT NULL DEFAULT 'pending',
            locked_by            TEXT,
            locked_at            TEXT,
            locked_until         TEXT,
            started_at           TEXT,
            completed_at         TEXT,
            duration_ms          INTEGER,
            output               TEXT,
            error                TEXT,
            retry_count          INTEGER NOT NULL DEFAULT 0,
            is_retry             INTEGER NOT NULL DEFAULT 0,
            parent_execution     TEXT,               -- retry chain link
            dependency_execution TEXT,               -- upstream gate
            created_at           TEXT    NOT NULL,
            deleted_at           TEXT
        ) STRICT;

        CREATE INDEX IF NOT EXISTS idx_executions_claimable
            ON executions (account_id, status, next_run_at);

        CREATE INDEX IF NOT EXISTS idx_executions_job
            ON executions (account_id, job_id, status);

        -- Reaper scan: running rows whose lease has lapsed.
        CREATE INDEX IF NOT EXISTS idx_executions_lease
            ON executions (locked_until) WHERE status = 'running';
        ",
    )?;
    Ok(())
}
