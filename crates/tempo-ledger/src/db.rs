use rusqlite::Connection;

use crate::error::Result;

/// Initialise the ledger schema in `conn`.
///
/// `versions` is append-only; the partial index on `functions` lets a name
/// be re-created after a soft delete while keeping live names unique per
/// job.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS versions (
            id                 TEXT    NOT NULL PRIMARY KEY,
            account_id         TEXT    NOT NULL,
            subject_kind       TEXT    NOT NULL,   -- 'function' | 'job'
            subject_id         TEXT    NOT NULL,
            version_number     INTEGER NOT NULL,
            content_hash       TEXT    NOT NULL,
            is_current         INTEGER NOT NULL DEFAULT 0,
            change_description TEXT    NOT NULL,
            diff_summary       TEXT,               -- JSON DiffSummary, NULL for v1
            created_by         TEXT    NOT NULL,
            created_at         TEXT    NOT NULL,
            UNIQUE (account_id, subject_kind, subject_id, version_number)
        ) STRICT;

        CREATE INDEX IF NOT EXISTS idx_versions_current
            ON versions (account_id, subject_kind, subject_id, is_current);

        CREATE TABLE IF NOT EXISTS functions (
            id           TEXT NOT NULL PRIMARY KEY,
            account_id   TEXT NOT NULL,
            job_id       TEXT NOT NULL,
            name         TEXT NOT NULL,
            content_hash TEXT NOT NULL,
            created_at   TEXT NOT NULL,
            updated_at   TEXT NOT NULL,
            deleted_at   TEXT
        ) STRICT;

        CREATE UNIQUE INDEX IF NOT EXISTS idx_functions_live_name
            ON functions (account_id, job_id, name) WHERE deleted_at IS NULL;

        CREATE INDEX IF NOT EXISTS idx_functions_job
            ON functions (account_id, job_id);
        ",
    )?;
    Ok(())
}
